use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{
    implementors::MemoryStore, HashCondition, HashWrite, RuntimeStore, StoreResult, Track,
};

/// A track with plausible metadata, named after `name`.
pub fn track(name: &str) -> Track {
    Track {
        source_id: format!("{name}-id"),
        source_uri: format!("spotify:track:{name}"),
        name: name.to_string(),
        artist: "Artist".to_string(),
        album: "Album".to_string(),
        duration_ms: 180_000,
        image_url: Some(format!("https://images.example/{name}.jpg")),
    }
}

/// A [MemoryStore] that stalls transactions writing to keys containing a marker,
/// like a worker that pauses between reading and writing.
#[derive(Default)]
pub struct StallingStore {
    inner: MemoryStore,
    marker: Mutex<Option<(String, Duration)>>,
}

impl StallingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stalls every transaction writing to a key that contains `marker`.
    pub fn stall_writes_to(&self, marker: impl ToString, delay: Duration) {
        *self.marker.lock() = Some((marker.to_string(), delay));
    }

    fn stall_for(&self, writes: &[HashWrite]) -> Option<Duration> {
        let marker = self.marker.lock();
        let (marker, delay) = marker.as_ref()?;

        writes
            .iter()
            .any(|write| match write {
                HashWrite::Put { key, .. } | HashWrite::Delete { key } => key.contains(marker),
            })
            .then_some(*delay)
    }
}

#[async_trait]
impl RuntimeStore for StallingStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.inner.get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.inner.set(key, value).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.inner.incr(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.inner.exists(key).await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.inner.set_add(key, members).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.inner.set_remove(key, members).await
    }

    async fn set_members(&self, key: &str) -> StoreResult<HashSet<String>> {
        self.inner.set_members(key).await
    }

    async fn set_card(&self, key: &str) -> StoreResult<u64> {
        self.inner.set_card(key).await
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.inner.set_contains(key, member).await
    }

    async fn set_add_exclusive(
        &self,
        add_key: &str,
        remove_key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        self.inner
            .set_add_exclusive(add_key, remove_key, member)
            .await
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.inner.list_push(key, value).await
    }

    async fn list_range(&self, key: &str) -> StoreResult<Vec<String>> {
        self.inner.list_range(key).await
    }

    async fn hash_put_all(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        self.inner.hash_put_all(key, fields).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.inner.hash_get(key, field).await
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.inner.hash_get_all(key).await
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        updates: &[(&str, String)],
    ) -> StoreResult<bool> {
        self.inner
            .hash_compare_and_set(key, field, expected, updates)
            .await
    }

    async fn hash_transaction(
        &self,
        conditions: &[HashCondition],
        writes: &[HashWrite],
    ) -> StoreResult<bool> {
        if let Some(delay) = self.stall_for(writes) {
            tokio::time::sleep(delay).await;
        }

        self.inner.hash_transaction(conditions, writes).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        self.inner.persist(key).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.inner.delete(keys).await
    }
}
