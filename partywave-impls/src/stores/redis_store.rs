use std::{
    collections::{HashMap, HashSet},
    time::Duration,
};

use async_trait::async_trait;
use log::info;
use redis::{aio::ConnectionManager, AsyncCommands, Client, Script};

use partywave_core::{HashCondition, HashWrite, IntoStoreError, RuntimeStore, StoreResult};

/// Implements [RuntimeStore] for a Redis server.
///
/// Conditional updates run as Lua scripts, so each of them is atomic on the server.
/// Calls fail fast with [partywave_core::StoreError::Unavailable] and are never retried.
#[derive(Clone)]
pub struct RedisStore {
    connection: ConnectionManager,
    compare_and_set: Script,
    transaction: Script,
    add_exclusive: Script,
}

impl RedisStore {
    /// Connects to the server at `url`, such as `redis://127.0.0.1/`.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client = Client::open(url).map_err(|e| e.unavailable())?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| e.unavailable())?;

        info!("Connected to runtime store at {}", url);

        Ok(Self {
            connection,
            compare_and_set: Script::new(include_str!("scripts/compare_and_set.lua")),
            transaction: Script::new(include_str!("scripts/transaction.lua")),
            add_exclusive: Script::new(include_str!("scripts/add_exclusive.lua")),
        })
    }

    /// The connection manager reconnects on its own and is cheap to clone.
    fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

#[async_trait]
impl RuntimeStore for RedisStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection();
        conn.get(key).await.map_err(|e| e.unavailable())
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        let mut conn = self.connection();
        conn.set(key, value).await.map_err(|e| e.unavailable())
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        let mut conn = self.connection();
        conn.incr(key, 1).await.map_err(|e| e.unavailable())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection();
        conn.exists(key).await.map_err(|e| e.unavailable())
    }

    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection();
        conn.sadd(key, members).await.map_err(|e| e.unavailable())
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection();
        conn.srem(key, members).await.map_err(|e| e.unavailable())
    }

    async fn set_members(&self, key: &str) -> StoreResult<HashSet<String>> {
        let mut conn = self.connection();
        conn.smembers(key).await.map_err(|e| e.unavailable())
    }

    async fn set_card(&self, key: &str) -> StoreResult<u64> {
        let mut conn = self.connection();
        conn.scard(key).await.map_err(|e| e.unavailable())
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        let mut conn = self.connection();
        conn.sismember(key, member)
            .await
            .map_err(|e| e.unavailable())
    }

    async fn set_add_exclusive(
        &self,
        add_key: &str,
        remove_key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        let mut conn = self.connection();
        let added: i64 = self
            .add_exclusive
            .key(add_key)
            .key(remove_key)
            .arg(member)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| e.unavailable())?;

        Ok(added == 1)
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        let mut conn = self.connection();
        conn.rpush(key, value).await.map_err(|e| e.unavailable())
    }

    async fn list_range(&self, key: &str) -> StoreResult<Vec<String>> {
        let mut conn = self.connection();
        conn.lrange(key, 0, -1).await.map_err(|e| e.unavailable())
    }

    async fn hash_put_all(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        let mut conn = self.connection();
        conn.hset_multiple(key, fields)
            .await
            .map_err(|e| e.unavailable())
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        let mut conn = self.connection();
        conn.hget(key, field).await.map_err(|e| e.unavailable())
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        let mut conn = self.connection();
        conn.hgetall(key).await.map_err(|e| e.unavailable())
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        updates: &[(&str, String)],
    ) -> StoreResult<bool> {
        let mut invocation = self.compare_and_set.prepare_invoke();

        invocation
            .key(key)
            .arg(field)
            .arg(if expected.is_some() { "1" } else { "0" })
            .arg(expected.unwrap_or_default());

        for (field, value) in updates {
            invocation.arg(*field).arg(value);
        }

        let mut conn = self.connection();
        let swapped: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| e.unavailable())?;

        Ok(swapped == 1)
    }

    async fn hash_transaction(
        &self,
        conditions: &[HashCondition],
        writes: &[HashWrite],
    ) -> StoreResult<bool> {
        let mut invocation = self.transaction.prepare_invoke();
        invocation.arg(conditions.len());

        for condition in conditions {
            invocation
                .key(&condition.key)
                .arg(&condition.field)
                .arg(if condition.expected.is_some() { "1" } else { "0" })
                .arg(condition.expected.as_deref().unwrap_or_default());
        }

        for write in writes {
            match write {
                HashWrite::Put { key, fields } => {
                    invocation.key(key).arg(fields.len() as i64);

                    for (field, value) in fields {
                        invocation.arg(field).arg(value);
                    }
                }
                HashWrite::Delete { key } => {
                    invocation.key(key).arg(-1);
                }
            }
        }

        let mut conn = self.connection();
        let applied: i64 = invocation
            .invoke_async(&mut conn)
            .await
            .map_err(|e| e.unavailable())?;

        Ok(applied == 1)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        let mut conn = self.connection();
        redis::cmd("PEXPIRE")
            .arg(key)
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await
            .map_err(|e| e.unavailable())
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        let mut conn = self.connection();
        conn.persist(key).await.map_err(|e| e.unavailable())
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        if keys.is_empty() {
            return Ok(0);
        }

        let mut conn = self.connection();
        conn.del(keys).await.map_err(|e| e.unavailable())
    }
}

#[cfg(test)]
mod tests {
    use std::env;

    use super::*;
    use partywave_core::{Config, PlaylistItemId, RoomId, Runtime, Track, UserId};

    async fn store() -> RedisStore {
        let url = env::var("PARTYWAVE_REDIS_URL").unwrap_or("redis://127.0.0.1/".to_string());
        RedisStore::connect(&url).await.expect("redis is reachable")
    }

    fn key(name: &str) -> String {
        format!("partywave-test:{}:{}", name, PlaylistItemId::new())
    }

    #[tokio::test]
    #[ignore = "needs a running redis server"]
    async fn test_compare_and_set_on_server() {
        let store = store().await;
        let key = key("cas");
        let update = |value: &str| vec![("f", value.to_string())];

        assert!(store
            .hash_compare_and_set(&key, "f", None, &update("1"))
            .await
            .expect("cas runs"));
        assert!(!store
            .hash_compare_and_set(&key, "f", None, &update("2"))
            .await
            .expect("cas runs"));
        assert!(store
            .hash_compare_and_set(&key, "f", Some("1"), &update("2"))
            .await
            .expect("cas runs"));

        let stale = store
            .hash_transaction(
                &[HashCondition::equals(key.as_str(), "f", "1")],
                &[HashWrite::delete(key.as_str())],
            )
            .await
            .expect("transaction runs");
        let applied = store
            .hash_transaction(
                &[
                    HashCondition::equals(key.as_str(), "f", "2"),
                    HashCondition::absent(key.as_str(), "missing"),
                ],
                &[HashWrite::delete(key.as_str())],
            )
            .await
            .expect("transaction runs");

        assert!(!stale);
        assert!(applied);
        assert!(!store.exists(&key).await.expect("exists runs"));
    }

    #[tokio::test]
    #[ignore = "needs a running redis server"]
    async fn test_add_exclusive_on_server() {
        let store = store().await;
        let (likes, dislikes) = (key("likes"), key("dislikes"));

        store
            .set_add(&dislikes, &["a".to_string()])
            .await
            .expect("adds");

        assert!(store
            .set_add_exclusive(&likes, &dislikes, "a")
            .await
            .expect("moves"));
        assert!(!store.set_contains(&dislikes, "a").await.expect("checks"));

        store
            .delete(&[likes, dislikes])
            .await
            .expect("cleans up");
    }

    #[tokio::test]
    #[ignore = "needs a running redis server"]
    async fn test_runtime_over_server() {
        let config = Config {
            key_prefix: "partywave-test:".to_string(),
            ..Default::default()
        };
        let runtime = Runtime::new(store().await, config);
        let room_id = RoomId::new();

        let item = runtime
            .playlist
            .append(
                room_id,
                Track {
                    source_id: "id".into(),
                    source_uri: "spotify:track:id".into(),
                    name: "Song".into(),
                    artist: "Artist".into(),
                    album: "Album".into(),
                    duration_ms: 1000,
                    image_url: None,
                },
                UserId::new(),
            )
            .await
            .expect("appended");

        let started = runtime
            .playback
            .start_next_track(room_id)
            .await
            .expect("starts");
        let skipped = runtime.playback.skip_track(room_id).await.expect("skips");

        assert_eq!(started.item_id, Some(item.id));
        assert!(skipped.success);
        assert!(!runtime.playback.is_playing(room_id).await.expect("reads"));

        runtime
            .lifecycle
            .teardown(room_id, &[])
            .await
            .expect("tears down");
    }
}
