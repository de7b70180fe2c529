use std::{
    collections::{HashMap, HashSet},
    sync::Arc,
    time::Duration,
};

use async_trait::async_trait;

use crate::StoreResult;

/// Requires a hash field to hold a value, or to be absent if `expected` is [None].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HashCondition {
    pub key: String,
    pub field: String,
    pub expected: Option<String>,
}

impl HashCondition {
    pub fn equals(key: impl Into<String>, field: &str, value: impl ToString) -> Self {
        Self {
            key: key.into(),
            field: field.to_string(),
            expected: Some(value.to_string()),
        }
    }

    pub fn absent(key: impl Into<String>, field: &str) -> Self {
        Self {
            key: key.into(),
            field: field.to_string(),
            expected: None,
        }
    }
}

/// A write applied by [RuntimeStore::hash_transaction]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HashWrite {
    /// Sets the fields, keeping the others of the hash
    Put {
        key: String,
        fields: Vec<(String, String)>,
    },
    /// Deletes the whole key
    Delete { key: String },
}

impl HashWrite {
    pub fn put(key: impl Into<String>, fields: &[(&str, String)]) -> Self {
        Self::Put {
            key: key.into(),
            fields: fields
                .iter()
                .map(|(field, value)| (field.to_string(), value.clone()))
                .collect(),
        }
    }

    pub fn delete(key: impl Into<String>) -> Self {
        Self::Delete { key: key.into() }
    }
}

/// Represents a shared key-value service holding the ephemeral state of every room.
///
/// Absent keys behave as empty values: an empty set, an empty list, an empty hash,
/// or a counter at zero. Every call either completes or fails fast with
/// [crate::StoreError::Unavailable], implementors never retry.
#[async_trait]
pub trait RuntimeStore
where
    Self: 'static + Sync + Send,
{
    async fn get(&self, key: &str) -> StoreResult<Option<String>>;
    async fn set(&self, key: &str, value: &str) -> StoreResult<()>;
    /// Atomically increments the counter at `key` and returns the new value.
    async fn incr(&self, key: &str) -> StoreResult<i64>;
    async fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Returns how many of the members were not already in the set.
    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<u64>;
    /// Returns how many of the members were actually in the set.
    async fn set_remove(&self, key: &str, members: &[String]) -> StoreResult<u64>;
    async fn set_members(&self, key: &str) -> StoreResult<HashSet<String>>;
    async fn set_card(&self, key: &str) -> StoreResult<u64>;
    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool>;
    /// Removes `member` from `remove_key` and adds it to `add_key` as one atomic step.
    /// Returns true if the member was newly added to `add_key`.
    async fn set_add_exclusive(
        &self,
        add_key: &str,
        remove_key: &str,
        member: &str,
    ) -> StoreResult<bool>;

    /// Appends to the tail of the list, returning the new length.
    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64>;
    /// Returns the whole list, head first.
    async fn list_range(&self, key: &str) -> StoreResult<Vec<String>>;

    async fn hash_put_all(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()>;
    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>>;
    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>>;
    /// Writes `updates` only if `field` currently equals `expected`.
    /// An `expected` of [None] means the field must be absent.
    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        updates: &[(&str, String)],
    ) -> StoreResult<bool>;
    /// Checks every condition, and only if all of them hold applies every write.
    /// Both happen as one atomic step, even across keys.
    async fn hash_transaction(
        &self,
        conditions: &[HashCondition],
        writes: &[HashWrite],
    ) -> StoreResult<bool>;

    /// Applies a time to live to the key. Returns false if the key doesn't exist.
    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool>;
    /// Removes the time to live of the key. Returns false if there was none.
    async fn persist(&self, key: &str) -> StoreResult<bool>;
    /// Returns how many of the keys existed.
    async fn delete(&self, keys: &[String]) -> StoreResult<u64>;
}

#[async_trait]
impl<T> RuntimeStore for Arc<T>
where
    T: RuntimeStore,
{
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.as_ref().get(key).await
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.as_ref().set(key, value).await
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.as_ref().incr(key).await
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.as_ref().exists(key).await
    }

    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.as_ref().set_add(key, members).await
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.as_ref().set_remove(key, members).await
    }

    async fn set_members(&self, key: &str) -> StoreResult<HashSet<String>> {
        self.as_ref().set_members(key).await
    }

    async fn set_card(&self, key: &str) -> StoreResult<u64> {
        self.as_ref().set_card(key).await
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.as_ref().set_contains(key, member).await
    }

    async fn set_add_exclusive(
        &self,
        add_key: &str,
        remove_key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        self.as_ref()
            .set_add_exclusive(add_key, remove_key, member)
            .await
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.as_ref().list_push(key, value).await
    }

    async fn list_range(&self, key: &str) -> StoreResult<Vec<String>> {
        self.as_ref().list_range(key).await
    }

    async fn hash_put_all(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        self.as_ref().hash_put_all(key, fields).await
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.as_ref().hash_get(key, field).await
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.as_ref().hash_get_all(key).await
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        updates: &[(&str, String)],
    ) -> StoreResult<bool> {
        self.as_ref()
            .hash_compare_and_set(key, field, expected, updates)
            .await
    }

    async fn hash_transaction(
        &self,
        conditions: &[HashCondition],
        writes: &[HashWrite],
    ) -> StoreResult<bool> {
        self.as_ref().hash_transaction(conditions, writes).await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.as_ref().expire(key, ttl).await
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        self.as_ref().persist(key).await
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.as_ref().delete(keys).await
    }
}
