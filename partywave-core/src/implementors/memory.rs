use std::{
    collections::{HashMap, HashSet},
    time::{Duration, Instant},
};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::{HashCondition, HashWrite, RuntimeStore, StoreError, StoreResult};

/// A runtime store living in process memory.
///
/// Every call takes a single lock, so multi-key operations are atomic the same way
/// a server-side script is. Useful for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

#[derive(Debug)]
struct Entry {
    value: Value,
    expires_at: Option<Instant>,
}

#[derive(Debug)]
enum Value {
    String(String),
    Set(HashSet<String>),
    List(Vec<String>),
    Hash(HashMap<String, String>),
}

impl Value {
    fn kind(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
            Value::Set(_) => "set",
            Value::List(_) => "list",
            Value::Hash(_) => "hash",
        }
    }

    fn is_empty(&self) -> bool {
        match self {
            Value::String(_) => false,
            Value::Set(set) => set.is_empty(),
            Value::List(list) => list.is_empty(),
            Value::Hash(hash) => hash.is_empty(),
        }
    }
}

impl Entry {
    fn new(value: Value) -> Self {
        Self {
            value,
            expires_at: None,
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }
}

fn wrong_type(key: &str, value: &Value) -> StoreError {
    StoreError::Corrupt {
        key: key.to_string(),
        field: "type",
        value: value.kind().to_string(),
    }
}

/// The store state while the lock is held
struct State<'a> {
    entries: &'a mut HashMap<String, Entry>,
}

impl<'a> State<'a> {
    /// Looks up a live entry, dropping it first if it expired.
    fn live(&mut self, key: &str) -> Option<&mut Entry> {
        let now = Instant::now();

        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }

        self.entries.get_mut(key)
    }

    /// Gets the live entry or inserts the one created by `create`.
    fn live_or_insert(&mut self, key: &str, create: fn() -> Value) -> &mut Entry {
        let now = Instant::now();

        if self.entries.get(key).is_some_and(|e| e.is_expired(now)) {
            self.entries.remove(key);
        }

        self.entries
            .entry(key.to_string())
            .or_insert_with(|| Entry::new(create()))
    }

    /// Redis drops collections once they become empty, so do we.
    fn prune(&mut self, key: &str) {
        if self.entries.get(key).is_some_and(|e| e.value.is_empty()) {
            self.entries.remove(key);
        }
    }

    fn set(&mut self, key: &str) -> StoreResult<Option<&mut HashSet<String>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Set(set),
                ..
            }) => Ok(Some(set)),
            Some(entry) => Err(wrong_type(key, &entry.value)),
        }
    }

    fn set_or_insert(&mut self, key: &str) -> StoreResult<&mut HashSet<String>> {
        match &mut self.live_or_insert(key, || Value::Set(Default::default())).value {
            Value::Set(set) => Ok(set),
            other => Err(wrong_type(key, other)),
        }
    }

    fn list(&mut self, key: &str) -> StoreResult<Option<&mut Vec<String>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::List(list),
                ..
            }) => Ok(Some(list)),
            Some(entry) => Err(wrong_type(key, &entry.value)),
        }
    }

    fn list_or_insert(&mut self, key: &str) -> StoreResult<&mut Vec<String>> {
        match &mut self.live_or_insert(key, || Value::List(Default::default())).value {
            Value::List(list) => Ok(list),
            other => Err(wrong_type(key, other)),
        }
    }

    fn hash(&mut self, key: &str) -> StoreResult<Option<&mut HashMap<String, String>>> {
        match self.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::Hash(hash),
                ..
            }) => Ok(Some(hash)),
            Some(entry) => Err(wrong_type(key, &entry.value)),
        }
    }

    fn hash_or_insert(&mut self, key: &str) -> StoreResult<&mut HashMap<String, String>> {
        match &mut self.live_or_insert(key, || Value::Hash(Default::default())).value {
            Value::Hash(hash) => Ok(hash),
            other => Err(wrong_type(key, other)),
        }
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> StoreResult<R>) -> StoreResult<R> {
        let mut entries = self.entries.lock();
        let mut state = State {
            entries: &mut entries,
        };

        f(&mut state)
    }

    /// Returns the number of live keys. Only used for assertions.
    pub fn key_count(&self) -> usize {
        let now = Instant::now();

        self.entries
            .lock()
            .values()
            .filter(|e| !e.is_expired(now))
            .count()
    }
}

#[async_trait]
impl RuntimeStore for MemoryStore {
    async fn get(&self, key: &str) -> StoreResult<Option<String>> {
        self.with_state(|state| match state.live(key) {
            None => Ok(None),
            Some(Entry {
                value: Value::String(value),
                ..
            }) => Ok(Some(value.clone())),
            Some(entry) => Err(wrong_type(key, &entry.value)),
        })
    }

    async fn set(&self, key: &str, value: &str) -> StoreResult<()> {
        self.with_state(|state| {
            // Like SET, this overwrites any value and clears the time to live
            state
                .entries
                .insert(key.to_string(), Entry::new(Value::String(value.to_string())));

            Ok(())
        })
    }

    async fn incr(&self, key: &str) -> StoreResult<i64> {
        self.with_state(|state| {
            let entry = state.live_or_insert(key, || Value::String("0".to_string()));

            let value = match &mut entry.value {
                Value::String(value) => value,
                other => return Err(wrong_type(key, other)),
            };

            let current = value.parse::<i64>().map_err(|_| StoreError::Corrupt {
                key: key.to_string(),
                field: "counter",
                value: value.clone(),
            })?;

            let next = current + 1;
            *value = next.to_string();

            Ok(next)
        })
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        self.with_state(|state| Ok(state.live(key).is_some()))
    }

    async fn set_add(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        if members.is_empty() {
            return Ok(0);
        }

        self.with_state(|state| {
            let set = state.set_or_insert(key)?;
            let added = members.iter().filter(|m| set.insert(m.to_string())).count();

            Ok(added as u64)
        })
    }

    async fn set_remove(&self, key: &str, members: &[String]) -> StoreResult<u64> {
        self.with_state(|state| {
            let removed = match state.set(key)? {
                Some(set) => members.iter().filter(|m| set.remove(m.as_str())).count(),
                None => 0,
            };

            state.prune(key);
            Ok(removed as u64)
        })
    }

    async fn set_members(&self, key: &str) -> StoreResult<HashSet<String>> {
        self.with_state(|state| Ok(state.set(key)?.cloned().unwrap_or_default()))
    }

    async fn set_card(&self, key: &str) -> StoreResult<u64> {
        self.with_state(|state| Ok(state.set(key)?.map(|s| s.len() as u64).unwrap_or(0)))
    }

    async fn set_contains(&self, key: &str, member: &str) -> StoreResult<bool> {
        self.with_state(|state| Ok(state.set(key)?.is_some_and(|s| s.contains(member))))
    }

    async fn set_add_exclusive(
        &self,
        add_key: &str,
        remove_key: &str,
        member: &str,
    ) -> StoreResult<bool> {
        self.with_state(|state| {
            if let Some(set) = state.set(remove_key)? {
                set.remove(member);
            }

            state.prune(remove_key);

            let added = state.set_or_insert(add_key)?.insert(member.to_string());
            Ok(added)
        })
    }

    async fn list_push(&self, key: &str, value: &str) -> StoreResult<u64> {
        self.with_state(|state| {
            let list = state.list_or_insert(key)?;
            list.push(value.to_string());

            Ok(list.len() as u64)
        })
    }

    async fn list_range(&self, key: &str) -> StoreResult<Vec<String>> {
        self.with_state(|state| Ok(state.list(key)?.cloned().unwrap_or_default()))
    }

    async fn hash_put_all(&self, key: &str, fields: &[(&str, String)]) -> StoreResult<()> {
        if fields.is_empty() {
            return Ok(());
        }

        self.with_state(|state| {
            let hash = state.hash_or_insert(key)?;

            for (field, value) in fields {
                hash.insert(field.to_string(), value.clone());
            }

            Ok(())
        })
    }

    async fn hash_get(&self, key: &str, field: &str) -> StoreResult<Option<String>> {
        self.with_state(|state| Ok(state.hash(key)?.and_then(|h| h.get(field).cloned())))
    }

    async fn hash_get_all(&self, key: &str) -> StoreResult<HashMap<String, String>> {
        self.with_state(|state| Ok(state.hash(key)?.cloned().unwrap_or_default()))
    }

    async fn hash_compare_and_set(
        &self,
        key: &str,
        field: &str,
        expected: Option<&str>,
        updates: &[(&str, String)],
    ) -> StoreResult<bool> {
        self.with_state(|state| {
            let current = state.hash(key)?.and_then(|h| h.get(field).cloned());

            if current.as_deref() != expected {
                return Ok(false);
            }

            let hash = state.hash_or_insert(key)?;

            for (field, value) in updates {
                hash.insert(field.to_string(), value.clone());
            }

            state.prune(key);
            Ok(true)
        })
    }

    async fn hash_transaction(
        &self,
        conditions: &[HashCondition],
        writes: &[HashWrite],
    ) -> StoreResult<bool> {
        self.with_state(|state| {
            for condition in conditions {
                let current = state
                    .hash(&condition.key)?
                    .and_then(|h| h.get(&condition.field).cloned());

                if current != condition.expected {
                    return Ok(false);
                }
            }

            for write in writes {
                match write {
                    HashWrite::Put { key, fields } => {
                        let hash = state.hash_or_insert(key)?;

                        for (field, value) in fields {
                            hash.insert(field.clone(), value.clone());
                        }

                        state.prune(key);
                    }
                    HashWrite::Delete { key } => {
                        state.entries.remove(key.as_str());
                    }
                }
            }

            Ok(true)
        })
    }

    async fn expire(&self, key: &str, ttl: Duration) -> StoreResult<bool> {
        self.with_state(|state| match state.live(key) {
            Some(entry) => {
                entry.expires_at = Some(Instant::now() + ttl);
                Ok(true)
            }
            None => Ok(false),
        })
    }

    async fn persist(&self, key: &str) -> StoreResult<bool> {
        self.with_state(|state| match state.live(key) {
            Some(entry) => Ok(entry.expires_at.take().is_some()),
            None => Ok(false),
        })
    }

    async fn delete(&self, keys: &[String]) -> StoreResult<u64> {
        self.with_state(|state| {
            let mut deleted = 0;

            for key in keys {
                if state.live(key).is_some() {
                    state.entries.remove(key.as_str());
                    deleted += 1;
                }
            }

            Ok(deleted)
        })
    }
}
