use std::{collections::HashSet, time::Duration};

use log::{debug, info};

use crate::{parse_value, RoomId, RuntimeContext, RuntimeStore, StoreResult, UserId};

/// Tracks which members are currently connected to a room.
///
/// Every operation is idempotent, and a room nobody has joined behaves as empty.
pub struct PresenceEngine<S> {
    context: RuntimeContext<S>,
}

impl<S> PresenceEngine<S>
where
    S: RuntimeStore,
{
    pub fn new(context: &RuntimeContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    fn key(&self, room_id: RoomId) -> String {
        self.context.keys.online_members(room_id)
    }

    /// Marks the user online. Returns false if they already were.
    pub async fn join(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool> {
        let joined = self.join_many(room_id, &[user_id]).await? == 1;

        if joined {
            info!("User {} is online in room {}", user_id, room_id);
        } else {
            debug!("User {} was already online in room {}", user_id, room_id);
        }

        Ok(joined)
    }

    /// Marks the user offline. Returns false if they already were.
    pub async fn leave(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool> {
        let left = self.leave_many(room_id, &[user_id]).await? == 1;

        if left {
            info!("User {} went offline in room {}", user_id, room_id);
        } else {
            debug!("User {} was not online in room {}", user_id, room_id);
        }

        Ok(left)
    }

    /// Returns how many of the users were not already online.
    pub async fn join_many(&self, room_id: RoomId, user_ids: &[UserId]) -> StoreResult<u64> {
        let members: Vec<_> = user_ids.iter().map(ToString::to_string).collect();
        self.context.store.set_add(&self.key(room_id), &members).await
    }

    /// Returns how many of the users were actually online.
    pub async fn leave_many(&self, room_id: RoomId, user_ids: &[UserId]) -> StoreResult<u64> {
        let members: Vec<_> = user_ids.iter().map(ToString::to_string).collect();
        self.context
            .store
            .set_remove(&self.key(room_id), &members)
            .await
    }

    pub async fn is_online(&self, room_id: RoomId, user_id: UserId) -> StoreResult<bool> {
        self.context
            .store
            .set_contains(&self.key(room_id), &user_id.to_string())
            .await
    }

    pub async fn count(&self, room_id: RoomId) -> StoreResult<u64> {
        self.context.store.set_card(&self.key(room_id)).await
    }

    pub async fn has_online_members(&self, room_id: RoomId) -> StoreResult<bool> {
        Ok(self.count(room_id).await? > 0)
    }

    pub async fn members(&self, room_id: RoomId) -> StoreResult<HashSet<UserId>> {
        let key = self.key(room_id);
        let raw = self.context.store.set_members(&key).await?;

        raw.iter()
            .map(|member| parse_value(&key, "member", member))
            .collect()
    }

    /// Takes everyone offline. Returns how many were online.
    pub async fn clear(&self, room_id: RoomId) -> StoreResult<u64> {
        let key = self.key(room_id);
        let count = self.context.store.set_card(&key).await?;

        self.context.store.delete(&[key]).await?;
        Ok(count)
    }

    /// Lets the presence set expire unless someone joins in time.
    pub async fn set_idle_ttl(&self, room_id: RoomId, ttl: Duration) -> StoreResult<bool> {
        self.context.store.expire(&self.key(room_id), ttl).await
    }

    pub async fn persist(&self, room_id: RoomId) -> StoreResult<bool> {
        self.context.store.persist(&self.key(room_id)).await
    }
}

impl<S> Clone for PresenceEngine<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}
