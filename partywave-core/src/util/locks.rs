use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::RoomId;

/// Serializes multi-step mutations of a single room within this process.
///
/// Rooms never contend with each other, each room gets its own lock.
#[derive(Debug, Clone, Default)]
pub struct RoomLocks {
    locks: Arc<DashMap<RoomId, Arc<Mutex<()>>>>,
}

impl RoomLocks {
    /// Waits for exclusive access to the room.
    pub async fn lock(&self, room_id: RoomId) -> OwnedMutexGuard<()> {
        let lock = self.locks.entry(room_id).or_default().clone();

        lock.lock_owned().await
    }

    /// Drops the lock entry of a room that no longer has runtime state.
    pub fn forget(&self, room_id: RoomId) {
        self.locks
            .remove_if(&room_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_room_is_serialized() {
        let locks = RoomLocks::default();
        let room_id = RoomId::new();

        let guard = locks.lock(room_id).await;

        let contender = {
            let locks = locks.clone();
            tokio::spawn(async move {
                let _guard = locks.lock(room_id).await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!contender.is_finished());

        drop(guard);
        contender.await.expect("contender finishes");
    }

    #[tokio::test]
    async fn test_different_rooms_do_not_contend() {
        let locks = RoomLocks::default();

        let _first = locks.lock(RoomId::new()).await;
        let _second = locks.lock(RoomId::new()).await;
    }
}
