mod feedback;
mod playlist;

use std::time::Duration;

use log::info;

pub use feedback::*;
pub use playlist::*;

use partywave_core::{RoomId, RoomSnapshot, RuntimeStore, UserId};

use crate::{CollabContext, CollabError, CollabEvent, CollabResult, Database, MemberRole};

/// Drives the flows of a room: presence, the queue, playback, and feedback.
pub struct RoomManager<S, Db> {
    context: CollabContext<S, Db>,
}

impl<S, Db> RoomManager<S, Db>
where
    S: RuntimeStore,
    Db: Database,
{
    pub fn new(context: &CollabContext<S, Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns the role of the user, failing if they aren't an active member.
    async fn require_member(&self, room_id: RoomId, user_id: UserId) -> CollabResult<MemberRole> {
        self.context
            .database
            .member_role(room_id, user_id)
            .await?
            .ok_or(CollabError::NotAMember)
    }

    pub async fn initialize(&self, room_id: RoomId) -> CollabResult<()> {
        self.context.runtime.lifecycle.initialize(room_id).await?;
        Ok(())
    }

    /// Deletes all runtime state of a room that was closed.
    pub async fn teardown(&self, room_id: RoomId) -> CollabResult<()> {
        self.context
            .runtime
            .lifecycle
            .teardown(room_id, &[])
            .await?;

        self.context.emit(CollabEvent::RoomTornDown { room_id });
        Ok(())
    }

    pub async fn deactivate(&self, room_id: RoomId, ttl: Duration) -> CollabResult<()> {
        self.context
            .runtime
            .lifecycle
            .deactivate(room_id, ttl)
            .await?;

        self.context
            .emit(CollabEvent::RoomDeactivated { room_id, ttl });
        Ok(())
    }

    /// Brings a member online. Returns false if they already were.
    ///
    /// Every member that comes online cancels the expiry of an idle room,
    /// so concurrent joins can't leave it expiring.
    pub async fn join(&self, room_id: RoomId, user_id: UserId) -> CollabResult<bool> {
        self.require_member(room_id, user_id).await?;

        let runtime = &self.context.runtime;
        let joined = runtime.presence.join(room_id, user_id).await?;

        if !joined {
            return Ok(false);
        }

        runtime.lifecycle.reactivate(room_id).await?;
        let online_count = runtime.presence.count(room_id).await?;

        self.context.emit(CollabEvent::MemberOnline {
            room_id,
            user_id,
            online_count,
        });

        Ok(true)
    }

    /// Takes a member offline. Returns false if they already were.
    ///
    /// Once nobody is online, the room is deactivated with the configured idle time to live.
    pub async fn leave(&self, room_id: RoomId, user_id: UserId) -> CollabResult<bool> {
        let runtime = &self.context.runtime;
        let left = runtime.presence.leave(room_id, user_id).await?;

        if !left {
            return Ok(false);
        }

        let online_count = runtime.presence.count(room_id).await?;

        self.context.emit(CollabEvent::MemberOffline {
            room_id,
            user_id,
            online_count,
        });

        if online_count == 0 {
            info!("Last member left room {}", room_id);
            self.deactivate(room_id, runtime.config().idle_ttl).await?;
        }

        Ok(true)
    }

    /// Reads the whole room for a client that just connected.
    pub async fn state(&self, room_id: RoomId) -> CollabResult<RoomSnapshot> {
        Ok(self.context.runtime.snapshot(room_id).await?)
    }
}

impl<S, Db> Clone for RoomManager<S, Db> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::testing::{collab, events, member};

    #[tokio::test]
    async fn test_only_members_can_join() {
        let (collab, room_id, owner) = collab();

        assert!(collab.rooms.join(room_id, owner).await.expect("joins"));
        assert!(!collab.rooms.join(room_id, owner).await.expect("joins"));

        let stranger = collab.rooms.join(room_id, UserId::new()).await;
        assert!(matches!(stranger, Err(CollabError::NotAMember)));
    }

    #[tokio::test]
    async fn test_last_leave_deactivates_room() {
        let (collab, room_id, owner) = collab();
        let guest = member(&collab, room_id, MemberRole::Participant);

        collab.rooms.join(room_id, owner).await.expect("joins");
        collab.rooms.join(room_id, guest).await.expect("joins");
        events(&collab);

        collab.rooms.leave(room_id, owner).await.expect("leaves");
        collab.rooms.leave(room_id, guest).await.expect("leaves");

        let events = events(&collab);

        assert!(matches!(
            events.as_slice(),
            [
                CollabEvent::MemberOffline { online_count: 1, .. },
                CollabEvent::MemberOffline { online_count: 0, .. },
                CollabEvent::RoomDeactivated { ttl, .. },
            ] if *ttl == Duration::from_secs(3600)
        ));
    }

    #[tokio::test]
    async fn test_rejoin_behind_another_member_keeps_room() {
        let (collab, room_id, owner) = collab();
        let guest = member(&collab, room_id, MemberRole::Participant);

        collab.rooms.initialize(room_id).await.expect("initializes");
        collab
            .rooms
            .add_track(room_id, owner, "a")
            .await
            .expect("track is added");
        collab
            .rooms
            .deactivate(room_id, Duration::from_millis(50))
            .await
            .expect("deactivates");

        // Another worker brings the owner online first, so the guest isn't the first one back
        let runtime = collab.runtime();
        runtime.presence.join(room_id, owner).await.expect("joins");
        assert!(collab.rooms.join(room_id, guest).await.expect("joins"));

        tokio::time::sleep(Duration::from_millis(100)).await;

        let items = runtime.playlist.list_all(room_id).await.expect("lists");
        assert_eq!(items.len(), 1);
        assert!(runtime.playback.is_playing(room_id).await.expect("reads"));
    }

    #[tokio::test]
    async fn test_state_reflects_presence() {
        let (collab, room_id, owner) = collab();

        collab.rooms.join(room_id, owner).await.expect("joins");
        let state = collab.rooms.state(room_id).await.expect("state is read");

        assert_eq!(state.online_count, 1);
        assert!(state.playback.is_none());
    }

    #[tokio::test]
    async fn test_teardown_emits_event() {
        let (collab, room_id, owner) = collab();

        collab.rooms.initialize(room_id).await.expect("initializes");
        collab.rooms.join(room_id, owner).await.expect("joins");
        collab.rooms.teardown(room_id).await.expect("tears down");

        assert!(matches!(
            events(&collab).last(),
            Some(CollabEvent::RoomTornDown { .. })
        ));
        assert_eq!(
            collab.runtime().presence.count(room_id).await.expect("counts"),
            0
        );
    }
}
