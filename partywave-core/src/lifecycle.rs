use std::{collections::HashSet, time::Duration};

use log::info;

use crate::{
    FeedbackEngine, PlaybackEngine, PlaylistEngine, PlaylistItemId, PresenceEngine, RoomId,
    RuntimeContext, RuntimeStore, StoreResult,
};

/// Creates, idles, and destroys the runtime state of a room as a whole.
pub struct RoomLifecycle<S> {
    context: RuntimeContext<S>,
    presence: PresenceEngine<S>,
    playlist: PlaylistEngine<S>,
    playback: PlaybackEngine<S>,
    feedback: FeedbackEngine<S>,
}

impl<S> RoomLifecycle<S>
where
    S: RuntimeStore,
{
    pub fn new(
        context: &RuntimeContext<S>,
        presence: &PresenceEngine<S>,
        playlist: &PlaylistEngine<S>,
        playback: &PlaybackEngine<S>,
        feedback: &FeedbackEngine<S>,
    ) -> Self {
        Self {
            context: context.clone(),
            presence: presence.clone(),
            playlist: playlist.clone(),
            playback: playback.clone(),
            feedback: feedback.clone(),
        }
    }

    /// Every structure of a room is created by its first write, so there is nothing to allocate.
    pub async fn initialize(&self, room_id: RoomId) -> StoreResult<()> {
        info!("Initialized runtime state of room {}", room_id);
        Ok(())
    }

    /// Deletes all runtime state of the room.
    ///
    /// `known_item_ids` are deleted along with whatever the queue itself lists, to
    /// also catch items whose queue entry already expired.
    pub async fn teardown(
        &self,
        room_id: RoomId,
        known_item_ids: &[PlaylistItemId],
    ) -> StoreResult<usize> {
        let guard = self.context.locks.lock(room_id).await;

        let listed = self.playlist.item_ids(room_id).await?;
        let listed_set: HashSet<_> = listed.iter().copied().collect();
        let extra: Vec<_> = known_item_ids
            .iter()
            .copied()
            .filter(|id| !listed_set.contains(id))
            .collect();

        let all: Vec<_> = listed.iter().chain(extra.iter()).copied().collect();

        self.playback.delete(room_id).await?;
        self.presence.clear(room_id).await?;
        self.feedback.delete_all_feedback(room_id, &all).await?;
        self.playlist.delete_items(room_id, &extra).await?;
        self.playlist.delete_all(room_id).await?;

        drop(guard);
        self.context.locks.forget(room_id);

        info!(
            "Tore down runtime state of room {} ({} items)",
            room_id,
            all.len()
        );

        Ok(all.len())
    }

    /// Lets the runtime state of an idle room expire on its own after `ttl`.
    pub async fn deactivate(&self, room_id: RoomId, ttl: Duration) -> StoreResult<()> {
        let item_ids = self.playlist.item_ids(room_id).await?;

        self.playlist.set_idle_ttl(room_id, ttl).await?;
        self.feedback.set_idle_ttl(room_id, &item_ids, ttl).await?;
        self.playback.set_idle_ttl(room_id, ttl).await?;
        self.presence.set_idle_ttl(room_id, ttl).await?;

        info!(
            "Deactivated room {}, state expires in {}s",
            room_id,
            ttl.as_secs()
        );

        Ok(())
    }

    /// Cancels a pending expiry set by [Self::deactivate].
    pub async fn reactivate(&self, room_id: RoomId) -> StoreResult<()> {
        let item_ids = self.playlist.item_ids(room_id).await?;

        self.playlist.persist(room_id).await?;
        self.feedback.persist(room_id, &item_ids).await?;
        self.playback.persist(room_id).await?;
        self.presence.persist(room_id).await?;

        info!("Reactivated room {}", room_id);
        Ok(())
    }
}

impl<S> Clone for RoomLifecycle<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            presence: self.presence.clone(),
            playlist: self.playlist.clone(),
            playback: self.playback.clone(),
            feedback: self.feedback.clone(),
        }
    }
}
