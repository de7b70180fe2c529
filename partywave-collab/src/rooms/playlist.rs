use log::{debug, info};
use serde::Serialize;

use partywave_core::{OperationResult, PlaylistItem, PlaylistItemId, RoomId, RuntimeStore, UserId};

use crate::{CollabError, CollabEvent, CollabResult, Database};

use super::RoomManager;

/// The result of adding a track to a room
#[derive(Debug, Clone, Serialize)]
pub struct AddedTrack {
    pub item: PlaylistItem,
    /// True if the track started playing right away, because the room was silent
    pub auto_started: bool,
}

impl<S, Db> RoomManager<S, Db>
where
    S: RuntimeStore,
    Db: Database,
{
    /// Queues a track on behalf of a member, and starts it if nothing else is playing.
    pub async fn add_track(
        &self,
        room_id: RoomId,
        user_id: UserId,
        track_id: &str,
    ) -> CollabResult<AddedTrack> {
        self.require_member(room_id, user_id).await?;

        let metadata = self.context.metadata.fetch(track_id).await?;
        let runtime = &self.context.runtime;

        let item = runtime
            .playlist
            .append(room_id, metadata.into_track(track_id), user_id)
            .await?;

        self.context.emit(CollabEvent::TrackAdded {
            room_id,
            item: item.clone(),
        });

        let silent = !runtime.playback.is_playing(room_id).await?;
        let next_up = runtime.playlist.first_queued(room_id).await? == Some(item.id);

        let mut auto_started = false;

        if silent && next_up {
            let result = runtime.playback.start_track(room_id, item.id).await?;
            auto_started = result.success;

            if auto_started {
                info!("Auto-started \"{}\" in room {}", item.track.name, room_id);
                self.context.emit_advance(room_id, &result).await?;
            } else {
                debug!("Did not auto-start in room {}: {}", room_id, result.message);
            }
        }

        Ok(AddedTrack { item, auto_started })
    }

    /// Skips the current track without a vote. Only owners and moderators may do this.
    pub async fn manual_skip(
        &self,
        room_id: RoomId,
        user_id: UserId,
    ) -> CollabResult<OperationResult> {
        let role = self.require_member(room_id, user_id).await?;

        if !role.can_skip() {
            return Err(CollabError::Forbidden(
                "Only the owner or a moderator can skip tracks",
            ));
        }

        self.skip(room_id).await
    }

    /// Skips the current track. Used by operators, who are not room members.
    pub async fn skip(&self, room_id: RoomId) -> CollabResult<OperationResult> {
        let playback = &self.context.runtime.playback;

        let Some(current) = playback.current_item_id(room_id).await? else {
            return Ok(playback.skip_track(room_id).await?);
        };

        let result = playback.skip_item(room_id, current).await?;

        if result.success {
            self.context.emit(CollabEvent::TrackSkipped {
                room_id,
                item_id: current,
                by_vote: false,
            });

            self.context.emit_advance(room_id, &result).await?;
        }

        Ok(result)
    }

    /// Marks the current track as played and moves on to the next one.
    pub async fn complete_track(&self, room_id: RoomId) -> CollabResult<OperationResult> {
        let playback = &self.context.runtime.playback;

        let Some(current) = playback.current_item_id(room_id).await? else {
            return Ok(playback.complete_track(room_id).await?);
        };

        self.complete_item(room_id, current).await
    }

    /// Completes `item_id` if it is still the current track.
    pub async fn complete_item(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> CollabResult<OperationResult> {
        let result = self
            .context
            .runtime
            .playback
            .complete_item(room_id, item_id)
            .await?;

        if result.success {
            self.context
                .emit(CollabEvent::TrackCompleted { room_id, item_id });

            self.context.emit_advance(room_id, &result).await?;
        }

        Ok(result)
    }

    pub async fn start_next_track(&self, room_id: RoomId) -> CollabResult<OperationResult> {
        let result = self
            .context
            .runtime
            .playback
            .start_next_track(room_id)
            .await?;

        if result.success {
            self.context.emit_advance(room_id, &result).await?;
        }

        Ok(result)
    }

    /// Stops playback, leaving the queue as it is.
    pub async fn stop(&self, room_id: RoomId) -> CollabResult<()> {
        self.context
            .runtime
            .playback
            .stop_playback(room_id)
            .await?;

        self.context
            .emit(CollabEvent::PlaybackStopped { room_id });
        Ok(())
    }
}
