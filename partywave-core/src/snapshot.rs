use serde::Serialize;

use crate::{
    now_ms, FeedbackCounts, PlaybackState, PlaylistItem, RoomId, Runtime, RuntimeStore,
    StoreResult,
};

/// Everything a client needs to render a room at one point in time.
#[derive(Debug, Clone, Serialize)]
pub struct RoomSnapshot {
    pub room_id: RoomId,
    pub playlist: Vec<ItemSnapshot>,
    pub playback: Option<PlaybackSnapshot>,
    pub online_count: u64,
    pub taken_at_ms: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemSnapshot {
    #[serde(flatten)]
    pub item: PlaylistItem,
    #[serde(flatten)]
    pub feedback: FeedbackCounts,
}

#[derive(Debug, Clone, Serialize)]
pub struct PlaybackSnapshot {
    #[serde(flatten)]
    pub state: PlaybackState,
    pub elapsed_ms: u64,
    pub remaining_ms: u64,
}

impl<S> Runtime<S>
where
    S: RuntimeStore,
{
    /// Reads the whole room. The reads are not one transaction, so a snapshot taken
    /// during a skip may show the old and the new track both finished or both queued.
    pub async fn snapshot(&self, room_id: RoomId) -> StoreResult<RoomSnapshot> {
        let mut playlist = vec![];

        for item in self.playlist.list_all(room_id).await? {
            let feedback = self.feedback.counts(room_id, item.id).await?;
            playlist.push(ItemSnapshot { item, feedback });
        }

        let taken_at_ms = now_ms();
        let playback = self
            .playback
            .playback_state(room_id)
            .await?
            .map(|state| PlaybackSnapshot {
                elapsed_ms: state.elapsed_ms(taken_at_ms),
                remaining_ms: state.remaining_ms(taken_at_ms),
                state,
            });

        Ok(RoomSnapshot {
            room_id,
            playlist,
            playback,
            online_count: self.presence.count(room_id).await?,
            taken_at_ms,
        })
    }
}
