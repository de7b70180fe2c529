use std::time::Duration;

use crossbeam::channel::{Receiver, Sender};

use partywave_core::{
    FeedbackCounts, PlaybackState, PlaylistItem, PlaylistItemId, RoomId, UserId,
};

use crate::TargetTally;

pub type EventSender = Sender<CollabEvent>;
pub type EventReceiver = Receiver<CollabEvent>;

/// Events emitted by the collab system, for clients to follow along
#[derive(Debug, Clone)]
pub enum CollabEvent {
    /// A track was appended to the queue
    TrackAdded {
        room_id: RoomId,
        item: PlaylistItem,
    },
    /// A track started playing, with the clock clients sync their players to
    TrackStarted {
        room_id: RoomId,
        item: PlaylistItem,
        state: PlaybackState,
    },
    /// A track was skipped, by a moderator or by a vote
    TrackSkipped {
        room_id: RoomId,
        item_id: PlaylistItemId,
        by_vote: bool,
    },
    /// A track played until the end
    TrackCompleted {
        room_id: RoomId,
        item_id: PlaylistItemId,
    },
    /// Nothing is playing anymore
    PlaybackStopped { room_id: RoomId },
    /// The likes or dislikes of a track changed
    FeedbackUpdated {
        room_id: RoomId,
        item_id: PlaylistItemId,
        counts: FeedbackCounts,
    },
    VoteCast {
        room_id: RoomId,
        voter_id: UserId,
        tally: TargetTally,
    },
    VoteWithdrawn {
        room_id: RoomId,
        voter_id: UserId,
        tally: TargetTally,
    },
    /// A kick vote reached its threshold and the member was removed
    UserKicked { room_id: RoomId, user_id: UserId },
    MemberOnline {
        room_id: RoomId,
        user_id: UserId,
        online_count: u64,
    },
    MemberOffline {
        room_id: RoomId,
        user_id: UserId,
        online_count: u64,
    },
    /// The room's runtime state will expire unless someone comes back
    RoomDeactivated { room_id: RoomId, ttl: Duration },
    RoomTornDown { room_id: RoomId },
}
