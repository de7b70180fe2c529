use async_trait::async_trait;
use thiserror::Error;

use partywave_core::{RoomId, UserId};

mod data;
pub use data::*;

mod memory;
pub use memory::*;

mod pg;
pub use pg::*;

pub type Result<T> = std::result::Result<T, DatabaseError>;
pub type BoxedMetadataSource = std::sync::Arc<dyn TrackMetadataSource>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    /// An unknown or internal error happened with the database
    #[error(transparent)]
    Internal(Box<dyn std::error::Error + Send + Sync>),
    /// A resource already exists
    #[error("{resource} with {field} of value {value} already exists")]
    Conflict {
        /// The resource in question
        resource: &'static str,
        /// The field that is conflicting
        field: &'static str,
        /// The conflicting value
        value: String,
    },
    /// A resource in the database doesn't exist
    #[error("{resource}:{identifier} doesn't exist")]
    NotFound {
        resource: &'static str,
        identifier: String,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoDatabaseError {
    fn any(self) -> DatabaseError;
}

/// Answers who belongs to a room, and with what role.
#[async_trait]
pub trait MembershipAuthority
where
    Self: 'static + Sync + Send,
{
    /// Returns the role of an active member, or [None] if the user isn't one.
    async fn member_role(&self, room_id: RoomId, user_id: UserId) -> Result<Option<MemberRole>>;

    async fn is_active_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        Ok(self.member_role(room_id, user_id).await?.is_some())
    }

    /// Returns false if the user wasn't an active member to begin with.
    async fn deactivate_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool>;
}

/// Keeps one vote per voter and target, and counts them.
#[async_trait]
pub trait VoteLedger
where
    Self: 'static + Sync + Send,
{
    /// Fails with [DatabaseError::Conflict] if the voter already voted for the target.
    async fn record_vote(&self, room_id: RoomId, voter_id: UserId, target: VoteTarget)
        -> Result<()>;
    async fn count(&self, room_id: RoomId, target: VoteTarget) -> Result<u64>;
    async fn has_voted(&self, room_id: RoomId, voter_id: UserId, target: VoteTarget)
        -> Result<bool>;
    /// Returns false if there was no vote to withdraw.
    async fn withdraw_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<bool>;
    /// Deletes every vote for the target, after its action fired.
    async fn clear_votes(&self, room_id: RoomId, target: VoteTarget) -> Result<u64>;
    /// Returns the vote count of every user with kick votes against them.
    async fn kick_tallies(&self, room_id: RoomId) -> Result<Vec<(UserId, u64)>>;
}

/// Keeps the likes and dislikes received by the tracks each user added.
#[async_trait]
pub trait UserStats
where
    Self: 'static + Sync + Send,
{
    /// Adds the deltas to the totals of the user, starting them at zero.
    async fn adjust_feedback(&self, user_id: UserId, likes: i64, dislikes: i64) -> Result<()>;
    async fn feedback_totals(&self, user_id: UserId) -> Result<FeedbackTotals>;
}

/// Supplies the metadata of a track, used once when the track is queued.
#[async_trait]
pub trait TrackMetadataSource
where
    Self: 'static + Sync + Send,
{
    /// Fails with [DatabaseError::NotFound] if the track is unknown.
    async fn fetch(&self, track_id: &str) -> Result<TrackMetadata>;
}

/// Represents a type that holds the durable side of rooms
pub trait Database: MembershipAuthority + VoteLedger + UserStats {}

impl<T> Database for T where T: MembershipAuthority + VoteLedger + UserStats {}
