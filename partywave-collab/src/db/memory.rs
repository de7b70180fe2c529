use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;

use partywave_core::{RoomId, UserId};

use crate::{
    DatabaseError, FeedbackTotals, MemberRole, MembershipAuthority, Result, TrackMetadata,
    TrackMetadataSource, UserStats, VoteLedger, VoteTarget,
};

#[derive(Debug, Clone, Copy)]
struct MemberRecord {
    role: MemberRole,
    is_active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct VoteRecord {
    room_id: RoomId,
    voter_id: UserId,
    target: VoteTarget,
}

/// Keeps members, votes, user totals and a track catalog in process memory.
#[derive(Debug, Default)]
pub struct MemoryDatabase {
    members: Mutex<HashMap<(RoomId, UserId), MemberRecord>>,
    votes: Mutex<Vec<VoteRecord>>,
    tracks: Mutex<HashMap<String, TrackMetadata>>,
    stats: Mutex<HashMap<UserId, FeedbackTotals>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a member to a room, or reactivates them with a new role.
    pub fn add_member(&self, room_id: RoomId, user_id: UserId, role: MemberRole) {
        self.members.lock().insert(
            (room_id, user_id),
            MemberRecord {
                role,
                is_active: true,
            },
        );
    }

    /// Makes a track known to [TrackMetadataSource::fetch].
    pub fn add_track(&self, track_id: &str, metadata: TrackMetadata) {
        self.tracks.lock().insert(track_id.to_string(), metadata);
    }
}

#[async_trait]
impl MembershipAuthority for MemoryDatabase {
    async fn member_role(&self, room_id: RoomId, user_id: UserId) -> Result<Option<MemberRole>> {
        let members = self.members.lock();

        Ok(members
            .get(&(room_id, user_id))
            .filter(|m| m.is_active)
            .map(|m| m.role))
    }

    async fn deactivate_member(&self, room_id: RoomId, user_id: UserId) -> Result<bool> {
        let mut members = self.members.lock();

        match members.get_mut(&(room_id, user_id)) {
            Some(member) if member.is_active => {
                member.is_active = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl VoteLedger for MemoryDatabase {
    async fn record_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<()> {
        let mut votes = self.votes.lock();
        let vote = VoteRecord {
            room_id,
            voter_id,
            target,
        };

        if votes.contains(&vote) {
            return Err(DatabaseError::Conflict {
                resource: "vote",
                field: "voter_id",
                value: voter_id.to_string(),
            });
        }

        votes.push(vote);
        Ok(())
    }

    async fn count(&self, room_id: RoomId, target: VoteTarget) -> Result<u64> {
        let votes = self.votes.lock();

        Ok(votes
            .iter()
            .filter(|v| v.room_id == room_id && v.target == target)
            .count() as u64)
    }

    async fn has_voted(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<bool> {
        Ok(self.votes.lock().contains(&VoteRecord {
            room_id,
            voter_id,
            target,
        }))
    }

    async fn withdraw_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> Result<bool> {
        let mut votes = self.votes.lock();
        let before = votes.len();

        votes.retain(|v| {
            *v != VoteRecord {
                room_id,
                voter_id,
                target,
            }
        });

        Ok(votes.len() < before)
    }

    async fn clear_votes(&self, room_id: RoomId, target: VoteTarget) -> Result<u64> {
        let mut votes = self.votes.lock();
        let before = votes.len();

        votes.retain(|v| !(v.room_id == room_id && v.target == target));

        Ok((before - votes.len()) as u64)
    }

    async fn kick_tallies(&self, room_id: RoomId) -> Result<Vec<(UserId, u64)>> {
        let votes = self.votes.lock();
        let mut tallies: HashMap<UserId, u64> = HashMap::new();

        for vote in votes.iter().filter(|v| v.room_id == room_id) {
            if let VoteTarget::KickUser(user_id) = vote.target {
                *tallies.entry(user_id).or_default() += 1;
            }
        }

        let mut tallies: Vec<_> = tallies.into_iter().collect();
        tallies.sort_by(|a, b| b.1.cmp(&a.1));

        Ok(tallies)
    }
}

#[async_trait]
impl UserStats for MemoryDatabase {
    async fn adjust_feedback(&self, user_id: UserId, likes: i64, dislikes: i64) -> Result<()> {
        let mut stats = self.stats.lock();
        let totals = stats.entry(user_id).or_default();

        totals.total_like += likes;
        totals.total_dislike += dislikes;

        Ok(())
    }

    async fn feedback_totals(&self, user_id: UserId) -> Result<FeedbackTotals> {
        Ok(self.stats.lock().get(&user_id).copied().unwrap_or_default())
    }
}

#[async_trait]
impl TrackMetadataSource for MemoryDatabase {
    async fn fetch(&self, track_id: &str) -> Result<TrackMetadata> {
        self.tracks
            .lock()
            .get(track_id)
            .cloned()
            .ok_or_else(|| DatabaseError::NotFound {
                resource: "track",
                identifier: track_id.to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use partywave_core::PlaylistItemId;

    #[tokio::test]
    async fn test_one_vote_per_voter_and_target() {
        let database = MemoryDatabase::new();
        let (room_id, voter_id) = (RoomId::new(), UserId::new());
        let target = VoteTarget::SkipTrack(PlaylistItemId::new());

        database
            .record_vote(room_id, voter_id, target)
            .await
            .expect("vote is recorded");

        let again = database.record_vote(room_id, voter_id, target).await;

        assert!(matches!(again, Err(DatabaseError::Conflict { .. })));
        assert_eq!(database.count(room_id, target).await.expect("counts"), 1);
        assert!(database
            .withdraw_vote(room_id, voter_id, target)
            .await
            .expect("withdraws"));
        assert!(!database
            .has_voted(room_id, voter_id, target)
            .await
            .expect("checks"));
    }

    #[tokio::test]
    async fn test_deactivated_members_have_no_role() {
        let database = MemoryDatabase::new();
        let (room_id, user_id) = (RoomId::new(), UserId::new());

        database.add_member(room_id, user_id, MemberRole::Dj);

        assert!(database
            .is_active_member(room_id, user_id)
            .await
            .expect("checks"));
        assert!(database
            .deactivate_member(room_id, user_id)
            .await
            .expect("deactivates"));
        assert!(!database
            .deactivate_member(room_id, user_id)
            .await
            .expect("deactivates"));
        assert_eq!(
            database.member_role(room_id, user_id).await.expect("reads"),
            None
        );
    }

    #[tokio::test]
    async fn test_feedback_totals_start_at_zero() {
        let database = MemoryDatabase::new();
        let user_id = UserId::new();

        assert_eq!(
            database.feedback_totals(user_id).await.expect("reads"),
            FeedbackTotals::default()
        );

        database
            .adjust_feedback(user_id, 2, 1)
            .await
            .expect("adjusts");
        database
            .adjust_feedback(user_id, -1, 0)
            .await
            .expect("adjusts");

        assert_eq!(
            database.feedback_totals(user_id).await.expect("reads"),
            FeedbackTotals {
                total_like: 1,
                total_dislike: 1
            }
        );
    }

    #[tokio::test]
    async fn test_kick_tallies_group_by_target() {
        let database = MemoryDatabase::new();
        let room_id = RoomId::new();
        let (popular, other) = (UserId::new(), UserId::new());

        for target in [popular, popular, other] {
            database
                .record_vote(room_id, UserId::new(), VoteTarget::KickUser(target))
                .await
                .expect("vote is recorded");
        }

        let tallies = database.kick_tallies(room_id).await.expect("tallies");

        assert_eq!(tallies, vec![(popular, 2), (other, 1)]);
    }
}
