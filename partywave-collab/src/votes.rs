use futures_util::{future::try_join, TryFutureExt};
use log::{debug, info};
use serde::Serialize;

use partywave_core::{Config, RoomId, RuntimeStore, UserId};

use crate::{
    CollabContext, CollabError, CollabEvent, CollabResult, Database, DatabaseError, MemberRole,
    VoteTarget,
};

/// The votes for a target, against what is needed for its action to fire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TargetTally {
    pub target: VoteTarget,
    pub votes: u64,
    pub required: u64,
    pub online: u64,
}

impl TargetTally {
    pub fn new(target: VoteTarget, votes: u64, online: u64) -> Self {
        Self {
            target,
            votes,
            required: Config::required_votes(online),
            online,
        }
    }

    pub fn threshold_reached(&self) -> bool {
        Config::threshold_reached(self.votes, self.online)
    }
}

/// What became of a vote
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VoteOutcome {
    /// The vote was not counted
    Rejected(String),
    /// The vote was counted, and its action did not fire
    Counted(TargetTally),
    /// The vote was counted, and fired the action of its target
    Fired(TargetTally),
}

impl VoteOutcome {
    pub fn is_fired(&self) -> bool {
        matches!(self, VoteOutcome::Fired(_))
    }
}

/// Every open vote of a room, for display
#[derive(Debug, Clone, Serialize)]
pub struct VoteStatus {
    pub online: u64,
    pub required: u64,
    pub skip: Option<TargetTally>,
    pub kicks: Vec<TargetTally>,
}

/// Fires skip and kick actions once enough online members vote for them.
///
/// Skips fire at most once because they only advance the item that was voted on.
/// Kicks are serialized by the room lock and re-check the membership before acting.
pub struct VoteEngine<S, Db> {
    context: CollabContext<S, Db>,
}

impl<S, Db> VoteEngine<S, Db>
where
    S: RuntimeStore,
    Db: Database,
{
    pub fn new(context: &CollabContext<S, Db>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    async fn require_member(&self, room_id: RoomId, user_id: UserId) -> CollabResult<MemberRole> {
        self.context
            .database
            .member_role(room_id, user_id)
            .await?
            .ok_or(CollabError::NotAMember)
    }

    async fn tally(&self, room_id: RoomId, target: VoteTarget) -> CollabResult<TargetTally> {
        let online = self
            .context
            .runtime
            .presence
            .count(room_id)
            .map_err(CollabError::from);
        let votes = self
            .context
            .database
            .count(room_id, target)
            .map_err(CollabError::from);

        let (online, votes) = try_join(online, votes).await?;

        Ok(TargetTally::new(target, votes, online))
    }

    /// Records a vote. Returns false if the voter already voted for the target.
    async fn record(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> CollabResult<bool> {
        let database = &self.context.database;

        if database.has_voted(room_id, voter_id, target).await? {
            return Ok(false);
        }

        match database.record_vote(room_id, voter_id, target).await {
            Ok(()) => Ok(true),
            Err(DatabaseError::Conflict { .. }) => Ok(false),
            Err(err) => Err(err.into()),
        }
    }

    /// Votes to skip the track that is currently playing.
    pub async fn vote_skip(&self, room_id: RoomId, voter_id: UserId) -> CollabResult<VoteOutcome> {
        self.require_member(room_id, voter_id).await?;

        let playback = &self.context.runtime.playback;

        let Some(item_id) = playback.current_item_id(room_id).await? else {
            return Ok(VoteOutcome::Rejected(
                "No track is currently playing".to_string(),
            ));
        };

        let target = VoteTarget::SkipTrack(item_id);

        if !self.record(room_id, voter_id, target).await? {
            return Ok(VoteOutcome::Rejected(
                "You already voted to skip this track".to_string(),
            ));
        }

        let tally = self.tally(room_id, target).await?;

        self.context.emit(CollabEvent::VoteCast {
            room_id,
            voter_id,
            tally,
        });

        if !tally.threshold_reached() {
            return Ok(VoteOutcome::Counted(tally));
        }

        let result = playback.skip_item(room_id, item_id).await?;

        if !result.success {
            debug!(
                "Skip vote for item {} in room {} did not fire: {}",
                item_id, room_id, result.message
            );
            return Ok(VoteOutcome::Counted(tally));
        }

        info!(
            "Skip vote fired for item {} in room {} with {}/{} votes",
            item_id, room_id, tally.votes, tally.required
        );

        self.context.database.clear_votes(room_id, target).await?;

        self.context.emit(CollabEvent::TrackSkipped {
            room_id,
            item_id,
            by_vote: true,
        });
        self.context.emit_advance(room_id, &result).await?;

        Ok(VoteOutcome::Fired(tally))
    }

    /// Votes to kick a member out of the room.
    pub async fn vote_kick(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target_id: UserId,
    ) -> CollabResult<VoteOutcome> {
        self.require_member(room_id, voter_id).await?;

        if voter_id == target_id {
            return Ok(VoteOutcome::Rejected("You cannot kick yourself".to_string()));
        }

        let database = &self.context.database;

        match database.member_role(room_id, target_id).await? {
            None => {
                return Ok(VoteOutcome::Rejected(
                    "User is not an active member of this room".to_string(),
                ))
            }
            Some(MemberRole::Owner) => {
                return Ok(VoteOutcome::Rejected(
                    "You cannot kick the room owner".to_string(),
                ))
            }
            Some(_) => {}
        }

        let target = VoteTarget::KickUser(target_id);

        if !self.record(room_id, voter_id, target).await? {
            return Ok(VoteOutcome::Rejected(
                "You already voted to kick this user".to_string(),
            ));
        }

        let tally = self.tally(room_id, target).await?;

        self.context.emit(CollabEvent::VoteCast {
            room_id,
            voter_id,
            tally,
        });

        if !tally.threshold_reached() {
            return Ok(VoteOutcome::Counted(tally));
        }

        let runtime = &self.context.runtime;
        let _guard = runtime.context().locks.lock(room_id).await;

        if !database.deactivate_member(room_id, target_id).await? {
            debug!(
                "Kick vote against {} in room {} did not fire, already gone",
                target_id, room_id
            );
            return Ok(VoteOutcome::Counted(tally));
        }

        runtime.presence.leave(room_id, target_id).await?;
        database.clear_votes(room_id, target).await?;

        info!(
            "Kick vote fired against {} in room {} with {}/{} votes",
            target_id, room_id, tally.votes, tally.required
        );

        self.context.emit(CollabEvent::UserKicked {
            room_id,
            user_id: target_id,
        });

        Ok(VoteOutcome::Fired(tally))
    }

    /// Takes back a skip vote for the current track. Never fires the skip.
    pub async fn withdraw_skip_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
    ) -> CollabResult<VoteOutcome> {
        let current = self
            .context
            .runtime
            .playback
            .current_item_id(room_id)
            .await?;

        let Some(item_id) = current else {
            return Ok(VoteOutcome::Rejected(
                "No track is currently playing".to_string(),
            ));
        };

        self.withdraw(room_id, voter_id, VoteTarget::SkipTrack(item_id))
            .await
    }

    /// Takes back a kick vote. Never fires the kick.
    pub async fn withdraw_kick_vote(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target_id: UserId,
    ) -> CollabResult<VoteOutcome> {
        self.withdraw(room_id, voter_id, VoteTarget::KickUser(target_id))
            .await
    }

    async fn withdraw(
        &self,
        room_id: RoomId,
        voter_id: UserId,
        target: VoteTarget,
    ) -> CollabResult<VoteOutcome> {
        let withdrawn = self
            .context
            .database
            .withdraw_vote(room_id, voter_id, target)
            .await?;

        if !withdrawn {
            return Ok(VoteOutcome::Rejected("You have not voted".to_string()));
        }

        let tally = self.tally(room_id, target).await?;

        self.context.emit(CollabEvent::VoteWithdrawn {
            room_id,
            voter_id,
            tally,
        });

        Ok(VoteOutcome::Counted(tally))
    }

    /// Returns the skip tally of the current track, and every kick tally.
    pub async fn vote_status(&self, room_id: RoomId) -> CollabResult<VoteStatus> {
        let online = self.context.runtime.presence.count(room_id).await?;
        let current = self
            .context
            .runtime
            .playback
            .current_item_id(room_id)
            .await?;

        let skip = match current {
            Some(item_id) => {
                let target = VoteTarget::SkipTrack(item_id);
                let votes = self.context.database.count(room_id, target).await?;

                Some(TargetTally::new(target, votes, online))
            }
            None => None,
        };

        let kicks = self
            .context
            .database
            .kick_tallies(room_id)
            .await?
            .into_iter()
            .map(|(user_id, votes)| TargetTally::new(VoteTarget::KickUser(user_id), votes, online))
            .collect();

        Ok(VoteStatus {
            online,
            required: Config::required_votes(online),
            skip,
            kicks,
        })
    }
}

impl<S, Db> Clone for VoteEngine<S, Db> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}
