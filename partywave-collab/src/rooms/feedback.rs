use futures_util::future::try_join;
use log::warn;
use serde::Serialize;

use partywave_core::{FeedbackCounts, PlaylistItemId, RoomId, RuntimeStore, StoreResult, UserId};

use crate::{CollabError, CollabEvent, CollabResult, Database};

use super::RoomManager;

/// The result of a like or dislike operation
#[derive(Debug, Clone, Copy, Serialize)]
pub struct FeedbackResult {
    /// False if the operation had nothing to do
    pub changed: bool,
    pub counts: FeedbackCounts,
    /// Where the member stands on the item afterwards
    pub user_liked: bool,
    pub user_disliked: bool,
}

#[derive(Debug, Clone, Copy)]
enum FeedbackAction {
    Like,
    Dislike,
    Unlike,
    Undislike,
}

impl FeedbackAction {
    /// How the totals of the track's adder move, given where the member stood.
    fn totals_delta(self, liked: bool, disliked: bool) -> (i64, i64) {
        match self {
            Self::Like if !liked => (1, -i64::from(disliked)),
            Self::Dislike if !disliked => (-i64::from(liked), 1),
            Self::Unlike if liked => (-1, 0),
            Self::Undislike if disliked => (0, -1),
            _ => (0, 0),
        }
    }
}

impl<S, Db> RoomManager<S, Db>
where
    S: RuntimeStore,
    Db: Database,
{
    /// Likes an item, taking back a dislike by the same member.
    pub async fn like(
        &self,
        room_id: RoomId,
        user_id: UserId,
        item_id: PlaylistItemId,
    ) -> CollabResult<FeedbackResult> {
        self.feedback(room_id, user_id, item_id, FeedbackAction::Like)
            .await
    }

    /// Dislikes an item, taking back a like by the same member.
    pub async fn dislike(
        &self,
        room_id: RoomId,
        user_id: UserId,
        item_id: PlaylistItemId,
    ) -> CollabResult<FeedbackResult> {
        self.feedback(room_id, user_id, item_id, FeedbackAction::Dislike)
            .await
    }

    pub async fn unlike(
        &self,
        room_id: RoomId,
        user_id: UserId,
        item_id: PlaylistItemId,
    ) -> CollabResult<FeedbackResult> {
        self.feedback(room_id, user_id, item_id, FeedbackAction::Unlike)
            .await
    }

    pub async fn undislike(
        &self,
        room_id: RoomId,
        user_id: UserId,
        item_id: PlaylistItemId,
    ) -> CollabResult<FeedbackResult> {
        self.feedback(room_id, user_id, item_id, FeedbackAction::Undislike)
            .await
    }

    /// Applies feedback, keeping the totals of the user who added the item in step.
    ///
    /// Totals are adjusted first and reverted if the runtime didn't change.
    async fn feedback(
        &self,
        room_id: RoomId,
        user_id: UserId,
        item_id: PlaylistItemId,
        action: FeedbackAction,
    ) -> CollabResult<FeedbackResult> {
        self.require_member(room_id, user_id).await?;

        let runtime = &self.context.runtime;
        let database = &self.context.database;

        let item = runtime
            .playlist
            .get(room_id, item_id)
            .await?
            .ok_or(CollabError::PlaylistItemNotFound)?;

        let feedback = &runtime.feedback;
        let (liked, disliked) = try_join(
            feedback.is_liked_by(room_id, item_id, user_id),
            feedback.is_disliked_by(room_id, item_id, user_id),
        )
        .await?;

        let (likes, dislikes) = action.totals_delta(liked, disliked);
        let counted = likes != 0 || dislikes != 0;

        if counted {
            database
                .adjust_feedback(item.added_by, likes, dislikes)
                .await?;
        }

        let applied = self.apply_feedback(room_id, user_id, item_id, action).await;

        if counted && !matches!(applied, Ok(true)) {
            if let Err(err) = database
                .adjust_feedback(item.added_by, -likes, -dislikes)
                .await
            {
                warn!(
                    "Could not revert feedback totals of user {}: {}",
                    item.added_by, err
                );
            }
        }

        let changed = applied?;

        let (counts, (user_liked, user_disliked)) = try_join(
            feedback.counts(room_id, item_id),
            try_join(
                feedback.is_liked_by(room_id, item_id, user_id),
                feedback.is_disliked_by(room_id, item_id, user_id),
            ),
        )
        .await?;

        if changed {
            self.context.emit(CollabEvent::FeedbackUpdated {
                room_id,
                item_id,
                counts,
            });
        }

        Ok(FeedbackResult {
            changed,
            counts,
            user_liked,
            user_disliked,
        })
    }

    async fn apply_feedback(
        &self,
        room_id: RoomId,
        user_id: UserId,
        item_id: PlaylistItemId,
        action: FeedbackAction,
    ) -> StoreResult<bool> {
        let feedback = &self.context.runtime.feedback;

        match action {
            FeedbackAction::Like => feedback.like(room_id, item_id, user_id).await,
            FeedbackAction::Dislike => feedback.dislike(room_id, item_id, user_id).await,
            FeedbackAction::Unlike => feedback.unlike(room_id, item_id, user_id).await,
            FeedbackAction::Undislike => feedback.undislike(room_id, item_id, user_id).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{collab, events, member, TestCollab};
    use crate::{FeedbackTotals, MemberRole, UserStats};

    async fn totals(collab: &TestCollab, user_id: UserId) -> FeedbackTotals {
        collab
            .database()
            .feedback_totals(user_id)
            .await
            .expect("totals are read")
    }

    #[tokio::test]
    async fn test_switching_sides_moves_the_vote() {
        let (collab, room_id, owner) = collab();
        let added = collab
            .rooms
            .add_track(room_id, owner, "a")
            .await
            .expect("track is added");
        let item_id = added.item.id;

        let liked = collab
            .rooms
            .like(room_id, owner, item_id)
            .await
            .expect("likes");
        let disliked = collab
            .rooms
            .dislike(room_id, owner, item_id)
            .await
            .expect("dislikes");

        assert!(liked.changed);
        assert_eq!(liked.counts, FeedbackCounts { likes: 1, dislikes: 0 });
        assert!(liked.user_liked && !liked.user_disliked);
        assert!(disliked.changed);
        assert_eq!(disliked.counts, FeedbackCounts { likes: 0, dislikes: 1 });
        assert!(!disliked.user_liked && disliked.user_disliked);
    }

    #[tokio::test]
    async fn test_switching_sides_moves_the_adders_totals() {
        let (collab, room_id, owner) = collab();
        let guest = member(&collab, room_id, MemberRole::Participant);
        let other = member(&collab, room_id, MemberRole::Participant);
        let added = collab
            .rooms
            .add_track(room_id, owner, "a")
            .await
            .expect("track is added");
        let item_id = added.item.id;

        collab.rooms.like(room_id, guest, item_id).await.expect("likes");
        collab.rooms.like(room_id, guest, item_id).await.expect("likes");
        collab.rooms.like(room_id, other, item_id).await.expect("likes");
        assert_eq!(
            totals(&collab, owner).await,
            FeedbackTotals {
                total_like: 2,
                total_dislike: 0
            }
        );

        collab
            .rooms
            .dislike(room_id, guest, item_id)
            .await
            .expect("dislikes");
        assert_eq!(
            totals(&collab, owner).await,
            FeedbackTotals {
                total_like: 1,
                total_dislike: 1
            }
        );

        collab
            .rooms
            .undislike(room_id, guest, item_id)
            .await
            .expect("undislikes");
        collab
            .rooms
            .unlike(room_id, guest, item_id)
            .await
            .expect("unlikes");
        assert_eq!(
            totals(&collab, owner).await,
            FeedbackTotals {
                total_like: 1,
                total_dislike: 0
            }
        );
        assert_eq!(
            totals(&collab, guest).await,
            FeedbackTotals::default()
        );
    }

    #[tokio::test]
    async fn test_repeated_feedback_emits_once() {
        let (collab, room_id, owner) = collab();
        let guest = member(&collab, room_id, MemberRole::Participant);
        let added = collab
            .rooms
            .add_track(room_id, owner, "a")
            .await
            .expect("track is added");
        events(&collab);

        let first = collab
            .rooms
            .like(room_id, guest, added.item.id)
            .await
            .expect("likes");
        let second = collab
            .rooms
            .like(room_id, guest, added.item.id)
            .await
            .expect("likes");
        let removed = collab
            .rooms
            .unlike(room_id, guest, added.item.id)
            .await
            .expect("unlikes");
        let nothing = collab
            .rooms
            .undislike(room_id, guest, added.item.id)
            .await
            .expect("undislikes");

        assert!(first.changed);
        assert!(!second.changed);
        assert!(removed.changed);
        assert!(!nothing.changed);
        assert_eq!(removed.counts, FeedbackCounts::default());
        assert_eq!(events(&collab).len(), 2);
    }

    #[tokio::test]
    async fn test_feedback_needs_member_and_item() {
        let (collab, room_id, owner) = collab();
        let added = collab
            .rooms
            .add_track(room_id, owner, "a")
            .await
            .expect("track is added");

        let stranger = collab
            .rooms
            .like(room_id, UserId::new(), added.item.id)
            .await;
        let missing = collab
            .rooms
            .like(room_id, owner, PlaylistItemId::new())
            .await;

        assert!(matches!(stranger, Err(CollabError::NotAMember)));
        assert!(matches!(missing, Err(CollabError::PlaylistItemNotFound)));
    }
}
