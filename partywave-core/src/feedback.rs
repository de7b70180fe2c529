use std::{collections::HashSet, time::Duration};

use log::{debug, info};
use serde::Serialize;

use crate::{
    parse_value, PlaylistItemId, RoomId, RuntimeContext, RuntimeStore, StoreResult, UserId,
};

/// How many members like and dislike an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct FeedbackCounts {
    pub likes: u64,
    pub dislikes: u64,
}

/// Owns the like and dislike sets of every item.
///
/// A member is in at most one of the two sets of an item. Switching sides moves the
/// member with a single atomic store operation.
pub struct FeedbackEngine<S> {
    context: RuntimeContext<S>,
}

impl<S> FeedbackEngine<S>
where
    S: RuntimeStore,
{
    pub fn new(context: &RuntimeContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Returns true if the user didn't already like the item.
    pub async fn like(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let keys = &self.context.keys;
        let changed = self
            .context
            .store
            .set_add_exclusive(
                &keys.likes(room_id, item_id),
                &keys.dislikes(room_id, item_id),
                &user_id.to_string(),
            )
            .await?;

        if changed {
            info!("User {} likes item {}", user_id, item_id);
        } else {
            debug!("User {} already likes item {}", user_id, item_id);
        }

        Ok(changed)
    }

    /// Returns true if the user didn't already dislike the item.
    pub async fn dislike(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let keys = &self.context.keys;
        let changed = self
            .context
            .store
            .set_add_exclusive(
                &keys.dislikes(room_id, item_id),
                &keys.likes(room_id, item_id),
                &user_id.to_string(),
            )
            .await?;

        if changed {
            info!("User {} dislikes item {}", user_id, item_id);
        } else {
            debug!("User {} already dislikes item {}", user_id, item_id);
        }

        Ok(changed)
    }

    /// Returns true if the user liked the item.
    pub async fn unlike(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let key = self.context.keys.likes(room_id, item_id);
        let removed = self
            .context
            .store
            .set_remove(&key, &[user_id.to_string()])
            .await?;

        Ok(removed > 0)
    }

    /// Returns true if the user disliked the item.
    pub async fn undislike(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let key = self.context.keys.dislikes(room_id, item_id);
        let removed = self
            .context
            .store
            .set_remove(&key, &[user_id.to_string()])
            .await?;

        Ok(removed > 0)
    }

    /// Removes whatever feedback the user gave. Returns true if there was any.
    pub async fn clear_feedback(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let unliked = self.unlike(room_id, item_id, user_id).await?;
        let undisliked = self.undislike(room_id, item_id, user_id).await?;

        Ok(unliked || undisliked)
    }

    pub async fn like_count(&self, room_id: RoomId, item_id: PlaylistItemId) -> StoreResult<u64> {
        let key = self.context.keys.likes(room_id, item_id);
        self.context.store.set_card(&key).await
    }

    pub async fn dislike_count(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<u64> {
        let key = self.context.keys.dislikes(room_id, item_id);
        self.context.store.set_card(&key).await
    }

    pub async fn counts(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<FeedbackCounts> {
        Ok(FeedbackCounts {
            likes: self.like_count(room_id, item_id).await?,
            dislikes: self.dislike_count(room_id, item_id).await?,
        })
    }

    pub async fn is_liked_by(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let key = self.context.keys.likes(room_id, item_id);
        self.context
            .store
            .set_contains(&key, &user_id.to_string())
            .await
    }

    pub async fn is_disliked_by(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        user_id: UserId,
    ) -> StoreResult<bool> {
        let key = self.context.keys.dislikes(room_id, item_id);
        self.context
            .store
            .set_contains(&key, &user_id.to_string())
            .await
    }

    async fn users_in(&self, key: String) -> StoreResult<HashSet<UserId>> {
        let raw = self.context.store.set_members(&key).await?;

        raw.iter()
            .map(|member| parse_value(&key, "member", member))
            .collect()
    }

    pub async fn all_likers(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<HashSet<UserId>> {
        self.users_in(self.context.keys.likes(room_id, item_id))
            .await
    }

    pub async fn all_dislikers(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<HashSet<UserId>> {
        self.users_in(self.context.keys.dislikes(room_id, item_id))
            .await
    }

    fn feedback_keys(&self, room_id: RoomId, item_ids: &[PlaylistItemId]) -> Vec<String> {
        let keys = &self.context.keys;

        item_ids
            .iter()
            .flat_map(|id| [keys.likes(room_id, *id), keys.dislikes(room_id, *id)])
            .collect()
    }

    /// Deletes both sets of an item. Returns how many of them existed.
    pub async fn delete_feedback(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<u64> {
        self.delete_all_feedback(room_id, &[item_id]).await
    }

    pub async fn delete_all_feedback(
        &self,
        room_id: RoomId,
        item_ids: &[PlaylistItemId],
    ) -> StoreResult<u64> {
        let keys = self.feedback_keys(room_id, item_ids);

        if keys.is_empty() {
            return Ok(0);
        }

        self.context.store.delete(&keys).await
    }

    pub async fn set_idle_ttl(
        &self,
        room_id: RoomId,
        item_ids: &[PlaylistItemId],
        ttl: Duration,
    ) -> StoreResult<()> {
        for key in self.feedback_keys(room_id, item_ids) {
            self.context.store.expire(&key, ttl).await?;
        }

        Ok(())
    }

    pub async fn persist(&self, room_id: RoomId, item_ids: &[PlaylistItemId]) -> StoreResult<()> {
        for key in self.feedback_keys(room_id, item_ids) {
            self.context.store.persist(&key).await?;
        }

        Ok(())
    }
}

impl<S> Clone for FeedbackEngine<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::implementors::MemoryStore;
    use crate::Config;

    fn engine() -> FeedbackEngine<MemoryStore> {
        let context = RuntimeContext::new(MemoryStore::new(), Config::default());
        FeedbackEngine::new(&context)
    }

    #[tokio::test]
    async fn test_liking_twice_counts_once() {
        let feedback = engine();
        let (room_id, item_id, user_id) = (RoomId::new(), PlaylistItemId::new(), UserId::new());

        let first = feedback.like(room_id, item_id, user_id).await.expect("likes");
        let second = feedback.like(room_id, item_id, user_id).await.expect("likes");

        assert_eq!((first, second), (true, false));
        assert_eq!(feedback.like_count(room_id, item_id).await.expect("counts"), 1);
    }

    #[tokio::test]
    async fn test_dislike_replaces_like() {
        let feedback = engine();
        let (room_id, item_id, user_id) = (RoomId::new(), PlaylistItemId::new(), UserId::new());

        feedback.like(room_id, item_id, user_id).await.expect("likes");
        feedback
            .dislike(room_id, item_id, user_id)
            .await
            .expect("dislikes");

        assert_eq!(
            feedback.counts(room_id, item_id).await.expect("counts"),
            FeedbackCounts {
                likes: 0,
                dislikes: 1
            }
        );
        assert!(!feedback
            .is_liked_by(room_id, item_id, user_id)
            .await
            .expect("checks"));
        assert!(feedback
            .is_disliked_by(room_id, item_id, user_id)
            .await
            .expect("checks"));
    }

    #[tokio::test]
    async fn test_sets_stay_disjoint() {
        let feedback = engine();
        let (room_id, item_id) = (RoomId::new(), PlaylistItemId::new());
        let users = [UserId::new(), UserId::new()];

        for (step, user_id) in users.iter().cycle().take(12).enumerate() {
            let result = match step % 4 {
                0 => feedback.like(room_id, item_id, *user_id).await,
                1 => feedback.dislike(room_id, item_id, *user_id).await,
                2 => feedback.undislike(room_id, item_id, *user_id).await,
                _ => feedback.unlike(room_id, item_id, *user_id).await,
            };
            result.expect("feedback is given");

            let likers = feedback.all_likers(room_id, item_id).await.expect("lists");
            let dislikers = feedback
                .all_dislikers(room_id, item_id)
                .await
                .expect("lists");

            assert!(likers.is_disjoint(&dislikers));
        }
    }

    #[tokio::test]
    async fn test_clear_and_delete() {
        let feedback = engine();
        let (room_id, item_id, user_id) = (RoomId::new(), PlaylistItemId::new(), UserId::new());

        feedback.like(room_id, item_id, user_id).await.expect("likes");

        assert!(feedback
            .clear_feedback(room_id, item_id, user_id)
            .await
            .expect("clears"));
        assert!(!feedback
            .clear_feedback(room_id, item_id, user_id)
            .await
            .expect("clears"));

        feedback
            .dislike(room_id, item_id, user_id)
            .await
            .expect("dislikes");

        assert_eq!(
            feedback
                .delete_feedback(room_id, item_id)
                .await
                .expect("deletes"),
            1
        );
        assert_eq!(feedback.counts(room_id, item_id).await.expect("counts"), Default::default());
    }
}
