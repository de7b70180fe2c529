use std::{fmt::Display, time::Duration};

use log::{debug, info};

use crate::{now_ms, parse_value, RoomId, RuntimeContext, RuntimeStore, StoreResult, UserId};

mod item;
mod status;

pub use item::*;
pub use status::*;

/// The outcome of a status transition.
///
/// Rejections are ordinary values: two competing requests racing on the same item is
/// expected, and the loser simply observes a status it can't move from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Applied {
        from: ItemStatus,
        to: ItemStatus,
    },
    Rejected {
        current: ItemStatus,
        attempted: ItemStatus,
    },
    Missing,
}

impl Transition {
    pub fn is_applied(&self) -> bool {
        matches!(self, Transition::Applied { .. })
    }
}

impl Display for Transition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Transition::Applied { from, to } => write!(f, "moved from {} to {}", from, to),
            Transition::Rejected { current, attempted } => {
                write!(f, "cannot move from {} to {}", current, attempted)
            }
            Transition::Missing => write!(f, "playlist item not found"),
        }
    }
}

/// Owns the append-only queue of a room and the status of every item in it.
pub struct PlaylistEngine<S> {
    context: RuntimeContext<S>,
}

impl<S> PlaylistEngine<S>
where
    S: RuntimeStore,
{
    pub fn new(context: &RuntimeContext<S>) -> Self {
        Self {
            context: context.clone(),
        }
    }

    /// Appends a track to the end of the queue as a new [ItemStatus::Queued] item.
    pub async fn append(
        &self,
        room_id: RoomId,
        track: Track,
        added_by: UserId,
    ) -> StoreResult<PlaylistItem> {
        let keys = &self.context.keys;
        let store = &self.context.store;

        let sequence_number = store.incr(&keys.sequence_counter(room_id)).await?;

        let item = PlaylistItem {
            id: PlaylistItemId::new(),
            room_id,
            track,
            added_by,
            added_at_ms: now_ms(),
            sequence_number: sequence_number as u64,
            status: ItemStatus::Queued,
        };

        // The hash goes first so the id is never listed without its fields
        store
            .hash_put_all(&keys.playlist_item(room_id, item.id), &item.to_fields())
            .await?;
        store
            .list_push(&keys.playlist(room_id), &item.id.to_string())
            .await?;

        info!(
            "Appended \"{}\" as #{} ({}) to room {}",
            item.track.name, item.sequence_number, item.id, room_id
        );

        Ok(item)
    }

    pub async fn get(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<Option<PlaylistItem>> {
        let key = self.context.keys.playlist_item(room_id, item_id);
        let fields = self.context.store.hash_get_all(&key).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        PlaylistItem::from_fields(&key, &fields).map(Some)
    }

    /// Returns the ids of every item ever queued in the room, in insertion order.
    pub async fn item_ids(&self, room_id: RoomId) -> StoreResult<Vec<PlaylistItemId>> {
        let key = self.context.keys.playlist(room_id);
        let raw = self.context.store.list_range(&key).await?;

        raw.iter()
            .map(|id| parse_value(&key, "item_id", id))
            .collect()
    }

    /// Returns every item in insertion order, whatever its status.
    pub async fn list_all(&self, room_id: RoomId) -> StoreResult<Vec<PlaylistItem>> {
        let mut items = vec![];

        for item_id in self.item_ids(room_id).await? {
            // An item hash can expire before the list does
            if let Some(item) = self.get(room_id, item_id).await? {
                items.push(item);
            }
        }

        Ok(items)
    }

    pub async fn list_by_status(
        &self,
        room_id: RoomId,
        statuses: &[ItemStatus],
    ) -> StoreResult<Vec<PlaylistItem>> {
        let items = self.list_all(room_id).await?;

        Ok(items
            .into_iter()
            .filter(|item| statuses.contains(&item.status))
            .collect())
    }

    /// Returns the status of a single item without loading the rest of it.
    pub async fn status(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<Option<ItemStatus>> {
        let key = self.context.keys.playlist_item(room_id, item_id);
        let raw = self
            .context
            .store
            .hash_get(&key, PlaylistItem::STATUS_FIELD)
            .await?;

        raw.map(|raw| parse_value(&key, PlaylistItem::STATUS_FIELD, &raw))
            .transpose()
    }

    /// Returns the first item in insertion order with the given status.
    async fn first_with_status(
        &self,
        room_id: RoomId,
        wanted: ItemStatus,
    ) -> StoreResult<Option<PlaylistItemId>> {
        for item_id in self.item_ids(room_id).await? {
            if self.status(room_id, item_id).await? == Some(wanted) {
                return Ok(Some(item_id));
            }
        }

        Ok(None)
    }

    /// Returns the item that is currently playing, if any.
    pub async fn current_playing(&self, room_id: RoomId) -> StoreResult<Option<PlaylistItemId>> {
        self.first_with_status(room_id, ItemStatus::Playing).await
    }

    /// Returns the next item up, the first queued one in insertion order.
    pub async fn first_queued(&self, room_id: RoomId) -> StoreResult<Option<PlaylistItemId>> {
        self.first_with_status(room_id, ItemStatus::Queued).await
    }

    /// Moves an item to `next` if the transition table allows it.
    ///
    /// The status is swapped with a compare-and-set, so out of any number of
    /// concurrent callers attempting the same move, exactly one sees it applied.
    pub async fn transition(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        next: ItemStatus,
    ) -> StoreResult<Transition> {
        let Some(current) = self.status(room_id, item_id).await? else {
            debug!("Cannot move missing item {} in room {}", item_id, room_id);
            return Ok(Transition::Missing);
        };

        if !current.allowed(next) {
            debug!(
                "Rejected transition of item {} from {} to {}",
                item_id, current, next
            );

            return Ok(Transition::Rejected {
                current,
                attempted: next,
            });
        }

        let key = self.context.keys.playlist_item(room_id, item_id);
        let swapped = self
            .context
            .store
            .hash_compare_and_set(
                &key,
                PlaylistItem::STATUS_FIELD,
                Some(current.as_str()),
                &[(PlaylistItem::STATUS_FIELD, next.to_string())],
            )
            .await?;

        if !swapped {
            // Someone else moved it first, report what they moved it to
            let observed = self.status(room_id, item_id).await?.unwrap_or(current);
            debug!(
                "Lost race moving item {} from {} to {}, it is now {}",
                item_id, current, next, observed
            );

            return Ok(Transition::Rejected {
                current: observed,
                attempted: next,
            });
        }

        info!(
            "Item {} in room {} moved from {} to {}",
            item_id, room_id, current, next
        );

        Ok(Transition::Applied {
            from: current,
            to: next,
        })
    }

    /// Applies a time to live to the queue, its counter, and every item.
    pub async fn set_idle_ttl(&self, room_id: RoomId, ttl: Duration) -> StoreResult<()> {
        let keys = &self.context.keys;
        let store = &self.context.store;

        for item_id in self.item_ids(room_id).await? {
            store.expire(&keys.playlist_item(room_id, item_id), ttl).await?;
        }

        store.expire(&keys.playlist(room_id), ttl).await?;
        store.expire(&keys.sequence_counter(room_id), ttl).await?;

        Ok(())
    }

    /// Removes a time to live applied by [Self::set_idle_ttl].
    pub async fn persist(&self, room_id: RoomId) -> StoreResult<()> {
        let keys = &self.context.keys;
        let store = &self.context.store;

        for item_id in self.item_ids(room_id).await? {
            store.persist(&keys.playlist_item(room_id, item_id)).await?;
        }

        store.persist(&keys.playlist(room_id)).await?;
        store.persist(&keys.sequence_counter(room_id)).await?;

        Ok(())
    }

    /// Deletes the records of the given items. The queue itself is left alone.
    pub async fn delete_items(
        &self,
        room_id: RoomId,
        item_ids: &[PlaylistItemId],
    ) -> StoreResult<u64> {
        let keys: Vec<_> = item_ids
            .iter()
            .map(|id| self.context.keys.playlist_item(room_id, *id))
            .collect();

        if keys.is_empty() {
            return Ok(0);
        }

        self.context.store.delete(&keys).await
    }

    /// Deletes the queue, its counter, and every item in it.
    /// Returns the ids of the deleted items.
    pub async fn delete_all(&self, room_id: RoomId) -> StoreResult<Vec<PlaylistItemId>> {
        let keys = &self.context.keys;
        let item_ids = self.item_ids(room_id).await?;

        self.delete_items(room_id, &item_ids).await?;
        self.context
            .store
            .delete(&[keys.playlist(room_id), keys.sequence_counter(room_id)])
            .await?;

        info!(
            "Deleted the queue of room {} ({} items)",
            room_id,
            item_ids.len()
        );

        Ok(item_ids)
    }
}

impl<S> Clone for PlaylistEngine<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
        }
    }
}
