use std::time::Duration;

use log::{debug, info};

mod state;

pub use state::*;

use crate::{
    now_ms, parse_value, HashCondition, HashWrite, ItemStatus, PlaylistEngine, PlaylistItem,
    PlaylistItemId, RoomId, RuntimeContext, RuntimeStore, StoreResult,
};

const NOTHING_PLAYING: &str = "No track is currently playing";
const CHANGED_CONCURRENTLY: &str = "Playback was changed by another request";

/// How the current track ends when playback advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Advance {
    Skip,
    Complete,
}

impl Advance {
    fn status(self) -> ItemStatus {
        match self {
            Advance::Skip => ItemStatus::Skipped,
            Advance::Complete => ItemStatus::Played,
        }
    }

    fn past_tense(self) -> &'static str {
        match self {
            Advance::Skip => "skipped",
            Advance::Complete => "completed",
        }
    }
}

/// Owns the single "now playing" clock of every room.
///
/// Mutations of a room are serialized by the room lock within this process. Across
/// processes, every change to what is playing is a single store transaction that
/// checks the playback record and the statuses it reads, then writes them together.
/// Two workers can never both start a track from the same state, and the record
/// only ever points at a playing item.
pub struct PlaybackEngine<S> {
    context: RuntimeContext<S>,
    playlist: PlaylistEngine<S>,
}

impl<S> PlaybackEngine<S>
where
    S: RuntimeStore,
{
    pub fn new(context: &RuntimeContext<S>, playlist: &PlaylistEngine<S>) -> Self {
        Self {
            context: context.clone(),
            playlist: playlist.clone(),
        }
    }

    fn key(&self, room_id: RoomId) -> String {
        self.context.keys.playback(room_id)
    }

    /// Starts a queued item, finishing whatever was playing before it.
    pub async fn start_track(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<OperationResult> {
        let _guard = self.context.locks.lock(room_id).await;
        self.start_track_locked(room_id, item_id).await
    }

    /// Starts the first queued item.
    pub async fn start_next_track(&self, room_id: RoomId) -> StoreResult<OperationResult> {
        let _guard = self.context.locks.lock(room_id).await;

        match self.playlist.first_queued(room_id).await? {
            Some(next) => self.start_track_locked(room_id, next).await,
            None => {
                debug!("No queued tracks to start in room {}", room_id);
                Ok(OperationResult::failed("No queued tracks found in playlist"))
            }
        }
    }

    /// Skips the current track and starts the next one, or stops if the queue is exhausted.
    pub async fn skip_track(&self, room_id: RoomId) -> StoreResult<OperationResult> {
        let _guard = self.context.locks.lock(room_id).await;
        self.advance_locked(room_id, None, Advance::Skip).await
    }

    /// Skips the current track only if it is still `expected`.
    ///
    /// Used by threshold actions, so a skip decided for one track can't hit the next one.
    pub async fn skip_item(
        &self,
        room_id: RoomId,
        expected: PlaylistItemId,
    ) -> StoreResult<OperationResult> {
        let _guard = self.context.locks.lock(room_id).await;
        self.advance_locked(room_id, Some(expected), Advance::Skip)
            .await
    }

    /// Marks the current track as played and moves on, like a skip would.
    pub async fn complete_track(&self, room_id: RoomId) -> StoreResult<OperationResult> {
        let _guard = self.context.locks.lock(room_id).await;
        self.advance_locked(room_id, None, Advance::Complete).await
    }

    /// Completes the current track only if it is still `expected`, so that several
    /// listeners reporting the end of the same track advance playback once.
    pub async fn complete_item(
        &self,
        room_id: RoomId,
        expected: PlaylistItemId,
    ) -> StoreResult<OperationResult> {
        let _guard = self.context.locks.lock(room_id).await;
        self.advance_locked(room_id, Some(expected), Advance::Complete)
            .await
    }

    /// Deletes the playback record. Stopping a stopped room does nothing.
    pub async fn stop_playback(&self, room_id: RoomId) -> StoreResult<()> {
        let _guard = self.context.locks.lock(room_id).await;
        self.delete(room_id).await?;

        info!("Stopped playback in room {}", room_id);
        Ok(())
    }

    pub async fn playback_state(&self, room_id: RoomId) -> StoreResult<Option<PlaybackState>> {
        let key = self.key(room_id);
        let fields = self.context.store.hash_get_all(&key).await?;

        if fields.is_empty() {
            return Ok(None);
        }

        PlaybackState::from_fields(&key, &fields).map(Some)
    }

    pub async fn current_item_id(&self, room_id: RoomId) -> StoreResult<Option<PlaylistItemId>> {
        let key = self.key(room_id);
        let raw = self
            .context
            .store
            .hash_get(&key, PlaybackState::CURRENT_FIELD)
            .await?;

        raw.map(|raw| parse_value(&key, PlaybackState::CURRENT_FIELD, &raw))
            .transpose()
    }

    /// Returns how far into the current track playback is, for clients to seek to.
    pub async fn elapsed_ms(&self, room_id: RoomId) -> StoreResult<Option<u64>> {
        let state = self.playback_state(room_id).await?;
        Ok(state.map(|s| s.elapsed_ms(now_ms())))
    }

    pub async fn is_playing(&self, room_id: RoomId) -> StoreResult<bool> {
        Ok(self.current_item_id(room_id).await?.is_some())
    }

    pub async fn set_idle_ttl(&self, room_id: RoomId, ttl: Duration) -> StoreResult<bool> {
        self.context.store.expire(&self.key(room_id), ttl).await
    }

    pub async fn persist(&self, room_id: RoomId) -> StoreResult<bool> {
        self.context.store.persist(&self.key(room_id)).await
    }

    /// Deletes the playback record without taking the room lock.
    pub async fn delete(&self, room_id: RoomId) -> StoreResult<bool> {
        Ok(self.context.store.delete(&[self.key(room_id)]).await? > 0)
    }

    fn item_key(&self, room_id: RoomId, item_id: PlaylistItemId) -> String {
        self.context.keys.playlist_item(room_id, item_id)
    }

    fn status_is(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        status: ItemStatus,
    ) -> HashCondition {
        HashCondition::equals(
            self.item_key(room_id, item_id),
            PlaylistItem::STATUS_FIELD,
            status,
        )
    }

    fn set_status(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
        status: ItemStatus,
    ) -> HashWrite {
        HashWrite::put(
            self.item_key(room_id, item_id),
            &[(PlaylistItem::STATUS_FIELD, status.to_string())],
        )
    }

    /// Requires the playback record to point at `current`, or to be absent.
    fn current_is(&self, room_id: RoomId, current: Option<PlaylistItemId>) -> HashCondition {
        match current {
            Some(item_id) => {
                HashCondition::equals(self.key(room_id), PlaybackState::CURRENT_FIELD, item_id)
            }
            None => HashCondition::absent(self.key(room_id), PlaybackState::CURRENT_FIELD),
        }
    }

    /// The conditions and writes that put `item` on air.
    ///
    /// The item must still be queued, and the playback record is written along with
    /// its status, so the record never points at an item that isn't playing.
    fn start_steps(
        &self,
        room_id: RoomId,
        item: &PlaylistItem,
    ) -> (HashCondition, [HashWrite; 2]) {
        let now = now_ms();
        let state = PlaybackState {
            current_item_id: item.id,
            started_at_ms: now,
            track_duration_ms: item.track.duration_ms,
            updated_at_ms: now,
        };

        (
            self.status_is(room_id, item.id, ItemStatus::Queued),
            [
                self.set_status(room_id, item.id, ItemStatus::Playing),
                HashWrite::put(self.key(room_id), &state.to_fields()),
            ],
        )
    }

    async fn start_track_locked(
        &self,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> StoreResult<OperationResult> {
        let Some(item) = self.playlist.get(room_id, item_id).await? else {
            return Ok(OperationResult::failed(format!(
                "Playlist item not found: {}",
                item_id
            )));
        };

        if item.status != ItemStatus::Queued {
            return Ok(OperationResult::failed(format!(
                "Cannot start track with status: {} (must be QUEUED)",
                item.status
            )));
        }

        let previous = self.current_item_id(room_id).await?;
        // Whatever is still marked as playing ends as played, even after a stop
        let finishing = self
            .playlist
            .current_playing(room_id)
            .await?
            .filter(|playing| *playing != item_id);

        let (queued, start) = self.start_steps(room_id, &item);
        let mut conditions = vec![self.current_is(room_id, previous), queued];
        let mut writes = start.to_vec();

        if let Some(playing) = finishing {
            conditions.push(self.status_is(room_id, playing, ItemStatus::Playing));
            writes.push(self.set_status(room_id, playing, ItemStatus::Played));
        }

        let applied = self
            .context
            .store
            .hash_transaction(&conditions, &writes)
            .await?;

        if !applied {
            debug!("Lost the race to start {} in room {}", item_id, room_id);
            return Ok(OperationResult::failed(CHANGED_CONCURRENTLY));
        }

        if let Some(playing) = finishing {
            info!("Track {} played in room {}", playing, room_id);
        }

        info!(
            "Now playing \"{}\" ({}) in room {}",
            item.track.name, item_id, room_id
        );

        Ok(OperationResult::succeeded("Track started", Some(item_id)))
    }

    async fn advance_locked(
        &self,
        room_id: RoomId,
        expected: Option<PlaylistItemId>,
        advance: Advance,
    ) -> StoreResult<OperationResult> {
        let Some(current_id) = self.current_item_id(room_id).await? else {
            return Ok(OperationResult::failed(NOTHING_PLAYING));
        };

        if expected.is_some_and(|expected| expected != current_id) {
            debug!("Track in room {} already advanced past {:?}", room_id, expected);
            return Ok(OperationResult::failed("Track already advanced"));
        }

        let Some(current) = self.playlist.get(room_id, current_id).await? else {
            return Ok(OperationResult::failed(format!(
                "Current playlist item not found: {}",
                current_id
            )));
        };

        if current.status != ItemStatus::Playing {
            return Ok(OperationResult::failed(format!(
                "Current track has status: {} (must be PLAYING)",
                current.status
            )));
        }

        let next = match self.playlist.first_queued(room_id).await? {
            Some(next_id) => self.playlist.get(room_id, next_id).await?,
            None => None,
        };

        let mut conditions = vec![
            self.current_is(room_id, Some(current_id)),
            self.status_is(room_id, current_id, ItemStatus::Playing),
        ];
        let mut writes = vec![self.set_status(room_id, current_id, advance.status())];

        match &next {
            Some(next) => {
                let (queued, start) = self.start_steps(room_id, next);

                conditions.push(queued);
                writes.extend(start);
            }
            None => writes.push(HashWrite::delete(self.key(room_id))),
        }

        let applied = self
            .context
            .store
            .hash_transaction(&conditions, &writes)
            .await?;

        if !applied {
            debug!("Lost the race to advance {} in room {}", current_id, room_id);
            return Ok(OperationResult::failed(CHANGED_CONCURRENTLY));
        }

        info!(
            "Track \"{}\" {} in room {}",
            current.track.name,
            advance.past_tense(),
            room_id
        );

        match next {
            Some(next) => {
                info!(
                    "Now playing \"{}\" ({}) in room {}",
                    next.track.name, next.id, room_id
                );

                Ok(OperationResult::succeeded(
                    format!("Track {} and next track started", advance.past_tense()),
                    Some(next.id),
                ))
            }
            None => {
                info!("Queue exhausted, stopped playback in room {}", room_id);

                Ok(OperationResult::succeeded(
                    format!("Track {}, stopped, queue exhausted", advance.past_tense()),
                    None,
                ))
            }
        }
    }
}

impl<S> Clone for PlaybackEngine<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            playlist: self.playlist.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::implementors::MemoryStore;
    use std::time::Duration;

    use crate::testing::{track, StallingStore};
    use crate::{Config, UserId};

    fn engines<S: RuntimeStore>(store: S) -> (PlaylistEngine<S>, PlaybackEngine<S>) {
        let context = RuntimeContext::new(store, Config::default());
        let playlist = PlaylistEngine::new(&context);
        let playback = PlaybackEngine::new(&context, &playlist);

        (playlist, playback)
    }

    async fn queue<S: RuntimeStore>(
        playlist: &PlaylistEngine<S>,
        room_id: RoomId,
        names: &[&str],
    ) -> Vec<PlaylistItem> {
        let mut items = vec![];

        for name in names {
            let item = playlist
                .append(room_id, track(name), UserId::new())
                .await
                .expect("track is appended");

            items.push(item);
        }

        items
    }

    async fn status_of<S: RuntimeStore>(
        playlist: &PlaylistEngine<S>,
        room_id: RoomId,
        item_id: PlaylistItemId,
    ) -> ItemStatus {
        playlist
            .status(room_id, item_id)
            .await
            .expect("status is read")
            .expect("item exists")
    }

    #[tokio::test]
    async fn test_start_then_skip_advances() {
        let (playlist, playback) = engines(MemoryStore::new());
        let room_id = RoomId::new();
        let items = queue(&playlist, room_id, &["one", "two", "three"]).await;

        let started = playback
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        assert!(started.success);
        assert_eq!(status_of(&playlist, room_id, items[0].id).await, ItemStatus::Playing);
        assert_eq!(
            playback.current_item_id(room_id).await.expect("reads"),
            Some(items[0].id)
        );

        let state = playback
            .playback_state(room_id)
            .await
            .expect("reads")
            .expect("something is playing");
        assert_eq!(state.track_duration_ms, items[0].track.duration_ms);

        let skipped = playback.skip_track(room_id).await.expect("skip runs");

        assert!(skipped.success);
        assert_eq!(skipped.item_id, Some(items[1].id));
        assert_eq!(status_of(&playlist, room_id, items[0].id).await, ItemStatus::Skipped);
        assert_eq!(status_of(&playlist, room_id, items[1].id).await, ItemStatus::Playing);
        assert_eq!(status_of(&playlist, room_id, items[2].id).await, ItemStatus::Queued);
    }

    #[tokio::test]
    async fn test_skip_with_nothing_playing_fails() {
        let (_, playback) = engines(MemoryStore::new());
        let room_id = RoomId::new();

        let result = playback.skip_track(room_id).await.expect("skip runs");

        assert!(!result.success);
        assert_eq!(result.message, NOTHING_PLAYING);
        assert_eq!(playback.elapsed_ms(room_id).await.expect("reads"), None);
    }

    #[tokio::test]
    async fn test_skipping_last_track_stops_playback() {
        let (playlist, playback) = engines(MemoryStore::new());
        let room_id = RoomId::new();
        let items = queue(&playlist, room_id, &["only"]).await;

        playback
            .start_next_track(room_id)
            .await
            .expect("start runs");

        let result = playback.skip_track(room_id).await.expect("skip runs");

        assert!(result.success);
        assert_eq!(result.item_id, None);
        assert_eq!(status_of(&playlist, room_id, items[0].id).await, ItemStatus::Skipped);
        assert!(!playback.is_playing(room_id).await.expect("reads"));
        assert_eq!(playback.playback_state(room_id).await.expect("reads"), None);
    }

    #[tokio::test]
    async fn test_complete_marks_played() {
        let (playlist, playback) = engines(MemoryStore::new());
        let room_id = RoomId::new();
        let items = queue(&playlist, room_id, &["one", "two"]).await;

        playback
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        let result = playback.complete_track(room_id).await.expect("complete runs");

        assert!(result.success);
        assert_eq!(status_of(&playlist, room_id, items[0].id).await, ItemStatus::Played);
        assert_eq!(status_of(&playlist, room_id, items[1].id).await, ItemStatus::Playing);
    }

    #[tokio::test]
    async fn test_starting_over_a_playing_track_finishes_it() {
        let (playlist, playback) = engines(MemoryStore::new());
        let room_id = RoomId::new();
        let items = queue(&playlist, room_id, &["one", "two"]).await;

        for item in &items {
            let result = playback
                .start_track(room_id, item.id)
                .await
                .expect("start runs");

            assert!(result.success);
        }

        assert_eq!(status_of(&playlist, room_id, items[0].id).await, ItemStatus::Played);
        assert_eq!(status_of(&playlist, room_id, items[1].id).await, ItemStatus::Playing);

        let again = playback
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        assert!(!again.success);
    }

    #[tokio::test]
    async fn test_start_next_with_empty_queue_fails() {
        let (_, playback) = engines(MemoryStore::new());

        let result = playback
            .start_next_track(RoomId::new())
            .await
            .expect("start runs");

        assert!(!result.success);
    }

    #[tokio::test]
    async fn test_skip_item_only_hits_expected_track() {
        let (playlist, playback) = engines(MemoryStore::new());
        let room_id = RoomId::new();
        let items = queue(&playlist, room_id, &["one", "two"]).await;

        playback
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        let first = playback
            .skip_item(room_id, items[0].id)
            .await
            .expect("skip runs");
        let second = playback
            .skip_item(room_id, items[0].id)
            .await
            .expect("skip runs");

        assert!(first.success);
        assert!(!second.success);
        assert_eq!(status_of(&playlist, room_id, items[1].id).await, ItemStatus::Playing);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_skips_advance_once() {
        let (playlist, playback) = engines(MemoryStore::new());
        let room_id = RoomId::new();
        let items = queue(&playlist, room_id, &["one", "two", "three"]).await;

        playback
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let playback = playback.clone();
                let expected = items[0].id;

                tokio::spawn(async move { playback.skip_item(room_id, expected).await })
            })
            .collect();

        let mut successes = 0;

        for handle in handles {
            let result = handle.await.expect("task completes").expect("skip runs");

            if result.success {
                successes += 1;
            }
        }

        assert_eq!(successes, 1);
        assert_eq!(status_of(&playlist, room_id, items[1].id).await, ItemStatus::Playing);
        assert_eq!(status_of(&playlist, room_id, items[2].id).await, ItemStatus::Queued);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_workers_sharing_a_store_advance_once() {
        let store = Arc::new(MemoryStore::new());
        let room_id = RoomId::new();

        // Two engines with separate room locks, like two processes
        let (playlist, first) = engines(store.clone());
        let (_, second) = engines(store.clone());

        let items = queue(&playlist, room_id, &["one", "two", "three"]).await;

        first
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        let a = tokio::spawn({
            let first = first.clone();
            async move { first.skip_track(room_id).await }
        });
        let b = tokio::spawn({
            let second = second.clone();
            async move { second.skip_track(room_id).await }
        });

        let a = a.await.expect("task completes").expect("skip runs");
        let b = b.await.expect("task completes").expect("skip runs");

        let playing = playlist
            .list_by_status(room_id, &[ItemStatus::Playing])
            .await
            .expect("listed");

        assert!(playing.len() <= 1);
        assert_eq!(
            first.current_item_id(room_id).await.expect("reads"),
            playing.first().map(|i| i.id)
        );
        assert!(a.success || b.success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_start_loses_to_other_worker() {
        let store = Arc::new(StallingStore::new());
        let room_id = RoomId::new();

        let (playlist, first) = engines(store.clone());
        let (_, second) = engines(store.clone());

        let items = queue(&playlist, room_id, &["one", "two", "three"]).await;

        first
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        // The first worker pauses right before writing, with its reads already done
        store.stall_writes_to(items[1].id, Duration::from_millis(100));

        let a = tokio::spawn({
            let first = first.clone();
            let item_id = items[1].id;
            async move { first.start_track(room_id, item_id).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;

        let b = second
            .start_track(room_id, items[2].id)
            .await
            .expect("start runs");
        let a = a.await.expect("task completes").expect("start runs");

        assert!(!a.success);
        assert!(b.success);

        let playing = playlist
            .list_by_status(room_id, &[ItemStatus::Playing])
            .await
            .expect("listed");

        assert_eq!(playing.len(), 1);
        assert_eq!(playing[0].id, items[2].id);
        assert_eq!(
            first.current_item_id(room_id).await.expect("reads"),
            Some(items[2].id)
        );
        assert_eq!(status_of(&playlist, room_id, items[0].id).await, ItemStatus::Played);
        assert_eq!(status_of(&playlist, room_id, items[1].id).await, ItemStatus::Queued);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_stalled_skip_never_leaves_record_on_skipped_item() {
        let store = Arc::new(StallingStore::new());
        let room_id = RoomId::new();

        let (playlist, first) = engines(store.clone());
        let (_, second) = engines(store.clone());

        let items = queue(&playlist, room_id, &["one", "two", "three"]).await;

        first
            .start_track(room_id, items[0].id)
            .await
            .expect("start runs");

        store.stall_writes_to(items[0].id, Duration::from_millis(100));

        let a = tokio::spawn({
            let first = first.clone();
            async move { first.skip_track(room_id).await }
        });

        tokio::time::sleep(Duration::from_millis(20)).await;
        store.stall_writes_to("nothing", Duration::ZERO);

        let b = second.complete_track(room_id).await.expect("complete runs");
        let a = a.await.expect("task completes").expect("skip runs");

        assert!(b.success);
        assert!(!a.success);
        assert_eq!(status_of(&playlist, room_id, items[0].id).await, ItemStatus::Played);
        assert_eq!(status_of(&playlist, room_id, items[1].id).await, ItemStatus::Playing);
        assert_eq!(status_of(&playlist, room_id, items[2].id).await, ItemStatus::Queued);

        let state = first
            .playback_state(room_id)
            .await
            .expect("reads")
            .expect("something is playing");
        assert_eq!(state.current_item_id, items[1].id);
    }
}
