mod db;
mod error;
mod events;
mod rooms;
mod votes;

use std::sync::Arc;

use crossbeam::channel::unbounded;
use log::{debug, warn};

pub use db::*;
pub use error::*;
pub use events::*;
pub use rooms::*;
pub use votes::*;

use partywave_core::{OperationResult, RoomId, Runtime, RuntimeStore};

/// The partywave collab system, driving room flows over the runtime and the database.
pub struct Collab<S, Db> {
    context: CollabContext<S, Db>,
    event_receiver: EventReceiver,

    pub rooms: RoomManager<S, Db>,
    pub votes: VoteEngine<S, Db>,
}

/// A type passed to various components of the collab system, to access state and emit events.
pub struct CollabContext<S, Db> {
    pub runtime: Runtime<S>,
    pub database: Arc<Db>,
    pub metadata: BoxedMetadataSource,

    event_sender: EventSender,
}

impl<S, Db> Collab<S, Db>
where
    S: RuntimeStore,
    Db: Database,
{
    pub fn new<M>(runtime: Runtime<S>, database: Db, metadata: M) -> Self
    where
        M: TrackMetadataSource,
    {
        Self::with_shared(runtime, Arc::new(database), Arc::new(metadata))
    }

    /// Creates a collab system over a database that is also used elsewhere,
    /// such as one that is also its own metadata source.
    pub fn with_shared(
        runtime: Runtime<S>,
        database: Arc<Db>,
        metadata: BoxedMetadataSource,
    ) -> Self {
        let (event_sender, event_receiver) = unbounded();

        let context = CollabContext {
            runtime,
            database,
            metadata,
            event_sender,
        };

        let rooms = RoomManager::new(&context);
        let votes = VoteEngine::new(&context);

        Self {
            context,
            event_receiver,
            rooms,
            votes,
        }
    }

    pub fn runtime(&self) -> &Runtime<S> {
        &self.context.runtime
    }

    pub fn database(&self) -> &Db {
        &self.context.database
    }

    /// Blocks until the next event. Returns [None] once every sender is gone.
    pub fn wait_for_event(&self) -> Option<CollabEvent> {
        self.event_receiver.recv().ok()
    }

    /// Returns the next event if there is one.
    pub fn try_event(&self) -> Option<CollabEvent> {
        self.event_receiver.try_recv().ok()
    }
}

impl<S, Db> CollabContext<S, Db> {
    pub fn emit(&self, event: CollabEvent) {
        if let Err(err) = self.event_sender.send(event) {
            warn!("Dropped event, nobody is listening: {:?}", err.0);
        }
    }
}

impl<S, Db> CollabContext<S, Db>
where
    S: RuntimeStore,
{
    /// Emits what happened to playback after a track was skipped, completed, or started.
    pub async fn emit_advance(
        &self,
        room_id: RoomId,
        result: &OperationResult,
    ) -> CollabResult<()> {
        let Some(item_id) = result.item_id else {
            self.emit(CollabEvent::PlaybackStopped { room_id });
            return Ok(());
        };

        let item = self.runtime.playlist.get(room_id, item_id).await?;
        let state = self.runtime.playback.playback_state(room_id).await?;

        match (item, state) {
            (Some(item), Some(state)) if state.current_item_id == item_id => {
                self.emit(CollabEvent::TrackStarted {
                    room_id,
                    item,
                    state,
                });
            }
            _ => debug!(
                "Track {} in room {} stopped before it was announced",
                item_id, room_id
            ),
        }

        Ok(())
    }
}

impl<S, Db> Clone for CollabContext<S, Db> {
    fn clone(&self) -> Self {
        Self {
            runtime: self.runtime.clone(),
            database: self.database.clone(),
            metadata: self.metadata.clone(),
            event_sender: self.event_sender.clone(),
        }
    }
}
