use std::sync::Arc;

mod config;
mod error;
mod feedback;
mod keys;
mod lifecycle;
mod playback;
mod playlist;
mod presence;
mod snapshot;
mod store;
mod util;

#[cfg(test)]
mod testing;

pub mod implementors;
pub use config::*;
pub use error::*;
pub use feedback::*;
pub use keys::*;
pub use lifecycle::*;
pub use playback::*;
pub use playlist::*;
pub use presence::*;
pub use snapshot::*;
pub use store::*;
pub use util::*;

use implementors::MemoryStore;

/// The live state of every room, as a set of engines over one runtime store.
pub struct Runtime<S> {
    context: RuntimeContext<S>,

    pub presence: PresenceEngine<S>,
    pub playlist: PlaylistEngine<S>,
    pub playback: PlaybackEngine<S>,
    pub feedback: FeedbackEngine<S>,
    pub lifecycle: RoomLifecycle<S>,
}

/// A type passed to the engines of a runtime, to reach the store, build keys, and lock rooms.
pub struct RuntimeContext<S> {
    pub config: Config,
    pub keys: Keys,
    pub store: Arc<S>,
    pub locks: RoomLocks,
}

impl<S> Runtime<S>
where
    S: RuntimeStore,
{
    pub fn new(store: S, config: Config) -> Self {
        Self::with_shared(Arc::new(store), config)
    }

    /// Creates a runtime over a store that is also used elsewhere.
    pub fn with_shared(store: Arc<S>, config: Config) -> Self {
        let context = RuntimeContext::with_shared(store, config);

        let presence = PresenceEngine::new(&context);
        let playlist = PlaylistEngine::new(&context);
        let playback = PlaybackEngine::new(&context, &playlist);
        let feedback = FeedbackEngine::new(&context);
        let lifecycle = RoomLifecycle::new(&context, &presence, &playlist, &playback, &feedback);

        Self {
            context,
            presence,
            playlist,
            playback,
            feedback,
            lifecycle,
        }
    }

    pub fn context(&self) -> &RuntimeContext<S> {
        &self.context
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }
}

impl Default for Runtime<MemoryStore> {
    fn default() -> Self {
        Self::new(MemoryStore::new(), Config::default())
    }
}

impl<S> Clone for Runtime<S> {
    fn clone(&self) -> Self {
        Self {
            context: self.context.clone(),
            presence: self.presence.clone(),
            playlist: self.playlist.clone(),
            playback: self.playback.clone(),
            feedback: self.feedback.clone(),
            lifecycle: self.lifecycle.clone(),
        }
    }
}

impl<S> RuntimeContext<S> {
    pub fn new(store: S, config: Config) -> Self {
        Self::with_shared(Arc::new(store), config)
    }

    pub fn with_shared(store: Arc<S>, config: Config) -> Self {
        Self {
            keys: Keys::new(&config.key_prefix),
            config,
            store,
            locks: RoomLocks::default(),
        }
    }
}

impl<S> Clone for RuntimeContext<S> {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            keys: self.keys.clone(),
            store: self.store.clone(),
            locks: self.locks.clone(),
        }
    }
}
