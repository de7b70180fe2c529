use thiserror::Error;

use partywave_core::StoreError;

use crate::DatabaseError;

pub type CollabResult<T> = std::result::Result<T, CollabError>;

#[derive(Debug, Error)]
pub enum CollabError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Database(#[from] DatabaseError),
    #[error("User is not an active member of this room")]
    NotAMember,
    #[error("Forbidden: {0}")]
    Forbidden(&'static str),
    #[error("Playlist item not found")]
    PlaylistItemNotFound,
}
