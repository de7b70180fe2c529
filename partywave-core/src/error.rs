use thiserror::Error;

pub type StoreResult<T> = std::result::Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The runtime store could not be reached or the call failed.
    /// State read before this happened cannot be trusted, callers decide whether to retry.
    #[error("Runtime store unavailable: {0}")]
    Unavailable(Box<dyn std::error::Error + Send + Sync>),
    /// A stored value could not be understood
    #[error("Corrupt value {value:?} for field {field} of {key}")]
    Corrupt {
        key: String,
        field: &'static str,
        value: String,
    },
}

/// Helper trait to reduce boilerplate
pub trait IntoStoreError {
    fn unavailable(self) -> StoreError;
}

impl<E> IntoStoreError for E
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn unavailable(self) -> StoreError {
        StoreError::Unavailable(Box::new(self))
    }
}
