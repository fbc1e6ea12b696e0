//! Content store port: Trait for content-addressed blob storage.

use std::future::Future;

use crate::domain::ContentId;

/// Errors from the content store.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Content store unavailable: {0}")]
    Unavailable(String),

    #[error("Content not found: {0}")]
    NotFound(String),

    #[error("Content integrity check failed for {0}")]
    Integrity(String),

    #[error("Content store error: {0}")]
    Backend(String),
}

/// Trait for content-addressed storage of encrypted blobs.
///
/// No retries happen at this layer; the caller decides whether to repeat.
pub trait ContentStore: Send + Sync {
    /// Store bytes and return their content identifier.
    ///
    /// # Errors
    /// Returns `StoreError::Unavailable` on transport failure.
    fn put(&self, bytes: Vec<u8>) -> impl Future<Output = Result<ContentId, StoreError>> + Send;

    /// Fetch bytes by content identifier.
    ///
    /// # Errors
    /// Returns `StoreError::NotFound` if the identifier is unknown,
    /// `StoreError::Unavailable` on transport failure.
    fn get(&self, id: &ContentId) -> impl Future<Output = Result<Vec<u8>, StoreError>> + Send;
}
