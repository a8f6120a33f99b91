//! Error types for the sync engine.

use thiserror::Error;

use contact_sync_core::OperationKind;

use crate::api::ApiError;

/// Errors that can occur while planning or executing operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Store operation failed.
    #[error("store error: {0}")]
    Store(#[from] contact_sync_store::StoreError),

    /// Encoding or decoding of a persisted record failed.
    #[error("core error: {0}")]
    Core(#[from] contact_sync_core::CoreError),

    /// The remote call failed before a response was received.
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    /// The operation needs a resolved identity and none is known.
    #[error("unable to process {0} without a previous contact identity")]
    MissingIdentity(OperationKind),
}

impl SyncError {
    /// Whether retrying later could succeed.
    ///
    /// Transport failures and storage hiccups are transient. A missing
    /// identity is not: the same operation will fail the same way.
    pub fn is_retryable(&self) -> bool {
        match self {
            SyncError::Api(_) | SyncError::Store(_) => true,
            SyncError::Core(_) | SyncError::MissingIdentity(_) => false,
        }
    }
}

/// Result type for sync operations.
pub type Result<T> = std::result::Result<T, SyncError>;
