//! Error types for the contact API.

use contact_sync_engine::SyncError;
use contact_sync_store::StoreError;
use thiserror::Error;

/// Errors that can occur while setting up or migrating a contact.
///
/// Public mutation calls never fail; they log and drop instead.
#[derive(Debug, Error)]
pub enum ContactError {
    /// Storage error.
    #[error("storage error: {0}")]
    Store(#[from] StoreError),

    /// Sync error.
    #[error("sync error: {0}")]
    Sync(#[from] SyncError),

    /// Invalid input to a public call.
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for contact operations.
pub type Result<T> = std::result::Result<T, ContactError>;
