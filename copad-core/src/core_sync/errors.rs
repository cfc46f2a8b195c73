/*
    errors.rs - Error types for the sync engine

    Taxonomy per failure surface:
    - NotFound: row absent, recovered by creation, not user-facing
    - LoadFailure: initial fetch failed, blocking until recovered
    - WriteFailure: persist failed, version bump abandoned, editing continues
    - RefreshFailure: explicit refresh failed, transient
    - SubscriptionError: notification channel reported an error payload
*/

use thiserror::Error;

/// Errors that can occur in the sync engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// Document row does not exist
    #[error("Document not found: {0}")]
    NotFound(String),

    /// Initial fetch failed
    #[error("Load failure: {0}")]
    LoadFailure(String),

    /// Persist call failed
    #[error("Write failure: {0}")]
    WriteFailure(String),

    /// Explicit refresh failed
    #[error("Refresh failure: {0}")]
    RefreshFailure(String),

    /// Notification channel reported an error
    #[error("Subscription error: {0}")]
    SubscriptionError(String),

    /// Local backup store failed
    #[error("Backup error: {0}")]
    Backup(String),

    /// Operation not legal in the current engine state
    #[error("Invalid state: {0}")]
    InvalidState(String),
}

/// Result type for sync operations
pub type SyncResult<T> = Result<T, SyncError>;
