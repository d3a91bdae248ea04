use std::time::Duration;

use thiserror::Error;

/// A snapshot read failed. The previous snapshot stays on screen.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("job not found: {0}")]
    NotFound(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("malformed job record: {0}")]
    Decode(String),
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),
}

/// The cancellation request failed. It may still have been partially applied.
#[derive(Debug, Clone, Error)]
pub enum MutationError {
    #[error("cancellation rejected: {0}")]
    Rejected(String),
    #[error("backend unreachable: {0}")]
    Transport(String),
    #[error("cancellation timed out after {0:?}")]
    Timeout(Duration),
}

/// The progress notification stream faulted.
#[derive(Debug, Clone, Error)]
pub enum SubscriptionError {
    #[error("failed to subscribe: {0}")]
    Connect(String),
    #[error("missed {0} notifications")]
    Lagged(u64),
    #[error("notification stream closed")]
    Closed,
    #[error("malformed notification: {0}")]
    Decode(String),
}
