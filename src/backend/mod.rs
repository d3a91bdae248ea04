//! Boundary to the job backend.
//!
//! The detail view only talks to a [`JobBackend`]. Two implementations ship
//! with the crate: [`RpcBackend`](crate::rpc::RpcBackend) for a remote daemon
//! and [`SimulatedBackend`] for tests and demos.

pub mod simulated;

use std::pin::Pin;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_stream::Stream;

use crate::core::{FetchError, MutationError, RawJob, SubscriptionError};

pub use simulated::{SimulatedBackend, Simulator};

/// Notification that some job's progress changed. Carries no state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub id: String,
}

impl ProgressEvent {
    pub fn new(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }
}

/// Shared, multiplexed stream of progress notifications for all jobs.
pub type ProgressStream =
    Pin<Box<dyn Stream<Item = Result<ProgressEvent, SubscriptionError>> + Send>>;

#[async_trait]
pub trait JobBackend: Send + Sync {
    /// Read the full state of a job. Must be free of side effects.
    async fn get_job(&self, id: &str) -> Result<RawJob, FetchError>;

    /// Ask the backend to stop a job. The backend decides if and when it stops.
    async fn cancel_job(&self, id: &str) -> Result<(), MutationError>;

    /// Open the shared notification channel.
    async fn subscribe_progress(&self) -> Result<ProgressStream, SubscriptionError>;
}
