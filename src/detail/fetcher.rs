//! Snapshot fetching and response ordering.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::backend::JobBackend;
use crate::core::{FetchError, JobRecord};

/// Read one job and flatten it into a snapshot.
///
/// A response for a different identifier is rejected, so a misrouted reply can
/// never be displayed under this job's heading.
pub async fn fetch_snapshot(
    backend: &dyn JobBackend,
    job_id: &str,
    timeout: Option<Duration>,
) -> Result<JobRecord, FetchError> {
    let raw = match timeout {
        Some(limit) => tokio::time::timeout(limit, backend.get_job(job_id))
            .await
            .map_err(|_| FetchError::Timeout(limit))??,
        None => backend.get_job(job_id).await?,
    };

    if raw.id != job_id {
        return Err(FetchError::Decode(format!(
            "requested {} but backend returned {}",
            job_id, raw.id
        )));
    }

    Ok(JobRecord::from_raw(raw))
}

/// Identifies one issued fetch. Tickets are strictly increasing per view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FetchTicket(u64);

impl FetchTicket {
    pub fn value(&self) -> u64 {
        self.0
    }
}

/// How concurrent fetch responses are reconciled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplyPolicy {
    /// Apply every response in the order it completes.
    #[default]
    LatestCompleted,
    /// Apply a response only if it was issued after the one on screen.
    LatestIssued,
}

/// Hands out tickets and decides which responses may replace the snapshot.
#[derive(Debug)]
pub struct FetchSequencer {
    policy: ApplyPolicy,
    next: u64,
    applied: Option<FetchTicket>,
    in_flight: usize,
}

impl FetchSequencer {
    pub fn new(policy: ApplyPolicy) -> Self {
        Self {
            policy,
            next: 0,
            applied: None,
            in_flight: 0,
        }
    }

    pub fn issue(&mut self) -> FetchTicket {
        self.next += 1;
        self.in_flight += 1;
        FetchTicket(self.next)
    }

    /// Record that a fetch settled. Returns whether a successful response
    /// carrying this ticket may be applied.
    pub fn settle(&mut self, ticket: FetchTicket, succeeded: bool) -> bool {
        self.in_flight = self.in_flight.saturating_sub(1);

        if !succeeded {
            return false;
        }

        let accept = match self.policy {
            ApplyPolicy::LatestCompleted => true,
            ApplyPolicy::LatestIssued => self.applied.is_none_or(|applied| ticket > applied),
        };

        if accept {
            self.applied = Some(ticket);
        } else {
            debug!(
                ticket = ticket.value(),
                applied = self.applied.map(|t| t.value()),
                "Discarding stale snapshot"
            );
        }

        accept
    }

    /// Ticket of the snapshot currently on screen.
    pub fn applied(&self) -> Option<FetchTicket> {
        self.applied
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }
}
