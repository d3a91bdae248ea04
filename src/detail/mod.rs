//! Job detail view synchronization.
//!
//! [`DetailView`] holds the state of one job detail view and decides what
//! must happen next; it never performs I/O itself. It answers every input
//! with zero or one [`Effect`], which [`DetailSession`] executes against a
//! [`JobBackend`](crate::backend::JobBackend) and feeds back as further
//! inputs. All state changes happen on the session task.
//!
//! ## Architecture
//!
//! - `fetcher`: snapshot reads and response ordering
//! - `listener`: per-job filtering of the shared notification channel
//! - `cancel`: confirmation flow for stopping a job
//! - `session`: the task that owns a view and runs its effects

pub mod cancel;
pub mod fetcher;
pub mod listener;
pub mod session;

use std::sync::Arc;

use tracing::{info, warn};

use crate::core::{FetchError, JobRecord, MutationError, cancel_allowed};

pub use cancel::{CancelCoordinator, CancelPhase};
pub use fetcher::{ApplyPolicy, FetchSequencer, FetchTicket, fetch_snapshot};
pub use listener::{ReconnectPolicy, SubscriptionHealth, for_job};
pub use session::{DetailSession, SessionClosed, SessionOptions, ViewCommand};

/// I/O the caller must perform on behalf of the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Read the job and report back with [`DetailView::fetch_settled`].
    Fetch(FetchTicket),
    /// Ask the backend to stop the job and report back with
    /// [`DetailView::cancel_settled`].
    Cancel,
}

/// Everything a renderer needs, published after every state change.
#[derive(Debug, Clone, PartialEq)]
pub struct DetailModel {
    pub job_id: String,
    /// True until the first snapshot arrives. Later refreshes keep the old
    /// snapshot on screen instead.
    pub loading: bool,
    pub record: Option<Arc<JobRecord>>,
    pub cancel_phase: CancelPhase,
    pub cancel_enabled: bool,
    pub subscription: SubscriptionHealth,
    pub fetch_error: Option<String>,
    pub cancel_error: Option<String>,
}

pub struct DetailView {
    job_id: String,
    snapshot: Option<Arc<JobRecord>>,
    sequencer: FetchSequencer,
    cancel: CancelCoordinator,
    subscription: SubscriptionHealth,
    fetch_error: Option<String>,
    cancel_error: Option<String>,
}

impl DetailView {
    /// Create the view for `job_id` together with its initial fetch.
    pub fn activate(job_id: impl Into<String>, policy: ApplyPolicy) -> (Self, Effect) {
        let mut view = Self {
            job_id: job_id.into(),
            snapshot: None,
            sequencer: FetchSequencer::new(policy),
            cancel: CancelCoordinator::default(),
            subscription: SubscriptionHealth::Connecting,
            fetch_error: None,
            cancel_error: None,
        };
        let initial = view.refresh();
        (view, initial)
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub fn snapshot(&self) -> Option<&Arc<JobRecord>> {
        self.snapshot.as_ref()
    }

    pub fn loading(&self) -> bool {
        self.snapshot.is_none()
    }

    pub fn cancel_phase(&self) -> CancelPhase {
        self.cancel.phase()
    }

    /// Whether the stop action is offered for the snapshot on screen.
    pub fn cancel_enabled(&self) -> bool {
        self.snapshot
            .as_ref()
            .is_some_and(|record| cancel_allowed(record.progress))
    }

    pub fn refresh(&mut self) -> Effect {
        Effect::Fetch(self.sequencer.issue())
    }

    /// A notification for this job arrived.
    pub fn progress_changed(&mut self) -> Effect {
        self.refresh()
    }

    /// Returns true if the snapshot was replaced.
    pub fn fetch_settled(
        &mut self,
        ticket: FetchTicket,
        result: Result<JobRecord, FetchError>,
    ) -> bool {
        match result {
            Ok(record) => {
                if !self.sequencer.settle(ticket, true) {
                    return false;
                }
                self.snapshot = Some(Arc::new(record));
                self.fetch_error = None;
                true
            }
            Err(e) => {
                self.sequencer.settle(ticket, false);
                warn!(job_id = %self.job_id, ticket = ticket.value(), error = %e, "Failed to fetch job");
                self.fetch_error = Some(e.to_string());
                false
            }
        }
    }

    /// Open the confirmation modal if the snapshot allows stopping the job.
    pub fn request_cancel(&mut self) -> bool {
        let opened = self.cancel.request(self.cancel_enabled());
        if opened {
            self.cancel_error = None;
        }
        opened
    }

    pub fn dismiss_cancel(&mut self) -> bool {
        self.cancel.dismiss()
    }

    pub fn confirm_cancel(&mut self) -> Option<Effect> {
        if self.cancel.confirm() {
            info!(job_id = %self.job_id, "Stopping job");
            Some(Effect::Cancel)
        } else {
            None
        }
    }

    /// The mutation settled. Always follows up with a fetch, even on failure,
    /// since the backend may have applied the stop before failing.
    pub fn cancel_settled(&mut self, result: Result<(), MutationError>) -> Option<Effect> {
        if !self.cancel.settle() {
            return None;
        }

        match result {
            Ok(()) => info!(job_id = %self.job_id, "Stop request accepted"),
            Err(e) => {
                warn!(job_id = %self.job_id, error = %e, "Stop request failed");
                self.cancel_error = Some(e.to_string());
            }
        }

        Some(self.refresh())
    }

    pub fn set_subscription(&mut self, health: SubscriptionHealth) {
        self.subscription = health;
    }

    pub fn model(&self) -> DetailModel {
        DetailModel {
            job_id: self.job_id.clone(),
            loading: self.loading(),
            record: self.snapshot.clone(),
            cancel_phase: self.cancel.phase(),
            cancel_enabled: self.cancel_enabled(),
            subscription: self.subscription,
            fetch_error: self.fetch_error.clone(),
            cancel_error: self.cancel_error.clone(),
        }
    }
}
