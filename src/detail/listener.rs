//! Progress notification listener.
//!
//! The backend channel is shared by every job. [`for_job`] narrows it to one
//! identifier before anything reaches view state; [`run_listener`] keeps that
//! narrowed stream alive across faults according to a [`ReconnectPolicy`].

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_stream::{Stream, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::backend::{JobBackend, ProgressStream};
use crate::core::SubscriptionError;

/// State of the notification channel as seen by the view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubscriptionHealth {
    #[default]
    Connecting,
    Live,
    Reconnecting {
        attempt: u32,
    },
    /// Gave up reconnecting. Only manual refresh updates the view.
    Degraded,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerEvent {
    /// The viewed job changed, or may have changed while events were missed.
    Changed,
    Health(SubscriptionHealth),
}

/// Exponential backoff for re-subscribing after a stream fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// `None` retries forever.
    pub max_attempts: Option<u32>,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            max_attempts: Some(10),
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the given attempt (1-based).
    pub fn delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.initial_delay
            .saturating_mul(1u32 << exp)
            .min(self.max_delay)
    }

    fn exhausted(&self, attempt: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempt > max)
    }
}

/// Narrow the shared channel to notifications for `job_id`.
///
/// Matching events become `Ok(())`; events for other jobs are dropped here and
/// never seen downstream. Stream errors pass through.
pub fn for_job(
    stream: ProgressStream,
    job_id: String,
) -> impl Stream<Item = Result<(), SubscriptionError>> + Send + Unpin {
    stream.filter_map(move |item| match item {
        Ok(event) if event.id == job_id => Some(Ok(())),
        Ok(event) => {
            trace!(job_id = %job_id, other = %event.id, "Ignoring notification");
            None
        }
        Err(e) => Some(Err(e)),
    })
}

/// Keep a filtered subscription open until `shutdown` fires.
///
/// After a successful re-subscription one `Changed` is emitted, since events
/// may have been missed while disconnected. The stream is dropped, and thereby
/// unsubscribed, as soon as `shutdown` is cancelled.
pub async fn run_listener(
    backend: Arc<dyn JobBackend>,
    job_id: String,
    policy: ReconnectPolicy,
    tx: mpsc::Sender<ListenerEvent>,
    shutdown: CancellationToken,
) {
    let mut attempt: u32 = 0;
    let mut resubscribing = false;

    loop {
        let subscribed = tokio::select! {
            _ = shutdown.cancelled() => return,
            result = backend.subscribe_progress() => result,
        };

        match subscribed {
            Ok(stream) => {
                attempt = 0;
                debug!(job_id = %job_id, "Progress subscription live");
                if tx
                    .send(ListenerEvent::Health(SubscriptionHealth::Live))
                    .await
                    .is_err()
                {
                    return;
                }

                if resubscribing {
                    info!(job_id = %job_id, "Resubscribed, refreshing snapshot");
                    if tx.send(ListenerEvent::Changed).await.is_err() {
                        return;
                    }
                }

                let mut events = for_job(stream, job_id.clone());
                loop {
                    let next = tokio::select! {
                        _ = shutdown.cancelled() => return,
                        next = events.next() => next,
                    };

                    match next {
                        Some(Ok(())) => {
                            debug!(job_id = %job_id, "Progress changed");
                            if tx.send(ListenerEvent::Changed).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(SubscriptionError::Lagged(missed))) => {
                            warn!(job_id = %job_id, missed, "Notifications lagged, refreshing");
                            if tx.send(ListenerEvent::Changed).await.is_err() {
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(job_id = %job_id, error = %e, "Progress subscription faulted");
                            break;
                        }
                        None => {
                            warn!(job_id = %job_id, "Progress subscription ended");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                warn!(job_id = %job_id, attempt, error = %e, "Failed to subscribe to progress");
            }
        }

        resubscribing = true;
        attempt += 1;

        if policy.exhausted(attempt) {
            warn!(job_id = %job_id, "Giving up on progress notifications");
            let _ = tx
                .send(ListenerEvent::Health(SubscriptionHealth::Degraded))
                .await;
            return;
        }

        if tx
            .send(ListenerEvent::Health(SubscriptionHealth::Reconnecting {
                attempt,
            }))
            .await
            .is_err()
        {
            return;
        }

        tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tokio::time::sleep(policy.delay(attempt)) => {}
        }
    }
}
