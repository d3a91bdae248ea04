//! In-memory backend for tests and demos.
//!
//! [`SimulatedBackend`] implements [`JobBackend`]; the paired [`Simulator`]
//! drives it from the outside (inject jobs, move them between phases, emit
//! notifications, inject failures).

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{RwLock, broadcast};
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::{JobBackend, ProgressEvent, ProgressStream};
use crate::core::{FetchError, MutationError, Parameter, Progress, RawJob, SubscriptionError};

const CHANNEL_CAPACITY: usize = 64;

/// Ticks a job spends running before the demo pipeline marks it done.
const RUNNING_TICKS: u32 = 20;

struct Inner {
    jobs: RwLock<HashMap<String, RawJob>>,
    events: RwLock<broadcast::Sender<ProgressEvent>>,
    get_calls: AtomicUsize,
    cancel_calls: AtomicUsize,
    cancel_requests: RwLock<Vec<String>>,
    fail_fetch: AtomicBool,
    fail_cancel: AtomicBool,
    fail_subscribe: AtomicBool,
}

#[derive(Clone)]
pub struct SimulatedBackend {
    inner: Arc<Inner>,
}

/// Controller for a [`SimulatedBackend`].
#[derive(Clone)]
pub struct Simulator {
    inner: Arc<Inner>,
}

impl SimulatedBackend {
    pub fn new() -> (Self, Simulator) {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        let inner = Arc::new(Inner {
            jobs: RwLock::new(HashMap::new()),
            events: RwLock::new(tx),
            get_calls: AtomicUsize::new(0),
            cancel_calls: AtomicUsize::new(0),
            cancel_requests: RwLock::new(Vec::new()),
            fail_fetch: AtomicBool::new(false),
            fail_cancel: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
        });

        (
            Self {
                inner: inner.clone(),
            },
            Simulator { inner },
        )
    }
}

#[async_trait]
impl JobBackend for SimulatedBackend {
    async fn get_job(&self, id: &str) -> Result<RawJob, FetchError> {
        self.inner.get_calls.fetch_add(1, Ordering::SeqCst);

        if self.inner.fail_fetch.load(Ordering::SeqCst) {
            return Err(FetchError::Transport("simulated outage".to_string()));
        }

        let jobs = self.inner.jobs.read().await;
        jobs.get(id)
            .cloned()
            .ok_or_else(|| FetchError::NotFound(id.to_string()))
    }

    async fn cancel_job(&self, id: &str) -> Result<(), MutationError> {
        self.inner.cancel_calls.fetch_add(1, Ordering::SeqCst);
        self.inner.cancel_requests.write().await.push(id.to_string());

        {
            let mut jobs = self.inner.jobs.write().await;
            let job = jobs
                .get_mut(id)
                .ok_or_else(|| MutationError::Rejected(format!("no such job: {}", id)))?;

            if matches!(
                job.progress,
                Some(Progress::Stopping | Progress::Stopped | Progress::Done)
            ) {
                return Err(MutationError::Rejected("job is not running".to_string()));
            }
            job.progress = Some(Progress::Stopping);
        }

        // The stop is already recorded above; the caller just never hears back.
        if self.inner.fail_cancel.load(Ordering::SeqCst) {
            return Err(MutationError::Transport(
                "connection reset after request".to_string(),
            ));
        }

        Ok(())
    }

    async fn subscribe_progress(&self) -> Result<ProgressStream, SubscriptionError> {
        if self.inner.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SubscriptionError::Connect("simulated outage".to_string()));
        }

        let rx = self.inner.events.read().await.subscribe();
        let stream = BroadcastStream::new(rx).map(|item| {
            item.map_err(|BroadcastStreamRecvError::Lagged(n)| SubscriptionError::Lagged(n))
        });

        Ok(Box::pin(stream))
    }
}

impl Simulator {
    /// Insert or replace a job without notifying.
    pub async fn insert(&self, job: RawJob) {
        self.inner.jobs.write().await.insert(job.id.clone(), job);
    }

    /// Create a demo replication job in the `CREATED` phase.
    pub async fn seed(&self, id: &str) {
        let job = RawJob {
            id: id.to_string(),
            progress: Some(Progress::Created),
            created_at: Utc::now(),
            description: Some(format!("Replicate images for {}", id)),
            parameters: Some(vec![
                Parameter::new("sourceType", "Amazon_ECR"),
                Parameter::new("srcRegion", "eu-west-1"),
                Parameter::new("srcAccountId", ""),
                Parameter::new("srcCredential", ""),
                Parameter::new("srcList", "ALL"),
                Parameter::new("srcImageList", ""),
                Parameter::new("destRegion", "us-east-1"),
                Parameter::new("destAccountId", "123456789012"),
                Parameter::new("destCredential", "drh-dest-credentials"),
                Parameter::new("destPrefix", ""),
                Parameter::new("alarmEmail", "ops@example.com"),
            ]),
        };
        self.insert(job).await;
    }

    /// Move a job to a new phase and notify subscribers.
    pub async fn set_progress(&self, id: &str, progress: Option<Progress>) {
        if let Some(job) = self.inner.jobs.write().await.get_mut(id) {
            job.progress = progress;
        }
        self.notify(id).await;
    }

    /// Emit a progress notification without changing any job.
    pub async fn notify(&self, id: &str) {
        let _ = self.inner.events.read().await.send(ProgressEvent::new(id));
    }

    /// End every open notification stream. New subscriptions still work.
    pub async fn drop_subscribers(&self) {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        *self.inner.events.write().await = tx;
    }

    /// Number of notification streams currently open.
    pub async fn subscriber_count(&self) -> usize {
        self.inner.events.read().await.receiver_count()
    }

    pub async fn progress(&self, id: &str) -> Option<Progress> {
        self.inner.jobs.read().await.get(id).and_then(|j| j.progress)
    }

    pub fn fail_fetches(&self, fail: bool) {
        self.inner.fail_fetch.store(fail, Ordering::SeqCst);
    }

    pub fn fail_cancels(&self, fail: bool) {
        self.inner.fail_cancel.store(fail, Ordering::SeqCst);
    }

    pub fn fail_subscriptions(&self, fail: bool) {
        self.inner.fail_subscribe.store(fail, Ordering::SeqCst);
    }

    pub fn get_calls(&self) -> usize {
        self.inner.get_calls.load(Ordering::SeqCst)
    }

    pub fn cancel_calls(&self) -> usize {
        self.inner.cancel_calls.load(Ordering::SeqCst)
    }

    pub async fn cancel_requests(&self) -> Vec<String> {
        self.inner.cancel_requests.read().await.clone()
    }

    /// Walk every job through its lifecycle until `shutdown` fires.
    ///
    /// `CREATED -> STARTING -> RUNNING -> DONE`, and `STOPPING -> STOPPED` for
    /// jobs that were asked to stop. Running jobs emit a notification per tick.
    pub async fn run_pipeline(&self, tick: Duration, shutdown: CancellationToken) {
        let mut running_ticks: HashMap<String, u32> = HashMap::new();
        let mut interval = tokio::time::interval(tick);
        info!(tick_ms = tick.as_millis() as u64, "Simulated pipeline started");

        loop {
            tokio::select! {
                _ = interval.tick() => {}
                _ = shutdown.cancelled() => break,
            }

            let mut changed = Vec::new();
            {
                let mut jobs = self.inner.jobs.write().await;
                for job in jobs.values_mut() {
                    let next = match job.progress {
                        None => Some(Progress::Created),
                        Some(Progress::Created) => Some(Progress::Starting),
                        Some(Progress::Starting) => Some(Progress::Running),
                        Some(Progress::Running) => {
                            let ticks = running_ticks.entry(job.id.clone()).or_insert(0);
                            *ticks += 1;
                            if *ticks >= RUNNING_TICKS {
                                Some(Progress::Done)
                            } else {
                                Some(Progress::Running)
                            }
                        }
                        Some(Progress::Stopping) => Some(Progress::Stopped),
                        Some(Progress::Stopped | Progress::Error | Progress::Done) => continue,
                    };

                    if next != job.progress {
                        debug!(job_id = %job.id, ?next, "Job advanced");
                    }
                    job.progress = next;
                    changed.push(job.id.clone());
                }
            }

            for id in changed {
                self.notify(&id).await;
            }
        }

        info!("Simulated pipeline stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::timeout;

    #[tokio::test]
    async fn get_job_counts_calls_and_reports_missing() {
        let (backend, sim) = SimulatedBackend::new();
        sim.seed("job-1").await;

        assert!(backend.get_job("job-1").await.is_ok());
        assert!(matches!(
            backend.get_job("nope").await,
            Err(FetchError::NotFound(_))
        ));
        assert_eq!(sim.get_calls(), 2);
    }

    #[tokio::test]
    async fn cancel_marks_stopping_even_when_reply_fails() {
        let (backend, sim) = SimulatedBackend::new();
        sim.seed("job-1").await;
        sim.fail_cancels(true);

        let result = backend.cancel_job("job-1").await;
        assert!(matches!(result, Err(MutationError::Transport(_))));
        assert_eq!(sim.progress("job-1").await, Some(Progress::Stopping));
    }

    #[tokio::test]
    async fn cancel_rejected_for_finished_job() {
        let (backend, sim) = SimulatedBackend::new();
        sim.seed("job-1").await;
        sim.set_progress("job-1", Some(Progress::Done)).await;

        assert!(matches!(
            backend.cancel_job("job-1").await,
            Err(MutationError::Rejected(_))
        ));
        assert_eq!(sim.cancel_requests().await, vec!["job-1".to_string()]);
    }

    #[tokio::test]
    async fn subscription_receives_all_jobs() {
        let (backend, sim) = SimulatedBackend::new();
        let mut stream = backend.subscribe_progress().await.unwrap();

        sim.notify("a").await;
        sim.notify("b").await;

        let first = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended")
            .unwrap();
        let second = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout")
            .expect("stream ended")
            .unwrap();

        assert_eq!(first, ProgressEvent::new("a"));
        assert_eq!(second, ProgressEvent::new("b"));
    }

    #[tokio::test]
    async fn drop_subscribers_ends_open_streams() {
        let (backend, sim) = SimulatedBackend::new();
        let mut stream = backend.subscribe_progress().await.unwrap();

        sim.drop_subscribers().await;

        let next = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("timeout");
        assert!(next.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn pipeline_advances_jobs() {
        let (_backend, sim) = SimulatedBackend::new();
        sim.seed("job-1").await;
        let token = CancellationToken::new();

        let handle = tokio::spawn({
            let sim = sim.clone();
            let token = token.clone();
            async move { sim.run_pipeline(Duration::from_millis(100), token).await }
        });

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(sim.progress("job-1").await, Some(Progress::Running));

        token.cancel();
        handle.await.unwrap();
    }
}
