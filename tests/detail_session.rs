use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use jobwatch::backend::{JobBackend, ProgressEvent, ProgressStream, SimulatedBackend, Simulator};
use jobwatch::core::{FetchError, MutationError, Progress, RawJob, SubscriptionError};
use jobwatch::detail::{
    ApplyPolicy, CancelPhase, DetailModel, DetailSession, ReconnectPolicy, SessionOptions,
    SubscriptionHealth, ViewCommand,
};
use tokio::sync::watch;
use tokio::time::{sleep, timeout};

/// Wait until the published model satisfies `f`.
async fn wait_for(
    models: &mut watch::Receiver<DetailModel>,
    f: impl FnMut(&DetailModel) -> bool,
) -> DetailModel {
    timeout(Duration::from_secs(2), models.wait_for(f))
        .await
        .expect("timeout waiting for model")
        .expect("session closed")
        .clone()
}

/// Poll a condition that is not reflected in the model.
async fn eventually(f: impl Fn() -> bool) {
    timeout(Duration::from_secs(2), async {
        while !f() {
            sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition never held");
}

fn progress(model: &DetailModel) -> Option<Progress> {
    model.record.as_ref().and_then(|r| r.progress)
}

async fn running_job(id: &str) -> (SimulatedBackend, Simulator) {
    let (backend, sim) = SimulatedBackend::new();
    sim.seed(id).await;
    sim.set_progress(id, Some(Progress::Running)).await;
    (backend, sim)
}

async fn open_loaded(
    backend: SimulatedBackend,
    id: &str,
    options: SessionOptions,
) -> (DetailSession, watch::Receiver<DetailModel>) {
    let session = DetailSession::open(Arc::new(backend), id, options);
    let mut models = session.watch();
    wait_for(&mut models, |m| {
        !m.loading && m.subscription == SubscriptionHealth::Live
    })
    .await;
    (session, models)
}

#[tokio::test]
async fn test_job_42_scenario() {
    let (backend, sim) = running_job("job-42").await;
    let (session, mut models) = open_loaded(backend, "job-42", SessionOptions::default()).await;

    let model = session.current();
    assert!(model.cancel_enabled);
    assert_eq!(progress(&model), Some(Progress::Running));
    assert_eq!(sim.get_calls(), 1);

    // Matching notification: exactly one re-fetch.
    sim.notify("job-42").await;
    eventually(|| sim.get_calls() == 2).await;

    // Foreign notification, then a matching one as a barrier.
    sim.notify("job-99").await;
    sim.notify("job-42").await;
    eventually(|| sim.get_calls() == 3).await;
    sleep(Duration::from_millis(50)).await;
    assert_eq!(sim.get_calls(), 3);

    // Confirmed cancellation: one mutation, then one re-fetch.
    session.send(ViewCommand::RequestCancel).await.unwrap();
    wait_for(&mut models, |m| m.cancel_phase == CancelPhase::Confirming).await;
    session.send(ViewCommand::ConfirmCancel).await.unwrap();

    let model = wait_for(&mut models, |m| {
        m.cancel_phase == CancelPhase::Idle && progress(m) == Some(Progress::Stopping)
    })
    .await;

    assert_eq!(sim.cancel_requests().await, vec!["job-42".to_string()]);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(sim.get_calls(), 4);
    assert!(!model.cancel_enabled);
    assert!(model.cancel_error.is_none());

    session.close().await;
}

#[tokio::test]
async fn test_dismiss_issues_no_mutation() {
    let (backend, sim) = running_job("job-42").await;
    let (session, mut models) = open_loaded(backend, "job-42", SessionOptions::default()).await;

    session.send(ViewCommand::RequestCancel).await.unwrap();
    wait_for(&mut models, |m| m.cancel_phase == CancelPhase::Confirming).await;
    session.send(ViewCommand::DismissCancel).await.unwrap();
    wait_for(&mut models, |m| m.cancel_phase == CancelPhase::Idle).await;

    // Confirm after dismiss must not reopen the flow.
    session.send(ViewCommand::ConfirmCancel).await.unwrap();
    session.send(ViewCommand::Refresh).await.unwrap();
    eventually(|| sim.get_calls() == 2).await;

    assert_eq!(sim.cancel_calls(), 0);
    session.close().await;
}

#[tokio::test]
async fn test_failed_cancel_still_refetches() {
    let (backend, sim) = running_job("job-42").await;
    sim.fail_cancels(true);
    let (session, mut models) = open_loaded(backend, "job-42", SessionOptions::default()).await;

    session.send(ViewCommand::RequestCancel).await.unwrap();
    session.send(ViewCommand::ConfirmCancel).await.unwrap();

    // The backend applied the stop before failing; the re-fetch reveals it.
    let model = wait_for(&mut models, |m| {
        m.cancel_phase == CancelPhase::Idle && progress(m) == Some(Progress::Stopping)
    })
    .await;

    assert!(model.cancel_error.is_some());
    assert_eq!(sim.cancel_calls(), 1);
    sleep(Duration::from_millis(50)).await;
    assert_eq!(sim.get_calls(), 2);

    session.close().await;
}

#[tokio::test]
async fn test_cancel_not_offered_for_finished_job() {
    let (backend, sim) = running_job("job-42").await;
    sim.set_progress("job-42", Some(Progress::Done)).await;
    let (session, _models) = open_loaded(backend, "job-42", SessionOptions::default()).await;

    assert!(!session.current().cancel_enabled);

    session.send(ViewCommand::RequestCancel).await.unwrap();
    session.send(ViewCommand::Refresh).await.unwrap();
    eventually(|| sim.get_calls() == 2).await;

    assert_eq!(session.current().cancel_phase, CancelPhase::Idle);
    session.close().await;
}

#[tokio::test]
async fn test_fetch_failure_keeps_snapshot() {
    let (backend, sim) = running_job("job-42").await;
    let (session, mut models) = open_loaded(backend, "job-42", SessionOptions::default()).await;

    sim.fail_fetches(true);
    session.send(ViewCommand::Refresh).await.unwrap();

    let model = wait_for(&mut models, |m| m.fetch_error.is_some()).await;
    assert!(!model.loading);
    assert_eq!(progress(&model), Some(Progress::Running));

    sim.fail_fetches(false);
    session.send(ViewCommand::Refresh).await.unwrap();
    wait_for(&mut models, |m| m.fetch_error.is_none()).await;

    session.close().await;
}

#[tokio::test]
async fn test_no_fetch_after_close() {
    let (backend, sim) = running_job("job-42").await;
    let (session, _models) = open_loaded(backend, "job-42", SessionOptions::default()).await;

    session.close().await;
    sim.notify("job-42").await;
    sleep(Duration::from_millis(50)).await;

    assert_eq!(sim.get_calls(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_close_releases_subscription_before_returning() {
    let (backend, sim) = running_job("job-42").await;
    let (session, _models) = open_loaded(backend, "job-42", SessionOptions::default()).await;
    assert_eq!(sim.subscriber_count().await, 1);

    session.close().await;

    assert_eq!(sim.subscriber_count().await, 0);
}

#[tokio::test]
async fn test_resubscribe_triggers_catch_up_fetch() {
    let (backend, sim) = running_job("job-42").await;
    let options = SessionOptions {
        reconnect: ReconnectPolicy {
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(10),
            max_attempts: Some(5),
        },
        ..SessionOptions::default()
    };
    let (session, mut models) = open_loaded(backend, "job-42", options).await;

    sim.drop_subscribers().await;

    eventually(|| sim.get_calls() == 2).await;
    wait_for(&mut models, |m| m.subscription == SubscriptionHealth::Live).await;

    // The new subscription delivers again.
    sim.notify("job-42").await;
    eventually(|| sim.get_calls() == 3).await;

    session.close().await;
}

#[tokio::test]
async fn test_degraded_subscription_still_allows_refresh() {
    let (backend, sim) = running_job("job-42").await;
    sim.fail_subscriptions(true);
    let options = SessionOptions {
        reconnect: ReconnectPolicy {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            max_attempts: Some(2),
        },
        ..SessionOptions::default()
    };

    let session = DetailSession::open(Arc::new(backend), "job-42", options);
    let mut models = session.watch();
    wait_for(&mut models, |m| {
        !m.loading && m.subscription == SubscriptionHealth::Degraded
    })
    .await;

    let calls = sim.get_calls();
    session.send(ViewCommand::Refresh).await.unwrap();
    eventually(|| sim.get_calls() == calls + 1).await;

    session.close().await;
}

/// Backend whose calls never complete.
struct Stalled;

#[async_trait]
impl JobBackend for Stalled {
    async fn get_job(&self, _id: &str) -> Result<RawJob, FetchError> {
        std::future::pending().await
    }

    async fn cancel_job(&self, _id: &str) -> Result<(), MutationError> {
        std::future::pending().await
    }

    async fn subscribe_progress(&self) -> Result<ProgressStream, SubscriptionError> {
        Ok(Box::pin(tokio_stream::pending::<
            Result<ProgressEvent, SubscriptionError>,
        >()))
    }
}

#[tokio::test]
async fn test_fetch_timeout_surfaces_error_and_stays_loading() {
    let options = SessionOptions {
        fetch_timeout: Some(Duration::from_millis(20)),
        ..SessionOptions::default()
    };
    let session = DetailSession::open(Arc::new(Stalled), "job-42", options);
    let mut models = session.watch();

    let model = wait_for(&mut models, |m| m.fetch_error.is_some()).await;

    assert!(model.loading);
    assert!(model.record.is_none());
    assert!(!model.cancel_enabled);

    session.close().await;
}

/// Backend whose n-th `get_job` call sleeps for `delays[n]` and reports `call-n`
/// as its description.
struct Delayed {
    delays: Vec<Duration>,
    calls: AtomicUsize,
}

impl Delayed {
    fn new(delays: Vec<Duration>) -> Self {
        Self {
            delays,
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl JobBackend for Delayed {
    async fn get_job(&self, id: &str) -> Result<RawJob, FetchError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        sleep(self.delays.get(n).copied().unwrap_or_default()).await;
        Ok(RawJob {
            id: id.to_string(),
            progress: Some(Progress::Running),
            created_at: "2021-03-04T10:20:00Z".parse().unwrap(),
            description: Some(format!("call-{}", n)),
            parameters: None,
        })
    }

    async fn cancel_job(&self, _id: &str) -> Result<(), MutationError> {
        Ok(())
    }

    async fn subscribe_progress(&self) -> Result<ProgressStream, SubscriptionError> {
        Ok(Box::pin(tokio_stream::pending::<
            Result<ProgressEvent, SubscriptionError>,
        >()))
    }
}

fn description(model: &DetailModel) -> Option<&str> {
    model.record.as_ref().map(|r| r.description.as_str())
}

/// Initial fetch is fast, the first refresh is slow, the second is fast.
fn slow_then_fast() -> Arc<Delayed> {
    Arc::new(Delayed::new(vec![
        Duration::ZERO,
        Duration::from_millis(200),
        Duration::from_millis(10),
    ]))
}

#[tokio::test]
async fn test_default_session_shows_last_completed_fetch() {
    let backend = slow_then_fast();
    let session = DetailSession::open(backend.clone(), "job-42", SessionOptions::default());
    let mut models = session.watch();
    wait_for(&mut models, |m| description(m) == Some("call-0")).await;

    session.send(ViewCommand::Refresh).await.unwrap();
    session.send(ViewCommand::Refresh).await.unwrap();

    // The later-issued fetch lands first, then the slow one overwrites it.
    wait_for(&mut models, |m| description(m) == Some("call-2")).await;
    let model = wait_for(&mut models, |m| description(m) == Some("call-1")).await;

    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);
    assert!(model.fetch_error.is_none());

    session.close().await;
}

#[tokio::test]
async fn test_strict_ordering_discards_slow_earlier_fetch() {
    let backend = slow_then_fast();
    let options = SessionOptions {
        apply_policy: ApplyPolicy::LatestIssued,
        ..SessionOptions::default()
    };
    let session = DetailSession::open(backend.clone(), "job-42", options);
    let mut models = session.watch();
    wait_for(&mut models, |m| description(m) == Some("call-0")).await;

    session.send(ViewCommand::Refresh).await.unwrap();
    session.send(ViewCommand::Refresh).await.unwrap();

    wait_for(&mut models, |m| description(m) == Some("call-2")).await;
    sleep(Duration::from_millis(300)).await;

    assert_eq!(description(&session.current()), Some("call-2"));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 3);

    session.close().await;
}
