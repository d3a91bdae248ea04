//! Runtime for a [`DetailView`].
//!
//! One task owns the view. Fetches, the stop request and the notification
//! listener run as separate tasks that only report results back over
//! channels, so the view has a single writer. Closing the session cancels
//! every child task; results that arrive afterwards are dropped unread.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::listener::{ListenerEvent, ReconnectPolicy, run_listener};
use super::{ApplyPolicy, DetailModel, DetailView, Effect, FetchTicket, fetch_snapshot};
use crate::backend::JobBackend;
use crate::core::{FetchError, JobRecord, MutationError};

/// User intents accepted by a running session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewCommand {
    Refresh,
    RequestCancel,
    DismissCancel,
    ConfirmCancel,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub apply_policy: ApplyPolicy,
    pub fetch_timeout: Option<Duration>,
    pub cancel_timeout: Option<Duration>,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            apply_policy: ApplyPolicy::default(),
            fetch_timeout: None,
            cancel_timeout: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

#[derive(Debug, Error)]
#[error("detail session is closed")]
pub struct SessionClosed;

enum Settled {
    Fetch(FetchTicket, Result<JobRecord, FetchError>),
    Cancel(Result<(), MutationError>),
}

/// Handle to a running job detail view.
pub struct DetailSession {
    job_id: String,
    commands: mpsc::Sender<ViewCommand>,
    model: watch::Receiver<DetailModel>,
    shutdown: CancellationToken,
    task: JoinHandle<()>,
    listener: JoinHandle<()>,
}

impl DetailSession {
    /// Activate a view for `job_id`: start the initial fetch and the
    /// notification listener concurrently.
    pub fn open(
        backend: Arc<dyn JobBackend>,
        job_id: impl Into<String>,
        options: SessionOptions,
    ) -> Self {
        let job_id = job_id.into();
        let (view, initial) = DetailView::activate(job_id.clone(), options.apply_policy);

        let (model_tx, model_rx) = watch::channel(view.model());
        let (commands_tx, commands_rx) = mpsc::channel(32);
        let (listener_tx, listener_rx) = mpsc::channel(32);
        let (settled_tx, settled_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let listener = tokio::spawn(run_listener(
            backend.clone(),
            job_id.clone(),
            options.reconnect,
            listener_tx,
            shutdown.child_token(),
        ));

        let driver = Driver {
            backend,
            view,
            options,
            model_tx,
            settled_tx,
            shutdown: shutdown.clone(),
        };
        let task = tokio::spawn(driver.run(initial, commands_rx, listener_rx, settled_rx));

        Self {
            job_id,
            commands: commands_tx,
            model: model_rx,
            shutdown,
            task,
            listener,
        }
    }

    pub fn job_id(&self) -> &str {
        &self.job_id
    }

    pub async fn send(&self, command: ViewCommand) -> Result<(), SessionClosed> {
        self.commands.send(command).await.map_err(|_| SessionClosed)
    }

    /// Subscribe to model updates.
    pub fn watch(&self) -> watch::Receiver<DetailModel> {
        self.model.clone()
    }

    /// Latest published model.
    pub fn current(&self) -> DetailModel {
        self.model.borrow().clone()
    }

    /// Tear the view down. Returns once the subscription is released and no
    /// further state change can happen.
    pub async fn close(mut self) {
        self.shutdown.cancel();
        let _ = (&mut self.listener).await;
        let _ = (&mut self.task).await;
    }
}

impl Drop for DetailSession {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

struct Driver {
    backend: Arc<dyn JobBackend>,
    view: DetailView,
    options: SessionOptions,
    model_tx: watch::Sender<DetailModel>,
    settled_tx: mpsc::UnboundedSender<Settled>,
    shutdown: CancellationToken,
}

impl Driver {
    async fn run(
        mut self,
        initial: Effect,
        mut commands: mpsc::Receiver<ViewCommand>,
        mut listener: mpsc::Receiver<ListenerEvent>,
        mut settled: mpsc::UnboundedReceiver<Settled>,
    ) {
        info!(job_id = %self.view.job_id(), "Detail view activated");
        self.apply(initial);

        let mut listener_open = true;

        loop {
            tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => break,
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command),
                    None => break,
                },
                event = listener.recv(), if listener_open => match event {
                    Some(event) => self.handle_listener(event),
                    None => listener_open = false,
                },
                Some(result) = settled.recv() => self.handle_settled(result),
            }

            self.publish();
        }

        info!(job_id = %self.view.job_id(), "Detail view closed");
    }

    fn handle_command(&mut self, command: ViewCommand) {
        debug!(job_id = %self.view.job_id(), ?command, "Command");
        match command {
            ViewCommand::Refresh => {
                let effect = self.view.refresh();
                self.apply(effect);
            }
            ViewCommand::RequestCancel => {
                self.view.request_cancel();
            }
            ViewCommand::DismissCancel => {
                self.view.dismiss_cancel();
            }
            ViewCommand::ConfirmCancel => {
                if let Some(effect) = self.view.confirm_cancel() {
                    self.apply(effect);
                }
            }
        }
    }

    fn handle_listener(&mut self, event: ListenerEvent) {
        match event {
            ListenerEvent::Changed => {
                let effect = self.view.progress_changed();
                self.apply(effect);
            }
            ListenerEvent::Health(health) => self.view.set_subscription(health),
        }
    }

    fn handle_settled(&mut self, settled: Settled) {
        match settled {
            Settled::Fetch(ticket, result) => {
                if self.view.fetch_settled(ticket, result) {
                    debug!(job_id = %self.view.job_id(), ticket = ticket.value(), "Snapshot applied");
                }
            }
            Settled::Cancel(result) => {
                if let Some(effect) = self.view.cancel_settled(result) {
                    self.apply(effect);
                }
            }
        }
    }

    fn apply(&self, effect: Effect) {
        match effect {
            Effect::Fetch(ticket) => self.spawn_fetch(ticket),
            Effect::Cancel => self.spawn_cancel(),
        }
    }

    fn spawn_fetch(&self, ticket: FetchTicket) {
        let backend = self.backend.clone();
        let job_id = self.view.job_id().to_string();
        let timeout = self.options.fetch_timeout;
        let tx = self.settled_tx.clone();
        let shutdown = self.shutdown.clone();

        debug!(job_id = %job_id, ticket = ticket.value(), "Fetching snapshot");
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = fetch_snapshot(backend.as_ref(), &job_id, timeout) => {
                    let _ = tx.send(Settled::Fetch(ticket, result));
                }
            }
        });
    }

    fn spawn_cancel(&self) {
        let backend = self.backend.clone();
        let job_id = self.view.job_id().to_string();
        let timeout = self.options.cancel_timeout;
        let tx = self.settled_tx.clone();
        let shutdown = self.shutdown.clone();

        tokio::spawn(async move {
            let request = async {
                match timeout {
                    Some(limit) => tokio::time::timeout(limit, backend.cancel_job(&job_id))
                        .await
                        .unwrap_or(Err(MutationError::Timeout(limit))),
                    None => backend.cancel_job(&job_id).await,
                }
            };

            tokio::select! {
                _ = shutdown.cancelled() => {}
                result = request => {
                    let _ = tx.send(Settled::Cancel(result));
                }
            }
        });
    }

    fn publish(&self) {
        let next = self.view.model();
        self.model_tx.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }
}
