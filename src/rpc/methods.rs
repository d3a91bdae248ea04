//! RPC method handlers.
//!
//! Dispatches JSON-RPC method calls to a [`JobBackend`].

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::backend::{JobBackend, ProgressStream};
use crate::core::{FetchError, MutationError};

use super::protocol::{
    CANCEL_REJECTED, JOB_NOT_FOUND, JOBS_CANCEL, JOBS_GET, PROGRESS_SUBSCRIBE, Request, Response,
};

/// What the transport should do after a request was handled.
pub enum Outcome {
    /// Write the response and keep reading requests.
    Reply(Response),
    /// Write the response, then forward every event of the stream as a
    /// `progress.changed` notification until either side hangs up.
    Subscribe(Response, ProgressStream),
}

/// Handles RPC method dispatch and execution.
pub struct MethodHandler {
    backend: Arc<dyn JobBackend>,
}

#[derive(Deserialize)]
struct JobParams {
    id: String,
}

impl MethodHandler {
    pub fn new(backend: Arc<dyn JobBackend>) -> Self {
        Self { backend }
    }

    /// Handle an RPC request.
    pub async fn handle(&self, request: Request) -> Outcome {
        let id = request.id.clone().unwrap_or(Value::Null);
        let params = request.params.unwrap_or(Value::Null);

        match request.method.as_str() {
            JOBS_GET => Outcome::Reply(self.jobs_get(id, params).await),
            JOBS_CANCEL => Outcome::Reply(self.jobs_cancel(id, params).await),
            PROGRESS_SUBSCRIBE => self.progress_subscribe(id).await,
            _ => Outcome::Reply(Response::method_not_found(id, &request.method)),
        }
    }

    /// Get the full state of one job.
    async fn jobs_get(&self, id: Value, params: Value) -> Response {
        let params: JobParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e.to_string()),
        };

        match self.backend.get_job(&params.id).await {
            Ok(job) => Response::success(id, job),
            Err(FetchError::NotFound(job_id)) => {
                Response::error(id, JOB_NOT_FOUND, format!("Job not found: {}", job_id))
            }
            Err(e) => Response::internal_error(id, e.to_string()),
        }
    }

    /// Ask the backend to stop a job.
    async fn jobs_cancel(&self, id: Value, params: Value) -> Response {
        let params: JobParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return Response::invalid_params(id, e.to_string()),
        };

        match self.backend.cancel_job(&params.id).await {
            Ok(()) => Response::success(id, json!({ "accepted": true })),
            Err(MutationError::Rejected(msg)) => Response::error(id, CANCEL_REJECTED, msg),
            Err(e) => Response::internal_error(id, e.to_string()),
        }
    }

    async fn progress_subscribe(&self, id: Value) -> Outcome {
        match self.backend.subscribe_progress().await {
            Ok(stream) => Outcome::Subscribe(Response::success(id, json!({ "subscribed": true })), stream),
            Err(e) => Outcome::Reply(Response::internal_error(id, e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimulatedBackend;
    use crate::core::Progress;

    fn request(method: &str, params: Value) -> Request {
        Request::new(method, Some(params), Value::Number(7.into()))
    }

    fn reply(outcome: Outcome) -> Response {
        match outcome {
            Outcome::Reply(resp) => resp,
            Outcome::Subscribe(..) => panic!("expected a plain reply"),
        }
    }

    #[tokio::test]
    async fn jobs_get_returns_raw_job() {
        let (backend, sim) = SimulatedBackend::new();
        sim.seed("job-42").await;
        let handler = MethodHandler::new(Arc::new(backend));

        let resp = reply(handler.handle(request(JOBS_GET, json!({ "id": "job-42" }))).await);

        let result = resp.result.unwrap();
        assert_eq!(result["id"], "job-42");
        assert_eq!(result["progress"], "CREATED");
        assert!(result["parameters"].is_array());
    }

    #[tokio::test]
    async fn jobs_get_unknown_job_uses_not_found_code() {
        let (backend, _sim) = SimulatedBackend::new();
        let handler = MethodHandler::new(Arc::new(backend));

        let resp = reply(handler.handle(request(JOBS_GET, json!({ "id": "missing" }))).await);
        assert_eq!(resp.error.unwrap().code, JOB_NOT_FOUND);
    }

    #[tokio::test]
    async fn jobs_cancel_rejected_for_stopped_job() {
        let (backend, sim) = SimulatedBackend::new();
        sim.seed("job-42").await;
        sim.set_progress("job-42", Some(Progress::Stopped)).await;
        let handler = MethodHandler::new(Arc::new(backend));

        let resp = reply(handler.handle(request(JOBS_CANCEL, json!({ "id": "job-42" }))).await);
        assert_eq!(resp.error.unwrap().code, CANCEL_REJECTED);
    }

    #[tokio::test]
    async fn missing_params_are_invalid() {
        let (backend, _sim) = SimulatedBackend::new();
        let handler = MethodHandler::new(Arc::new(backend));

        let resp = reply(handler.handle(request(JOBS_GET, Value::Null)).await);
        assert_eq!(resp.error.unwrap().code, super::super::protocol::INVALID_PARAMS);
    }

    #[tokio::test]
    async fn subscribe_hands_stream_to_transport() {
        let (backend, _sim) = SimulatedBackend::new();
        let handler = MethodHandler::new(Arc::new(backend));

        let outcome = handler.handle(request(PROGRESS_SUBSCRIBE, Value::Null)).await;
        assert!(matches!(outcome, Outcome::Subscribe(..)));
    }
}
