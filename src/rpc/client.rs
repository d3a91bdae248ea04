//! RPC client for connecting to the job backend.
//!
//! Plain calls use one short-lived connection each. A subscription keeps its
//! connection open and yields the notifications the server pushes on it.

use std::net::SocketAddr;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_stream::{Stream, StreamExt};

use super::protocol::{
    CANCEL_REJECTED, JOB_NOT_FOUND, JOBS_CANCEL, JOBS_GET, PROGRESS_CHANGED, PROGRESS_SUBSCRIBE,
    Request, Response, RpcError,
};
use crate::backend::{JobBackend, ProgressEvent, ProgressStream};
use crate::core::{FetchError, MutationError, RawJob, SubscriptionError};

/// RPC client for communicating with the backend.
#[derive(Debug, Clone)]
pub struct RpcClient {
    addr: SocketAddr,
}

/// Error returned by RPC client operations.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error("Failed to connect to backend: {0}")]
    Connect(#[source] std::io::Error),
    #[error("Communication error: {0}")]
    Io(#[source] std::io::Error),
    #[error("Failed to serialize request: {0}")]
    Serialize(#[source] serde_json::Error),
    #[error("Failed to parse response: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(RpcError),
}

impl RpcClient {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Call an RPC method and return the result.
    pub async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        params: Option<Value>,
    ) -> Result<T, ClientError> {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(ClientError::Connect)?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        send_request(&mut writer, method, params).await?;
        let result = read_response(&mut reader).await?;

        serde_json::from_value(result).map_err(ClientError::Parse)
    }

    /// Call a subscription method and stream the notifications that follow
    /// its reply. Dropping the stream closes the connection.
    pub async fn subscribe(
        &self,
        method: &str,
    ) -> Result<impl Stream<Item = Result<Request, ClientError>> + Send + 'static, ClientError>
    {
        let stream = TcpStream::connect(self.addr)
            .await
            .map_err(ClientError::Connect)?;
        let (reader, mut writer) = stream.into_split();
        let mut reader = BufReader::new(reader);

        send_request(&mut writer, method, None).await?;
        read_response(&mut reader).await?;

        let mut lines = reader.lines();

        Ok(async_stream::stream! {
            // Keep the write half alive; the server treats EOF as unsubscribe.
            let _writer = writer;

            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let trimmed = line.trim();
                        if trimmed.is_empty() {
                            continue;
                        }
                        yield serde_json::from_str::<Request>(trimmed).map_err(ClientError::Parse);
                    }
                    Ok(None) => break,
                    Err(e) => {
                        yield Err(ClientError::Io(e));
                        break;
                    }
                }
            }
        })
    }
}

async fn send_request<W: AsyncWriteExt + Unpin>(
    writer: &mut W,
    method: &str,
    params: Option<Value>,
) -> Result<(), ClientError> {
    let request = Request::new(method, params, Value::Number(1.into()));

    let mut request_json = serde_json::to_string(&request).map_err(ClientError::Serialize)?;
    request_json.push('\n');

    writer
        .write_all(request_json.as_bytes())
        .await
        .map_err(ClientError::Io)
}

async fn read_response<R: AsyncBufReadExt + Unpin>(reader: &mut R) -> Result<Value, ClientError> {
    let mut response_line = String::new();
    reader
        .read_line(&mut response_line)
        .await
        .map_err(ClientError::Io)?;

    if response_line.is_empty() {
        return Err(ClientError::Io(std::io::Error::new(
            std::io::ErrorKind::UnexpectedEof,
            "connection closed before response",
        )));
    }

    let response: Response = serde_json::from_str(&response_line).map_err(ClientError::Parse)?;

    if let Some(error) = response.error {
        return Err(ClientError::Rpc(error));
    }

    Ok(response.result.unwrap_or(Value::Null))
}

/// [`JobBackend`] served by a remote process over JSON-RPC.
#[derive(Debug, Clone)]
pub struct RpcBackend {
    client: RpcClient,
}

impl RpcBackend {
    pub fn new(addr: SocketAddr) -> Self {
        Self {
            client: RpcClient::new(addr),
        }
    }
}

#[async_trait]
impl JobBackend for RpcBackend {
    async fn get_job(&self, id: &str) -> Result<RawJob, FetchError> {
        self.client
            .call::<RawJob>(JOBS_GET, Some(json!({ "id": id })))
            .await
            .map_err(|e| match e {
                ClientError::Rpc(err) if err.code == JOB_NOT_FOUND => {
                    FetchError::NotFound(id.to_string())
                }
                ClientError::Parse(err) => FetchError::Decode(err.to_string()),
                other => FetchError::Transport(other.to_string()),
            })
    }

    async fn cancel_job(&self, id: &str) -> Result<(), MutationError> {
        self.client
            .call::<Value>(JOBS_CANCEL, Some(json!({ "id": id })))
            .await
            .map(|_| ())
            .map_err(|e| match e {
                ClientError::Rpc(err) if matches!(err.code, CANCEL_REJECTED | JOB_NOT_FOUND) => {
                    MutationError::Rejected(err.message)
                }
                other => MutationError::Transport(other.to_string()),
            })
    }

    async fn subscribe_progress(&self) -> Result<ProgressStream, SubscriptionError> {
        let notifications = self
            .client
            .subscribe(PROGRESS_SUBSCRIBE)
            .await
            .map_err(|e| SubscriptionError::Connect(e.to_string()))?;

        let events = notifications.filter_map(|item| match item {
            Ok(note) if note.method == PROGRESS_CHANGED => Some(
                serde_json::from_value::<ProgressEvent>(note.params.unwrap_or(Value::Null))
                    .map_err(|e| SubscriptionError::Decode(e.to_string())),
            ),
            Ok(_) => None,
            Err(ClientError::Parse(e)) => Some(Err(SubscriptionError::Decode(e.to_string()))),
            Err(e) => Some(Err(SubscriptionError::Connect(e.to_string()))),
        });

        Ok(Box::pin(events))
    }
}
