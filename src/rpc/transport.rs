//! Newline-delimited JSON over TCP, one task per connection.
//!
//! A connection that calls `progress.subscribe` switches to push mode and
//! stays open until the client hangs up or the server shuts down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio_stream::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::methods::{MethodHandler, Outcome};
use super::protocol::{PROGRESS_CHANGED, Request, Response};
use crate::backend::ProgressStream;
use crate::core::SubscriptionError;

/// Manages the TCP transport layer.
pub struct Transport {
    listener: TcpListener,
    handler: Arc<MethodHandler>,
}

impl Transport {
    pub async fn bind(bind_addr: SocketAddr, handler: MethodHandler) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind_addr).await?;
        Ok(Self {
            listener,
            handler: Arc::new(handler),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept connections until `shutdown` is cancelled.
    pub async fn listen(&self, shutdown: CancellationToken) -> anyhow::Result<()> {
        info!(addr = %self.local_addr()?, "RPC server listening");

        loop {
            tokio::select! {
                accept_result = self.listener.accept() => {
                    match accept_result {
                        Ok((stream, peer_addr)) => {
                            debug!(peer = %peer_addr, "Client connected");
                            let handler = self.handler.clone();
                            let shutdown = shutdown.child_token();
                            tokio::spawn(async move {
                                if let Err(e) = handle_connection(stream, peer_addr, handler, shutdown).await {
                                    debug!(peer = %peer_addr, error = %e, "Connection error");
                                }
                                debug!(peer = %peer_addr, "Client disconnected");
                            });
                        }
                        Err(e) => {
                            error!(error = %e, "Failed to accept connection");
                        }
                    }
                }
                _ = shutdown.cancelled() => {
                    info!("RPC server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}

/// Handle a single client connection.
async fn handle_connection(
    stream: TcpStream,
    peer_addr: SocketAddr,
    handler: Arc<MethodHandler>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = tokio::select! {
            read = reader.read_line(&mut line) => read?,
            _ = shutdown.cancelled() => break,
        };

        if bytes_read == 0 {
            break;
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let outcome = match serde_json::from_str::<Request>(trimmed) {
            Ok(request) => {
                if let Err(msg) = request.validate() {
                    warn!(peer = %peer_addr, error = msg, "Invalid request");
                    let id = request.id.clone().unwrap_or(serde_json::Value::Null);
                    Outcome::Reply(Response::invalid_request(id))
                } else if request.is_notification() {
                    // Notifications don't get responses
                    debug!(peer = %peer_addr, method = %request.method, "Notification received");
                    let _ = handler.handle(request).await;
                    continue;
                } else {
                    handler.handle(request).await
                }
            }
            Err(e) => {
                warn!(peer = %peer_addr, error = %e, "Parse error");
                Outcome::Reply(Response::parse_error())
            }
        };

        match outcome {
            Outcome::Reply(response) => write_line(&mut writer, &response).await?,
            Outcome::Subscribe(response, events) => {
                write_line(&mut writer, &response).await?;
                debug!(peer = %peer_addr, "Client subscribed to progress");
                return forward_progress(events, reader, writer, peer_addr, shutdown).await;
            }
        }
    }

    Ok(())
}

/// Push progress notifications until the client disconnects, the stream ends
/// or the server shuts down.
async fn forward_progress(
    mut events: ProgressStream,
    mut reader: BufReader<OwnedReadHalf>,
    mut writer: OwnedWriteHalf,
    peer_addr: SocketAddr,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let mut discard = String::new();

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(Ok(event)) => {
                    let note = Request::notification(PROGRESS_CHANGED, event);
                    write_line(&mut writer, &note).await?;
                }
                Some(Err(SubscriptionError::Lagged(missed))) => {
                    // The client can't tell which jobs were skipped. Hanging up
                    // makes it resubscribe and refetch.
                    warn!(peer = %peer_addr, missed, "Subscriber lagged, disconnecting");
                    break;
                }
                Some(Err(e)) => {
                    warn!(peer = %peer_addr, error = %e, "Progress stream failed");
                    break;
                }
                None => break,
            },
            read = reader.read_line(&mut discard) => {
                // Subscribed clients send nothing; EOF means unsubscribe.
                if read? == 0 {
                    break;
                }
                discard.clear();
            }
            _ = shutdown.cancelled() => break,
        }
    }

    Ok(())
}

async fn write_line<T: serde::Serialize>(
    writer: &mut OwnedWriteHalf,
    message: &T,
) -> anyhow::Result<()> {
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    Ok(())
}
