//! JSON-RPC 2.0 over TCP between the detail view and a job backend.
//!
//! ## Architecture
//!
//! - `protocol`: JSON-RPC 2.0 request/response types and method names
//! - `transport`: TCP listener with newline-delimited JSON framing
//! - `methods`: method dispatcher fronting any [`JobBackend`]
//! - `client`: client and the [`RpcBackend`] adapter
//!
//! ## Subscriptions
//!
//! `progress.subscribe` is answered like any call, after which the server
//! pushes `progress.changed` notifications (`{"id": ...}`) on the same
//! connection. Closing the connection unsubscribes.

pub mod client;
pub mod methods;
mod protocol;
mod transport;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::backend::JobBackend;
use transport::Transport;

pub use client::{ClientError, RpcBackend, RpcClient};
pub use methods::MethodHandler;
pub use protocol::{Request, Response, RpcError};

/// RPC server that exposes a job backend to remote views.
pub struct RpcServer {
    transport: Transport,
    shutdown: CancellationToken,
}

impl RpcServer {
    /// Bind the server to the given address. Port 0 picks a free port.
    pub async fn bind(backend: Arc<dyn JobBackend>, bind_addr: SocketAddr) -> anyhow::Result<Self> {
        let handler = MethodHandler::new(backend);
        let transport = Transport::bind(bind_addr, handler).await?;

        Ok(Self {
            transport,
            shutdown: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> anyhow::Result<SocketAddr> {
        Ok(self.transport.local_addr()?)
    }

    /// Serve until shutdown() is called.
    pub async fn start(&self) -> anyhow::Result<()> {
        self.transport.listen(self.shutdown.clone()).await
    }

    /// Signal the server and every open connection to shut down.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}
