//! Caller-side connection handler and the async `Caller` client.
//!
//! A `CallerConnection` performs exactly one exchange:
//! `Connecting -> AwaitingResponse -> Closed`. It writes the request, shuts
//! down its write half, stores whatever response arrives, and returns it
//! once the worker closes the connection.

use std::sync::Arc;

use dispatch_core::{Args, CallerCodec, DispatchRequest, DispatchResponse, Kwargs, ProtocolError};
use futures_util::{SinkExt, StreamExt};
use parking_lot::RwLock;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio_util::codec::Framed;
use tracing::debug;

use super::config::{ConnectionConfig, NetworkConfig};

/// Errors raised while performing an outbound call.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    #[error("failed to connect to {address}: {source}")]
    Connect {
        address: String,
        #[source]
        source: std::io::Error,
    },
    #[error("timed out connecting to {address}")]
    ConnectTimeout { address: String },
    #[error("I/O error during call: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Protocol(#[from] ProtocolError),
}

/// Per-exchange state of an outbound connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallerState {
    Connecting,
    AwaitingResponse,
    Closed,
}

/// State machine for one outbound request/response exchange.
#[derive(Debug)]
pub struct CallerConnection {
    request: DispatchRequest,
    state: CallerState,
    result: Option<DispatchResponse>,
}

impl CallerConnection {
    #[must_use]
    pub fn new(request: DispatchRequest) -> Self {
        Self {
            request,
            state: CallerState::Connecting,
            result: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> CallerState {
        self.state
    }

    /// Runs the exchange over an established transport.
    ///
    /// Returns `Ok(None)` when the worker closed the connection without
    /// answering (e.g. it judged the request invalid).
    ///
    /// # Errors
    ///
    /// Returns `CallError::Io` or `CallError::Protocol` if writing the
    /// request or decoding the response fails.
    pub async fn exchange<T>(
        mut self,
        io: T,
        config: &ConnectionConfig,
    ) -> Result<Option<DispatchResponse>, CallError>
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(io, CallerCodec::new(config.max_frame_length));

        debug!("Sending {:?}", self.request);
        framed.send(self.request.clone()).await?;
        // Only one request is ever sent on this connection.
        framed.get_mut().shutdown().await?;
        self.state = CallerState::AwaitingResponse;

        while let Some(frame) = framed.next().await {
            let response = frame?;
            debug!("Received {:?}", response);
            self.result = Some(response);
        }

        debug!("Server closed connection");
        self.state = CallerState::Closed;
        Ok(self.result)
    }
}

/// Cheap, cloneable client that dispatches tasks to the configured endpoint.
///
/// Reads host/port at call time, so endpoint changes made through the
/// owning orchestrator apply to subsequent calls.
#[derive(Debug, Clone)]
pub struct Caller {
    config: Arc<RwLock<NetworkConfig>>,
}

impl Caller {
    #[must_use]
    pub fn new(config: Arc<RwLock<NetworkConfig>>) -> Self {
        Self { config }
    }

    /// Current `host:port` target.
    #[must_use]
    pub fn address(&self) -> String {
        self.config.read().address()
    }

    /// Dispatches `name` on the configured worker and waits for its answer.
    ///
    /// There is no response timeout: a worker that accepts but never answers
    /// or closes keeps this future pending.
    ///
    /// # Errors
    ///
    /// See [`Caller::call_at`].
    pub async fn call(
        &self,
        name: &str,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Option<DispatchResponse>, CallError> {
        let address = self.address();
        self.call_at(&address, DispatchRequest::new(name, args, kwargs))
            .await
    }

    /// Performs one exchange against an explicit `host:port`.
    ///
    /// # Errors
    ///
    /// Returns `CallError::Connect`/`ConnectTimeout` if no connection could be
    /// made, and `Io`/`Protocol` for failures during the exchange.
    pub async fn call_at(
        &self,
        address: &str,
        request: DispatchRequest,
    ) -> Result<Option<DispatchResponse>, CallError> {
        let connection = self.config.read().connection.clone();
        let stream = connect(address, &connection).await?;
        if let Ok(peer) = stream.peer_addr() {
            debug!("Connecting to {}", peer);
        }
        CallerConnection::new(request)
            .exchange(stream, &connection)
            .await
    }
}

async fn connect(address: &str, config: &ConnectionConfig) -> Result<TcpStream, CallError> {
    let attempt = TcpStream::connect(address);
    let result = match config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, attempt)
            .await
            .map_err(|_| CallError::ConnectTimeout {
                address: address.to_string(),
            })?,
        None => attempt.await,
    };
    result.map_err(|source| CallError::Connect {
        address: address.to_string(),
        source,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
