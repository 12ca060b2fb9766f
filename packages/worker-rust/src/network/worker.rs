//! Worker-side connection handler.
//!
//! Each accepted connection runs one `WorkerConnection`. Every request frame
//! goes through `Connected -> Processing -> Responded`: decode, validate
//! against the registry, schedule, and write exactly one response. Invalid
//! requests (no task name) produce no response at all. The connection is
//! closed once the peer finishes writing.

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;

use dispatch_core::{DispatchRequest, DispatchResponse, WorkerCodec};
use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::Framed;
use tracing::{debug, info, warn};

use super::config::ConnectionConfig;
use crate::service::registry::TaskRegistry;
use crate::service::scheduler::{DispatchError, DispatchId, Scheduler};
use crate::service::task::TaskArgs;

/// Per-exchange state of a worker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    /// Accepted, waiting for a request (also re-entered after an invalid one).
    Connected,
    /// A request is being validated and dispatched.
    Processing,
    /// A response has been produced for the last request.
    Responded,
}

/// State machine for one accepted connection.
#[derive(Debug)]
pub struct WorkerConnection {
    peer: SocketAddr,
    state: WorkerState,
    registry: Arc<TaskRegistry>,
    scheduler: Scheduler,
}

impl WorkerConnection {
    #[must_use]
    pub fn new(peer: SocketAddr, registry: Arc<TaskRegistry>, scheduler: Scheduler) -> Self {
        debug!("Connection accepted from {}", peer);
        Self {
            peer,
            state: WorkerState::Connected,
            registry,
            scheduler,
        }
    }

    #[must_use]
    pub fn state(&self) -> WorkerState {
        self.state
    }

    /// Validates and dispatches one decoded request.
    ///
    /// Returns the response to write, or `None` for an invalid request that
    /// must be ignored. Runs without suspending, so the response reflects a
    /// single consistent view of the registry.
    pub fn process(&mut self, request: DispatchRequest) -> Option<DispatchResponse> {
        self.state = WorkerState::Processing;

        let Some(name) = request.task_name().map(str::to_owned) else {
            info!("Invalid message received from {}: {:?}", self.peer, request);
            self.state = WorkerState::Connected;
            return None;
        };
        let DispatchRequest { args, kwargs, .. } = request;

        let Some(task) = self.registry.lookup(&name) else {
            info!("Unregistered \"{}\" task received", name);
            self.state = WorkerState::Responded;
            return Some(DispatchResponse::unregistered());
        };

        let id = DispatchId::new();
        info!("(task:{}) Running task '{}'...", id, name);

        let args = TaskArgs::new(args, kwargs);
        let response = match self.scheduler.dispatch(&id, &name, &task, args) {
            Ok(()) => {
                info!("(task:{}) Task sent.", id);
                DispatchResponse::dispatched(id)
            }
            Err(err) => {
                let traceback = diagnostic(&name, &err);
                info!("(task:{}) Error while running task...\n{}", id, traceback);
                DispatchResponse::dispatch_failed(id, err.to_string(), traceback)
            }
        };

        self.state = WorkerState::Responded;
        Some(response)
    }

    /// Drives the connection until the peer closes its write side or the
    /// worker starts shutting down.
    ///
    /// A frame whose payload is not a valid request is answered with a
    /// malformed-request failure and the connection is closed; a broken
    /// frame closes the connection without a response. Frames already
    /// readable when shutdown begins are still answered.
    pub async fn serve<T>(mut self, io: T, config: &ConnectionConfig)
    where
        T: AsyncRead + AsyncWrite + Unpin,
    {
        let mut framed = Framed::new(io, WorkerCodec::new(config.max_frame_length));
        let controller = Arc::clone(self.scheduler.shutdown_controller());

        loop {
            let frame = tokio::select! {
                biased;
                frame = framed.next() => frame,
                () = controller.triggered() => {
                    debug!("Shutting down, closing connection from {}", self.peer);
                    break;
                }
            };
            let Some(frame) = frame else {
                break;
            };

            match frame {
                Ok(request) => {
                    let Some(response) = self.process(request) else {
                        continue;
                    };
                    if let Err(err) = framed.send(response).await {
                        warn!("Failed to write response to {}: {}", self.peer, err);
                        return;
                    }
                }
                Err(err) if err.is_payload_error() => {
                    info!("Malformed message received from {}: {}", self.peer, err);
                    self.state = WorkerState::Responded;
                    let response = DispatchResponse::malformed(err.to_string());
                    if let Err(err) = framed.send(response).await {
                        warn!("Failed to write response to {}: {}", self.peer, err);
                    }
                    break;
                }
                Err(err) => {
                    warn!("Dropping connection from {}: {}", self.peer, err);
                    break;
                }
            }
        }

        if let Err(err) = SinkExt::<DispatchResponse>::close(&mut framed).await {
            debug!("Error closing connection from {}: {}", self.peer, err);
        }
        debug!("Connection from {} closed", self.peer);
    }
}

/// Diagnostic text for a dispatch failure: the failing task plus the full
/// error source chain.
fn diagnostic(name: &str, err: &DispatchError) -> String {
    let mut text = format!("dispatching task '{name}' failed: {err}");
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        let _ = write!(text, "\n  caused by: {cause}");
        source = cause.source();
    }
    text
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
