//! TCP listener lifecycle for the worker.
//!
//! Follows a deferred startup pattern: `new()` wires shared state, `start()`
//! binds the listener, and `serve()` accepts connections until shutdown.
//! Binding separately lets callers learn the real port (when configured with
//! port 0) before any connection is accepted.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::TcpListener;
use tracing::{debug, info, warn};

use super::config::NetworkConfig;
use super::worker::WorkerConnection;
use crate::service::registry::TaskRegistry;
use crate::service::scheduler::Scheduler;

/// Pause before retrying a failed `accept()` (e.g. EMFILE).
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Accepts connections and hands each to its own `WorkerConnection`.
#[derive(Debug)]
pub struct WorkerServer {
    config: NetworkConfig,
    listener: Option<TcpListener>,
    registry: Arc<TaskRegistry>,
    scheduler: Scheduler,
}

impl WorkerServer {
    #[must_use]
    pub fn new(config: NetworkConfig, registry: Arc<TaskRegistry>, scheduler: Scheduler) -> Self {
        Self {
            config,
            listener: None,
            registry,
            scheduler,
        }
    }

    /// Binds the listener and returns the bound port.
    ///
    /// # Errors
    ///
    /// Returns an error if the address cannot be resolved or bound.
    pub async fn start(&mut self) -> anyhow::Result<u16> {
        let listener = TcpListener::bind(self.config.address()).await?;
        let port = listener.local_addr()?.port();
        info!("Listening on {}:{}...", self.config.host, port);

        self.config.port = port;
        self.listener = Some(listener);
        Ok(port)
    }

    /// Accepts connections until `shutdown` resolves or the scheduler's
    /// controller is triggered, then closes the listener and drains.
    ///
    /// # Errors
    ///
    /// Returns an error if `start()` was not called first.
    pub async fn serve(self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        let Some(listener) = self.listener else {
            anyhow::bail!("start() must be called before serve()");
        };
        let controller = Arc::clone(self.scheduler.shutdown_controller());
        let connection_config = Arc::new(self.config.connection.clone());

        controller.set_ready();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, peer) = match accepted {
                        Ok(pair) => pair,
                        Err(err) => {
                            warn!("Failed to accept connection: {}", err);
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };
                    let conn = WorkerConnection::new(
                        peer,
                        Arc::clone(&self.registry),
                        self.scheduler.clone(),
                    );
                    let config = Arc::clone(&connection_config);
                    self.scheduler.spawn(async move { conn.serve(stream, &config).await });
                }
                () = &mut shutdown => break,
                () = controller.triggered() => break,
            }
        }

        info!("Closing server");
        drop(listener);
        controller.trigger_shutdown();

        debug!(
            "Waiting for {} in-flight connections and tasks",
            controller.in_flight_count()
        );
        if controller.wait_for_drain(self.config.drain_timeout).await {
            info!("All in-flight work drained");
        } else {
            warn!(
                "Drain timeout expired with {} connections or tasks still running",
                controller.in_flight_count()
            );
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::collections::HashSet;
    use std::time::Instant;

    use dispatch_core::{DispatchRequest, DispatchResponse, Kwargs};
    use parking_lot::RwLock;
    use serde_json::json;
    use tokio::sync::{mpsc, oneshot};
    use tokio::task::JoinSet;

    use super::*;
    use crate::network::caller::Caller;
    use crate::network::shutdown::{HealthState, ShutdownController};
    use crate::service::task::{task_fn, TaskArgs};

    fn local_config() -> NetworkConfig {
        NetworkConfig {
            host: "127.0.0.1".to_string(),
            port: 0,
            drain_timeout: Duration::from_secs(2),
            ..NetworkConfig::default()
        }
    }

    fn registry(tx: mpsc::UnboundedSender<i64>) -> Arc<TaskRegistry> {
        let registry = TaskRegistry::new();
        registry.register(
            "x",
            task_fn(move |args: TaskArgs| {
                let mut bound = args.bind(&["n"])?;
                let n: i64 = bound.optional("n", 0)?;
                let tx = tx.clone();
                Ok(async move {
                    tx.send(n)?;
                    Ok(())
                })
            }),
        );
        Arc::new(registry)
    }

    struct Running {
        caller: Caller,
        controller: Arc<ShutdownController>,
        stop: oneshot::Sender<()>,
        handle: tokio::task::JoinHandle<anyhow::Result<()>>,
    }

    async fn start_server(registry: Arc<TaskRegistry>) -> Running {
        let controller = Arc::new(ShutdownController::new());
        let scheduler = Scheduler::current(Arc::clone(&controller));
        let mut config = local_config();
        let mut server = WorkerServer::new(config.clone(), registry, scheduler);
        config.port = server.start().await.unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(async move {
            let _ = stopped.await;
        }));

        Running {
            caller: Caller::new(Arc::new(RwLock::new(config))),
            controller,
            stop,
            handle,
        }
    }

    #[tokio::test]
    async fn start_binds_ephemeral_port() {
        let scheduler = Scheduler::current(Arc::new(ShutdownController::new()));
        let mut server = WorkerServer::new(local_config(), Arc::new(TaskRegistry::new()), scheduler);
        let port = server.start().await.unwrap();
        assert!(port > 0);
    }

    #[tokio::test]
    async fn serve_without_start_fails() {
        let scheduler = Scheduler::current(Arc::new(ShutdownController::new()));
        let server = WorkerServer::new(local_config(), Arc::new(TaskRegistry::new()), scheduler);
        assert!(server.serve(std::future::pending::<()>()).await.is_err());
    }

    #[tokio::test]
    async fn call_dispatches_registered_task() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = start_server(registry(tx)).await;

        let resp = tokio::time::timeout(
            Duration::from_secs(5),
            running.caller.call("x", vec![json!(5)], Kwargs::new()),
        )
        .await
        .unwrap()
        .unwrap()
        .unwrap();
        assert!(resp.success);

        let ran = tokio::time::timeout(Duration::from_secs(1), rx.recv()).await.unwrap();
        assert_eq!(ran, Some(5));

        running.stop.send(()).unwrap();
        running.handle.await.unwrap().unwrap();
        assert_eq!(running.controller.health_state(), HealthState::Stopped);
    }

    #[tokio::test]
    async fn unregistered_and_invalid_requests() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let running = start_server(registry(tx)).await;

        let resp = running
            .caller
            .call("missing", vec![], Kwargs::new())
            .await
            .unwrap();
        assert_eq!(resp, Some(DispatchResponse::unregistered()));

        // No task name: the worker writes nothing and closes after our EOF.
        let address = running.caller.address();
        let invalid = DispatchRequest {
            task: None,
            args: vec![],
            kwargs: Kwargs::new(),
        };
        let resp = running.caller.call_at(&address, invalid).await.unwrap();
        assert!(resp.is_none());

        running.controller.trigger_shutdown();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn concurrent_calls_each_get_their_own_response() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let running = start_server(registry(tx)).await;

        let mut calls = JoinSet::new();
        for n in 0..24_i64 {
            let caller = running.caller.clone();
            calls.spawn(async move {
                // Every third call targets an unknown task, every fourth one
                // passes a surplus argument.
                let (name, args) = match n {
                    n if n % 3 == 0 => ("missing", vec![json!(n)]),
                    n if n % 4 == 0 => ("x", vec![json!(n), json!(n)]),
                    n => ("x", vec![json!(n)]),
                };
                let resp = caller.call(name, args, Kwargs::new()).await;
                (n, resp)
            });
        }

        let mut ids = HashSet::new();
        let mut expected_runs = HashSet::new();
        while let Some(joined) = calls.join_next().await {
            let (n, resp) = joined.unwrap();
            let resp = resp.unwrap().unwrap();
            if n % 3 == 0 {
                assert_eq!(resp, DispatchResponse::unregistered(), "call {n}");
            } else if n % 4 == 0 {
                assert!(!resp.success, "call {n}");
                assert_eq!(
                    resp.error.as_deref(),
                    Some("takes 1 positional arguments but 2 were given"),
                    "call {n}"
                );
                assert!(ids.insert(resp.message));
            } else {
                assert!(resp.success, "call {n}");
                assert!(resp.error.is_none(), "call {n}");
                assert!(ids.insert(resp.message));
                expected_runs.insert(n);
            }
        }
        assert_eq!(ids.len(), 24 - 8);

        let mut ran = HashSet::new();
        for _ in 0..expected_runs.len() {
            let n = tokio::time::timeout(Duration::from_secs(1), rx.recv())
                .await
                .unwrap()
                .unwrap();
            ran.insert(n);
        }
        assert_eq!(ran, expected_runs);

        running.stop.send(()).unwrap();
        running.handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn idle_connection_does_not_hold_up_shutdown() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let running = start_server(registry(tx)).await;

        let _idle = tokio::net::TcpStream::connect(running.caller.address())
            .await
            .unwrap();
        let deadline = Instant::now() + Duration::from_secs(1);
        while running.controller.in_flight_count() == 0 {
            assert!(Instant::now() < deadline, "connection never accepted");
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let started = Instant::now();
        running.stop.send(()).unwrap();
        running.handle.await.unwrap().unwrap();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(running.controller.health_state(), HealthState::Stopped);
        assert_eq!(running.controller.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn draining_server_refuses_new_connections() {
        let (tx, _rx) = mpsc::unbounded_channel();
        let running = start_server(registry(tx)).await;
        let address = running.caller.address();

        running.stop.send(()).unwrap();
        running.handle.await.unwrap().unwrap();

        let err = running
            .caller
            .call_at(&address, DispatchRequest::new("x", vec![], Kwargs::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, crate::network::caller::CallError::Connect { .. }));
    }
}
