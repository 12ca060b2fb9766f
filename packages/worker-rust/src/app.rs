//! The orchestrator: owns the scheduler runtime, the task registry, the
//! listener lifecycle, and outbound calls.
//!
//! `App` is a synchronous facade. `run()` and `call()` block the calling
//! thread on the app's own runtime, so they must not be used from inside a
//! task; tasks dispatch onward through `RegisteredTask::delay` or a `Caller`.

use std::future::Future;
use std::sync::Arc;

use dispatch_core::{Args, DispatchResponse, Kwargs};
use parking_lot::RwLock;
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, info};

use crate::network::caller::{CallError, Caller};
use crate::network::config::NetworkConfig;
use crate::network::server::WorkerServer;
use crate::network::shutdown::ShutdownController;
use crate::service::config::SchedulerConfig;
use crate::service::registry::TaskRegistry;
use crate::service::scheduler::Scheduler;
use crate::service::task::{task_fn, ArgumentError, TaskArgs, TaskFn};

/// Construction-time configuration for an `App`.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    pub network: NetworkConfig,
    pub scheduler: SchedulerConfig,
}

// ---------------------------------------------------------------------------
// RegisteredTask
// ---------------------------------------------------------------------------

/// Handle returned by `App::register_task`.
///
/// `invoke` runs the task in the current async context; `delay` sends it to
/// the app's configured worker and returns the acknowledgment.
#[derive(Clone)]
pub struct RegisteredTask {
    name: String,
    task: TaskFn,
    caller: Caller,
}

impl RegisteredTask {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Runs the task locally and waits for it to finish.
    ///
    /// # Errors
    ///
    /// Returns an argument binding error or whatever the task itself fails with.
    pub async fn invoke(&self, args: Args, kwargs: Kwargs) -> anyhow::Result<()> {
        let future = (self.task)(TaskArgs::new(args, kwargs))?;
        future.await
    }

    /// Dispatches the task remotely through the owning app's endpoint.
    ///
    /// # Errors
    ///
    /// Returns a `CallError` if the exchange with the worker fails.
    pub async fn delay(
        &self,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Option<DispatchResponse>, CallError> {
        self.caller.call(&self.name, args, kwargs).await
    }
}

impl std::fmt::Debug for RegisteredTask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegisteredTask")
            .field("name", &self.name)
            .field("caller", &self.caller)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// App
// ---------------------------------------------------------------------------

/// A task-dispatch worker and client bound to one host/port.
pub struct App {
    config: Arc<RwLock<NetworkConfig>>,
    registry: Arc<TaskRegistry>,
    shutdown: Arc<ShutdownController>,
    runtime: Runtime,
}

impl App {
    /// Creates the app and its runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the runtime cannot be built.
    pub fn new(config: AppConfig) -> std::io::Result<Self> {
        let runtime = build_runtime(&config.scheduler)?;
        Ok(Self {
            config: Arc::new(RwLock::new(config.network)),
            registry: Arc::new(TaskRegistry::new()),
            shutdown: Arc::new(ShutdownController::new()),
            runtime,
        })
    }

    #[must_use]
    pub fn host(&self) -> String {
        self.config.read().host.clone()
    }

    #[must_use]
    pub fn port(&self) -> u16 {
        self.config.read().port
    }

    /// Changes the listener host and the default call target.
    pub fn set_host(&self, host: impl Into<String>) {
        self.config.write().host = host.into();
    }

    /// Changes the listener port and the default call target.
    pub fn set_port(&self, port: u16) {
        self.config.write().port = port;
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.registry
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Async client targeting this app's current host/port.
    #[must_use]
    pub fn caller(&self) -> Caller {
        Caller::new(Arc::clone(&self.config))
    }

    /// Scheduler handle on this app's runtime.
    #[must_use]
    pub fn scheduler(&self) -> Scheduler {
        Scheduler::new(self.runtime.handle().clone(), Arc::clone(&self.shutdown))
    }

    /// Registers a task under `name` and returns its dispatch handle.
    ///
    /// The closure binds arguments and returns the future doing the work.
    /// Registering an existing name replaces the earlier task.
    pub fn register_task<F, Fut>(&self, name: &str, task: F) -> RegisteredTask
    where
        F: Fn(TaskArgs) -> Result<Fut, ArgumentError> + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        let task = task_fn(task);
        self.registry.register(name, Arc::clone(&task));
        RegisteredTask {
            name: name.to_string(),
            task,
            caller: self.caller(),
        }
    }

    /// Serves inbound connections until Ctrl-C/SIGTERM or
    /// `shutdown_controller().trigger_shutdown()`, then drains.
    ///
    /// # Errors
    ///
    /// Returns an error if the app already ran or the listener cannot be bound.
    pub fn run(&self) -> anyhow::Result<()> {
        self.run_until(shutdown_signal())
    }

    /// Like [`App::run`], but stops when `shutdown` resolves instead of on
    /// process signals.
    ///
    /// An app serves at most once: its shutdown controller latches, so a
    /// stopped app stays stopped.
    ///
    /// # Errors
    ///
    /// Returns an error if shutdown was already triggered or the listener
    /// cannot be bound.
    pub fn run_until(&self, shutdown: impl Future<Output = ()> + Send) -> anyhow::Result<()> {
        if !self.shutdown.is_accepting() {
            anyhow::bail!(
                "app is {:?} and cannot serve again",
                self.shutdown.health_state()
            );
        }
        let config = self.config.read().clone();
        info!(
            "Serving {} task(s): {}",
            self.registry.len(),
            self.registry.names().join(", ")
        );

        self.runtime.block_on(async {
            let mut server = WorkerServer::new(config, Arc::clone(&self.registry), self.scheduler());
            let port = server.start().await?;
            // Port 0 binds an ephemeral port; calls must target the real one.
            self.config.write().port = port;
            server.serve(shutdown).await
        })
    }

    /// Dispatches `name` on the configured worker, blocking until the
    /// connection closes.
    ///
    /// Returns `Ok(None)` if the worker closed without answering.
    ///
    /// # Errors
    ///
    /// Returns a `CallError` if the exchange fails.
    ///
    /// # Panics
    ///
    /// Panics if called from within an async context.
    pub fn call(
        &self,
        name: &str,
        args: Args,
        kwargs: Kwargs,
    ) -> Result<Option<DispatchResponse>, CallError> {
        let caller = self.caller();
        self.runtime.block_on(caller.call(name, args, kwargs))
    }
}

impl std::fmt::Debug for App {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("App")
            .field("config", &*self.config.read())
            .field("registry", &self.registry)
            .field("health", &self.shutdown.health_state())
            .finish_non_exhaustive()
    }
}

fn build_runtime(config: &SchedulerConfig) -> std::io::Result<Runtime> {
    let mut builder = match config.worker_threads {
        Some(threads) => {
            let mut builder = Builder::new_multi_thread();
            builder.worker_threads(threads.max(1));
            builder
        }
        None => Builder::new_current_thread(),
    };
    debug!("Building scheduler runtime: {:?}", config);
    builder.thread_name(config.thread_name.clone()).enable_all().build()
}

/// Resolves on Ctrl-C, or SIGTERM on Unix.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl-C: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                tracing::error!("Failed to listen for SIGTERM: {}", err);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl-C"),
        () = terminate => info!("Received SIGTERM"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
