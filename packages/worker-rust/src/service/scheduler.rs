//! Explicit scheduler handle shared by the accept loop, connections, and tasks.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::task::{ArgumentError, TaskArgs, TaskFn};
use crate::network::shutdown::ShutdownController;

/// Correlation token assigned to every accepted dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DispatchId(String);

impl DispatchId {
    /// Generates a fresh UUID v4 identifier.
    #[must_use]
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for DispatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for DispatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<DispatchId> for String {
    fn from(id: DispatchId) -> Self {
        id.0
    }
}

/// Reasons a task could not be scheduled.
#[derive(Debug, thiserror::Error)]
pub enum DispatchError {
    #[error(transparent)]
    Arguments(#[from] ArgumentError),
    #[error("worker is shutting down and no longer schedules tasks")]
    Draining,
}

/// Handle to the runtime that runs connections and dispatched tasks.
///
/// Cloned into every handler; never a process-wide global, so several
/// orchestrators can coexist in one process.
#[derive(Debug, Clone)]
pub struct Scheduler {
    handle: Handle,
    shutdown: Arc<ShutdownController>,
}

impl Scheduler {
    #[must_use]
    pub fn new(handle: Handle, shutdown: Arc<ShutdownController>) -> Self {
        Self { handle, shutdown }
    }

    /// Builds a scheduler on the runtime of the calling task.
    ///
    /// # Panics
    ///
    /// Panics when called outside a tokio runtime.
    #[must_use]
    pub fn current(shutdown: Arc<ShutdownController>) -> Self {
        Self::new(Handle::current(), shutdown)
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> &Arc<ShutdownController> {
        &self.shutdown
    }

    /// Binds `args` to `task` and schedules the resulting future.
    ///
    /// Returns once the task is queued; its outcome is only logged.
    ///
    /// # Errors
    ///
    /// Returns `DispatchError::Draining` during shutdown, or
    /// `DispatchError::Arguments` when binding fails. Nothing is scheduled
    /// in either case.
    pub fn dispatch(
        &self,
        id: &DispatchId,
        name: &str,
        task: &TaskFn,
        args: TaskArgs,
    ) -> Result<(), DispatchError> {
        if !self.shutdown.is_accepting() {
            return Err(DispatchError::Draining);
        }

        let future = task(args)?;
        let guard = self.shutdown.in_flight_guard();
        let id = id.clone();
        let name = name.to_string();

        self.handle.spawn(async move {
            let _guard = guard;
            match future.await {
                Ok(()) => debug!("(task:{}) '{}' completed", id, name),
                Err(err) => warn!("(task:{}) '{}' failed: {:#}", id, name, err),
            }
        });
        Ok(())
    }

    /// Spawns tracked infrastructure work (e.g. a connection handler).
    pub fn spawn<F>(&self, future: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let guard = self.shutdown.in_flight_guard();
        self.handle.spawn(async move {
            let _guard = guard;
            future.await;
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
