//! Name -> task mapping consulted by every inbound request.

use dashmap::DashMap;
use tracing::{debug, info};

use super::task::TaskFn;

/// Registry of dispatchable tasks.
///
/// Populated during startup and only read once the worker is serving.
/// Registering a name twice replaces the earlier task (last writer wins).
#[derive(Default)]
pub struct TaskRegistry {
    tasks: DashMap<String, TaskFn>,
}

impl TaskRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: DashMap::new(),
        }
    }

    /// Stores `task` under `name`, silently replacing any previous entry.
    pub fn register(&self, name: impl Into<String>, task: TaskFn) {
        let name = name.into();
        if self.tasks.insert(name.clone(), task).is_some() {
            debug!("Replaced task registered as '{}'", name);
        } else {
            info!("Registered task '{}'", name);
        }
    }

    /// Returns the task registered under `name`, if any.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<TaskFn> {
        self.tasks.get(name).map(|entry| entry.value().clone())
    }

    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.tasks.contains_key(name)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Registered task names in sorted order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tasks.iter().map(|entry| entry.key().clone()).collect();
        names.sort_unstable();
        names
    }
}

impl std::fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.names())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
