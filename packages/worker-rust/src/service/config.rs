/// Scheduler (runtime) configuration for an orchestrator.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// `None` runs everything on a single cooperative thread. `Some(n)` uses
    /// a multi-threaded runtime with `n` workers.
    pub worker_threads: Option<usize>,
    /// Name given to runtime threads.
    pub thread_name: String,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            thread_name: "crate-worker".to_string(),
        }
    }
}
