//! Task registration and scheduling.
//!
//! 1. **Tasks** (`task`): binding closures and argument extraction
//! 2. **Registry** (`registry`): name -> task lookup
//! 3. **Scheduler** (`scheduler`): explicit runtime handle that runs dispatched tasks

pub mod config;
pub mod registry;
pub mod scheduler;
pub mod task;

pub use config::SchedulerConfig;
pub use registry::TaskRegistry;
pub use scheduler::{DispatchError, DispatchId, Scheduler};
pub use task::{task_fn, ArgumentError, BoundArgs, TaskArgs, TaskFn, TaskFuture};
