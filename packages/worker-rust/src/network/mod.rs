//! Networking: configuration, connection state machines, listener, shutdown.

pub mod caller;
pub mod config;
pub mod server;
pub mod shutdown;
pub mod worker;

pub use caller::{CallError, Caller, CallerConnection, CallerState};
pub use config::{ConnectionConfig, NetworkConfig, DEFAULT_HOST, DEFAULT_PORT};
pub use server::WorkerServer;
pub use shutdown::{HealthState, InFlightGuard, ShutdownController};
pub use worker::{WorkerConnection, WorkerState};
