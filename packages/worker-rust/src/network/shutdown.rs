//! Worker lifecycle state and in-flight work tracking.
//!
//! The controller is shared by the accept loop, every connection, and every
//! scheduled task. Connections and tasks hold an `InFlightGuard`; shutdown
//! stops accepting, flips the state to `Draining`, and waits for the guard
//! count to reach zero.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tokio::sync::{watch, Notify};

/// Worker lifecycle: `Starting -> Ready -> Draining -> Stopped`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    /// Constructed, listener not yet accepting.
    Starting,
    /// Accepting connections and scheduling tasks.
    Ready,
    /// Listener closed; new dispatches are refused while in-flight work finishes.
    Draining,
    /// All tracked work has finished.
    Stopped,
}

#[derive(Debug, Default)]
struct InFlight {
    count: AtomicU64,
    idle: Notify,
}

/// Coordinates shutdown between the accept loop and in-flight work.
#[derive(Debug)]
pub struct ShutdownController {
    signal: watch::Sender<bool>,
    in_flight: Arc<InFlight>,
    state: ArcSwap<HealthState>,
}

impl ShutdownController {
    #[must_use]
    pub fn new() -> Self {
        let (signal, _rx) = watch::channel(false);
        Self {
            signal,
            in_flight: Arc::new(InFlight::default()),
            state: ArcSwap::from_pointee(HealthState::Starting),
        }
    }

    pub fn set_ready(&self) {
        self.state.store(Arc::new(HealthState::Ready));
    }

    #[must_use]
    pub fn health_state(&self) -> HealthState {
        **self.state.load()
    }

    /// Returns `true` while new tasks may still be scheduled.
    #[must_use]
    pub fn is_accepting(&self) -> bool {
        matches!(
            self.health_state(),
            HealthState::Starting | HealthState::Ready
        )
    }

    /// Resolves once `trigger_shutdown` has been called (immediately if it
    /// already was).
    pub async fn triggered(&self) {
        let mut rx = self.signal.subscribe();
        // An error means the sender is gone, which cannot outlive `self`.
        let _ = rx.wait_for(|triggered| *triggered).await;
    }

    /// Moves to `Draining` and notifies every shutdown receiver.
    pub fn trigger_shutdown(&self) {
        self.state.store(Arc::new(HealthState::Draining));
        self.signal.send_replace(true);
    }

    /// Tracks one unit of in-flight work until the guard is dropped.
    #[must_use]
    pub fn in_flight_guard(&self) -> InFlightGuard {
        self.in_flight.count.fetch_add(1, Ordering::AcqRel);
        InFlightGuard {
            in_flight: Arc::clone(&self.in_flight),
        }
    }

    #[must_use]
    pub fn in_flight_count(&self) -> u64 {
        self.in_flight.count.load(Ordering::Acquire)
    }

    /// Waits until no work is in flight or `timeout` expires.
    ///
    /// Returns `true` and moves to `Stopped` on a clean drain; returns `false`
    /// and stays `Draining` on timeout.
    pub async fn wait_for_drain(&self, timeout: Duration) -> bool {
        let drained = tokio::time::timeout(timeout, async {
            loop {
                let idle = self.in_flight.idle.notified();
                if self.in_flight_count() == 0 {
                    return;
                }
                idle.await;
            }
        })
        .await
        .is_ok();

        if drained {
            self.state.store(Arc::new(HealthState::Stopped));
        }
        drained
    }
}

impl Default for ShutdownController {
    fn default() -> Self {
        Self::new()
    }
}

/// Decrements the in-flight count on drop, including during unwinding.
#[derive(Debug)]
pub struct InFlightGuard {
    in_flight: Arc<InFlight>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        if self.in_flight.count.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.in_flight.idle.notify_waiters();
        }
    }
}
