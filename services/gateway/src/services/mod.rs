//! Long-running domain services and their lifecycle plumbing.
//!
//! A service is a named worker the dispatcher hands accepted messages to.
//! `process` runs on the dispatcher task and must stay inside the 10us
//! budget; anything heavier belongs on the service's own worker task.

mod market_data;
mod order_matching;
mod risk;

pub use market_data::{MarketDataService, Quote};
pub use order_matching::OrderMatchingService;
pub use risk::RiskManagementService;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use velo_types::Message;

/// Registry name of the order matching service.
pub const ORDER_MATCHING: &str = "OrderMatching";
/// Registry name of the market data fan-out service.
pub const MARKET_DATA: &str = "MarketData";
/// Registry name of the risk service.
pub const RISK_MANAGEMENT: &str = "RiskManagement";

/// Per-message budget for `Service::process`.
pub const PROCESS_BUDGET: Duration = Duration::from_micros(10);

/// A long-running domain worker owned by the registry.
#[async_trait]
pub trait Service: Send + Sync {
    fn name(&self) -> &'static str;

    /// Spawn the service's worker task. Idempotent while running.
    async fn start(&self);

    /// Stop the worker task and wait for it to exit. Idempotent while
    /// stopped.
    async fn stop(&self);

    fn is_running(&self) -> bool;

    /// Handle one message on the dispatcher task. Must not block; overruns
    /// of [`PROCESS_BUDGET`] are logged and swallowed, never propagated.
    fn process(&self, message: &Message);
}

/// Start/stop state shared by the concrete services.
///
/// Owns the running flag, the shutdown signal, and the worker join handle so
/// each service only contributes its domain logic.
pub(crate) struct WorkerLifecycle {
    running: AtomicBool,
    shutdown: watch::Sender<bool>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl WorkerLifecycle {
    pub(crate) fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            running: AtomicBool::new(false),
            shutdown,
            worker: Mutex::new(None),
        }
    }

    /// Transition to running. Returns a fresh shutdown receiver for the
    /// worker task, or `None` if the service was already running.
    pub(crate) fn begin_start(&self) -> Option<watch::Receiver<bool>> {
        if self.running.swap(true, Ordering::AcqRel) {
            return None;
        }
        // Reset the signal left over from a previous stop.
        let _ = self.shutdown.send(false);
        Some(self.shutdown.subscribe())
    }

    pub(crate) fn store_worker(&self, handle: JoinHandle<()>) {
        *self.worker.lock() = Some(handle);
    }

    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Signal the worker and wait for it to exit.
    pub(crate) async fn stop(&self) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let _ = self.shutdown.send(true);
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

/// Periodic housekeeping loop used by every service worker.
///
/// Waits with a timeout (never spins) and exits as soon as the shutdown
/// signal flips.
pub(crate) async fn run_ticker<F>(
    service: &'static str,
    mut shutdown: watch::Receiver<bool>,
    period: Duration,
    mut on_tick: F,
) where
    F: FnMut() + Send,
{
    debug!(service, "worker started");
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => on_tick(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(service, "worker stopped");
}

/// Log a warning when a `process` call overruns [`PROCESS_BUDGET`].
pub(crate) fn warn_if_over_budget(service: &'static str, started: Instant) {
    let elapsed = started.elapsed();
    if elapsed > PROCESS_BUDGET {
        warn!(
            service,
            latency_us = elapsed.as_secs_f64() * 1_000_000.0,
            "process exceeded 10us budget"
        );
    }
}
