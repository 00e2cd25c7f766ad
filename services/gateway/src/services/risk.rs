//! Risk management service.
//!
//! Accumulates gross notional exposure per client from accepted order flow
//! and counts upstream error reports. Limit breaches are logged; blocking an
//! order is a matching-engine decision, not the gateway's.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{trace, warn};

use velo_types::{Message, MessageBody, MessageType};

use super::{run_ticker, warn_if_over_budget, Service, WorkerLifecycle, RISK_MANAGEMENT};

const HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(1);

/// Gross notional per client above which a breach warning is emitted.
pub const DEFAULT_EXPOSURE_LIMIT: f64 = 10_000_000.0;

pub struct RiskManagementService {
    lifecycle: WorkerLifecycle,
    exposure: Arc<Mutex<HashMap<u64, f64>>>,
    exposure_limit: f64,
    error_reports: AtomicU64,
    messages_processed: AtomicU64,
}

impl Default for RiskManagementService {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskManagementService {
    pub fn new() -> Self {
        Self::with_limit(DEFAULT_EXPOSURE_LIMIT)
    }

    pub fn with_limit(exposure_limit: f64) -> Self {
        Self {
            lifecycle: WorkerLifecycle::new(),
            exposure: Arc::new(Mutex::new(HashMap::new())),
            exposure_limit,
            error_reports: AtomicU64::new(0),
            messages_processed: AtomicU64::new(0),
        }
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn error_reports(&self) -> u64 {
        self.error_reports.load(Ordering::Relaxed)
    }

    /// Accumulated gross notional for one client.
    pub fn gross_exposure(&self, client_id: u64) -> f64 {
        self.exposure.lock().get(&client_id).copied().unwrap_or(0.0)
    }
}

#[async_trait]
impl Service for RiskManagementService {
    fn name(&self) -> &'static str {
        RISK_MANAGEMENT
    }

    async fn start(&self) {
        let Some(shutdown) = self.lifecycle.begin_start() else {
            return;
        };
        let exposure = Arc::clone(&self.exposure);
        let handle = tokio::spawn(run_ticker(
            RISK_MANAGEMENT,
            shutdown,
            HOUSEKEEPING_PERIOD,
            move || {
                trace!(clients = exposure.lock().len(), "exposure housekeeping");
            },
        ));
        self.lifecycle.store_worker(handle);
    }

    async fn stop(&self) {
        self.lifecycle.stop().await;
    }

    fn is_running(&self) -> bool {
        self.lifecycle.is_running()
    }

    fn process(&self, message: &Message) {
        if !self.is_running() {
            return;
        }
        let started = Instant::now();
        match &message.body {
            MessageBody::Order {
                price, quantity, ..
            } if message.kind == MessageType::OrderNew => {
                let notional = price * f64::from(*quantity);
                let mut exposure = self.exposure.lock();
                let total = exposure.entry(message.client_id).or_insert(0.0);
                *total += notional;
                let total = *total;
                drop(exposure);
                if total > self.exposure_limit {
                    warn!(
                        client_id = message.client_id,
                        gross_notional = total,
                        limit = self.exposure_limit,
                        "client exposure limit breached"
                    );
                }
            }
            MessageBody::Error { code, text } => {
                self.error_reports.fetch_add(1, Ordering::Relaxed);
                trace!(code = *code, text = text.as_str(), "upstream error report");
            }
            _ => {}
        }
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        warn_if_over_budget(RISK_MANAGEMENT, started);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn exposure_accumulates_per_client() {
        let service = RiskManagementService::new();
        service.start().await;

        let order = |client: u64, price: f64, qty: u32| {
            Message::order(MessageType::OrderNew, 1, "AAPL", price, qty, true)
                .with_client_id(client)
        };

        service.process(&order(7, 100.0, 10));
        service.process(&order(7, 50.0, 2));
        service.process(&order(8, 10.0, 1));

        assert_eq!(service.gross_exposure(7), 1_100.0);
        assert_eq!(service.gross_exposure(8), 10.0);
        assert_eq!(service.gross_exposure(9), 0.0);

        service.stop().await;
    }

    #[tokio::test]
    async fn cancels_and_fills_do_not_move_exposure() {
        let service = RiskManagementService::new();
        service.start().await;

        service.process(&Message::order(MessageType::OrderCancel, 1, "AAPL", 100.0, 10, true));
        service.process(&Message::order(MessageType::OrderFill, 1, "AAPL", 100.0, 10, true));
        assert_eq!(service.gross_exposure(0), 0.0);

        service.stop().await;
    }

    #[tokio::test]
    async fn error_reports_are_counted() {
        let service = RiskManagementService::new();
        service.start().await;

        service.process(&Message::error(4001, "venue rejected order"));
        service.process(&Message::error(4002, "stale quote"));
        assert_eq!(service.error_reports(), 2);

        service.stop().await;
    }
}
