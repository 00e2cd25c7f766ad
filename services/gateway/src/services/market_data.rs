//! Market data fan-out service.
//!
//! Tracks the last quote per symbol; downstream subscribers read the
//! consolidated view rather than the raw feed.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use velo_types::{Message, MessageBody};

use super::{run_ticker, warn_if_over_budget, Service, WorkerLifecycle, MARKET_DATA};

const HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(1);

/// Last observed top-of-book for one symbol.
#[derive(Debug, Clone, PartialEq)]
pub struct Quote {
    pub bid: f64,
    pub ask: f64,
    pub bid_size: u32,
    pub ask_size: u32,
    pub timestamp_us: u64,
}

pub struct MarketDataService {
    lifecycle: WorkerLifecycle,
    quotes: Arc<Mutex<HashMap<String, Quote>>>,
    messages_processed: AtomicU64,
}

impl Default for MarketDataService {
    fn default() -> Self {
        Self::new()
    }
}

impl MarketDataService {
    pub fn new() -> Self {
        Self {
            lifecycle: WorkerLifecycle::new(),
            quotes: Arc::new(Mutex::new(HashMap::new())),
            messages_processed: AtomicU64::new(0),
        }
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    pub fn last_quote(&self, symbol: &str) -> Option<Quote> {
        self.quotes.lock().get(symbol).cloned()
    }

    pub fn tracked_symbols(&self) -> usize {
        self.quotes.lock().len()
    }
}

#[async_trait]
impl Service for MarketDataService {
    fn name(&self) -> &'static str {
        MARKET_DATA
    }

    async fn start(&self) {
        let Some(shutdown) = self.lifecycle.begin_start() else {
            return;
        };
        let quotes = Arc::clone(&self.quotes);
        let handle = tokio::spawn(run_ticker(
            MARKET_DATA,
            shutdown,
            HOUSEKEEPING_PERIOD,
            move || {
                trace!(symbols = quotes.lock().len(), "quote table housekeeping");
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
        if let MessageBody::MarketData {
            symbol,
            bid,
            ask,
            bid_size,
            ask_size,
        } = &message.body
        {
            self.quotes.lock().insert(
                symbol.clone(),
                Quote {
                    bid: *bid,
                    ask: *ask,
                    bid_size: *bid_size,
                    ask_size: *ask_size,
                    timestamp_us: message.timestamp_us,
                },
            );
        }
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        warn_if_over_budget(MARKET_DATA, started);
    }
}
