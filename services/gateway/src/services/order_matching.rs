//! Order matching service.
//!
//! Keeps the live order set current from the inbound order flow. The actual
//! matching engine sits behind this service; the gateway's contract ends at
//! handing it a consistent book view.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::trace;

use velo_types::{Message, MessageBody, MessageType};

use super::{run_ticker, warn_if_over_budget, Service, WorkerLifecycle, ORDER_MATCHING};

const HOUSEKEEPING_PERIOD: Duration = Duration::from_secs(1);

#[derive(Debug, Clone)]
struct RestingOrder {
    symbol: String,
    price: f64,
    quantity: u32,
    is_buy: bool,
}

pub struct OrderMatchingService {
    lifecycle: WorkerLifecycle,
    book: Arc<Mutex<HashMap<u64, RestingOrder>>>,
    messages_processed: AtomicU64,
}

impl Default for OrderMatchingService {
    fn default() -> Self {
        Self::new()
    }
}

impl OrderMatchingService {
    pub fn new() -> Self {
        Self {
            lifecycle: WorkerLifecycle::new(),
            book: Arc::new(Mutex::new(HashMap::new())),
            messages_processed: AtomicU64::new(0),
        }
    }

    pub fn messages_processed(&self) -> u64 {
        self.messages_processed.load(Ordering::Relaxed)
    }

    /// Number of currently resting orders.
    pub fn open_orders(&self) -> usize {
        self.book.lock().len()
    }

    fn apply(&self, kind: MessageType, body: &MessageBody) {
        let MessageBody::Order {
            order_id,
            symbol,
            price,
            quantity,
            is_buy,
        } = body
        else {
            return;
        };

        let mut book = self.book.lock();
        match kind {
            MessageType::OrderNew => {
                book.insert(
                    *order_id,
                    RestingOrder {
                        symbol: symbol.clone(),
                        price: *price,
                        quantity: *quantity,
                        is_buy: *is_buy,
                    },
                );
            }
            MessageType::OrderCancel => {
                book.remove(order_id);
            }
            MessageType::OrderReplace => {
                if let Some(resting) = book.get_mut(order_id) {
                    resting.price = *price;
                    resting.quantity = *quantity;
                }
            }
            MessageType::OrderFill => {
                if let Some(resting) = book.get_mut(order_id) {
                    resting.quantity = resting.quantity.saturating_sub(*quantity);
                    if resting.quantity == 0 {
                        book.remove(order_id);
                    }
                }
            }
            _ => {}
        }
    }
}

#[async_trait]
impl Service for OrderMatchingService {
    fn name(&self) -> &'static str {
        ORDER_MATCHING
    }

    async fn start(&self) {
        let Some(shutdown) = self.lifecycle.begin_start() else {
            return;
        };
        let book = Arc::clone(&self.book);
        let handle = tokio::spawn(run_ticker(
            ORDER_MATCHING,
            shutdown,
            HOUSEKEEPING_PERIOD,
            move || {
                trace!(resting_orders = book.lock().len(), "book housekeeping");
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
        self.apply(message.kind, &message.body);
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
        warn_if_over_budget(ORDER_MATCHING, started);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn order_flow_maintains_the_live_set() {
        let service = OrderMatchingService::new();
        service.start().await;

        service.process(&Message::order(MessageType::OrderNew, 1, "AAPL", 150.0, 100, true));
        service.process(&Message::order(MessageType::OrderNew, 2, "MSFT", 410.0, 50, false));
        assert_eq!(service.open_orders(), 2);

        service.process(&Message::order(MessageType::OrderFill, 1, "AAPL", 150.0, 40, true));
        assert_eq!(service.open_orders(), 2, "partial fill keeps the order resting");

        service.process(&Message::order(MessageType::OrderFill, 1, "AAPL", 150.0, 60, true));
        assert_eq!(service.open_orders(), 1, "full fill removes the order");

        service.process(&Message::order(MessageType::OrderCancel, 2, "MSFT", 410.0, 50, false));
        assert_eq!(service.open_orders(), 0);
        assert_eq!(service.messages_processed(), 4);

        service.stop().await;
        assert!(!service.is_running());
    }

    #[tokio::test]
    async fn stopped_service_ignores_messages() {
        let service = OrderMatchingService::new();
        service.process(&Message::order(MessageType::OrderNew, 1, "AAPL", 150.0, 100, true));
        assert_eq!(service.messages_processed(), 0);
        assert_eq!(service.open_orders(), 0);
    }

    #[tokio::test]
    async fn start_and_stop_are_idempotent() {
        let service = OrderMatchingService::new();
        service.start().await;
        service.start().await;
        assert!(service.is_running());
        service.stop().await;
        service.stop().await;
        assert!(!service.is_running());
    }
}
