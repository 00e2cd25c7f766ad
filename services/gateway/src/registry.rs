//! # Service Registry and Dispatcher
//!
//! ## Purpose
//!
//! Process-wide named map of long-running services plus the bounded FIFO that
//! feeds them. Workers enqueue `(service_name, message)` items; a single
//! dispatcher task drains the FIFO in batches and invokes the target
//! service's handler.
//!
//! ## Concurrency
//!
//! The registry map sits behind one `RwLock` held only for lookups, never
//! across `Service::process`. The FIFO is a bounded mpsc channel; `send` is a
//! `try_send` so producers never block and see `QueueFull` under back
//! pressure. `broadcast` bypasses the FIFO and delivers synchronously from
//! the caller's task.
//!
//! The dispatcher waits on the queue with a timeout bounded by the shutdown
//! budget. With `busy_poll` enabled it uses the 10us wait plus a 1us pause
//! between batches; disabled, it waits 1ms per iteration and skips the
//! pause, trading tail latency for an idle queue that costs no CPU.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use velo_types::Message;

use crate::error::GatewayError;
use crate::services::Service;

/// Most items the dispatcher delivers per drain pass.
pub const BATCH_MAX: usize = 100;

const BUSY_QUEUE_WAIT: Duration = Duration::from_micros(10);
const IDLE_QUEUE_WAIT: Duration = Duration::from_millis(1);
const BATCH_PAUSE: Duration = Duration::from_micros(1);

type WorkItem = (String, Message);

pub struct ServiceRegistry {
    inner: Arc<RegistryInner>,
    queue_tx: mpsc::Sender<WorkItem>,
    queue_rx: Mutex<Option<mpsc::Receiver<WorkItem>>>,
    queue_capacity: usize,
    busy_poll: bool,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the dispatcher task.
struct RegistryInner {
    services: RwLock<HashMap<String, Arc<dyn Service>>>,
    running: AtomicBool,
}

impl ServiceRegistry {
    pub fn new(queue_capacity: usize, busy_poll: bool) -> Self {
        let (queue_tx, queue_rx) = mpsc::channel(queue_capacity);
        Self {
            inner: Arc::new(RegistryInner {
                services: RwLock::new(HashMap::new()),
                running: AtomicBool::new(false),
            }),
            queue_tx,
            queue_rx: Mutex::new(Some(queue_rx)),
            queue_capacity,
            busy_poll,
            dispatcher: Mutex::new(None),
        }
    }

    /// Insert a service under its name, replacing any previous holder.
    pub fn register(&self, service: Arc<dyn Service>) {
        let name = service.name().to_string();
        let previous = self.inner.services.write().insert(name.clone(), service);
        if previous.is_some() {
            warn!(service = %name, "replacing previously registered service");
        } else {
            info!(service = %name, "registered service");
        }
    }

    /// Stop the named service if it is running, then drop it from the map.
    pub async fn unregister(&self, name: &str) {
        let service = self.inner.services.read().get(name).cloned();
        let Some(service) = service else {
            return;
        };
        if service.is_running() {
            service.stop().await;
        }
        self.inner.services.write().remove(name);
        info!(service = name, "unregistered service");
    }

    /// Start every non-running service, then the dispatcher task exactly
    /// once.
    pub async fn start_all(&self) {
        let services: Vec<_> = self.inner.services.read().values().cloned().collect();
        for service in services {
            if !service.is_running() {
                service.start().await;
                info!(service = service.name(), "started service");
            }
        }

        self.inner.running.store(true, Ordering::Release);

        let mut slot = self.dispatcher.lock();
        if slot.is_none() {
            match self.queue_rx.lock().take() {
                Some(rx) => {
                    *slot = Some(tokio::spawn(dispatch_loop(
                        Arc::clone(&self.inner),
                        rx,
                        self.busy_poll,
                    )));
                }
                None => warn!("dispatch queue already consumed; dispatcher not restarted"),
            }
        }
    }

    /// Mark the registry stopped, stop every running service, and wait for
    /// the dispatcher to exit.
    pub async fn stop_all(&self) {
        self.inner.running.store(false, Ordering::Release);

        let services: Vec<_> = self.inner.services.read().values().cloned().collect();
        for service in services {
            if service.is_running() {
                service.stop().await;
                info!(service = service.name(), "stopped service");
            }
        }

        let handle = self.dispatcher.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }

    /// Enqueue a message for the named service.
    pub fn send(&self, name: &str, message: Message) -> Result<(), GatewayError> {
        self.queue_tx
            .try_send((name.to_string(), message))
            .map_err(|e| match e {
                TrySendError::Full(_) => GatewayError::QueueFull {
                    capacity: self.queue_capacity,
                },
                TrySendError::Closed(_) => GatewayError::QueueClosed,
            })
    }

    /// Deliver a message synchronously to every running service, bypassing
    /// the FIFO. Returns the delivery count.
    pub fn broadcast(&self, message: &Message) -> usize {
        let services: Vec<_> = self.inner.services.read().values().cloned().collect();
        let mut delivered = 0;
        for service in services {
            if service.is_running() {
                service.process(message);
                delivered += 1;
            }
        }
        delivered
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Service>> {
        self.inner.services.read().get(name).cloned()
    }

    /// Number of currently running services.
    pub fn active_count(&self) -> usize {
        self.inner
            .services
            .read()
            .values()
            .filter(|s| s.is_running())
            .count()
    }

    pub fn len(&self) -> usize {
        self.inner.services.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.services.read().is_empty()
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }
}

/// Single long-lived drain loop feeding all services.
async fn dispatch_loop(
    inner: Arc<RegistryInner>,
    mut rx: mpsc::Receiver<WorkItem>,
    busy_poll: bool,
) {
    debug!(busy_poll, "dispatcher started");
    let wait = if busy_poll {
        BUSY_QUEUE_WAIT
    } else {
        IDLE_QUEUE_WAIT
    };

    while inner.running.load(Ordering::Acquire) {
        let first = match timeout(wait, rx.recv()).await {
            Ok(Some(item)) => item,
            // Channel closed: every sender is gone, nothing left to drain.
            Ok(None) => break,
            // Timed out: poll the running flag again.
            Err(_) => continue,
        };

        let mut batch: Vec<WorkItem> = Vec::with_capacity(BATCH_MAX);
        batch.push(first);
        while batch.len() < BATCH_MAX {
            match rx.try_recv() {
                Ok(item) => batch.push(item),
                Err(_) => break,
            }
        }

        for (name, message) in batch {
            // Lookup under the lock, delivery outside it.
            let target = inner.services.read().get(&name).cloned();
            match target {
                Some(service) if service.is_running() => service.process(&message),
                _ => trace!(
                    service = %name,
                    sequence = message.sequence,
                    "dropping message for absent or stopped service"
                ),
            }
        }

        if busy_poll {
            tokio::time::sleep(BATCH_PAUSE).await;
        }
    }
    debug!("dispatcher stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::{
        MarketDataService, OrderMatchingService, RiskManagementService, MARKET_DATA,
        ORDER_MATCHING,
    };
    use async_trait::async_trait;
    use std::sync::atomic::AtomicBool;
    use velo_types::MessageType;

    /// Records the sequence numbers it sees, in order.
    struct RecordingService {
        running: AtomicBool,
        seen: Mutex<Vec<u64>>,
    }

    impl RecordingService {
        fn new() -> Self {
            Self {
                running: AtomicBool::new(false),
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl Service for RecordingService {
        fn name(&self) -> &'static str {
            "Recording"
        }

        async fn start(&self) {
            self.running.store(true, Ordering::Release);
        }

        async fn stop(&self) {
            self.running.store(false, Ordering::Release);
        }

        fn is_running(&self) -> bool {
            self.running.load(Ordering::Acquire)
        }

        fn process(&self, message: &Message) {
            self.seen.lock().push(message.sequence);
        }
    }

    async fn wait_until(mut done: impl FnMut() -> bool) {
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while !done() {
            assert!(
                std::time::Instant::now() < deadline,
                "condition not reached within deadline"
            );
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    #[tokio::test]
    async fn dispatcher_delivers_in_fifo_order() {
        let registry = ServiceRegistry::new(1024, true);
        let recording = Arc::new(RecordingService::new());
        registry.register(recording.clone());
        registry.start_all().await;

        let mut expected = Vec::new();
        for _ in 0..200 {
            let message = Message::heartbeat(1);
            expected.push(message.sequence);
            registry.send("Recording", message).expect("queue has room");
        }

        wait_until(|| recording.seen.lock().len() == 200).await;
        assert_eq!(*recording.seen.lock(), expected);

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn messages_for_unknown_services_are_dropped_silently() {
        let registry = ServiceRegistry::new(16, true);
        let recording = Arc::new(RecordingService::new());
        registry.register(recording.clone());
        registry.start_all().await;

        registry.send("Nowhere", Message::heartbeat(1)).unwrap();
        let tracked = Message::heartbeat(1);
        let seq = tracked.sequence;
        registry.send("Recording", tracked).unwrap();

        wait_until(|| !recording.seen.lock().is_empty()).await;
        assert_eq!(*recording.seen.lock(), vec![seq]);

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn full_queue_rejects_with_queue_full() {
        // Registry never started: nothing drains the queue.
        let registry = ServiceRegistry::new(2, true);
        registry.send("X", Message::heartbeat(1)).unwrap();
        registry.send("X", Message::heartbeat(1)).unwrap();
        match registry.send("X", Message::heartbeat(1)) {
            Err(GatewayError::QueueFull { capacity }) => assert_eq!(capacity, 2),
            other => panic!("expected QueueFull, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn broadcast_reaches_every_running_service_once() {
        let registry = ServiceRegistry::new(1024, true);
        let matching = Arc::new(OrderMatchingService::new());
        let market = Arc::new(MarketDataService::new());
        let risk = Arc::new(RiskManagementService::new());
        registry.register(matching.clone());
        registry.register(market.clone());
        registry.register(risk.clone());

        assert_eq!(registry.active_count(), 0);
        registry.start_all().await;
        assert_eq!(registry.active_count(), 3);

        let delivered = registry.broadcast(&Message::heartbeat(42));
        assert_eq!(delivered, 3);
        assert_eq!(matching.messages_processed(), 1);
        assert_eq!(market.messages_processed(), 1);
        assert_eq!(risk.messages_processed(), 1);

        registry.stop_all().await;
        assert_eq!(registry.active_count(), 0);
    }

    #[tokio::test]
    async fn broadcast_skips_stopped_services() {
        let registry = ServiceRegistry::new(64, true);
        let matching = Arc::new(OrderMatchingService::new());
        let market = Arc::new(MarketDataService::new());
        registry.register(matching.clone());
        registry.register(market.clone());
        registry.start_all().await;

        registry.get(MARKET_DATA).expect("registered").stop().await;
        let delivered = registry.broadcast(&Message::heartbeat(1));
        assert_eq!(delivered, 1);
        assert_eq!(market.messages_processed(), 0);

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn unregister_stops_the_service_first() {
        let registry = ServiceRegistry::new(64, true);
        let matching = Arc::new(OrderMatchingService::new());
        registry.register(matching.clone());
        registry.start_all().await;
        assert!(matching.is_running());

        registry.unregister(ORDER_MATCHING).await;
        assert!(!matching.is_running());
        assert!(registry.get(ORDER_MATCHING).is_none());

        registry.stop_all().await;
    }

    #[tokio::test]
    async fn register_overwrites_by_name() {
        let registry = ServiceRegistry::new(64, true);
        let first = Arc::new(OrderMatchingService::new());
        let second = Arc::new(OrderMatchingService::new());
        registry.register(first);
        registry.register(second.clone());
        assert_eq!(registry.len(), 1);

        registry.start_all().await;
        assert!(second.is_running());
        registry.stop_all().await;
    }

    #[tokio::test]
    async fn idle_poll_mode_still_delivers_and_stops() {
        let registry = ServiceRegistry::new(64, false);
        let recording = Arc::new(RecordingService::new());
        registry.register(recording.clone());
        registry.start_all().await;

        registry.send("Recording", Message::heartbeat(3)).unwrap();
        wait_until(|| !recording.seen.lock().is_empty()).await;

        registry.stop_all().await;
        assert!(!registry.is_running());
    }

    #[tokio::test]
    async fn orders_flow_to_the_matching_service() {
        let registry = ServiceRegistry::new(1024, true);
        let matching = Arc::new(OrderMatchingService::new());
        registry.register(matching.clone());
        registry.start_all().await;

        let order = Message::order(MessageType::OrderNew, 11, "AAPL", 150.0, 100, true);
        registry.send(ORDER_MATCHING, order).unwrap();

        wait_until(|| matching.open_orders() == 1).await;
        registry.stop_all().await;
    }
}
