//! End-to-end gateway tests: real sockets, the canonical chain, live
//! services, and graceful shutdown.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use velo_codec::encode;
use velo_gateway::config::GatewayConfig;
use velo_gateway::interceptor::InterceptorChain;
use velo_gateway::monitor::PerformanceMonitor;
use velo_gateway::registry::ServiceRegistry;
use velo_gateway::server::GatewayServer;
use velo_gateway::services::{MarketDataService, OrderMatchingService, RiskManagementService};
use velo_types::{Message, MessageType};

struct Harness {
    server: Arc<GatewayServer>,
    registry: Arc<ServiceRegistry>,
    monitor: Arc<PerformanceMonitor>,
    matching: Arc<OrderMatchingService>,
    market: Arc<MarketDataService>,
    risk: Arc<RiskManagementService>,
}

async fn start_gateway(config: GatewayConfig) -> Harness {
    let monitor = Arc::new(PerformanceMonitor::new());
    let registry = Arc::new(ServiceRegistry::new(config.queue_capacity, config.busy_poll));

    let matching = Arc::new(OrderMatchingService::new());
    let market = Arc::new(MarketDataService::new());
    let risk = Arc::new(RiskManagementService::new());
    registry.register(matching.clone());
    registry.register(market.clone());
    registry.register(risk.clone());

    let chain = Arc::new(InterceptorChain::standard(
        config.rate_limit,
        Arc::clone(&monitor),
    ));
    let server = Arc::new(
        GatewayServer::bind(config, chain, Arc::clone(&registry), Arc::clone(&monitor))
            .await
            .expect("bind on an ephemeral port"),
    );

    registry.start_all().await;
    server.start();

    Harness {
        server,
        registry,
        monitor,
        matching,
        market,
        risk,
    }
}

fn test_config() -> GatewayConfig {
    GatewayConfig {
        port: 0, // ephemeral
        ..Default::default()
    }
}

async fn wait_until(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(3);
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {}", what);
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn frames_flow_from_socket_to_services() {
    let gateway = start_gateway(test_config()).await;
    let mut client = TcpStream::connect(gateway.server.local_addr())
        .await
        .expect("connect");

    // Split the order frame across two writes to force partial-frame
    // buffering in the reader.
    let order = Message::order(MessageType::OrderNew, 900, "AAPL", 150.50, 100, true)
        .with_client_id(7);
    let frame = encode(&order);
    let (head, tail) = frame.split_at(frame.len() / 2);
    client.write_all(head).await.unwrap();
    client.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(5)).await;
    client.write_all(tail).await.unwrap();

    let quote = Message::market_data("AAPL", 150.45, 150.55, 1_000, 1_000).with_client_id(7);
    client.write_all(&encode(&quote)).await.unwrap();

    // Heartbeats broadcast to every running service.
    let heartbeat = Message::heartbeat(7);
    client.write_all(&encode(&heartbeat)).await.unwrap();
    client.flush().await.unwrap();

    wait_until("order reaches matching", || gateway.matching.open_orders() == 1).await;
    wait_until("quote reaches market data", || {
        gateway.market.last_quote("AAPL").is_some()
    })
    .await;
    wait_until("heartbeat reaches every service", || {
        gateway.risk.messages_processed() >= 1
    })
    .await;

    assert_eq!(gateway.server.messages_processed(), 3);
    assert_eq!(gateway.server.connection_count(), 1);
    assert!(gateway.monitor.sample_count() >= 3);

    gateway.server.stop().await;
    gateway.registry.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_messages_are_dropped_and_the_session_survives() {
    let gateway = start_gateway(test_config()).await;
    let mut client = TcpStream::connect(gateway.server.local_addr())
        .await
        .expect("connect");

    // Crossed market: rejected by the validator.
    let crossed = Message::market_data("AAPL", 150.55, 150.45, 1_000, 1_000);
    client.write_all(&encode(&crossed)).await.unwrap();

    // Undecodable bytes: discarded, connection kept.
    client.write_all(&[0u8; 32]).await.unwrap();
    client.flush().await.unwrap();

    // Let the reader consume and discard the garbage before sending more, so
    // the buffer clear cannot swallow the frame that follows.
    tokio::time::sleep(Duration::from_millis(50)).await;

    // The same session still delivers good traffic afterwards.
    let order = Message::order(MessageType::OrderNew, 901, "MSFT", 410.0, 10, false);
    client.write_all(&encode(&order)).await.unwrap();
    client.flush().await.unwrap();

    wait_until("valid order still flows", || gateway.matching.open_orders() == 1).await;
    assert!(gateway.server.messages_dropped() >= 2);
    assert_eq!(gateway.market.tracked_symbols(), 0);
    assert_eq!(gateway.server.connection_count(), 1);

    gateway.server.stop().await;
    gateway.registry.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn connection_limit_closes_excess_sessions() {
    let config = GatewayConfig {
        max_connections: 1,
        ..test_config()
    };
    let gateway = start_gateway(config).await;

    let _first = TcpStream::connect(gateway.server.local_addr())
        .await
        .expect("first connect");
    wait_until("first session registers", || {
        gateway.server.connection_count() == 1
    })
    .await;

    let mut second = TcpStream::connect(gateway.server.local_addr())
        .await
        .expect("second connect reaches the backlog");
    // The acceptor drops the session immediately; the peer observes EOF.
    let mut scratch = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(3), second.read(&mut scratch))
        .await
        .expect("EOF within deadline");
    assert!(matches!(read, Ok(0) | Err(_)));
    assert_eq!(gateway.server.connection_count(), 1);

    gateway.server.stop().await;
    gateway.registry.stop_all().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn graceful_shutdown_closes_sessions_and_services() {
    let gateway = start_gateway(test_config()).await;
    let mut client = TcpStream::connect(gateway.server.local_addr())
        .await
        .expect("connect");
    wait_until("session registers", || gateway.server.connection_count() == 1).await;

    gateway.server.stop().await;
    gateway.registry.stop_all().await;

    assert!(!gateway.server.is_running());
    assert_eq!(gateway.registry.active_count(), 0);
    wait_until("reader task exits", || gateway.server.connection_count() == 0).await;

    // The dropped socket surfaces as EOF or a reset on the client side.
    let mut scratch = [0u8; 1];
    let read = tokio::time::timeout(Duration::from_secs(3), client.read(&mut scratch))
        .await
        .expect("socket closes within deadline");
    assert!(matches!(read, Ok(0) | Err(_)));

    // New sessions find nobody accepting.
    let reconnect = TcpStream::connect(gateway.server.local_addr()).await;
    if let Ok(mut stream) = reconnect {
        let read = tokio::time::timeout(Duration::from_secs(3), stream.read(&mut scratch))
            .await
            .expect("stale backlog session closes");
        assert!(matches!(read, Ok(0) | Err(_)));
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn burst_of_traffic_is_counted_without_loss() {
    let gateway = start_gateway(test_config()).await;
    let mut client = TcpStream::connect(gateway.server.local_addr())
        .await
        .expect("connect");

    let mut stream_bytes = Vec::new();
    const BURST: usize = 1_000;
    for i in 0..BURST {
        let order = Message::order(
            MessageType::OrderNew,
            10_000 + i as u64,
            "AAPL",
            150.0,
            10,
            i % 2 == 0,
        );
        stream_bytes.extend_from_slice(&encode(&order));
    }
    client.write_all(&stream_bytes).await.unwrap();
    client.flush().await.unwrap();

    wait_until("burst fully dispatched", || {
        gateway.matching.messages_processed() as usize == BURST
    })
    .await;
    assert_eq!(gateway.server.messages_processed() as usize, BURST);
    assert_eq!(gateway.matching.open_orders(), BURST);
    assert_eq!(gateway.server.messages_dropped(), 0);

    gateway.server.stop().await;
    gateway.registry.stop_all().await;
}
