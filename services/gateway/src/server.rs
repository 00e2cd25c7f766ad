//! # Gateway Socket Server
//!
//! ## Purpose
//!
//! The TCP front door: accepts client sessions, reads length-implicit binary
//! frames, decodes them, runs every message through the interceptor chain,
//! and routes accepted messages into the dispatcher.
//!
//! ## Architecture Role
//!
//! ```text
//! TCP bytes → per-connection framer → codec → InterceptorChain → dispatcher → service
//! ```
//!
//! ## Concurrency
//!
//! One acceptor task plus one reader task per connection, multiplexed by the
//! runtime's reactor onto the pinned worker threads the binary configures.
//! Every task polls the running flag at 1ms granularity, which bounds
//! shutdown latency to roughly one poll interval. Messages from a single
//! connection are decoded and processed in arrival order; no ordering holds
//! across connections.
//!
//! ## Error Handling
//!
//! Per-frame errors (truncation, unknown tags) drop the frame or the read
//! buffer and keep the connection. Socket errors close only that connection.
//! Only `bind` failures are fatal.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::{Buf, BytesMut};
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpSocket, TcpStream};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, trace, warn};

use velo_codec::{decode, DecodeError, MAX_FRAME_LEN};
use velo_types::{Message, MessageType};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::interceptor::{InterceptorChain, InterceptorContext};
use crate::monitor::PerformanceMonitor;
use crate::registry::ServiceRegistry;
use crate::services::{MARKET_DATA, ORDER_MATCHING, RISK_MANAGEMENT};

const POLL_INTERVAL: Duration = Duration::from_millis(1);
const LISTEN_BACKLOG: u32 = 1024;

fn init_err(context: &'static str) -> impl FnOnce(std::io::Error) -> GatewayError {
    move |source| GatewayError::Init { context, source }
}

/// Dispatch target per message kind. Heartbeats go to every running service.
fn route_target(kind: MessageType) -> Option<&'static str> {
    match kind {
        MessageType::OrderNew
        | MessageType::OrderCancel
        | MessageType::OrderReplace
        | MessageType::OrderFill => Some(ORDER_MATCHING),
        MessageType::MarketData => Some(MARKET_DATA),
        MessageType::Error => Some(RISK_MANAGEMENT),
        MessageType::Heartbeat | MessageType::Login | MessageType::Logout => None,
    }
}

pub struct GatewayServer {
    inner: Arc<ServerInner>,
    listener: Mutex<Option<TcpListener>>,
    local_addr: SocketAddr,
    acceptor: Mutex<Option<JoinHandle<()>>>,
}

/// State shared with the acceptor and the per-connection reader tasks.
struct ServerInner {
    config: GatewayConfig,
    chain: Arc<InterceptorChain>,
    registry: Arc<ServiceRegistry>,
    monitor: Arc<PerformanceMonitor>,
    running: AtomicBool,
    active_connections: AtomicUsize,
    messages_processed: AtomicU64,
    messages_dropped: AtomicU64,
}

impl GatewayServer {
    /// Create the listening socket with the low-latency options applied and
    /// wire up the processing pipeline. Fatal on failure.
    pub async fn bind(
        config: GatewayConfig,
        chain: Arc<InterceptorChain>,
        registry: Arc<ServiceRegistry>,
        monitor: Arc<PerformanceMonitor>,
    ) -> Result<Self, GatewayError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
        let socket = TcpSocket::new_v4().map_err(init_err("create socket"))?;
        socket
            .set_reuseaddr(true)
            .map_err(init_err("set SO_REUSEADDR"))?;

        // Buffer sizes set on the listener are inherited by accepted sockets.
        let buffer = config.clamped_buffer_size() as u32;
        if let Err(e) = socket.set_send_buffer_size(buffer) {
            warn!(error = %e, "could not set send buffer size");
        }
        if let Err(e) = socket.set_recv_buffer_size(buffer) {
            warn!(error = %e, "could not set receive buffer size");
        }

        socket.bind(addr).map_err(init_err("bind"))?;
        let listener = socket.listen(LISTEN_BACKLOG).map_err(init_err("listen"))?;
        let local_addr = listener.local_addr().map_err(init_err("local_addr"))?;

        info!(
            addr = %local_addr,
            max_connections = config.max_connections,
            buffer_size = config.clamped_buffer_size(),
            "gateway listening"
        );

        Ok(Self {
            inner: Arc::new(ServerInner {
                config,
                chain,
                registry,
                monitor,
                running: AtomicBool::new(false),
                active_connections: AtomicUsize::new(0),
                messages_processed: AtomicU64::new(0),
                messages_dropped: AtomicU64::new(0),
            }),
            listener: Mutex::new(Some(listener)),
            local_addr,
            acceptor: Mutex::new(None),
        })
    }

    /// Address actually bound; with port 0 this carries the assigned port.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Spawn the acceptor task. Idempotent while running.
    pub fn start(&self) {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let Some(listener) = self.listener.lock().take() else {
            warn!("listener already consumed; server not restarted");
            return;
        };
        let inner = Arc::clone(&self.inner);
        *self.acceptor.lock() = Some(tokio::spawn(accept_loop(inner, listener)));
        info!(threads = self.inner.config.thread_count, "gateway server started");
    }

    /// Flip the running flag and wait for the acceptor to exit. Reader tasks
    /// observe the flag within one poll interval and close their sockets on
    /// drop.
    pub async fn stop(&self) {
        if !self.inner.running.swap(false, Ordering::AcqRel) {
            return;
        }
        let handle = self.acceptor.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        info!("gateway server stopped");
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    pub fn connection_count(&self) -> usize {
        self.inner.active_connections.load(Ordering::Acquire)
    }

    /// Messages accepted by the chain and handed to the dispatcher.
    pub fn messages_processed(&self) -> u64 {
        self.inner.messages_processed.load(Ordering::Relaxed)
    }

    /// Messages rejected by the chain or shed under back pressure.
    pub fn messages_dropped(&self) -> u64 {
        self.inner.messages_dropped.load(Ordering::Relaxed)
    }

    pub fn average_latency(&self) -> f64 {
        self.inner.monitor.average_latency()
    }
}

impl ServerInner {
    /// Decode complete frames off the front of `buf`, retaining any partial
    /// trailing frame for the next read.
    fn drain_frames(&self, buf: &mut BytesMut, peer: SocketAddr) {
        loop {
            if buf.is_empty() {
                return;
            }
            match decode(&buf[..]) {
                Ok((mut message, consumed)) => {
                    buf.advance(consumed);
                    message.receive_time = Some(Instant::now());
                    self.handle_message(message);
                }
                Err(DecodeError::Truncated { .. }) => {
                    if buf.len() >= MAX_FRAME_LEN {
                        // No legal frame is this long; the stream lost its
                        // framing. Drop the buffer, keep the session.
                        warn!(
                            %peer,
                            buffered = buf.len(),
                            "desynchronized stream, discarding read buffer"
                        );
                        buf.clear();
                    }
                    return;
                }
                Err(e @ DecodeError::UnknownType { .. }) => {
                    warn!(%peer, error = %e, "undecodable frame, discarding read buffer");
                    self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    buf.clear();
                    return;
                }
            }
        }
    }

    /// Run one decoded message through the chain and route it.
    fn handle_message(&self, message: Message) {
        let mut ctx = InterceptorContext::new(message);
        if !self.chain.process(&mut ctx) {
            self.messages_dropped.fetch_add(1, Ordering::Relaxed);
            trace!(
                sequence = ctx.message().sequence,
                error = ctx.metadata("error").unwrap_or_default(),
                throttled = ctx.metadata("throttled").unwrap_or_default(),
                "message rejected by chain"
            );
            return;
        }

        let message = ctx.into_message();
        match route_target(message.kind) {
            Some(service) => {
                if let Err(e) = self.registry.send(service, message) {
                    self.messages_dropped.fetch_add(1, Ordering::Relaxed);
                    warn!(service, error = %e, "dropping accepted message");
                    return;
                }
            }
            None => {
                self.registry.broadcast(&message);
            }
        }
        self.messages_processed.fetch_add(1, Ordering::Relaxed);
    }
}

/// Accept sessions until the running flag drops.
async fn accept_loop(inner: Arc<ServerInner>, listener: TcpListener) {
    debug!("acceptor started");
    while inner.running.load(Ordering::Acquire) {
        let (stream, peer) = match timeout(POLL_INTERVAL, listener.accept()).await {
            Ok(Ok(accepted)) => accepted,
            Ok(Err(e)) => {
                warn!(error = %e, "accept failed");
                continue;
            }
            Err(_) => continue,
        };

        if inner.active_connections.load(Ordering::Acquire) >= inner.config.max_connections {
            warn!(%peer, "connection limit reached, closing new session");
            drop(stream);
            continue;
        }

        if let Err(e) = stream.set_nodelay(true) {
            warn!(%peer, error = %e, "could not set TCP_NODELAY");
        }

        let total = inner.active_connections.fetch_add(1, Ordering::AcqRel) + 1;
        debug!(%peer, total, "accepted connection");
        tokio::spawn(connection_loop(Arc::clone(&inner), stream, peer));
    }
    debug!("acceptor stopped");
}

/// Read frames from one session until EOF, error, or shutdown.
async fn connection_loop(inner: Arc<ServerInner>, mut stream: TcpStream, peer: SocketAddr) {
    let mut buf = BytesMut::with_capacity(inner.config.clamped_buffer_size());

    while inner.running.load(Ordering::Acquire) {
        match timeout(POLL_INTERVAL, stream.read_buf(&mut buf)).await {
            // Timed out: poll the running flag again.
            Err(_) => continue,
            Ok(Ok(0)) => {
                debug!(%peer, "peer closed connection");
                break;
            }
            Ok(Ok(_)) => inner.drain_frames(&mut buf, peer),
            Ok(Err(e)) => {
                debug!(%peer, error = %e, "read failed, closing connection");
                break;
            }
        }
    }

    let remaining = inner.active_connections.fetch_sub(1, Ordering::AcqRel) - 1;
    debug!(%peer, remaining, "connection closed");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn routing_matches_the_service_map() {
        assert_eq!(route_target(MessageType::OrderNew), Some(ORDER_MATCHING));
        assert_eq!(route_target(MessageType::OrderFill), Some(ORDER_MATCHING));
        assert_eq!(route_target(MessageType::MarketData), Some(MARKET_DATA));
        assert_eq!(route_target(MessageType::Error), Some(RISK_MANAGEMENT));
        assert_eq!(route_target(MessageType::Heartbeat), None);
    }
}
