//! The four standard gateway interceptors.

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::trace;

use velo_types::{MessageBody, MessageType};

use super::{Interceptor, InterceptorContext};
use crate::monitor::PerformanceMonitor;

const LATENCY_BUDGET_US: f64 = 10.0;
const THROTTLE_WINDOW: Duration = Duration::from_millis(1000);

/// Rejects messages that violate the data-model invariants.
///
/// Runs first in the canonical chain so malformed traffic is never charged
/// against the rate quota. Rejection reasons land in `metadata["error"]`.
pub struct ValidationInterceptor;

impl Interceptor for ValidationInterceptor {
    fn name(&self) -> &'static str {
        "validation"
    }

    fn intercept(&self, ctx: &mut InterceptorContext) -> bool {
        if let Some(reason) = validation_error(ctx) {
            ctx.set_metadata("error", reason);
            return false;
        }
        ctx.set_metadata("validation", "passed");
        true
    }
}

fn validation_error(ctx: &InterceptorContext) -> Option<&'static str> {
    let message = ctx.message();
    if message.sequence == 0 {
        return Some("Invalid sequence number");
    }
    if message.timestamp_us == 0 {
        return Some("Invalid timestamp");
    }

    match (&message.kind, &message.body) {
        (
            MessageType::OrderNew | MessageType::OrderCancel | MessageType::OrderReplace,
            MessageBody::Order {
                order_id,
                symbol,
                price,
                quantity,
                ..
            },
        ) => {
            if *order_id == 0 {
                return Some("Invalid order ID");
            }
            if symbol.is_empty() {
                return Some("Empty symbol");
            }
            if !(*price > 0.0) {
                return Some("Invalid price");
            }
            if *quantity == 0 {
                return Some("Invalid quantity");
            }
            None
        }
        (
            MessageType::MarketData,
            MessageBody::MarketData {
                symbol, bid, ask, ..
            },
        ) => {
            if symbol.is_empty() {
                return Some("Empty symbol");
            }
            if *bid < 0.0 || *ask < 0.0 {
                return Some("Invalid bid/ask");
            }
            if *bid >= *ask {
                return Some("Bid >= Ask");
            }
            None
        }
        _ => None,
    }
}

/// Captures a one-line summary of every message into `metadata["log"]`.
///
/// Never fails and never touches a sink; shipping the summary to a real log
/// backend is somebody else's job.
pub struct LoggingInterceptor;

impl Interceptor for LoggingInterceptor {
    fn name(&self) -> &'static str {
        "logging"
    }

    fn intercept(&self, ctx: &mut InterceptorContext) -> bool {
        let message = ctx.message();
        let summary = format!(
            "Processing message: Type={}, Seq={}, Client={}, Priority={}",
            message.kind as u8, message.sequence, message.client_id, message.priority as u8
        );
        trace!(
            kind = ?message.kind,
            sequence = message.sequence,
            client_id = message.client_id,
            "processing message"
        );
        ctx.set_metadata("log", summary);
        true
    }
}

/// Stops the context timer and records the in-band latency.
///
/// Always continues; a breach of the 10us budget only raises
/// `metadata["performance_warning"]` and feeds the shared monitor.
pub struct PerformanceInterceptor {
    monitor: Arc<PerformanceMonitor>,
}

impl PerformanceInterceptor {
    pub fn new(monitor: Arc<PerformanceMonitor>) -> Self {
        Self { monitor }
    }
}

impl Interceptor for PerformanceInterceptor {
    fn name(&self) -> &'static str {
        "performance"
    }

    fn intercept(&self, ctx: &mut InterceptorContext) -> bool {
        ctx.end_timer();
        let latency_us = ctx.latency_us();
        self.monitor.record_latency(latency_us);
        ctx.set_metadata("latency_us", latency_us.to_string());
        if latency_us > LATENCY_BUDGET_US {
            ctx.set_metadata("performance_warning", "Latency exceeds 10us threshold");
        }
        true
    }
}

/// Fixed-window admission limiter.
///
/// Windows are non-overlapping 1000ms slices; burst capacity equals
/// `max_per_second` per window. State is one mutex around the counter and
/// window start, shared by every worker.
pub struct ThrottlingInterceptor {
    max_per_second: usize,
    window: Mutex<ThrottleWindow>,
}

struct ThrottleWindow {
    started_at: Instant,
    count: usize,
}

impl ThrottlingInterceptor {
    pub fn new(max_per_second: usize) -> Self {
        Self {
            max_per_second,
            window: Mutex::new(ThrottleWindow {
                started_at: Instant::now(),
                count: 0,
            }),
        }
    }
}

impl Interceptor for ThrottlingInterceptor {
    fn name(&self) -> &'static str {
        "throttling"
    }

    fn intercept(&self, ctx: &mut InterceptorContext) -> bool {
        let now = Instant::now();
        let mut window = self.window.lock();

        if now.duration_since(window.started_at) >= THROTTLE_WINDOW {
            window.started_at = now;
            window.count = 0;
        }

        if window.count >= self.max_per_second {
            drop(window);
            ctx.set_metadata("throttled", "Rate limit exceeded");
            return false;
        }

        window.count += 1;
        drop(window);
        ctx.set_metadata("throttle_status", "accepted");
        true
    }
}
