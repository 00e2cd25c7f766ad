//! Gateway error kinds.
//!
//! Per-message failures (validation, throttling, decode) never surface here;
//! they are recorded in context metadata or logged and the message dropped.
//! This enum covers the conditions a caller can actually react to.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    /// Non-recoverable startup failure; the process exits with status 1.
    #[error("initialization failed ({context}): {source}")]
    Init {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    /// Dispatcher back-pressure: the bounded FIFO is at capacity.
    #[error("dispatch queue full ({capacity} entries)")]
    QueueFull { capacity: usize },

    /// The dispatch queue receiver is gone; no further sends can succeed.
    #[error("dispatch queue closed")]
    QueueClosed,
}
