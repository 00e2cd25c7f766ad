//! # Velo Gateway - Low-Latency Message Plane
//!
//! ## Purpose
//!
//! TCP front-end for a trading gateway. Client sessions stream length-implicit
//! binary frames; the gateway decodes each message, applies an ordered chain
//! of cross-cutting policies, and dispatches accepted messages to long-running
//! domain services through a bounded FIFO. A shared monitor tracks the
//! per-message latency distribution against the 10us budget.
//!
//! ## Data Flow
//!
//! ```text
//! TCP bytes → framer → velo-codec → InterceptorContext → InterceptorChain
//!                                                              ↓
//!                 OrderMatching / MarketData / RiskManagement ← dispatcher
//! ```
//!
//! ## What This Crate Contains
//! - [`server::GatewayServer`]: acceptor plus per-connection framed readers
//! - [`interceptor`]: the policy chain (validation, throttling, logging,
//!   latency measurement)
//! - [`registry::ServiceRegistry`]: named services, bounded dispatch FIFO,
//!   the dispatcher task
//! - [`monitor::PerformanceMonitor`]: sliding-window latency percentiles
//!
//! ## What This Crate Does NOT Contain
//! - Wire format rules (`velo-codec`) or message data structures
//!   (`velo-types`)
//! - Real matching, fan-out, or risk logic; the bundled services keep just
//!   enough state to be observable

pub mod config;
pub mod error;
pub mod interceptor;
pub mod monitor;
pub mod registry;
pub mod server;
pub mod services;

pub use config::GatewayConfig;
pub use error::GatewayError;
pub use interceptor::{InterceptorChain, InterceptorContext};
pub use monitor::PerformanceMonitor;
pub use registry::ServiceRegistry;
pub use server::GatewayServer;
