//! # Interceptor Pipeline
//!
//! ## Purpose
//!
//! Ordered, composable cross-cutting policies applied to every inbound
//! message before it reaches the dispatcher. Each interceptor inspects a
//! per-message [`InterceptorContext`] and either lets processing continue or
//! short-circuits the chain.
//!
//! ## Architecture Role
//!
//! ```text
//! frame → codec → InterceptorContext → [Validator → Throttler → Logger → Performance] → dispatch
//! ```
//!
//! Validator runs first so malformed messages are never charged against the
//! rate quota; Performance runs last so it measures the full in-band cost.
//!
//! Interceptors are shared across connections and messages, so they are
//! stateless or carry their own internal locks. Contexts are single-owner and
//! live for exactly one message.

mod context;
mod standard;

pub use context::InterceptorContext;
pub use standard::{
    LoggingInterceptor, PerformanceInterceptor, ThrottlingInterceptor, ValidationInterceptor,
};

use std::sync::Arc;

use tracing::trace;

/// A unit of cross-cutting policy on the ingress path.
///
/// `intercept` returns `true` to continue the chain and `false` to stop it.
/// Implementations must not block on I/O; the whole chain shares a 10us
/// latency budget per message.
pub trait Interceptor: Send + Sync {
    fn name(&self) -> &'static str;
    fn intercept(&self, ctx: &mut InterceptorContext) -> bool;
}

/// Ordered composition of interceptors, short-circuiting on first rejection.
#[derive(Default)]
pub struct InterceptorChain {
    interceptors: Vec<Arc<dyn Interceptor>>,
}

impl InterceptorChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The canonical server chain: Validator → Throttler → Logger →
    /// Performance.
    pub fn standard(
        max_per_second: usize,
        monitor: Arc<crate::monitor::PerformanceMonitor>,
    ) -> Self {
        let mut chain = Self::new();
        chain.push(Arc::new(ValidationInterceptor));
        chain.push(Arc::new(ThrottlingInterceptor::new(max_per_second)));
        chain.push(Arc::new(LoggingInterceptor));
        chain.push(Arc::new(PerformanceInterceptor::new(monitor)));
        chain
    }

    /// Append an interceptor; insertion order is evaluation order.
    pub fn push(&mut self, interceptor: Arc<dyn Interceptor>) {
        self.interceptors.push(interceptor);
    }

    /// Run the chain over one context. Returns `false` as soon as any
    /// interceptor stops processing; later interceptors are not invoked.
    pub fn process(&self, ctx: &mut InterceptorContext) -> bool {
        for interceptor in &self.interceptors {
            if !interceptor.intercept(ctx) {
                trace!(
                    interceptor = interceptor.name(),
                    sequence = ctx.message().sequence,
                    "interceptor stopped message"
                );
                return false;
            }
        }
        true
    }

    pub fn clear(&mut self) {
        self.interceptors.clear();
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}
