//! Per-message interceptor context.

use std::time::Instant;

use velo_types::Message;

/// Single-owner state for one message's trip through the chain.
///
/// Holds the message, a start/end timer pair, and a small metadata map.
/// Metadata is a plain array of pairs: the map holds at most a handful of
/// entries, where a linear scan beats hashing.
pub struct InterceptorContext {
    message: Message,
    started_at: Instant,
    ended_at: Option<Instant>,
    metadata: Vec<(&'static str, String)>,
}

impl InterceptorContext {
    /// Wrap a message entering the pipeline; the timer starts immediately.
    pub fn new(message: Message) -> Self {
        Self {
            message,
            started_at: Instant::now(),
            ended_at: None,
            metadata: Vec::with_capacity(6),
        }
    }

    pub fn message(&self) -> &Message {
        &self.message
    }

    pub fn message_mut(&mut self) -> &mut Message {
        &mut self.message
    }

    /// Recover the message once the pipeline is done with it.
    pub fn into_message(self) -> Message {
        self.message
    }

    /// Restart the latency timer.
    pub fn start_timer(&mut self) {
        self.started_at = Instant::now();
        self.ended_at = None;
    }

    /// Freeze the latency timer.
    pub fn end_timer(&mut self) {
        self.ended_at = Some(Instant::now());
    }

    /// Elapsed microseconds between the timer pair. If the timer was never
    /// frozen this measures up to the present instant.
    pub fn latency_us(&self) -> f64 {
        let end = self.ended_at.unwrap_or_else(Instant::now);
        end.duration_since(self.started_at).as_secs_f64() * 1_000_000.0
    }

    /// Set a metadata entry; the last write per key wins.
    pub fn set_metadata(&mut self, key: &'static str, value: impl Into<String>) {
        let value = value.into();
        for entry in &mut self.metadata {
            if entry.0 == key {
                entry.1 = value;
                return;
            }
        }
        self.metadata.push((key, value));
    }

    pub fn metadata(&self, key: &str) -> Option<&str> {
        self.metadata
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| v.as_str())
    }
}
