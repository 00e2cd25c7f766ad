//! Latency and throughput instrumentation.
//!
//! One shared monitor records per-message latency samples into a bounded
//! sliding window and computes mean / p95 / p99 on demand. Readers sort a
//! snapshot so the live buffer is never mutated by a query.

use std::collections::VecDeque;
use std::fmt;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Sliding-window size; the oldest sample is evicted on overflow.
pub const MAX_SAMPLES: usize = 100_000;

const THROUGHPUT_UPDATE_INTERVAL: Duration = Duration::from_millis(1000);

/// Thread-safe latency percentile tracker.
pub struct PerformanceMonitor {
    samples: Mutex<VecDeque<f64>>,
    throughput: Mutex<ThroughputGauge>,
}

struct ThroughputGauge {
    messages_per_second: u64,
    updated_at: Option<Instant>,
}

impl Default for PerformanceMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl PerformanceMonitor {
    pub fn new() -> Self {
        Self {
            samples: Mutex::new(VecDeque::with_capacity(MAX_SAMPLES)),
            throughput: Mutex::new(ThroughputGauge {
                messages_per_second: 0,
                updated_at: None,
            }),
        }
    }

    /// Append a latency sample in microseconds, evicting FIFO on overflow.
    pub fn record_latency(&self, latency_us: f64) {
        let mut samples = self.samples.lock();
        if samples.len() >= MAX_SAMPLES {
            samples.pop_front();
        }
        samples.push_back(latency_us);
    }

    /// Update the throughput gauge, at most once per second.
    pub fn record_throughput(&self, messages_per_second: u64) {
        let mut gauge = self.throughput.lock();
        let due = match gauge.updated_at {
            None => true,
            Some(at) => at.elapsed() >= THROUGHPUT_UPDATE_INTERVAL,
        };
        if due {
            gauge.messages_per_second = messages_per_second;
            gauge.updated_at = Some(Instant::now());
        }
    }

    /// Arithmetic mean of the current window, or 0 when empty.
    pub fn average_latency(&self) -> f64 {
        mean(&self.samples.lock())
    }

    /// 95th percentile; falls back to the mean below 20 samples.
    pub fn p95(&self) -> f64 {
        self.percentile(0.95, 20)
    }

    /// 99th percentile; falls back to the mean below 100 samples.
    pub fn p99(&self) -> f64 {
        self.percentile(0.99, 100)
    }

    fn percentile(&self, quantile: f64, min_samples: usize) -> f64 {
        let mut snapshot: Vec<f64> = {
            let samples = self.samples.lock();
            if samples.len() < min_samples {
                return mean(&samples);
            }
            samples.iter().copied().collect()
        };
        snapshot.sort_by(f64::total_cmp);

        // Sorted rank floor(q * n), counted from one: over {1..100} the p95
        // reading is exactly 95.
        let rank = (snapshot.len() as f64 * quantile) as usize;
        snapshot[rank.saturating_sub(1).min(snapshot.len() - 1)]
    }

    pub fn throughput(&self) -> u64 {
        self.throughput.lock().messages_per_second
    }

    pub fn sample_count(&self) -> usize {
        self.samples.lock().len()
    }

    /// Clear samples and the throughput gauge.
    pub fn reset(&self) {
        self.samples.lock().clear();
        let mut gauge = self.throughput.lock();
        gauge.messages_per_second = 0;
        gauge.updated_at = None;
    }

    /// Consistent one-shot view for stats reporting.
    pub fn snapshot(&self) -> MonitorSnapshot {
        MonitorSnapshot {
            average_latency_us: self.average_latency(),
            p95_latency_us: self.p95(),
            p99_latency_us: self.p99(),
            messages_per_second: self.throughput(),
            sample_count: self.sample_count(),
        }
    }
}

fn mean(samples: &VecDeque<f64>) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    samples.iter().sum::<f64>() / samples.len() as f64
}

/// Point-in-time monitor readings.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorSnapshot {
    pub average_latency_us: f64,
    pub p95_latency_us: f64,
    pub p99_latency_us: f64,
    pub messages_per_second: u64,
    pub sample_count: usize,
}

impl fmt::Display for MonitorSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "avg={:.2}us p95={:.2}us p99={:.2}us throughput={}msg/s samples={}",
            self.average_latency_us,
            self.p95_latency_us,
            self.p99_latency_us,
            self.messages_per_second,
            self.sample_count
        )
    }
}
