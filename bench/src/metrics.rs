//! Metrics collection module

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Operation counters shared by all benchmark workers
#[derive(Default)]
pub struct Metrics {
    ops: AtomicU64,
    latency_sum_ns: AtomicU64,
    latency_max_ns: AtomicU64,
    errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_op(&self, latency_ns: u64) {
        self.ops.fetch_add(1, Ordering::Relaxed);
        self.latency_sum_ns.fetch_add(latency_ns, Ordering::Relaxed);
        self.latency_max_ns.fetch_max(latency_ns, Ordering::Relaxed);
    }

    /// Counts a failed iteration, e.g. an allocation that found every list empty
    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn total_ops(&self) -> u64 {
        self.ops.load(Ordering::Relaxed)
    }

    pub fn total_errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }

    pub fn ops_per_sec(&self, elapsed: Duration) -> f64 {
        self.total_ops() as f64 / elapsed.as_secs_f64()
    }

    pub fn avg_latency_us(&self) -> f64 {
        match self.total_ops() {
            0 => 0.0,
            ops => self.latency_sum_ns.load(Ordering::Relaxed) as f64 / ops as f64 / 1000.0,
        }
    }

    pub fn max_latency_us(&self) -> f64 {
        self.latency_max_ns.load(Ordering::Relaxed) as f64 / 1000.0
    }
}
