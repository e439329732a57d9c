//! Lock-free latency histogram with Prometheus output.

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};

/// Bucket upper bounds in microseconds.
///
/// An allocation holds the counter lock for its whole block and syncs the
/// WAL on commit, so buckets span 100µs to 1s.
pub const LATENCY_BUCKETS_US: [u64; 12] = [
    100, 250, 500, 1_000, 2_500, 5_000, 10_000, 25_000, 50_000, 100_000, 250_000, 1_000_000,
];

const BUCKET_COUNT: usize = LATENCY_BUCKETS_US.len();

/// Cumulative-bucket histogram of latencies in microseconds.
pub struct LatencyHistogram {
    sum_us: AtomicU64,
    count: AtomicU64,
    buckets: [AtomicU64; BUCKET_COUNT],
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        Self {
            sum_us: AtomicU64::new(0),
            count: AtomicU64::new(0),
            buckets: std::array::from_fn(|_| AtomicU64::new(0)),
        }
    }

    #[inline]
    pub fn observe(&self, value_us: u64) {
        self.sum_us.fetch_add(value_us, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        // Buckets are sorted, so every bound from the first match up counts it.
        if let Some(first) = LATENCY_BUCKETS_US.iter().position(|&b| value_us <= b) {
            for bucket in &self.buckets[first..] {
                bucket.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    /// Returns `(sum_us, count, cumulative_buckets)`.
    pub fn snapshot(&self) -> (u64, u64, [u64; BUCKET_COUNT]) {
        let buckets = std::array::from_fn(|i| self.buckets[i].load(Ordering::Relaxed));
        (
            self.sum_us.load(Ordering::Relaxed),
            self.count.load(Ordering::Relaxed),
            buckets,
        )
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    pub fn format_prometheus(&self, name: &str, help: &str) -> String {
        let (sum, count, buckets) = self.snapshot();

        let mut output = String::with_capacity(1024);
        let _ = writeln!(output, "# HELP {} {}", name, help);
        let _ = writeln!(output, "# TYPE {} histogram", name);
        for (bound, bucket) in LATENCY_BUCKETS_US.iter().zip(buckets) {
            let _ = writeln!(output, "{}_bucket{{le=\"{}\"}} {}", name, bound, bucket);
        }
        let _ = writeln!(output, "{}_bucket{{le=\"+Inf\"}} {}", name, count);
        let _ = writeln!(output, "{}_sum {}", name, sum);
        let _ = writeln!(output, "{}_count {}", name, count);

        output
    }
}
