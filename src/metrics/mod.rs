//! Server metrics.
//!
//! Counters are plain atomics updated with `Relaxed` ordering and rendered in
//! Prometheus text exposition format by [`Metrics::format_prometheus`].

pub mod histogram;

use std::fmt::Write;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Instant;

pub use histogram::LatencyHistogram;

use crate::service::{Allocation, BatchResult};

#[derive(Default)]
pub struct Metrics {
    pub allocations_total: AtomicU64,
    pub serials_issued_total: AtomicU64,
    pub batches_total: AtomicU64,
    pub batch_pairs_ok_total: AtomicU64,
    pub batch_pairs_failed_total: AtomicU64,
    pub lookups_total: AtomicU64,
    pub upc_imports_total: AtomicU64,
    pub errors_total: AtomicU64,
    pub allocate_latency: LatencyHistogram,
    pub batch_latency: LatencyHistogram,
    pub start_time: OnceLock<Instant>,
}

impl Metrics {
    pub fn new() -> Self {
        let m = Self::default();
        let _ = m.start_time.set(Instant::now());
        m
    }

    pub fn record_allocation(&self, allocation: &Allocation, latency_us: u64) {
        self.allocations_total.fetch_add(1, Ordering::Relaxed);
        self.serials_issued_total
            .fetch_add(allocation.quantity, Ordering::Relaxed);
        self.allocate_latency.observe(latency_us);
    }

    pub fn record_batch(&self, result: &BatchResult, latency_us: u64) {
        self.batches_total.fetch_add(1, Ordering::Relaxed);
        self.batch_pairs_ok_total
            .fetch_add(result.success_count as u64, Ordering::Relaxed);
        self.batch_pairs_failed_total
            .fetch_add(result.error_count as u64, Ordering::Relaxed);
        self.allocations_total
            .fetch_add(result.success_count as u64, Ordering::Relaxed);
        self.serials_issued_total
            .fetch_add(result.total_serials_issued, Ordering::Relaxed);
        self.batch_latency.observe(latency_us);
    }

    pub fn record_lookup(&self) {
        self.lookups_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_import(&self) {
        self.upc_imports_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn uptime_secs(&self) -> f64 {
        self.start_time
            .get()
            .map(|t| t.elapsed().as_secs_f64())
            .unwrap_or(0.0)
    }

    /// Renders all metrics. `next_serial` is the counter's next value, when
    /// the counter exists.
    pub fn format_prometheus(&self, next_serial: Option<u64>) -> String {
        let mut output = String::with_capacity(2048);

        let _ = write!(
            output,
            "# HELP labelgen_uptime_secs Server uptime in seconds\n\
             # TYPE labelgen_uptime_secs gauge\n\
             labelgen_uptime_secs {:.3}\n\n",
            self.uptime_secs()
        );

        let counters: [(&str, &str, &AtomicU64); 8] = [
            (
                "labelgen_allocations_total",
                "Committed serial block allocations",
                &self.allocations_total,
            ),
            (
                "labelgen_serials_issued_total",
                "Serial numbers issued",
                &self.serials_issued_total,
            ),
            ("labelgen_batches_total", "Batches processed", &self.batches_total),
            (
                "labelgen_batch_pairs_ok_total",
                "Batch pairs that issued serials",
                &self.batch_pairs_ok_total,
            ),
            (
                "labelgen_batch_pairs_failed_total",
                "Batch pairs rejected or failed",
                &self.batch_pairs_failed_total,
            ),
            ("labelgen_lookups_total", "Serial lookups", &self.lookups_total),
            (
                "labelgen_upc_imports_total",
                "UPC CSV imports",
                &self.upc_imports_total,
            ),
            ("labelgen_errors_total", "Request errors", &self.errors_total),
        ];
        for (name, help, value) in counters {
            let _ = write!(
                output,
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n\n",
                value.load(Ordering::Relaxed)
            );
        }

        if let Some(next) = next_serial {
            let _ = write!(
                output,
                "# HELP labelgen_next_serial Next serial value to allocate\n\
                 # TYPE labelgen_next_serial gauge\n\
                 labelgen_next_serial {}\n\n",
                next
            );
        }

        output.push_str(&self.allocate_latency.format_prometheus(
            "labelgen_allocate_latency_us",
            "Allocation request latency in microseconds",
        ));
        output.push_str(&self.batch_latency.format_prometheus(
            "labelgen_batch_latency_us",
            "Whole-batch processing latency in microseconds",
        ));

        output
    }
}
