//! Relay metrics with Prometheus text export.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Histogram bucket boundaries in milliseconds for fetch wait duration.
const WAIT_DURATION_BUCKETS_MS: [u64; 7] = [10, 50, 100, 250, 500, 1000, 5000];

/// Relay metrics with counters, gauges, and a wait-duration histogram.
pub struct RelayMetrics {
    // === COUNTERS ===
    /// Total records buffered
    records_buffered_total: AtomicU64,

    /// Total records skipped (inactive flag or blank key)
    records_skipped_total: AtomicU64,

    /// Total records evicted by the sweeper
    records_evicted_total: AtomicU64,

    /// Total emptied queues removed by the sweeper
    queues_evicted_total: AtomicU64,

    /// Total eviction sweeps completed
    sweeps_total: AtomicU64,

    /// Total fetches satisfied without waiting
    fetch_fast_path_total: AtomicU64,

    /// Total fetches that registered a waiter
    fetch_waits_total: AtomicU64,

    /// Total fetch waits that expired with nothing buffered
    fetch_timeouts_total: AtomicU64,

    /// Total waiters notified by a reporter
    waiters_notified_total: AtomicU64,

    // === GAUGES ===
    /// Current buffered record count
    buffered_records: AtomicU64,

    /// Current pending waiter count
    pending_waiters: AtomicU64,

    // === HISTOGRAM: wait_duration_seconds ===
    /// Sum of all fetch wait durations in milliseconds
    wait_duration_sum_ms: AtomicU64,

    /// Count of fetch wait observations
    wait_duration_count: AtomicU64,

    /// Cumulative bucket counts, last slot is +Inf
    wait_duration_buckets: [AtomicU64; 8],
}

impl RelayMetrics {
    /// Create new metrics.
    pub fn new() -> Self {
        Self {
            records_buffered_total: AtomicU64::new(0),
            records_skipped_total: AtomicU64::new(0),
            records_evicted_total: AtomicU64::new(0),
            queues_evicted_total: AtomicU64::new(0),
            sweeps_total: AtomicU64::new(0),
            fetch_fast_path_total: AtomicU64::new(0),
            fetch_waits_total: AtomicU64::new(0),
            fetch_timeouts_total: AtomicU64::new(0),
            waiters_notified_total: AtomicU64::new(0),
            buffered_records: AtomicU64::new(0),
            pending_waiters: AtomicU64::new(0),
            wait_duration_sum_ms: AtomicU64::new(0),
            wait_duration_count: AtomicU64::new(0),
            wait_duration_buckets: Default::default(),
        }
    }

    // === COUNTER RECORDING ===

    /// Record a buffered record.
    pub fn record_buffered(&self) {
        self.records_buffered_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a skipped record (inactive flag or blank key).
    pub fn record_skipped(&self) {
        self.records_skipped_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a completed sweep and its eviction counts.
    pub fn record_sweep(&self, records_evicted: u64, queues_removed: u64) {
        self.sweeps_total.fetch_add(1, Ordering::Relaxed);
        self.records_evicted_total
            .fetch_add(records_evicted, Ordering::Relaxed);
        self.queues_evicted_total
            .fetch_add(queues_removed, Ordering::Relaxed);
    }

    /// Record a fetch satisfied from already-buffered records.
    pub fn record_fast_path(&self) {
        self.fetch_fast_path_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fetch that suspended, with its observed wait duration.
    pub fn record_wait(&self, duration: Duration) {
        self.fetch_waits_total.fetch_add(1, Ordering::Relaxed);

        let duration_ms = duration.as_millis() as u64;
        self.wait_duration_sum_ms
            .fetch_add(duration_ms, Ordering::Relaxed);
        self.wait_duration_count.fetch_add(1, Ordering::Relaxed);

        // Buckets are cumulative (le = less than or equal)
        for (i, &bucket_ms) in WAIT_DURATION_BUCKETS_MS.iter().enumerate() {
            if duration_ms <= bucket_ms {
                self.wait_duration_buckets[i].fetch_add(1, Ordering::Relaxed);
            }
        }
        self.wait_duration_buckets[7].fetch_add(1, Ordering::Relaxed);
    }

    /// Record a fetch wait that expired with nothing buffered.
    pub fn record_timeout(&self) {
        self.fetch_timeouts_total.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a waiter notification.
    pub fn record_notified(&self) {
        self.waiters_notified_total.fetch_add(1, Ordering::Relaxed);
    }

    // === GAUGE UPDATES ===

    /// Update the current buffered record count.
    pub fn set_buffered_records(&self, count: u64) {
        self.buffered_records.store(count, Ordering::Relaxed);
    }

    /// Update the current pending waiter count.
    pub fn set_pending_waiters(&self, count: u64) {
        self.pending_waiters.store(count, Ordering::Relaxed);
    }

    // === GETTERS ===

    /// Get total records buffered.
    pub fn records_buffered_total(&self) -> u64 {
        self.records_buffered_total.load(Ordering::Relaxed)
    }

    /// Get total records skipped.
    pub fn records_skipped_total(&self) -> u64 {
        self.records_skipped_total.load(Ordering::Relaxed)
    }

    /// Get total records evicted.
    pub fn records_evicted_total(&self) -> u64 {
        self.records_evicted_total.load(Ordering::Relaxed)
    }

    /// Get total emptied queues removed.
    pub fn queues_evicted_total(&self) -> u64 {
        self.queues_evicted_total.load(Ordering::Relaxed)
    }

    /// Get total sweeps completed.
    pub fn sweeps_total(&self) -> u64 {
        self.sweeps_total.load(Ordering::Relaxed)
    }

    /// Get total fast-path fetches.
    pub fn fetch_fast_path_total(&self) -> u64 {
        self.fetch_fast_path_total.load(Ordering::Relaxed)
    }

    /// Get total suspended fetches.
    pub fn fetch_waits_total(&self) -> u64 {
        self.fetch_waits_total.load(Ordering::Relaxed)
    }

    /// Get total fetch timeouts.
    pub fn fetch_timeouts_total(&self) -> u64 {
        self.fetch_timeouts_total.load(Ordering::Relaxed)
    }

    /// Get total waiters notified.
    pub fn waiters_notified_total(&self) -> u64 {
        self.waiters_notified_total.load(Ordering::Relaxed)
    }

    /// Get the current buffered record count.
    pub fn buffered_records(&self) -> u64 {
        self.buffered_records.load(Ordering::Relaxed)
    }

    /// Get the current pending waiter count.
    pub fn pending_waiters(&self) -> u64 {
        self.pending_waiters.load(Ordering::Relaxed)
    }

    /// Export metrics in Prometheus text format.
    pub fn export_prometheus_text(&self) -> String {
        let mut output = String::with_capacity(2048);

        // === COUNTERS ===

        output.push_str("# HELP spanrelay_records_buffered_total Total records buffered\n");
        output.push_str("# TYPE spanrelay_records_buffered_total counter\n");
        output.push_str(&format!(
            "spanrelay_records_buffered_total {}\n",
            self.records_buffered_total()
        ));
        output.push('\n');

        output.push_str(
            "# HELP spanrelay_records_skipped_total Total records skipped (inactive or blank key)\n",
        );
        output.push_str("# TYPE spanrelay_records_skipped_total counter\n");
        output.push_str(&format!(
            "spanrelay_records_skipped_total {}\n",
            self.records_skipped_total()
        ));
        output.push('\n');

        output.push_str(
            "# HELP spanrelay_records_evicted_total Total records evicted by the sweeper\n",
        );
        output.push_str("# TYPE spanrelay_records_evicted_total counter\n");
        output.push_str(&format!(
            "spanrelay_records_evicted_total {}\n",
            self.records_evicted_total()
        ));
        output.push('\n');

        output.push_str("# HELP spanrelay_queues_evicted_total Total emptied queues removed\n");
        output.push_str("# TYPE spanrelay_queues_evicted_total counter\n");
        output.push_str(&format!(
            "spanrelay_queues_evicted_total {}\n",
            self.queues_evicted_total()
        ));
        output.push('\n');

        output.push_str("# HELP spanrelay_sweeps_total Total eviction sweeps completed\n");
        output.push_str("# TYPE spanrelay_sweeps_total counter\n");
        output.push_str(&format!("spanrelay_sweeps_total {}\n", self.sweeps_total()));
        output.push('\n');

        output.push_str(
            "# HELP spanrelay_fetch_fast_path_total Total fetches satisfied without waiting\n",
        );
        output.push_str("# TYPE spanrelay_fetch_fast_path_total counter\n");
        output.push_str(&format!(
            "spanrelay_fetch_fast_path_total {}\n",
            self.fetch_fast_path_total()
        ));
        output.push('\n');

        output.push_str("# HELP spanrelay_fetch_waits_total Total fetches that registered a waiter\n");
        output.push_str("# TYPE spanrelay_fetch_waits_total counter\n");
        output.push_str(&format!(
            "spanrelay_fetch_waits_total {}\n",
            self.fetch_waits_total()
        ));
        output.push('\n');

        output.push_str(
            "# HELP spanrelay_fetch_timeouts_total Total fetch waits that expired empty\n",
        );
        output.push_str("# TYPE spanrelay_fetch_timeouts_total counter\n");
        output.push_str(&format!(
            "spanrelay_fetch_timeouts_total {}\n",
            self.fetch_timeouts_total()
        ));
        output.push('\n');

        output.push_str(
            "# HELP spanrelay_waiters_notified_total Total waiters notified by a reporter\n",
        );
        output.push_str("# TYPE spanrelay_waiters_notified_total counter\n");
        output.push_str(&format!(
            "spanrelay_waiters_notified_total {}\n",
            self.waiters_notified_total()
        ));
        output.push('\n');

        // === GAUGES ===

        output.push_str("# HELP spanrelay_buffered_records Current buffered record count\n");
        output.push_str("# TYPE spanrelay_buffered_records gauge\n");
        output.push_str(&format!(
            "spanrelay_buffered_records {}\n",
            self.buffered_records()
        ));
        output.push('\n');

        output.push_str("# HELP spanrelay_pending_waiters Current pending waiter count\n");
        output.push_str("# TYPE spanrelay_pending_waiters gauge\n");
        output.push_str(&format!(
            "spanrelay_pending_waiters {}\n",
            self.pending_waiters()
        ));
        output.push('\n');

        // === HISTOGRAM: wait_duration_seconds ===

        output.push_str(
            "# HELP spanrelay_wait_duration_seconds Duration of suspended fetch waits\n",
        );
        output.push_str("# TYPE spanrelay_wait_duration_seconds histogram\n");

        for (i, &bucket_ms) in WAIT_DURATION_BUCKETS_MS.iter().enumerate() {
            output.push_str(&format!(
                "spanrelay_wait_duration_seconds_bucket{{le=\"{}\"}} {}\n",
                bucket_ms as f64 / 1000.0,
                self.wait_duration_buckets[i].load(Ordering::Relaxed)
            ));
        }
        output.push_str(&format!(
            "spanrelay_wait_duration_seconds_bucket{{le=\"+Inf\"}} {}\n",
            self.wait_duration_buckets[7].load(Ordering::Relaxed)
        ));

        output.push_str(&format!(
            "spanrelay_wait_duration_seconds_sum {}\n",
            self.wait_duration_sum_ms.load(Ordering::Relaxed) as f64 / 1000.0
        ));
        output.push_str(&format!(
            "spanrelay_wait_duration_seconds_count {}\n",
            self.wait_duration_count.load(Ordering::Relaxed)
        ));

        output
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let metrics = RelayMetrics::new();

        metrics.record_buffered();
        metrics.record_buffered();
        metrics.record_skipped();
        metrics.record_sweep(3, 1);
        metrics.record_fast_path();
        metrics.record_timeout();
        metrics.record_notified();

        assert_eq!(metrics.records_buffered_total(), 2);
        assert_eq!(metrics.records_skipped_total(), 1);
        assert_eq!(metrics.records_evicted_total(), 3);
        assert_eq!(metrics.queues_evicted_total(), 1);
        assert_eq!(metrics.sweeps_total(), 1);
        assert_eq!(metrics.fetch_fast_path_total(), 1);
        assert_eq!(metrics.fetch_timeouts_total(), 1);
        assert_eq!(metrics.waiters_notified_total(), 1);
    }

    #[test]
    fn test_gauges() {
        let metrics = RelayMetrics::new();
        metrics.set_buffered_records(42);
        metrics.set_pending_waiters(3);

        assert_eq!(metrics.buffered_records(), 42);
        assert_eq!(metrics.pending_waiters(), 3);
    }

    #[test]
    fn test_wait_histogram_buckets_are_cumulative() {
        let metrics = RelayMetrics::new();
        metrics.record_wait(Duration::from_millis(30));

        assert_eq!(metrics.fetch_waits_total(), 1);
        // 30ms falls past the 10ms bucket and into every bucket from 50ms up
        assert_eq!(metrics.wait_duration_buckets[0].load(Ordering::Relaxed), 0);
        for i in 1..8 {
            assert_eq!(metrics.wait_duration_buckets[i].load(Ordering::Relaxed), 1);
        }
    }

    #[test]
    fn test_prometheus_text_export() {
        let metrics = RelayMetrics::new();
        metrics.record_buffered();
        metrics.record_wait(Duration::from_millis(200));
        metrics.set_pending_waiters(1);

        let output = metrics.export_prometheus_text();

        assert!(output.contains("spanrelay_records_buffered_total 1"));
        assert!(output.contains("spanrelay_pending_waiters 1"));
        assert!(output.contains("spanrelay_wait_duration_seconds_count 1"));
        assert!(output.contains("spanrelay_wait_duration_seconds_bucket{le=\"+Inf\"} 1"));

        // every exposed metric carries HELP and TYPE lines
        for line in output.lines() {
            if line.starts_with("# TYPE") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                assert_eq!(parts.len(), 4);
                assert!(matches!(parts[3], "counter" | "gauge" | "histogram"));
            }
        }
    }
}
