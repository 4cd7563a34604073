//! Per-correlation-key record buffer with O(1) lookup via DashMap.
//!
//! The buffer keeps records in insertion order per key until a consumer
//! drains them or the eviction sweep ages them out. Appends never block and
//! are never rejected; queues are unbounded, and the periodic sweep is the
//! only bound on memory growth for keys no consumer ever fetches.

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time::Instant;

/// An opaque timestamped trace record.
///
/// The payload is never interpreted by the buffer; it is carried by value
/// and returned verbatim to the consumer that drains it.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TraceRecord {
    /// Producer-supplied timestamp in epoch milliseconds
    pub timestamp_ms: i64,
    /// Opaque record payload
    pub payload: serde_json::Value,
}

impl TraceRecord {
    /// Create a record with an explicit timestamp.
    pub fn new(timestamp_ms: i64, payload: serde_json::Value) -> Self {
        Self {
            timestamp_ms,
            payload,
        }
    }

    /// Create a record stamped with the current wall-clock time.
    pub fn now(payload: serde_json::Value) -> Self {
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as i64)
            .unwrap_or(0);
        Self {
            timestamp_ms,
            payload,
        }
    }
}

/// A record held in the buffer, tagged with its insertion instant.
///
/// Eviction age is measured from `buffered_at`, not the producer-supplied
/// timestamp, so a producer's clock skew cannot starve or immortalize a
/// record.
#[derive(Debug, Clone)]
struct BufferedRecord {
    record: TraceRecord,
    buffered_at: Instant,
}

/// Counters for a single eviction sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SweepStats {
    /// Records removed because their age exceeded the horizon
    pub records_evicted: usize,
    /// Emptied queues whose map entries were removed
    pub queues_removed: usize,
    /// Keys present when the sweep started
    pub keys_scanned: usize,
}

/// Correlation-keyed record buffer.
pub struct TraceBuffer {
    queues: DashMap<String, VecDeque<BufferedRecord>>,
}

impl TraceBuffer {
    /// Create an empty buffer.
    pub fn new() -> Self {
        Self {
            queues: DashMap::new(),
        }
    }

    /// Append a record for a key, creating the queue on first use.
    ///
    /// Never blocks and never rejects; an append racing a concurrent
    /// `drain` for the same key either lands in the detached queue (and is
    /// returned by that drain) or starts a fresh queue.
    pub fn append(&self, key: &str, record: TraceRecord) {
        let buffered = BufferedRecord {
            record,
            buffered_at: Instant::now(),
        };
        self.queues.entry(key.to_string()).or_default().push_back(buffered);
    }

    /// Atomically detach and return the entire queue for a key.
    ///
    /// Returns an empty vec if no queue exists. No residual entry is left
    /// behind for the key.
    pub fn drain(&self, key: &str) -> Vec<TraceRecord> {
        match self.queues.remove(key) {
            Some((_, queue)) => queue.into_iter().map(|b| b.record).collect(),
            None => Vec::new(),
        }
    }

    /// Remove records older than `horizon` and drop queues that emptied.
    ///
    /// Works off a snapshot of the key set and touches entries one at a
    /// time, so no lock is held across the whole sweep. The map entry for a
    /// key is removed only if its queue is still empty at the moment of
    /// removal; an append that lands between the pruning and the removal
    /// survives.
    pub fn sweep(&self, horizon: Duration) -> SweepStats {
        let keys: Vec<String> = self.queues.iter().map(|e| e.key().clone()).collect();

        let mut stats = SweepStats {
            keys_scanned: keys.len(),
            ..SweepStats::default()
        };

        for key in keys {
            if let Some(mut queue) = self.queues.get_mut(&key) {
                let before = queue.len();
                queue.retain(|b| b.buffered_at.elapsed() <= horizon);
                stats.records_evicted += before - queue.len();
            }

            if self.queues.remove_if(&key, |_, queue| queue.is_empty()).is_some() {
                stats.queues_removed += 1;
            }
        }

        stats
    }

    /// Number of keys with a live queue.
    pub fn key_count(&self) -> usize {
        self.queues.len()
    }

    /// Total number of buffered records across all keys.
    pub fn record_count(&self) -> usize {
        self.queues.iter().map(|e| e.value().len()).sum()
    }
}

impl Default for TraceBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(n: i64) -> TraceRecord {
        TraceRecord::new(n, json!({ "op": format!("op-{n}") }))
    }

    #[test]
    fn test_append_then_drain_preserves_fifo_order() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));
        buffer.append("c1", record(2));
        buffer.append("c1", record(3));

        let drained = buffer.drain("c1");
        let timestamps: Vec<i64> = drained.iter().map(|r| r.timestamp_ms).collect();
        assert_eq!(timestamps, vec![1, 2, 3]);
    }

    #[test]
    fn test_drain_removes_queue() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));

        assert_eq!(buffer.drain("c1").len(), 1);
        assert_eq!(buffer.key_count(), 0);
        assert!(buffer.drain("c1").is_empty());
    }

    #[test]
    fn test_drain_missing_key_returns_empty() {
        let buffer = TraceBuffer::new();
        assert!(buffer.drain("absent").is_empty());
    }

    #[test]
    fn test_keys_are_independent() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));
        buffer.append("c2", record(2));

        assert_eq!(buffer.drain("c1").len(), 1);
        assert_eq!(buffer.key_count(), 1);
        assert_eq!(buffer.drain("c2").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_aged_records() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));

        tokio::time::advance(Duration::from_millis(150)).await;
        let stats = buffer.sweep(Duration::from_millis(100));

        assert_eq!(stats.records_evicted, 1);
        assert_eq!(stats.queues_removed, 1);
        assert_eq!(buffer.key_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_keeps_fresh_records() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));

        tokio::time::advance(Duration::from_millis(50)).await;
        let stats = buffer.sweep(Duration::from_millis(100));

        assert_eq!(stats.records_evicted, 0);
        assert_eq!(stats.queues_removed, 0);
        assert_eq!(buffer.drain("c1").len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_prunes_only_aged_portion() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));
        tokio::time::advance(Duration::from_millis(80)).await;
        buffer.append("c1", record(2));
        tokio::time::advance(Duration::from_millis(40)).await;

        // record 1 is 120ms old, record 2 is 40ms old
        let stats = buffer.sweep(Duration::from_millis(100));

        assert_eq!(stats.records_evicted, 1);
        assert_eq!(stats.queues_removed, 0);
        let remaining = buffer.drain("c1");
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].timestamp_ms, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_counts_scanned_keys() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));
        buffer.append("c2", record(2));

        let stats = buffer.sweep(Duration::from_millis(100));
        assert_eq!(stats.keys_scanned, 2);
    }

    #[test]
    fn test_record_count_sums_across_keys() {
        let buffer = TraceBuffer::new();
        buffer.append("c1", record(1));
        buffer.append("c1", record(2));
        buffer.append("c2", record(3));

        assert_eq!(buffer.record_count(), 3);
        assert_eq!(buffer.key_count(), 2);
    }
}
