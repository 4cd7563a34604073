//! Span relay service orchestration.
//!
//! Integrates the components of the long-poll buffering core:
//! - Record buffer keyed by correlation key
//! - Single-waiter notification registry
//! - Background eviction sweeper
//! - Relay metrics
//!
//! The relay is an explicitly owned instance with a `start`/`stop`
//! lifecycle; call sites receive it by reference rather than through
//! process-wide state.

use crate::buffer::{TraceBuffer, TraceRecord};
use crate::config::Config;
use crate::metrics::RelayMetrics;
use crate::sweeper::Sweeper;
use crate::waiter::WaitRegistry;
use crate::{Error, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Bound on how long `stop` waits for the sweeper to exit.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Point-in-time snapshot of relay occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    /// Keys with at least one buffered record
    pub buffered_keys: usize,
    /// Buffered records across all keys
    pub buffered_records: usize,
    /// Fetches currently blocked on a waiter
    pub pending_waiters: usize,
}

/// Buffers trace records per correlation key and serves them to long-poll
/// consumers.
///
/// Producers call [`report`](Self::report) from their own execution
/// contexts and never block. Consumers call [`fetch`](Self::fetch), which
/// returns buffered records immediately or suspends until a record arrives
/// or the timeout expires.
pub struct SpanRelay {
    config: Config,
    buffer: Arc<TraceBuffer>,
    waiters: Arc<WaitRegistry>,
    metrics: Arc<RelayMetrics>,
    shutdown_tx: broadcast::Sender<()>,
    sweeper_handle: Mutex<Option<JoinHandle<()>>>,
}

impl SpanRelay {
    /// Create a relay from a validated configuration.
    pub fn new(config: Config) -> Result<Self> {
        config.validate()?;

        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Self {
            config,
            buffer: Arc::new(TraceBuffer::new()),
            waiters: Arc::new(WaitRegistry::new()),
            metrics: Arc::new(RelayMetrics::new()),
            shutdown_tx,
            sweeper_handle: Mutex::new(None),
        })
    }

    /// Launch the background eviction sweeper.
    ///
    /// Must be called from within a tokio runtime. Calling `start` on an
    /// already-started relay is a logged no-op.
    pub fn start(&self) {
        let mut slot = self.sweeper_handle.lock();
        if slot.is_some() {
            warn!("span relay already started");
            return;
        }

        let horizon = self.config.buffer.buffering_horizon();
        let period = self.config.buffer.sweep_period();
        let sweeper = Sweeper::new(
            self.buffer.clone(),
            self.metrics.clone(),
            horizon,
            period,
        );
        *slot = Some(sweeper.spawn(self.shutdown_tx.subscribe()));

        info!(
            horizon_ms = horizon.as_millis() as u64,
            sweep_period_ms = period.as_millis() as u64,
            "span relay started"
        );
    }

    /// Stop the relay: cancel the sweeper and release all pending waiters.
    ///
    /// Released fetches wake, drain whatever is buffered for their key, and
    /// return. Buffered records are left in place.
    pub async fn stop(&self) {
        info!("stopping span relay");

        let _ = self.shutdown_tx.send(());

        let handle = self.sweeper_handle.lock().take();
        if let Some(handle) = handle {
            let _ = tokio::time::timeout(SHUTDOWN_GRACE, handle).await;
        }

        let woken = self.waiters.wake_all();
        if woken > 0 {
            debug!(woken, "released pending waiters");
        }
        self.metrics.set_pending_waiters(0);

        info!("span relay stopped");
    }

    /// Buffer a record for a correlation key and wake its waiter, if any.
    ///
    /// Never blocks. A record reported with `is_active == false` is
    /// discarded: the opt-in decision belongs to the caller, the relay only
    /// respects it. Blank keys are skipped the same way.
    pub fn report(&self, correlation_key: &str, is_active: bool, record: TraceRecord) {
        if !is_active {
            self.metrics.record_skipped();
            return;
        }
        if correlation_key.trim().is_empty() {
            debug!("dropping record with blank correlation key");
            self.metrics.record_skipped();
            return;
        }

        debug!(key = %correlation_key, "buffering record");
        self.buffer.append(correlation_key, record);
        self.metrics.record_buffered();

        // Atomic take: of concurrent reporters for this key, exactly one
        // obtains the handle, so the waiter is notified at most once.
        if let Some(waiter) = self.waiters.take(correlation_key) {
            waiter.notify_one();
            self.metrics.record_notified();
        }
    }

    /// Return buffered records for a key, waiting up to `timeout` for the
    /// first one to arrive.
    ///
    /// The returned records are removed from the buffer. An empty result
    /// means the timeout expired with nothing buffered. Callers must keep
    /// at most one fetch outstanding per key: a second concurrent fetch for
    /// the same key replaces the first's registration (the displaced waiter
    /// is woken and returns whatever is buffered at that point).
    ///
    /// Cancelling the returned future deregisters the waiter; a later
    /// report for the key simply buffers.
    pub async fn fetch(
        &self,
        correlation_key: &str,
        timeout: Duration,
    ) -> Result<Vec<TraceRecord>> {
        if correlation_key.trim().is_empty() {
            return Err(Error::EmptyCorrelationKey);
        }

        // Fast path: already-arrived records are returned without waiting.
        let buffered = self.buffer.drain(correlation_key);
        if !buffered.is_empty() {
            debug!(key = %correlation_key, count = buffered.len(), "picking up buffered records");
            self.metrics.record_fast_path();
            return Ok(buffered);
        }

        let guard = self.waiters.register(correlation_key);
        self.metrics.set_pending_waiters(self.waiters.len() as u64);

        // A report may have landed between the fast-path drain and the
        // registration above; re-check so this call returns it instead of
        // waiting out the timeout.
        let raced = self.buffer.drain(correlation_key);
        if !raced.is_empty() {
            drop(guard);
            self.metrics.set_pending_waiters(self.waiters.len() as u64);
            self.metrics.record_fast_path();
            return Ok(raced);
        }

        let started = Instant::now();
        let outcome = tokio::time::timeout(timeout, guard.notified()).await;
        self.metrics.record_wait(started.elapsed());

        // Deregister if still registered; a notifier may already have
        // removed the handle.
        drop(guard);
        self.metrics.set_pending_waiters(self.waiters.len() as u64);

        let records = self.buffer.drain(correlation_key);
        if outcome.is_err() && records.is_empty() {
            debug!(
                key = %correlation_key,
                timeout_ms = timeout.as_millis() as u64,
                "wait expired with nothing buffered"
            );
            self.metrics.record_timeout();
        }

        Ok(records)
    }

    /// Snapshot current occupancy.
    pub fn stats(&self) -> RelayStats {
        RelayStats {
            buffered_keys: self.buffer.key_count(),
            buffered_records: self.buffer.record_count(),
            pending_waiters: self.waiters.len(),
        }
    }

    /// Relay metrics, for exposition by the embedding service.
    pub fn metrics(&self) -> &RelayMetrics {
        &self.metrics
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn relay() -> SpanRelay {
        SpanRelay::new(Config::default()).unwrap()
    }

    fn record(n: i64) -> TraceRecord {
        TraceRecord::new(n, json!({ "op": n }))
    }

    #[tokio::test]
    async fn test_fast_path_drains_buffered_records() {
        let relay = relay();
        relay.report("c1", true, record(1));
        relay.report("c1", true, record(2));

        let records = relay.fetch("c1", Duration::from_millis(0)).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(relay.metrics().fetch_fast_path_total(), 1);
        assert_eq!(relay.stats().buffered_records, 0);
    }

    #[tokio::test]
    async fn test_inactive_report_is_discarded() {
        let relay = relay();
        relay.report("c1", false, record(1));

        assert_eq!(relay.stats().buffered_records, 0);
        assert_eq!(relay.metrics().records_skipped_total(), 1);
    }

    #[tokio::test]
    async fn test_blank_key_report_is_discarded() {
        let relay = relay();
        relay.report("  ", true, record(1));

        assert_eq!(relay.stats().buffered_keys, 0);
        assert_eq!(relay.metrics().records_skipped_total(), 1);
    }

    #[tokio::test]
    async fn test_blank_key_fetch_fails_without_touching_state() {
        let relay = relay();

        let err = relay.fetch("", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::EmptyCorrelationKey));

        let err = relay.fetch(" \t", Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, Error::EmptyCorrelationKey));

        let stats = relay.stats();
        assert_eq!(stats.buffered_keys, 0);
        assert_eq!(stats.pending_waiters, 0);
    }

    #[tokio::test]
    async fn test_invalid_config_is_rejected() {
        let config = Config {
            buffer: crate::config::BufferConfig {
                buffering_horizon_ms: 0,
                sweep_period_ms: None,
            },
        };
        assert!(SpanRelay::new(config).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_double_start_is_a_noop() {
        let relay = relay();
        relay.start();
        relay.start();
        relay.stop().await;
    }
}
