//! Background eviction sweep.
//!
//! A single dedicated task prunes records older than the buffering horizon
//! and removes emptied queues, at a fixed period. This is the only bound on
//! memory growth for correlation keys whose consumer never fetches, so it
//! runs regardless of fetch/report activity.

use crate::buffer::TraceBuffer;
use crate::metrics::RelayMetrics;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace};

/// Periodic eviction task over the whole buffer.
pub struct Sweeper {
    buffer: Arc<TraceBuffer>,
    metrics: Arc<RelayMetrics>,
    horizon: Duration,
    period: Duration,
}

impl Sweeper {
    /// Create a sweeper over the given buffer.
    pub fn new(
        buffer: Arc<TraceBuffer>,
        metrics: Arc<RelayMetrics>,
        horizon: Duration,
        period: Duration,
    ) -> Self {
        Self {
            buffer,
            metrics,
            horizon,
            period,
        }
    }

    /// Spawn the sweep loop, running until a shutdown signal arrives.
    ///
    /// Ticks are coalesced: a sweep that overruns its period skips the
    /// missed ticks instead of queueing duplicate sweeps, so at most one
    /// sweep is active at a time.
    pub fn spawn(self, mut shutdown_rx: broadcast::Receiver<()>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // Consume the immediate first tick; the first sweep happens one
            // full period after start.
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let stats = self.buffer.sweep(self.horizon);
                        self.metrics.record_sweep(
                            stats.records_evicted as u64,
                            stats.queues_removed as u64,
                        );
                        self.metrics
                            .set_buffered_records(self.buffer.record_count() as u64);

                        if stats.records_evicted > 0 || stats.queues_removed > 0 {
                            debug!(
                                records_evicted = stats.records_evicted,
                                queues_removed = stats.queues_removed,
                                keys_scanned = stats.keys_scanned,
                                "eviction sweep complete"
                            );
                        } else {
                            trace!(keys_scanned = stats.keys_scanned, "eviction sweep found nothing to prune");
                        }
                    }
                    _ = shutdown_rx.recv() => {
                        debug!("sweeper received shutdown signal");
                        break;
                    }
                }
            }
        })
    }
}
