//! Spanrelay core - in-process trace record buffering with long-poll retrieval
//!
//! This library buffers asynchronously produced trace records per
//! correlation key and serves them to a correlated consumer with:
//!
//! - Immediate pickup of already-arrived records (fast path)
//! - Bounded blocking until a record arrives or the wait times out
//! - Producers that never block on consumer presence
//! - A background sweep evicting records past the buffering horizon

pub mod buffer;
pub mod config;
pub mod error;
pub mod metrics;
pub mod relay;
pub mod sweeper;
pub mod waiter;

// Re-export commonly used types
pub use buffer::TraceRecord;
pub use config::{BufferConfig, Config};
pub use error::{Error, Result};
pub use relay::{RelayStats, SpanRelay};
