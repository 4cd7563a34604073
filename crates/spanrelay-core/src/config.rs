//! Configuration structures for spanrelay.
//!
//! Configuration is loaded from TOML files and validated before the service
//! is constructed.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Record buffer configuration
    #[serde(default)]
    pub buffer: BufferConfig,
}

/// Record buffer configuration.
///
/// Two tunables control retention: the buffering horizon (maximum age a
/// record may reach before eviction) and the sweep period of the background
/// evictor, which defaults to the horizon.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BufferConfig {
    /// Buffering horizon in milliseconds
    #[serde(default = "default_buffering_horizon_ms")]
    pub buffering_horizon_ms: u64,

    /// Sweep period in milliseconds (defaults to the buffering horizon)
    #[serde(default)]
    pub sweep_period_ms: Option<u64>,
}

impl BufferConfig {
    /// Maximum age a record may reach before the sweeper removes it.
    pub fn buffering_horizon(&self) -> Duration {
        Duration::from_millis(self.buffering_horizon_ms)
    }

    /// Interval between eviction sweeps.
    pub fn sweep_period(&self) -> Duration {
        Duration::from_millis(self.sweep_period_ms.unwrap_or(self.buffering_horizon_ms))
    }
}

impl Default for BufferConfig {
    fn default() -> Self {
        Self {
            buffering_horizon_ms: default_buffering_horizon_ms(),
            sweep_period_ms: None,
        }
    }
}

// Default value functions

fn default_buffering_horizon_ms() -> u64 {
    60_000
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &std::path::Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> crate::Result<()> {
        if self.buffer.buffering_horizon_ms == 0 {
            return Err(crate::Error::Config(
                "buffering_horizon_ms must be greater than zero".into(),
            ));
        }

        if self.buffer.sweep_period_ms == Some(0) {
            return Err(crate::Error::Config(
                "sweep_period_ms must be greater than zero".into(),
            ));
        }

        Ok(())
    }
}
