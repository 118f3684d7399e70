//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field has a default, so an empty
//! file is a valid configuration.
//!
//! ```toml
//! [poller]
//! interval_ms = 5000
//!
//! [sequencer]
//! await_ms = 3000
//! confirm_retries = 5
//! confirm_backoff_ms = 2000
//! index_retries = 10
//! index_backoff_ms = 2000
//!
//! [deltas]
//! feed = 20
//!
//! [contract]
//! address = "0x0000000000000000000000000000000000000000"
//! ```

use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use serde::Deserialize;

use crate::deltas::DeltaTable;
use crate::error::ConfigError;

/// Status poller settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PollerConfig {
    /// Time between authoritative reads.
    pub interval_ms: u64,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { interval_ms: 5_000 }
    }
}

impl PollerConfig {
    /// Poll interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }
}

/// Spawn sync retry budget.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct SequencerConfig {
    /// Wait before the first read, for the transaction to land.
    pub await_ms: u64,
    /// Authoritative reads before giving up.
    pub confirm_retries: u32,
    /// Delay between authoritative reads.
    pub confirm_backoff_ms: u64,
    /// Indexer fetches before settling for a partial sync.
    pub index_retries: u32,
    /// Delay between indexer fetches.
    pub index_backoff_ms: u64,
}

impl Default for SequencerConfig {
    fn default() -> Self {
        Self {
            await_ms: 3_000,
            confirm_retries: 5,
            confirm_backoff_ms: 2_000,
            index_retries: 10,
            index_backoff_ms: 2_000,
        }
    }
}

impl SequencerConfig {
    /// Initial landing delay.
    #[must_use]
    pub const fn await_delay(&self) -> Duration {
        Duration::from_millis(self.await_ms)
    }

    /// Delay between authoritative reads.
    #[must_use]
    pub const fn confirm_backoff(&self) -> Duration {
        Duration::from_millis(self.confirm_backoff_ms)
    }

    /// Delay between indexer fetches.
    #[must_use]
    pub const fn index_backoff(&self) -> Duration {
        Duration::from_millis(self.index_backoff_ms)
    }
}

/// Game contract location.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ContractConfig {
    /// Game contract address.
    pub address: Address,
}

/// Top-level configuration.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Poller settings.
    pub poller: PollerConfig,
    /// Spawn sync budget.
    pub sequencer: SequencerConfig,
    /// Optimistic stat increments.
    pub deltas: DeltaTable,
    /// Contract location.
    pub contract: ContractConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poller.interval_ms == 0 {
            return Err(ConfigError::Invalid("poller.interval_ms must be non-zero".into()));
        }
        let seq = &self.sequencer;
        if seq.confirm_retries == 0 {
            return Err(ConfigError::Invalid("sequencer.confirm_retries must be non-zero".into()));
        }
        if seq.index_retries <= seq.confirm_retries {
            return Err(ConfigError::Invalid(format!(
                "sequencer.index_retries ({}) must exceed confirm_retries ({})",
                seq.index_retries, seq.confirm_retries
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.poller.interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_sections() {
        let config = EngineConfig::from_toml_str(
            r#"
            [sequencer]
            confirm_retries = 3
            index_retries = 8

            [deltas]
            feed = 35

            [contract]
            address = "0x1111111111111111111111111111111111111111"
            "#,
        )
        .unwrap();

        assert_eq!(config.sequencer.confirm_retries, 3);
        assert_eq!(config.sequencer.await_ms, 3_000);
        assert_eq!(config.deltas.feed, 35);
        assert_eq!(config.deltas.clean, DeltaTable::default().clean);
        assert_eq!(config.contract.address, Address::repeat_byte(0x11));
    }

    #[test]
    fn test_index_budget_must_exceed_confirm() {
        let err = EngineConfig::from_toml_str(
            r"
            [sequencer]
            confirm_retries = 6
            index_retries = 6
            ",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        let err = EngineConfig::from_toml_str("[poller]\ninterval_ms = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn test_bad_toml() {
        assert!(matches!(
            EngineConfig::from_toml_str("[poller"),
            Err(ConfigError::Parse(_))
        ));
    }
}
