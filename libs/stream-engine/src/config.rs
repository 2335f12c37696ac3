//! Finished engine configuration, consumed once at generator construction.
//!
//! Command-line and file parsing live in the binary; by the time a
//! `GeneratorConfig` reaches the engine it is a plain value. The only
//! validation performed here is the one the engine owns: the two sizing
//! modes are mutually exclusive.

use serde::{Deserialize, Serialize};

use stream_api::{RECORD_SIZE, StreamError, TransportConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodecKind {
    /// Two-frame JSON header + raw payload.
    #[default]
    Passthrough,
    /// Single self-contained binary frame.
    Packed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransportKind {
    /// Publish to a named channel on a broker.
    #[default]
    Broker,
    /// Direct socket push/pull.
    Socket,
}

/// How the generator sizes one cycle's chunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SizingMode {
    /// Send each source batch as-is.
    Natural,
    /// Send each source batch `n` times.
    Multiplier(u32),
    /// Slice/replicate each source batch to exactly this many records.
    Records(usize),
}

/// The control state is not part of this config: it belongs to the
/// [`crate::control::Controller`] whose handle is passed to the
/// generator at construction.
#[derive(Debug, Clone)]
pub struct GeneratorConfig {
    pub codec: CodecKind,
    pub transport: TransportKind,
    pub transport_config: TransportConfig,
    /// Replication factor for the source's natural batch. 1 = natural.
    pub multiplier: u32,
    /// Target chunk size in bytes. 0 = disabled.
    pub bytes: usize,
    /// Packets per second. 0 = unthrottled.
    pub rate: f64,
    /// Seconds between progress reports.
    pub report_time: u64,
}

impl GeneratorConfig {
    pub fn new(transport_config: TransportConfig) -> Self {
        Self {
            codec: CodecKind::default(),
            transport: TransportKind::default(),
            transport_config,
            multiplier: 1,
            bytes: 0,
            rate: 0.0,
            report_time: 10,
        }
    }

    /// Resolve the sizing mode. `multiplier > 1` and `bytes > 0` at the
    /// same time is a configuration conflict, reported before the loop
    /// ever starts.
    pub fn sizing(&self) -> Result<SizingMode, StreamError> {
        if self.multiplier > 1 && self.bytes > 0 {
            return Err(StreamError::config(
                "conflict between `bytes` and `multiplier`: set at most one",
            ));
        }
        if self.bytes > 0 {
            if self.bytes % RECORD_SIZE != 0 {
                return Err(StreamError::config(format!(
                    "`bytes` ({}) must be a multiple of the record size ({RECORD_SIZE})",
                    self.bytes
                )));
            }
            return Ok(SizingMode::Records(self.bytes / RECORD_SIZE));
        }
        if self.multiplier > 1 {
            return Ok(SizingMode::Multiplier(self.multiplier));
        }
        Ok(SizingMode::Natural)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use stream_api::{ErrorKind, Role};

    fn config() -> GeneratorConfig {
        GeneratorConfig::new(TransportConfig::new("localhost:9092", "test", Role::Transmitter))
    }

    #[test]
    fn default_sizing_is_natural() {
        assert_eq!(config().sizing().unwrap(), SizingMode::Natural);
    }

    #[test]
    fn multiplier_one_is_natural() {
        let mut cfg = config();
        cfg.multiplier = 1;
        assert_eq!(cfg.sizing().unwrap(), SizingMode::Natural);
    }

    #[test]
    fn bytes_becomes_record_count() {
        let mut cfg = config();
        cfg.bytes = 16 * RECORD_SIZE;
        assert_eq!(cfg.sizing().unwrap(), SizingMode::Records(16));
    }

    #[test]
    fn conflicting_modes_rejected() {
        let mut cfg = config();
        cfg.multiplier = 5;
        cfg.bytes = 1024;
        assert_eq!(cfg.sizing().unwrap_err().kind(), ErrorKind::Config);
    }

    #[test]
    fn ragged_byte_budget_rejected() {
        let mut cfg = config();
        cfg.bytes = RECORD_SIZE + 1;
        assert_eq!(cfg.sizing().unwrap_err().kind(), ErrorKind::Config);
    }
}
