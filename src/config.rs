//! Connection configuration.
//!
//! Every field has a default, so a partial JSON document is enough:
//!
//! ```
//! use gridwire_client::ConnectionConfig;
//!
//! let config = ConnectionConfig::from_json(r#"{ "pipelining_threshold": 16384 }"#).unwrap();
//! assert!(config.pipelining_enabled);
//! assert_eq!(config.pipelining_threshold, 16384);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::{GridwireError, Result};
use crate::protocol::{DEFAULT_MAX_FRAME_LENGTH, DEFAULT_MAX_IN_FLIGHT_FRAGMENTED};
use crate::writer::{WriterConfig, WriterStrategy, DEFAULT_PIPELINING_THRESHOLD};

/// Default size of the socket read buffer.
pub const DEFAULT_READ_BUFFER_SIZE: usize = 64 * 1024;

/// Per-connection settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectionConfig {
    /// Coalesce small messages into fewer socket writes.
    pub pipelining_enabled: bool,
    /// Byte budget of one coalesced write.
    pub pipelining_threshold: usize,
    /// Set `TCP_NODELAY` on connect.
    pub no_delay: bool,
    /// Largest accepted inbound frame, header included.
    pub max_frame_length: u32,
    pub read_buffer_size: usize,
    /// Cap on inbound messages partially reassembled from fragments.
    pub max_fragmented_messages: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            pipelining_enabled: true,
            pipelining_threshold: DEFAULT_PIPELINING_THRESHOLD,
            no_delay: true,
            max_frame_length: DEFAULT_MAX_FRAME_LENGTH,
            read_buffer_size: DEFAULT_READ_BUFFER_SIZE,
            max_fragmented_messages: DEFAULT_MAX_IN_FLIGHT_FRAGMENTED,
        }
    }
}

impl ConnectionConfig {
    /// Parse and validate a JSON document.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings the transport cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.pipelining_enabled && self.pipelining_threshold == 0 {
            return Err(GridwireError::Config(
                "pipelining_threshold must be positive".to_string(),
            ));
        }
        if self.read_buffer_size == 0 {
            return Err(GridwireError::Config(
                "read_buffer_size must be positive".to_string(),
            ));
        }
        if self.max_fragmented_messages == 0 {
            return Err(GridwireError::Config(
                "max_fragmented_messages must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Writer settings derived from this configuration.
    pub fn writer_config(&self) -> WriterConfig {
        let strategy = if self.pipelining_enabled {
            WriterStrategy::Pipelined {
                threshold: self.pipelining_threshold,
            }
        } else {
            WriterStrategy::Direct
        };
        WriterConfig { strategy }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ConnectionConfig::default();
        assert!(config.pipelining_enabled);
        assert_eq!(config.pipelining_threshold, 8192);
        assert!(config.no_delay);
        assert_eq!(config.max_frame_length, i32::MAX as u32);
        assert_eq!(config.read_buffer_size, 64 * 1024);
        assert_eq!(config.max_fragmented_messages, 1024);
    }

    #[test]
    fn test_empty_json_is_default() {
        assert_eq!(
            ConnectionConfig::from_json("{}").unwrap(),
            ConnectionConfig::default()
        );
    }

    #[test]
    fn test_json_round_trip() {
        let config = ConnectionConfig {
            pipelining_enabled: false,
            no_delay: false,
            ..ConnectionConfig::default()
        };
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(ConnectionConfig::from_json(&json).unwrap(), config);
    }

    #[test]
    fn test_invalid_json() {
        let err = ConnectionConfig::from_json("{ not json").unwrap_err();
        assert!(matches!(err, GridwireError::Json(_)));
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let err = ConnectionConfig::from_json(r#"{ "pipelining_threshold": 0 }"#).unwrap_err();
        assert!(err.to_string().contains("pipelining_threshold"));

        // Irrelevant when pipelining is off
        let config = ConnectionConfig::from_json(
            r#"{ "pipelining_enabled": false, "pipelining_threshold": 0 }"#,
        )
        .unwrap();
        assert_eq!(config.writer_config().strategy, WriterStrategy::Direct);
    }

    #[test]
    fn test_zero_fragmented_cap_rejected() {
        let err = ConnectionConfig::from_json(r#"{ "max_fragmented_messages": 0 }"#).unwrap_err();
        assert!(matches!(err, GridwireError::Config(_)));
        assert!(err.to_string().contains("max_fragmented_messages"));
    }

    #[test]
    fn test_writer_strategy_follows_pipelining_flag() {
        let config = ConnectionConfig {
            pipelining_threshold: 1024,
            ..ConnectionConfig::default()
        };
        assert_eq!(
            config.writer_config().strategy,
            WriterStrategy::Pipelined { threshold: 1024 }
        );
    }
}
