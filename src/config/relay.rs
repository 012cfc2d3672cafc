//! Relay configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;
use crate::adapters::websocket::DEFAULT_MAILBOX_CAPACITY;

/// Relay configuration
#[derive(Debug, Clone, Deserialize)]
pub struct RelayConfig {
    /// Seconds of mailbox idleness before the dispatcher synthesizes a
    /// heartbeat
    #[serde(default = "default_heartbeat")]
    pub heartbeat_secs: u64,

    /// Per-session mailbox capacity; the oldest queued message is dropped
    /// once a slow client falls this far behind
    #[serde(default = "default_mailbox_capacity")]
    pub mailbox_capacity: usize,
}

impl RelayConfig {
    /// Get the heartbeat interval as Duration
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.heartbeat_secs)
    }

    /// Validate relay configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.heartbeat_secs == 0 {
            return Err(ValidationError::InvalidHeartbeat);
        }
        if self.mailbox_capacity == 0 {
            return Err(ValidationError::InvalidMailboxCapacity);
        }
        Ok(())
    }
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            heartbeat_secs: default_heartbeat(),
            mailbox_capacity: default_mailbox_capacity(),
        }
    }
}

fn default_heartbeat() -> u64 {
    30
}

fn default_mailbox_capacity() -> usize {
    DEFAULT_MAILBOX_CAPACITY
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = RelayConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.heartbeat(), Duration::from_secs(30));
    }

    #[test]
    fn zero_heartbeat_is_rejected() {
        let config = RelayConfig {
            heartbeat_secs: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(config.validate(), Err(ValidationError::InvalidHeartbeat)));
    }

    #[test]
    fn zero_capacity_is_rejected() {
        let config = RelayConfig {
            mailbox_capacity: 0,
            ..RelayConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ValidationError::InvalidMailboxCapacity)
        ));
    }
}
