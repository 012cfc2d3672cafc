//! Engine sidecar configuration

use serde::Deserialize;
use std::time::Duration;

use super::error::ValidationError;

/// Engine sidecar configuration
///
/// Per-session engine instances listen on ports derived from the session
/// id; only the host and the request timeout come from configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Host the engine sidecar instances run on
    #[serde(default = "default_engine_host")]
    pub host: String,

    /// Request timeout in seconds (turns can be slow)
    #[serde(default = "default_engine_timeout")]
    pub timeout_secs: u64,
}

impl EngineConfig {
    /// Get timeout as Duration
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Validate engine configuration
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.host.is_empty() {
            return Err(ValidationError::MissingRequired("ENGINE_HOST"));
        }
        if self.timeout_secs == 0 {
            return Err(ValidationError::InvalidTimeout);
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            host: default_engine_host(),
            timeout_secs: default_engine_timeout(),
        }
    }
}

fn default_engine_host() -> String {
    "127.0.0.1".to_string()
}

fn default_engine_timeout() -> u64 {
    120
}
