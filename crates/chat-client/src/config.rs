//! Client configuration. As with [`chat_server::ServerConfig`], the library
//! never reads argv or the environment — `chat-cli` builds a
//! [`ClientConfig`] from parsed flags and hands it over.

use std::time::Duration;

use chat_core::{DEFAULT_HEARTBEAT_INTERVAL_SECS, DEFAULT_REQUEST_TIMEOUT_SECS};

/// Fully-resolved client configuration.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Heartbeat emission interval; the client actually sends every
    /// `heartbeat_interval / 3` and treats `heartbeat_interval` of silence
    /// from the server as a lost connection.
    pub heartbeat_interval: Duration,
    /// Default timeout for a single request/response round trip.
    pub request_timeout: Duration,
    /// Timeout for the initial `Hello`/`HelloAck` handshake.
    pub handshake_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            handshake_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
        }
    }
}

impl ClientConfig {
    /// Validate invariants a CLI shell should catch before start-up.
    ///
    /// # Errors
    ///
    /// Returns a human-readable message describing the first violated
    /// invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat interval must be nonzero".into());
        }
        if self.request_timeout.is_zero() {
            return Err("request timeout must be nonzero".into());
        }
        if self.handshake_timeout.is_zero() {
            return Err("handshake timeout must be nonzero".into());
        }
        Ok(())
    }

    /// The interval between emitted heartbeats, `heartbeat_interval / 3`
    /// per the heartbeat protocol.
    #[must_use]
    pub fn heartbeat_emit_interval(&self) -> Duration {
        self.heartbeat_interval / 3
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ClientConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let mut config = ClientConfig::default();
        config.heartbeat_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn emit_interval_is_third_of_heartbeat() {
        let config = ClientConfig {
            heartbeat_interval: Duration::from_secs(60),
            ..ClientConfig::default()
        };
        assert_eq!(config.heartbeat_emit_interval(), Duration::from_secs(20));
    }
}
