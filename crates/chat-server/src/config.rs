//! Server configuration. The library never reads argv or the environment
//! itself — `chat-cli` parses flags and environment variables and hands the
//! server a fully-constructed [`ServerConfig`], so this crate stays testable
//! without a process boundary.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use chat_core::{DEFAULT_CHAT_HISTORY_CAPACITY, DEFAULT_HEARTBEAT_INTERVAL_SECS};
use chat_crypto::password::PasswordParams;

/// Fully-resolved server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Local address to bind the UDP socket to.
    pub bind_addr: SocketAddr,
    /// Heartbeat interval: clients are reaped if silent for longer than
    /// this, and the reaper sweeps every `heartbeat_interval / 4`.
    pub heartbeat_interval: Duration,
    /// Path to the persisted user credential store.
    pub store_path: PathBuf,
    /// Per-log (public or private) chat history capacity.
    pub chat_history_capacity: usize,
    /// Argon2id cost parameters for password hashing.
    pub password_params: PasswordParams,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:0".parse().expect("valid default bind addr"),
            heartbeat_interval: Duration::from_secs(DEFAULT_HEARTBEAT_INTERVAL_SECS),
            store_path: PathBuf::from("./users.bin"),
            chat_history_capacity: DEFAULT_CHAT_HISTORY_CAPACITY,
            password_params: PasswordParams::default(),
        }
    }
}

impl ServerConfig {
    /// Validate invariants a CLI shell should catch before start-up:
    /// a nonzero heartbeat interval and a store path whose parent directory
    /// exists (or is the current directory).
    ///
    /// # Errors
    ///
    /// Returns a human-readable message describing the first violated
    /// invariant.
    pub fn validate(&self) -> Result<(), String> {
        if self.heartbeat_interval.is_zero() {
            return Err("heartbeat interval must be nonzero".into());
        }
        if let Some(parent) = self.store_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                return Err(format!(
                    "store path parent directory does not exist: {}",
                    parent.display()
                ));
            }
        }
        if self.chat_history_capacity == 0 {
            return Err("chat history capacity must be nonzero".into());
        }
        Ok(())
    }

    /// The reaper sweep interval, `heartbeat_interval / 4` per the
    /// concurrency model.
    #[must_use]
    pub fn reap_interval(&self) -> Duration {
        self.heartbeat_interval / 4
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        assert!(ServerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_heartbeat_rejected() {
        let mut config = ServerConfig::default();
        config.heartbeat_interval = Duration::ZERO;
        assert!(config.validate().is_err());
    }

    #[test]
    fn reap_interval_is_quarter_of_heartbeat() {
        let config = ServerConfig {
            heartbeat_interval: Duration::from_secs(60),
            ..ServerConfig::default()
        };
        assert_eq!(config.reap_interval(), Duration::from_secs(15));
    }
}
