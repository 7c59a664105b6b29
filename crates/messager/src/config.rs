// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messager configuration.
//!
//! Supports both programmatic and file-based configuration:
//!
//! ```toml
//! name = "robot-a"
//! role = "server"
//! port = 54555
//! update_period_ms = 10
//! ```

use crate::transport::tcp::TcpRole;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Messager configuration (TCP endpoint plus routing options).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessagerConfig {
    /// Endpoint name, used in log lines and thread names.
    #[serde(default = "default_name")]
    pub name: String,

    #[serde(default)]
    pub role: TcpRole,

    /// Bind address (server) or peer host (client).
    #[serde(default = "default_address")]
    pub address: String,

    pub port: u16,

    /// Period of the update pump.
    #[serde(default = "default_update_period_ms")]
    pub update_period_ms: u64,

    /// Deliver submitted messages to local consumers as well.
    #[serde(default = "default_true")]
    pub allow_self_submit: bool,

    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,

    /// Client connection attempts before giving up (0 = retry forever).
    #[serde(default)]
    pub max_connect_attempts: u32,

    /// Keep-alive frame interval (0 = disabled).
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,

    /// Drop the session after this long without inbound traffic (0 = never).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_max_message_size")]
    pub max_message_size: usize,
}

fn default_name() -> String {
    "messager".to_string()
}

fn default_address() -> String {
    "127.0.0.1".to_string()
}

fn default_update_period_ms() -> u64 {
    10
}

fn default_true() -> bool {
    true
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_reconnect_delay_ms() -> u64 {
    1_000
}

fn default_keepalive_interval_ms() -> u64 {
    8_000
}

fn default_timeout_ms() -> u64 {
    12_000
}

fn default_max_message_size() -> usize {
    16 * 1024 * 1024
}

impl Default for MessagerConfig {
    fn default() -> Self {
        Self {
            name: default_name(),
            role: TcpRole::default(),
            address: default_address(),
            port: 0,
            update_period_ms: default_update_period_ms(),
            allow_self_submit: true,
            connect_timeout_ms: default_connect_timeout_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
            max_connect_attempts: 0,
            keepalive_interval_ms: default_keepalive_interval_ms(),
            timeout_ms: default_timeout_ms(),
            max_message_size: default_max_message_size(),
        }
    }
}

impl MessagerConfig {
    /// Load and validate a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn server(port: u16) -> Self {
        Self {
            role: TcpRole::Server,
            address: "0.0.0.0".to_string(),
            port,
            ..Default::default()
        }
    }

    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self {
            role: TcpRole::Client,
            address: host.into(),
            port,
            ..Default::default()
        }
    }

    pub fn update_period(&self) -> Duration {
        Duration::from_millis(self.update_period_ms)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.is_empty() {
            return Err(ConfigError::Invalid("name must not be empty".into()));
        }
        if self.address.is_empty() {
            return Err(ConfigError::Invalid("address must not be empty".into()));
        }
        if self.role == TcpRole::Client && self.port == 0 {
            return Err(ConfigError::Invalid(
                "client role requires a non-zero port".into(),
            ));
        }
        if self.update_period_ms == 0 {
            return Err(ConfigError::Invalid("update_period_ms must be > 0".into()));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::Invalid("connect_timeout_ms must be > 0".into()));
        }
        if self.max_message_size == 0 {
            return Err(ConfigError::Invalid("max_message_size must be > 0".into()));
        }
        if self.timeout_ms != 0 && self.timeout_ms <= self.keepalive_interval_ms {
            return Err(ConfigError::Invalid(format!(
                "timeout_ms ({}) must exceed keepalive_interval_ms ({})",
                self.timeout_ms, self.keepalive_interval_ms
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_minimal_toml_uses_defaults() {
        let config = MessagerConfig::from_toml_str("port = 54555\n").expect("parse");

        assert_eq!(config.port, 54555);
        assert_eq!(config.role, TcpRole::Server);
        assert_eq!(config.update_period(), Duration::from_millis(10));
        assert!(config.allow_self_submit);
        assert_eq!(config.keepalive_interval_ms, 8_000);
        assert_eq!(config.timeout_ms, 12_000);
    }

    #[test]
    fn test_client_toml() {
        let config = MessagerConfig::from_toml_str(
            r#"
            name = "robot-b"
            role = "client"
            address = "10.0.0.2"
            port = 54555
            allow_self_submit = false
            max_connect_attempts = 3
            "#,
        )
        .expect("parse");

        assert_eq!(config.role, TcpRole::Client);
        assert_eq!(config.address, "10.0.0.2");
        assert!(!config.allow_self_submit);
        assert_eq!(config.max_connect_attempts, 3);
    }

    #[test]
    fn test_validation_errors() {
        let err = MessagerConfig::from_toml_str("role = \"client\"\nport = 0\n").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let config = MessagerConfig {
            timeout_ms: 1_000,
            keepalive_interval_ms: 2_000,
            ..MessagerConfig::server(1)
        };
        assert!(config.validate().is_err());

        let config = MessagerConfig {
            timeout_ms: 0,
            ..MessagerConfig::server(1)
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_bad_toml_is_reported() {
        let err = MessagerConfig::from_toml_str("port = \"not a number\"").unwrap_err();
        assert!(matches!(err, ConfigError::Toml(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        writeln!(file, "name = \"from-file\"\nport = 6000").expect("write");

        let config = MessagerConfig::from_file(file.path()).expect("load");
        assert_eq!(config.name, "from-file");
        assert_eq!(config.port, 6000);

        let missing = MessagerConfig::from_file("/nonexistent/messager.toml").unwrap_err();
        assert!(matches!(missing, ConfigError::Io(_)));
    }
}
