// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport configuration.
//!
//! # Example
//!
//! ```
//! use messager::transport::tcp::{TcpConfig, TcpRole};
//! use std::time::Duration;
//!
//! let config = TcpConfig::client("127.0.0.1", 54555)
//!     .with_keepalive_interval(Duration::from_secs(2))
//!     .with_timeout(Duration::from_secs(6));
//! assert_eq!(config.role, TcpRole::Client);
//! assert!(config.validate().is_ok());
//! ```

use crate::config::MessagerConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::frame_codec::DEFAULT_MAX_MESSAGE_SIZE;

/// Which side of the session this endpoint plays.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TcpRole {
    /// Listen and accept one peer at a time. Keeps accepting after a peer drops.
    #[default]
    Server,

    /// Connect to a server. Does not reconnect once an established session drops.
    Client,
}

impl TcpRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            TcpRole::Server => "server",
            TcpRole::Client => "client",
        }
    }
}

/// TCP transport configuration.
#[derive(Clone, Debug)]
pub struct TcpConfig {
    pub role: TcpRole,

    /// Bind address (server) or peer host name (client).
    pub address: String,

    /// Listen port (server, 0 = ephemeral) or peer port (client).
    pub port: u16,

    // === Connection ===
    /// Timeout for outbound connects and for the handshake exchange.
    pub connect_timeout: Duration,

    /// Delay between client connection attempts.
    pub reconnect_delay: Duration,

    /// Client attempts before giving up (0 = infinite).
    pub max_connect_attempts: u32,

    // === Liveness ===
    /// Keep-alive frame interval, sent from `update()` (zero = disabled).
    pub keepalive_interval: Duration,

    /// Idle timeout on inbound traffic (zero = disabled).
    pub timeout: Duration,

    // === Framing ===
    /// Maximum frame size in bytes (anti-OOM protection).
    pub max_message_size: usize,

    /// Enable TCP_NODELAY (disable Nagle's algorithm).
    pub nodelay: bool,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            role: TcpRole::Server,
            address: "0.0.0.0".to_string(),
            port: 0,

            connect_timeout: Duration::from_secs(5),
            reconnect_delay: Duration::from_secs(1),
            max_connect_attempts: 0,

            keepalive_interval: Duration::from_secs(8),
            timeout: Duration::from_secs(12),

            max_message_size: DEFAULT_MAX_MESSAGE_SIZE,
            nodelay: true,
        }
    }
}

impl TcpConfig {
    /// Server listening on all interfaces.
    pub fn server(port: u16) -> Self {
        Self {
            role: TcpRole::Server,
            port,
            ..Default::default()
        }
    }

    /// Client connecting to `host:port`.
    pub fn client(host: impl Into<String>, port: u16) -> Self {
        Self {
            role: TcpRole::Client,
            address: host.into(),
            port,
            ..Default::default()
        }
    }

    /// Builder: set bind address / peer host
    pub fn with_address(mut self, address: impl Into<String>) -> Self {
        self.address = address.into();
        self
    }

    /// Builder: set connect timeout
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Builder: set reconnect delay and attempt budget
    pub fn with_reconnect(mut self, delay: Duration, max_attempts: u32) -> Self {
        self.reconnect_delay = delay;
        self.max_connect_attempts = max_attempts;
        self
    }

    /// Builder: set keep-alive interval
    pub fn with_keepalive_interval(mut self, interval: Duration) -> Self {
        self.keepalive_interval = interval;
        self
    }

    /// Builder: set idle timeout
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Builder: set max message size
    pub fn with_max_message_size(mut self, size: usize) -> Self {
        self.max_message_size = size;
        self
    }

    /// Builder: set TCP_NODELAY
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }

    /// Validate configuration, returning error message if invalid.
    pub fn validate(&self) -> Result<(), &'static str> {
        if self.address.is_empty() {
            return Err("address must not be empty");
        }
        if self.role == TcpRole::Client && self.port == 0 {
            return Err("client role requires a peer port");
        }
        if self.max_message_size == 0 {
            return Err("max_message_size must be > 0");
        }
        if self.max_message_size > 1024 * 1024 * 1024 {
            return Err("max_message_size too large (> 1 GB)");
        }
        if self.connect_timeout.is_zero() {
            return Err("connect_timeout must be > 0");
        }
        if !self.timeout.is_zero() && self.timeout <= self.keepalive_interval {
            return Err("timeout must exceed keepalive_interval");
        }
        Ok(())
    }
}

impl From<&MessagerConfig> for TcpConfig {
    fn from(config: &MessagerConfig) -> Self {
        Self {
            role: config.role,
            address: config.address.clone(),
            port: config.port,
            connect_timeout: Duration::from_millis(config.connect_timeout_ms),
            reconnect_delay: Duration::from_millis(config.reconnect_delay_ms),
            max_connect_attempts: config.max_connect_attempts,
            keepalive_interval: Duration::from_millis(config.keepalive_interval_ms),
            timeout: Duration::from_millis(config.timeout_ms),
            max_message_size: config.max_message_size,
            ..Default::default()
        }
    }
}
