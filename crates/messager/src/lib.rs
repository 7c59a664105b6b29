// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! # messager - typed publish/subscribe between two endpoints
//!
//! Two endpoints agree on a [`MessagerApi`] (a closed set of typed topics),
//! connect over a [`Transport`] and exchange [`Message`]s. Locally, values
//! arrive either in bound variables ([`Input`]) or through
//! [`TopicListener`] callbacks.
//!
//! ## Quick Start
//!
//! ```rust
//! use messager::transport::loopback::LoopbackTransport;
//! use messager::{ManualUpdateDriver, Messager, MessagerApi, Result};
//! use std::sync::Arc;
//!
//! fn main() -> Result<()> {
//!     let mut builder = MessagerApi::builder("Robot");
//!     let speed = builder.topic::<f64>("Speed")?;
//!     let api = Arc::new(builder.build());
//!
//!     let (transport, _peer) = LoopbackTransport::pair();
//!     let messager = Messager::new(api, Arc::new(transport), Arc::new(ManualUpdateDriver::new()));
//!
//!     let current = messager.create_input(&speed, 0.0);
//!     messager.submit(&speed, 5.0)?; // delivered locally even while closed
//!     assert_eq!(current.value(), Some(5.0));
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +-------------------------------------------------------------+
//! |  Messager / MessagerBasics          (facade, handle)        |
//! +-------------------------------------------------------------+
//! |  MessageRouter -> BindingManager | ListenerManager          |
//! |  LifecycleController -> UpdateDriver (periodic | manual)    |
//! +-------------------------------------------------------------+
//! |  Transport: TcpTransport | LoopbackTransport               |
//! +-------------------------------------------------------------+
//! ```
//!
//! ## Modules Overview
//!
//! - [`api`] - topic registry
//! - [`engine`] - router, bound variables, listeners
//! - [`lifecycle`] - start/close state machine and update drivers
//! - [`transport`] - transport trait, TCP and loopback implementations
//! - [`config`] - TOML configuration
//!
//! ## Logging
//!
//! The crate logs through the `log` facade and never installs a logger.

pub mod api;
pub mod config;
pub mod engine;
pub mod error;
pub mod lifecycle;
pub mod message;
mod messager;
pub mod transport;

pub use api::{ApiBuilder, MessagerApi, Topic, TopicDescriptor, TopicId, TopicValue};
pub use config::{ConfigError, MessagerConfig};
pub use engine::{
    Input, MessagerStateListener, ReceiveOutcome, RouterMetricsSnapshot, SubmitOutcome,
    TopicListener,
};
pub use error::{Error, Result};
pub use lifecycle::{LifecycleState, ManualUpdateDriver, PeriodicUpdateDriver, UpdateDriver};
pub use message::{Message, Payload};
pub use messager::{Messager, MessagerBasics};
pub use transport::tcp::{TcpConfig, TcpRole, TcpTransport};
pub use transport::{Inbound, Transport};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
