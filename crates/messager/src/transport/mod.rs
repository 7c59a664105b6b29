// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Transport abstraction and the bundled implementations.
//!
//! A transport moves [`Message`]s between two endpoints and reports inbound
//! objects and connection changes through callbacks. It owns no routing logic:
//! everything it receives goes to the registered [`ReceivedListener`].
//!
//! - [`loopback`]: in-process pair, delivered on `update()`.
//! - [`tcp`]: one framed TCP session (server or client role).

pub mod loopback;
pub mod tcp;

use crate::api::TopicId;
use crate::error::Result;
use crate::message::Message;
use std::sync::Arc;

/// One object handed up by a transport.
#[derive(Debug, Clone)]
pub enum Inbound {
    /// Already-typed message (in-process transports).
    Message(Message),
    /// Wire payload still to be decoded with the topic codec.
    Encoded { topic: TopicId, bytes: Vec<u8> },
    /// Protocol traffic that is not a message (keep-alive, handshake echo).
    Control { kind: &'static str },
}

/// Inbound handler. Errors are reported back to the delivery thread.
pub type ReceivedListener = Arc<dyn Fn(Inbound) -> Result<()> + Send + Sync>;

/// Connection-state handler, called with `true` on connect and `false` on loss.
pub type ConnectionStateListener = Arc<dyn Fn(bool) + Send + Sync>;

/// Contract between the messager and the network layer.
///
/// All methods take `&self`: transports are shared between caller threads,
/// the pump thread and their own I/O threads.
pub trait Transport: Send + Sync {
    /// Begin establishing the session. May return before it is up.
    fn connect(&self) -> Result<()>;

    /// Tear the session down. Calling it when already disconnected is a no-op.
    fn disconnect(&self) -> Result<()>;

    fn is_connected(&self) -> bool;

    /// Send one message to the peer.
    fn send(&self, message: &Message) -> Result<()>;

    /// Install the inbound handler, replacing any previous one.
    fn set_received_listener(&self, listener: ReceivedListener);

    fn add_connection_state_listener(&self, listener: ConnectionStateListener);

    /// Periodic pump: drive I/O, deliver inbound objects, keep the session alive.
    fn update(&self) -> Result<()>;
}
