// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! TCP transport: one framed, handshaken session between a server and a client.
//!
//! # Architecture
//!
//! ```text
//! +-----------------------------------------------------------+
//! |                       TcpTransport                        |
//! |  +------------------+   +------------------------------+  |
//! |  |  worker thread   |-->|  Session (own mio::Poll)     |  |
//! |  | mio::Poll: accept|   |  FrameCodec + outgoing queue |  |
//! |  | connect, Waker   |   +------------------------------+  |
//! |  |  + handshake     |          ^ update() / send()        |
//! |  +------------------+                                     |
//! +-----------------------------------------------------------+
//! ```
//!
//! The worker blocks in `Poll::poll`; `disconnect()` wakes it through a
//! `mio::Waker`. `update()` polls the session with a zero timeout.
//!
//! Frames are length-prefixed (see [`frame_codec`]); their bodies are
//! described in [`wire`].

mod config;
pub mod frame_codec;
mod transport;
pub mod wire;

pub use config::{TcpConfig, TcpRole};
pub use frame_codec::{FrameCodec, DEFAULT_MAX_MESSAGE_SIZE, FRAME_HEADER_SIZE};
pub use transport::{TcpStats, TcpTransport};
