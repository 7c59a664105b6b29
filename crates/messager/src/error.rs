// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types shared by the router, lifecycle and transports.

use crate::api::TopicId;
use crate::config::ConfigError;
use thiserror::Error;

/// Errors returned by messager operations.
///
/// Only [`Error::UnknownTopic`] comes out of the routing path. It means both
/// endpoints (or the caller and its API) disagree on the topic set, which is
/// never transient, so it is never retried. Connection loss is not an error at
/// all: it is reported through state listeners.
#[derive(Debug, Error)]
pub enum Error {
    /// The message references a topic that is not part of this messager's API.
    #[error("Topic {id} is not part of this messager's API")]
    UnknownTopic { id: TopicId },

    /// Operation not allowed in the current lifecycle state.
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Transport-level failure (send, connect, pump).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Peer handshake rejected (API mismatch, bad frame).
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// Payload could not be encoded or decoded with the topic codec.
    #[error("Codec error: {0}")]
    Codec(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}

impl Error {
    /// True for errors that indicate an API mismatch or programming error.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::UnknownTopic { .. } | Error::Handshake(_))
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, Error>;
