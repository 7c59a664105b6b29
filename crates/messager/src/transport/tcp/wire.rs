// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Frame bodies exchanged over a TCP session.
//!
//! ```text
//! Hello / HelloAck : [kind:1][topic_count: u32 BE][api name: UTF-8]
//! KeepAlive        : [kind:1]
//! Message          : [kind:1][topic id: u32 BE][payload: topic codec bytes]
//! ```
//!
//! The client opens with `Hello`, the server answers `HelloAck` with its own
//! API identity and closes the socket if the two differ.

use crate::api::{MessagerApi, TopicId};
use crate::error::{Error, Result};

const KIND_HELLO: u8 = 0x01;
const KIND_HELLO_ACK: u8 = 0x02;
const KIND_KEEP_ALIVE: u8 = 0x03;
const KIND_MESSAGE: u8 = 0x10;

/// API identity compared during the handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiIdentity {
    pub name: String,
    pub topic_count: u32,
}

impl ApiIdentity {
    pub fn of(api: &MessagerApi) -> Self {
        Self {
            name: api.name().to_string(),
            topic_count: u32::try_from(api.len()).unwrap_or(u32::MAX),
        }
    }

    /// `Err(Handshake)` describing the first difference.
    pub fn check_peer(&self, peer: &ApiIdentity) -> Result<()> {
        if self.name != peer.name {
            return Err(Error::Handshake(format!(
                "API name mismatch: local '{}', peer '{}'",
                self.name, peer.name
            )));
        }
        if self.topic_count != peer.topic_count {
            return Err(Error::Handshake(format!(
                "API '{}' topic count mismatch: local {}, peer {}",
                self.name, self.topic_count, peer.topic_count
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Hello(ApiIdentity),
    HelloAck(ApiIdentity),
    KeepAlive,
    Message { topic: TopicId, body: Vec<u8> },
}

impl Frame {
    pub fn kind(&self) -> &'static str {
        match self {
            Frame::Hello(_) => "hello",
            Frame::HelloAck(_) => "hello-ack",
            Frame::KeepAlive => "keep-alive",
            Frame::Message { .. } => "message",
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            Frame::Hello(identity) => encode_identity(KIND_HELLO, identity),
            Frame::HelloAck(identity) => encode_identity(KIND_HELLO_ACK, identity),
            Frame::KeepAlive => vec![KIND_KEEP_ALIVE],
            Frame::Message { topic, body } => {
                let mut buf = Vec::with_capacity(5 + body.len());
                buf.push(KIND_MESSAGE);
                buf.extend_from_slice(&topic.0.to_be_bytes());
                buf.extend_from_slice(body);
                buf
            }
        }
    }

    pub fn decode(buf: &[u8]) -> Result<Frame> {
        let (&kind, rest) = buf
            .split_first()
            .ok_or_else(|| Error::Codec("empty frame".to_string()))?;

        match kind {
            KIND_HELLO => Ok(Frame::Hello(decode_identity(rest)?)),
            KIND_HELLO_ACK => Ok(Frame::HelloAck(decode_identity(rest)?)),
            KIND_KEEP_ALIVE => Ok(Frame::KeepAlive),
            KIND_MESSAGE => {
                let (id, body) = split_u32(rest)?;
                Ok(Frame::Message {
                    topic: TopicId(id),
                    body: body.to_vec(),
                })
            }
            other => Err(Error::Codec(format!("unknown frame kind 0x{:02x}", other))),
        }
    }
}

fn encode_identity(kind: u8, identity: &ApiIdentity) -> Vec<u8> {
    let mut buf = Vec::with_capacity(5 + identity.name.len());
    buf.push(kind);
    buf.extend_from_slice(&identity.topic_count.to_be_bytes());
    buf.extend_from_slice(identity.name.as_bytes());
    buf
}

fn decode_identity(buf: &[u8]) -> Result<ApiIdentity> {
    let (topic_count, name) = split_u32(buf)?;
    let name = std::str::from_utf8(name)
        .map_err(|e| Error::Codec(format!("API name is not UTF-8: {}", e)))?;
    Ok(ApiIdentity {
        name: name.to_string(),
        topic_count,
    })
}

fn split_u32(buf: &[u8]) -> Result<(u32, &[u8])> {
    if buf.len() < 4 {
        return Err(Error::Codec(format!(
            "truncated frame: {} bytes, need 4",
            buf.len()
        )));
    }
    let (head, rest) = buf.split_at(4);
    Ok((u32::from_be_bytes([head[0], head[1], head[2], head[3]]), rest))
}
