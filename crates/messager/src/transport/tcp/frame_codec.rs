// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing for the TCP session.
//!
//! ```text
//! +----------------+---------------------+
//! | Length (4B BE) | Frame body          |
//! +----------------+---------------------+
//! ```
//!
//! The length is the body size, header excluded. The decoder reads whatever
//! the socket has and keeps the surplus for the next call, so one codec must
//! follow its stream from the handshake into the session.

use std::io::{self, Read};

/// Frame header size (4 bytes for length).
pub const FRAME_HEADER_SIZE: usize = 4;

/// Default maximum frame size (16 MB).
pub const DEFAULT_MAX_MESSAGE_SIZE: usize = 16 * 1024 * 1024;

const READ_CHUNK: usize = 8 * 1024;

/// Buffered length-prefix decoder plus stateless encoders.
#[derive(Debug)]
pub struct FrameCodec {
    max_size: usize,
    received: Vec<u8>,
    frames_decoded: u64,
    frames_rejected: u64,
}

impl FrameCodec {
    pub fn new(max_size: usize) -> Self {
        Self {
            max_size,
            received: Vec::new(),
            frames_decoded: 0,
            frames_rejected: 0,
        }
    }

    pub fn frames_decoded(&self) -> u64 {
        self.frames_decoded
    }

    /// Frames refused for exceeding the size limit.
    pub fn frames_rejected(&self) -> u64 {
        self.frames_rejected
    }

    /// `[length: u32 BE][body]` as a new buffer.
    pub fn encode(body: &[u8]) -> Vec<u8> {
        let mut frame = Vec::with_capacity(FRAME_HEADER_SIZE + body.len());
        Self::encode_into(body, &mut frame);
        frame
    }

    /// Append `[length: u32 BE][body]` to `buf`.
    pub fn encode_into(body: &[u8], buf: &mut Vec<u8>) {
        let len = body.len() as u32;
        buf.extend_from_slice(&len.to_be_bytes());
        buf.extend_from_slice(body);
    }

    /// Next complete frame body, reading from `reader` only when the buffer
    /// holds no complete frame.
    ///
    /// `Ok(None)` means the reader would block. EOF, I/O errors and oversized
    /// frames are errors; the stream is unusable afterwards.
    pub fn decode<R: Read + ?Sized>(&mut self, reader: &mut R) -> io::Result<Option<Vec<u8>>> {
        let mut chunk = [0u8; READ_CHUNK];
        loop {
            if let Some(body) = self.take_frame()? {
                return Ok(Some(body));
            }
            match reader.read(&mut chunk) {
                Ok(0) if self.received.is_empty() => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "connection closed",
                    ));
                }
                Ok(0) => {
                    return Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!(
                            "connection closed inside a frame ({} bytes buffered)",
                            self.received.len()
                        ),
                    ));
                }
                Ok(n) => self.received.extend_from_slice(&chunk[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e),
            }
        }
    }

    fn take_frame(&mut self) -> io::Result<Option<Vec<u8>>> {
        let Some(header) = self.received.get(..FRAME_HEADER_SIZE) else {
            return Ok(None);
        };
        let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;

        if len > self.max_size {
            self.frames_rejected += 1;
            self.received.clear();
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("frame of {} bytes exceeds the {} byte limit", len, self.max_size),
            ));
        }

        let end = FRAME_HEADER_SIZE + len;
        if self.received.len() < end {
            return Ok(None);
        }
        let body = self.received[FRAME_HEADER_SIZE..end].to_vec();
        self.received.drain(..end);
        self.frames_decoded += 1;
        Ok(Some(body))
    }
}
