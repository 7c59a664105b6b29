// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-process transport pair.
//!
//! Two [`LoopbackTransport`] ends share one link. The link is up once both
//! ends have called `connect()`, and goes down as soon as either end
//! disconnects. Sent messages are queued on the peer and handed to its
//! received listener on the peer's next `update()`.
//!
//! # Example
//!
//! ```
//! use messager::transport::loopback::LoopbackTransport;
//! use messager::transport::Transport;
//!
//! let (a, b) = LoopbackTransport::pair();
//! a.connect().expect("connect a");
//! assert!(!a.is_connected());
//! b.connect().expect("connect b");
//! assert!(a.is_connected() && b.is_connected());
//! ```

use super::{ConnectionStateListener, Inbound, ReceivedListener, Transport};
use crate::error::{Error, Result};
use crate::message::Message;
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use std::sync::Arc;

struct Side {
    inbox_tx: Sender<Inbound>,
    inbox_rx: Receiver<Inbound>,
    received: Mutex<Option<ReceivedListener>>,
    state_listeners: Mutex<Vec<ConnectionStateListener>>,
}

impl Side {
    fn new() -> Self {
        let (inbox_tx, inbox_rx) = channel::unbounded();
        Self {
            inbox_tx,
            inbox_rx,
            received: Mutex::new(None),
            state_listeners: Mutex::new(Vec::new()),
        }
    }

    fn notify(&self, connected: bool) {
        let listeners: Vec<_> = self.state_listeners.lock().clone();
        for listener in listeners {
            listener(connected);
        }
    }

    fn clear_inbox(&self) {
        while self.inbox_rx.try_recv().is_ok() {}
    }
}

#[derive(Default)]
struct LinkState {
    wants: [bool; 2],
    connected: bool,
}

struct Link {
    state: Mutex<LinkState>,
    sides: [Side; 2],
}

/// One end of an in-process link.
pub struct LoopbackTransport {
    link: Arc<Link>,
    side: usize,
}

impl LoopbackTransport {
    /// Create both ends of a new link.
    pub fn pair() -> (Self, Self) {
        let link = Arc::new(Link {
            state: Mutex::new(LinkState::default()),
            sides: [Side::new(), Side::new()],
        });
        (
            Self {
                link: Arc::clone(&link),
                side: 0,
            },
            Self { link, side: 1 },
        )
    }

    fn me(&self) -> &Side {
        &self.link.sides[self.side]
    }

    fn peer(&self) -> &Side {
        &self.link.sides[1 - self.side]
    }

    /// Queue an object on this end as if the peer had sent it.
    pub fn push_inbound(&self, inbound: Inbound) {
        // Both ends of the channel live in `Side`, so the send cannot fail.
        let _ = self.me().inbox_tx.send(inbound);
    }

    /// Objects waiting for the next `update()`.
    pub fn pending(&self) -> usize {
        self.me().inbox_rx.len()
    }

    fn notify_both(&self, connected: bool) {
        log::info!(
            "[loopback] link {}",
            if connected { "up" } else { "down" }
        );
        self.me().notify(connected);
        self.peer().notify(connected);
    }
}

impl Transport for LoopbackTransport {
    fn connect(&self) -> Result<()> {
        let came_up = {
            let mut state = self.link.state.lock();
            state.wants[self.side] = true;
            if state.wants[0] && state.wants[1] && !state.connected {
                state.connected = true;
                true
            } else {
                false
            }
        };
        if came_up {
            self.notify_both(true);
        }
        Ok(())
    }

    fn disconnect(&self) -> Result<()> {
        let went_down = {
            let mut state = self.link.state.lock();
            state.wants[self.side] = false;
            std::mem::replace(&mut state.connected, false)
        };
        // Anything still queued for this end is lost with the session.
        self.me().clear_inbox();
        if went_down {
            self.notify_both(false);
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.link.state.lock().connected
    }

    fn send(&self, message: &Message) -> Result<()> {
        if !self.is_connected() {
            return Err(Error::Transport("loopback link is down".to_string()));
        }
        self.peer()
            .inbox_tx
            .send(Inbound::Message(message.clone()))
            .map_err(|e| Error::Transport(e.to_string()))
    }

    fn set_received_listener(&self, listener: ReceivedListener) {
        *self.me().received.lock() = Some(listener);
    }

    fn add_connection_state_listener(&self, listener: ConnectionStateListener) {
        self.me().state_listeners.lock().push(listener);
    }

    fn update(&self) -> Result<()> {
        let Some(listener) = self.me().received.lock().clone() else {
            return Ok(());
        };

        while let Ok(inbound) = self.me().inbox_rx.try_recv() {
            if let Err(e) = listener(inbound) {
                log::error!("[loopback] inbound delivery failed: {}", e);
                return Err(e);
            }
        }
        Ok(())
    }
}
