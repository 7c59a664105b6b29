// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Messager lifecycle: connect, wait, pump, close.
//!
//! ```text
//! Created --start()--> Connecting --connected--> Open --close()--> Closed
//!    ^                     |
//!    +---- connect error --+            close() from any state --> Closed
//! ```
//!
//! `Closed` is terminal. Transport connection changes are forwarded to the
//! messager state listeners as they happen, independent of this state machine.

mod barrier;
mod driver;

pub use barrier::spin_until;
pub use driver::{ManualUpdateDriver, PeriodicUpdateDriver, Pump, UpdateDriver};

use crate::engine::StateListeners;
use crate::error::{Error, Result};
use crate::transport::Transport;
use parking_lot::Mutex;
use std::fmt;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LifecycleState {
    Created,
    Connecting,
    Open,
    Closed,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LifecycleState::Created => "created",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Open => "open",
            LifecycleState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Owns the start/close sequence of one messager.
pub struct LifecycleController {
    name: String,
    transport: Arc<dyn Transport>,
    driver: Arc<dyn UpdateDriver>,
    state: Mutex<LifecycleState>,
    state_listeners: Arc<StateListeners>,
}

impl LifecycleController {
    /// Wire transport connection changes into `state_listeners`.
    pub fn new(
        name: impl Into<String>,
        transport: Arc<dyn Transport>,
        driver: Arc<dyn UpdateDriver>,
        state_listeners: Arc<StateListeners>,
    ) -> Self {
        let forward = Arc::clone(&state_listeners);
        transport.add_connection_state_listener(Arc::new(move |open: bool| forward.notify(open)));

        Self {
            name: name.into(),
            transport,
            driver,
            state: Mutex::new(LifecycleState::Created),
            state_listeners,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn state(&self) -> LifecycleState {
        *self.state.lock()
    }

    /// Live transport connectivity, not the lifecycle state.
    pub fn is_open(&self) -> bool {
        self.transport.is_connected()
    }

    pub fn state_listeners(&self) -> &Arc<StateListeners> {
        &self.state_listeners
    }

    /// Connect, block until the transport reports connected, then start the driver.
    ///
    /// Blocks without timeout. A concurrent [`close`](Self::close) releases the
    /// wait and makes this return `Error::InvalidState`.
    pub fn start(&self) -> Result<()> {
        {
            let mut state = self.state.lock();
            if *state != LifecycleState::Created {
                return Err(Error::InvalidState(format!(
                    "cannot start messager '{}' while {}",
                    self.name, *state
                )));
            }
            *state = LifecycleState::Connecting;
        }
        log::info!("[lifecycle] '{}' connecting", self.name);

        if let Err(e) = self.transport.connect() {
            log::error!("[lifecycle] '{}' connect failed: {}", self.name, e);
            self.transition(LifecycleState::Connecting, LifecycleState::Created);
            return Err(e);
        }

        let spins = spin_until(|| {
            self.transport.is_connected() || self.state() != LifecycleState::Connecting
        });
        if self.state() != LifecycleState::Connecting {
            return Err(self.closed_while_starting());
        }
        log::debug!("[lifecycle] '{}' connected after {} spins", self.name, spins);

        let transport = Arc::clone(&self.transport);
        if let Err(e) = self.driver.start(Arc::new(move || transport.update())) {
            log::error!("[lifecycle] '{}' update driver failed to start: {}", self.name, e);
            if let Err(e) = self.transport.disconnect() {
                log::warn!("[lifecycle] '{}' disconnect after failed start: {}", self.name, e);
            }
            self.transition(LifecycleState::Connecting, LifecycleState::Created);
            return Err(e);
        }

        if !self.transition(LifecycleState::Connecting, LifecycleState::Open) {
            self.driver.stop();
            return Err(self.closed_while_starting());
        }
        log::info!("[lifecycle] '{}' open", self.name);
        Ok(())
    }

    /// Disconnect and stop the driver. Idempotent; `Closed` is terminal.
    pub fn close(&self) -> Result<()> {
        let previous = {
            let mut state = self.state.lock();
            std::mem::replace(&mut *state, LifecycleState::Closed)
        };
        if previous == LifecycleState::Closed {
            return Ok(());
        }

        log::info!("[lifecycle] '{}' closing (was {})", self.name, previous);
        let disconnected = self.transport.disconnect();
        self.driver.stop();
        disconnected
    }

    fn transition(&self, from: LifecycleState, to: LifecycleState) -> bool {
        let mut state = self.state.lock();
        if *state != from {
            return false;
        }
        *state = to;
        true
    }

    fn closed_while_starting(&self) -> Error {
        log::warn!("[lifecycle] '{}' closed while starting", self.name);
        Error::InvalidState(format!("messager '{}' closed while starting", self.name))
    }
}

impl fmt::Debug for LifecycleController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleController")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::transport::loopback::LoopbackTransport;
    use crate::transport::{ConnectionStateListener, ReceivedListener};
    use std::thread;
    use std::time::Duration;

    fn controller(transport: LoopbackTransport) -> (LifecycleController, Arc<ManualUpdateDriver>) {
        let driver = Arc::new(ManualUpdateDriver::new());
        let controller = LifecycleController::new(
            "test",
            Arc::new(transport),
            driver.clone(),
            Arc::new(StateListeners::new()),
        );
        (controller, driver)
    }

    #[test]
    fn test_start_and_close() {
        let (a, b) = LoopbackTransport::pair();
        b.connect().expect("peer connect");
        let (controller, driver) = controller(a);
        assert_eq!(controller.state(), LifecycleState::Created);
        assert!(!controller.is_open());

        controller.start().expect("start");
        assert_eq!(controller.state(), LifecycleState::Open);
        assert!(controller.is_open());
        assert!(driver.is_running());

        controller.close().expect("close");
        assert_eq!(controller.state(), LifecycleState::Closed);
        assert!(!controller.is_open());
        assert!(!driver.is_running());
        assert!(!b.is_connected());

        controller.close().expect("second close is a no-op");
        assert!(matches!(controller.start(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_start_twice_rejected() {
        let (a, b) = LoopbackTransport::pair();
        b.connect().expect("peer connect");
        let (controller, _driver) = controller(a);

        controller.start().expect("start");
        assert!(matches!(controller.start(), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_start_blocks_until_peer_connects() {
        let (a, b) = LoopbackTransport::pair();
        let (controller, _driver) = controller(a);
        let peer = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            b.connect().expect("peer connect");
            b
        });

        controller.start().expect("start");
        assert!(controller.is_open());
        let _b = peer.join().expect("peer thread");
    }

    #[test]
    fn test_close_releases_pending_start() {
        let (a, _b) = LoopbackTransport::pair();
        let (controller, driver) = controller(a);
        let controller = Arc::new(controller);

        let starter = {
            let controller = Arc::clone(&controller);
            thread::spawn(move || controller.start())
        };
        while controller.state() != LifecycleState::Connecting {
            thread::yield_now();
        }
        controller.close().expect("close");

        let result = starter.join().expect("starter thread");
        assert!(matches!(result, Err(Error::InvalidState(_))));
        assert_eq!(controller.state(), LifecycleState::Closed);
        assert!(!driver.is_running());
    }

    #[test]
    fn test_state_changes_forwarded_to_listeners() {
        let (a, b) = LoopbackTransport::pair();
        let (controller, _driver) = controller(a);
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let s = Arc::clone(&seen);
        controller
            .state_listeners()
            .register(Arc::new(move |open: bool| s.lock().push(open)));

        b.connect().expect("peer connect");
        controller.start().expect("start");
        b.disconnect().expect("peer disconnect");

        assert_eq!(*seen.lock(), vec![true, false]);
        assert!(!controller.is_open());
        assert_eq!(controller.state(), LifecycleState::Open);
    }

    #[test]
    fn test_driver_failure_disconnects_and_returns_to_created() {
        let (a, b) = LoopbackTransport::pair();
        b.connect().expect("peer connect");
        let (controller, driver) = controller(a);
        driver
            .start(Arc::new(|| -> Result<()> { Ok(()) }))
            .expect("occupy driver");

        assert!(matches!(controller.start(), Err(Error::InvalidState(_))));
        assert_eq!(controller.state(), LifecycleState::Created);
        assert!(!b.is_connected());
    }

    struct RefusingTransport;

    impl Transport for RefusingTransport {
        fn connect(&self) -> Result<()> {
            Err(Error::Transport("refused".to_string()))
        }

        fn disconnect(&self) -> Result<()> {
            Ok(())
        }

        fn is_connected(&self) -> bool {
            false
        }

        fn send(&self, _message: &Message) -> Result<()> {
            Err(Error::Transport("refused".to_string()))
        }

        fn set_received_listener(&self, _listener: ReceivedListener) {}

        fn add_connection_state_listener(&self, _listener: ConnectionStateListener) {}

        fn update(&self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_connect_failure_returns_to_created() {
        let controller = LifecycleController::new(
            "refused",
            Arc::new(RefusingTransport),
            Arc::new(ManualUpdateDriver::new()),
            Arc::new(StateListeners::new()),
        );

        assert!(matches!(controller.start(), Err(Error::Transport(_))));
        assert_eq!(controller.state(), LifecycleState::Created);
    }
}
