// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Update drivers: who calls the transport pump, and when.
//!
//! - [`PeriodicUpdateDriver`]: dedicated named thread ticking at a fixed period.
//! - [`ManualUpdateDriver`]: the application pumps from its own loop.

use crate::error::{Error, Result};
use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// One pump step (normally `Transport::update`).
pub type Pump = Arc<dyn Fn() -> Result<()> + Send + Sync>;

/// Calls a [`Pump`] until stopped.
pub trait UpdateDriver: Send + Sync {
    /// Begin pumping. Fails if already running.
    fn start(&self, pump: Pump) -> Result<()>;

    /// Stop pumping. No pump call starts after this returns (except when
    /// called from the pump itself). Stopping twice is a no-op.
    fn stop(&self);

    fn is_running(&self) -> bool;
}

struct Running {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Pumps on a named thread every `period`.
pub struct PeriodicUpdateDriver {
    name: String,
    period: Duration,
    running: Mutex<Option<Running>>,
}

impl PeriodicUpdateDriver {
    pub fn new(name: impl Into<String>, period: Duration) -> Self {
        Self {
            name: name.into(),
            period,
            running: Mutex::new(None),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }
}

impl UpdateDriver for PeriodicUpdateDriver {
    fn start(&self, pump: Pump) -> Result<()> {
        if self.period.is_zero() {
            return Err(Error::InvalidState("update period must be > 0".to_string()));
        }

        let mut running = self.running.lock();
        if running.is_some() {
            return Err(Error::InvalidState(format!(
                "update driver '{}' already running",
                self.name
            )));
        }

        let (stop_tx, stop_rx) = channel::bounded::<()>(1);
        let ticker = channel::tick(self.period);
        let name = self.name.clone();

        let handle = thread::Builder::new()
            .name(format!("{}-update", self.name))
            .spawn(move || {
                log::debug!("[driver] '{}' started", name);
                loop {
                    crossbeam::select! {
                        recv(stop_rx) -> _ => break,
                        recv(ticker) -> _ => {
                            match pump() {
                                Ok(()) => {}
                                Err(e) if e.is_fatal() => {
                                    log::error!("[driver] '{}' update failed: {}", name, e);
                                }
                                Err(e) => log::warn!("[driver] '{}' update failed: {}", name, e),
                            }
                        }
                    }
                }
                log::debug!("[driver] '{}' stopped", name);
            })?;

        *running = Some(Running { stop_tx, handle });
        Ok(())
    }

    fn stop(&self) {
        let Some(running) = self.running.lock().take() else {
            return;
        };
        let _ = running.stop_tx.send(());

        // Stopping from inside the pump (e.g. a listener closing the messager)
        // must not join the current thread.
        if running.handle.thread().id() == thread::current().id() {
            return;
        }
        if running.handle.join().is_err() {
            log::error!("[driver] '{}' update thread panicked", self.name);
        }
    }

    fn is_running(&self) -> bool {
        self.running.lock().is_some()
    }
}

impl Drop for PeriodicUpdateDriver {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Leaves pumping to the caller via [`ManualUpdateDriver::update`].
#[derive(Default)]
pub struct ManualUpdateDriver {
    pump: Mutex<Option<Pump>>,
}

impl ManualUpdateDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run one pump step. `Ok(false)` when the driver is not running.
    pub fn update(&self) -> Result<bool> {
        let Some(pump) = self.pump.lock().clone() else {
            return Ok(false);
        };
        pump()?;
        Ok(true)
    }
}

impl UpdateDriver for ManualUpdateDriver {
    fn start(&self, pump: Pump) -> Result<()> {
        let mut slot = self.pump.lock();
        if slot.is_some() {
            return Err(Error::InvalidState("manual driver already running".to_string()));
        }
        *slot = Some(pump);
        Ok(())
    }

    fn stop(&self) {
        self.pump.lock().take();
    }

    fn is_running(&self) -> bool {
        self.pump.lock().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Instant;

    fn counting_pump(count: &Arc<AtomicUsize>) -> Pump {
        let count = Arc::clone(count);
        Arc::new(move || -> Result<()> {
            count.fetch_add(1, Ordering::SeqCst);
            Ok(())
        })
    }

    #[test]
    fn test_periodic_driver_pumps_until_stopped() {
        let count = Arc::new(AtomicUsize::new(0));
        let driver = PeriodicUpdateDriver::new("test", Duration::from_millis(2));

        driver.start(counting_pump(&count)).expect("start");
        assert!(driver.is_running());
        assert!(driver.start(counting_pump(&count)).is_err());

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 3 {
            assert!(Instant::now() < deadline, "driver never pumped");
            thread::sleep(Duration::from_millis(1));
        }

        driver.stop();
        assert!(!driver.is_running());
        let after_stop = count.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);

        driver.stop();
    }

    #[test]
    fn test_periodic_driver_survives_pump_errors() {
        let count = Arc::new(AtomicUsize::new(0));
        let c = Arc::clone(&count);
        let driver = PeriodicUpdateDriver::new("failing", Duration::from_millis(2));
        driver
            .start(Arc::new(move || -> Result<()> {
                c.fetch_add(1, Ordering::SeqCst);
                Err(Error::Transport("pump failed".to_string()))
            }))
            .expect("start");

        let deadline = Instant::now() + Duration::from_secs(5);
        while count.load(Ordering::SeqCst) < 2 {
            assert!(Instant::now() < deadline, "driver stopped after an error");
            thread::sleep(Duration::from_millis(1));
        }
        driver.stop();
    }

    #[test]
    fn test_zero_period_rejected() {
        let driver = PeriodicUpdateDriver::new("zero", Duration::ZERO);
        let count = Arc::new(AtomicUsize::new(0));
        assert!(matches!(
            driver.start(counting_pump(&count)),
            Err(Error::InvalidState(_))
        ));
    }

    #[test]
    fn test_manual_driver() {
        let count = Arc::new(AtomicUsize::new(0));
        let driver = ManualUpdateDriver::new();

        assert!(!driver.update().expect("idle update"));
        driver.start(counting_pump(&count)).expect("start");
        assert!(driver.update().expect("update"));
        assert!(driver.update().expect("update"));
        assert_eq!(count.load(Ordering::SeqCst), 2);

        driver.stop();
        assert!(!driver.is_running());
        assert!(!driver.update().expect("stopped update"));
    }
}
