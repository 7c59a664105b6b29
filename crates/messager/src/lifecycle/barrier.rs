// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Busy-wait barrier used while a transport comes up.

use std::thread;

/// Spin until `ready` returns `true`, yielding the CPU between polls.
///
/// No sleep, no backoff and no timeout: if `ready` never becomes true this
/// never returns. Callers that need an escape hatch fold it into `ready`.
/// Returns the number of polls that came back `false`.
#[inline]
pub fn spin_until(mut ready: impl FnMut() -> bool) -> u64 {
    let mut spins = 0u64;
    while !ready() {
        spins += 1;
        thread::yield_now();
    }
    spins
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn test_returns_immediately_when_ready() {
        assert_eq!(spin_until(|| true), 0);
    }

    #[test]
    fn test_waits_for_other_thread() {
        let flag = Arc::new(AtomicBool::new(false));
        let setter = {
            let flag = Arc::clone(&flag);
            thread::spawn(move || {
                thread::sleep(Duration::from_millis(20));
                flag.store(true, Ordering::Release);
            })
        };

        let spins = spin_until(|| flag.load(Ordering::Acquire));
        setter.join().expect("setter thread");

        assert!(flag.load(Ordering::Acquire));
        assert!(spins > 0);
    }

    #[test]
    fn test_counts_failed_polls() {
        let mut remaining = 3;
        let spins = spin_until(|| {
            remaining -= 1;
            remaining == 0
        });
        assert_eq!(spins, 2);
    }
}
