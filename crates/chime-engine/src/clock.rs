//! Shared musical-time clock.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Monotonic tick counter advanced by the render path and waited on by
/// caller threads.
///
/// The mutex is held only to read or bump the counter, so the render
/// thread never blocks behind a waiter.
pub struct TickClock {
    tick: Mutex<u64>,
    waiters: Condvar,
}

impl TickClock {
    pub fn new() -> Self {
        Self {
            tick: Mutex::new(0),
            waiters: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, u64> {
        self.tick.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Current tick.
    pub fn now(&self) -> u64 {
        *self.lock()
    }

    /// Advance by `ticks` and wake all waiters. Returns the new tick.
    pub fn advance(&self, ticks: u64) -> u64 {
        let now = {
            let mut tick = self.lock();
            *tick += ticks;
            *tick
        };
        self.waiters.notify_all();
        now
    }

    /// Block until the clock reaches `target`. Returns immediately if it
    /// already has.
    pub fn wait_for_tick(&self, target: u64) {
        let mut tick = self.lock();
        while *tick < target {
            tick = self
                .waiters
                .wait(tick)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
        }
    }

    /// Like [`TickClock::wait_for_tick`] but gives up after `timeout`.
    /// Returns whether the target was reached.
    pub fn wait_for_tick_timeout(&self, target: u64, timeout: Duration) -> bool {
        let mut tick = self.lock();
        while *tick < target {
            let (guard, result) = self
                .waiters
                .wait_timeout(tick, timeout)
                .unwrap_or_else(|poisoned| poisoned.into_inner());
            tick = guard;
            if result.timed_out() {
                return *tick >= target;
            }
        }
        true
    }
}

impl Default for TickClock {
    fn default() -> Self {
        Self::new()
    }
}
