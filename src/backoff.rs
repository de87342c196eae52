//! Bounded retry/backoff shared by the readers and the watcher.
//!
//! A `Backoff` yields delays starting at `floor`, multiplied by `multiplier`
//! after every attempt and never exceeding `ceiling`.

use std::thread;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Backoff {
    pub floor: Duration,
    pub ceiling: Duration,
    pub multiplier: f64,
}

impl Backoff {
    pub fn new(floor: Duration, ceiling: Duration, multiplier: f64) -> Self {
        let ceiling = ceiling.max(floor);
        Self {
            floor,
            ceiling,
            multiplier: multiplier.max(1.0),
        }
    }

    /// Fixed interval, useful for polling loops.
    pub fn constant(interval: Duration) -> Self {
        Self::new(interval, interval, 1.0)
    }

    /// Clamp a requested delay into this backoff's window.
    pub fn clamp(&self, delay: Duration) -> Duration {
        delay.clamp(self.floor, self.ceiling)
    }

    /// Infinite sequence of delays.
    pub fn delays(&self) -> Delays {
        Delays {
            next: self.floor,
            ceiling: self.ceiling,
            multiplier: self.multiplier,
        }
    }

    /// Run `op` until it yields `Some`, sleeping between attempts.
    ///
    /// Gives up after `attempts` tries, or once `deadline` has passed, and
    /// returns `None`. No sleep follows the final attempt and no sleep runs
    /// past the deadline.
    pub fn retry<T>(
        &self,
        attempts: u32,
        deadline: Option<Instant>,
        mut op: impl FnMut(u32) -> Option<T>,
    ) -> Option<T> {
        let mut delays = self.delays();
        for attempt in 0..attempts {
            if let Some(value) = op(attempt) {
                return Some(value);
            }
            if attempt + 1 >= attempts {
                break;
            }
            let Some(delay) = delays.next() else {
                break;
            };
            match deadline {
                Some(deadline) if Instant::now() >= deadline => break,
                Some(deadline) => self.sleep_until(delay, deadline),
                None => thread::sleep(self.clamp(delay)),
            }
        }
        None
    }

    /// Sleep for `delay` clamped to the window, but never past `deadline`.
    pub fn sleep_until(&self, delay: Duration, deadline: Instant) {
        let remaining = deadline.saturating_duration_since(Instant::now());
        let delay = self.clamp(delay).min(remaining);
        if !delay.is_zero() {
            thread::sleep(delay);
        }
    }
}

/// Iterator over backoff delays.
#[derive(Debug, Clone)]
pub struct Delays {
    next: Duration,
    ceiling: Duration,
    multiplier: f64,
}

impl Iterator for Delays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        let current = self.next;
        self.next = self.next.mul_f64(self.multiplier).min(self.ceiling);
        Some(current)
    }
}
