//! Time sources
//!
//! Every temporal computation reads "now" through the `Clock` trait so that
//! the engine is deterministic under test. `SystemClock` is monotonic: it
//! never reports a time earlier than one it already reported.

use crate::error::{NeuronError, Result};
use crate::types::Timestamp;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

/// Trusted source of the current time in UTC seconds
pub trait Clock: Send + Sync {
    fn now(&self) -> Result<Timestamp>;
}

/// Wall-clock time, made monotonic
#[derive(Debug, Default)]
pub struct SystemClock {
    last: AtomicU64,
}

impl SystemClock {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Result<Timestamp> {
        let wall = chrono::Utc::now().timestamp();
        let wall = u64::try_from(wall).map_err(|_| {
            NeuronError::DependencyUnavailable(format!("system clock before epoch: {}", wall))
        })?;

        // fetch_max returns the previous value
        let previous = self.last.fetch_max(wall, Ordering::AcqRel);
        Ok(previous.max(wall))
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<Timestamp>,
}

impl ManualClock {
    /// Create a clock starting at `start`
    pub fn new(start: Timestamp) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move time forward by `seconds`
    pub fn advance(&self, seconds: u64) -> Timestamp {
        let mut now = self.now.lock();
        *now = now.saturating_add(seconds);
        *now
    }

    /// Jump to `timestamp`; moving backwards is ignored
    pub fn set(&self, timestamp: Timestamp) {
        let mut now = self.now.lock();
        if timestamp > *now {
            *now = timestamp;
        } else if timestamp < *now {
            tracing::warn!(current = *now, requested = timestamp, "ignoring backwards clock jump");
        }
    }

    pub fn current(&self) -> Timestamp {
        *self.now.lock()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Result<Timestamp> {
        Ok(*self.now.lock())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advance() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.now().unwrap(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now().unwrap(), 1_500);
    }

    #[test]
    fn test_manual_clock_never_goes_back() {
        let clock = ManualClock::new(1_000);
        clock.set(900);
        assert_eq!(clock.current(), 1_000);
        clock.set(2_000);
        assert_eq!(clock.current(), 2_000);
    }

    #[test]
    fn test_system_clock_monotonic() {
        let clock = SystemClock::new();
        let t1 = clock.now().unwrap();
        let t2 = clock.now().unwrap();
        assert!(t2 >= t1);
        assert!(t1 > 1_600_000_000);
    }
}
