//! Timekeeping: one base tick, many logical timers.
//!
//! [`Scheduler`] owns the thread producing the base tick, [`TickMultiplexer`]
//! fans it out to per-observable periods, and [`WakeSignal`] carries the
//! "time to sample" flag from the timer callback to the poll loop.

pub mod multiplexer;
pub mod scheduler;

pub use multiplexer::{TickMultiplexer, TimerHandle};
pub use scheduler::Scheduler;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// Pending-wake flag shared between a timer callback and an observable.
#[derive(Clone, Debug, Default)]
pub struct WakeSignal(Arc<AtomicBool>);

impl WakeSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }

    /// Clear the flag, returning whether it was set.
    pub fn take(&self) -> bool {
        self.0.swap(false, Ordering::AcqRel)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wake_signal_take_clears() {
        let signal = WakeSignal::new();
        let remote = signal.clone();
        assert!(!signal.take());

        remote.raise();
        assert!(signal.is_raised());
        assert!(signal.take());
        assert!(!signal.take());
    }
}
