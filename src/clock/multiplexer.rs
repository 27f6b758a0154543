//! Many logical timers driven by one base tick.
//!
//! Each registered timer counts base ticks and fires its callback every
//! `period` ticks. The registry belongs to the multiplexer instance; two
//! multiplexers never share timers.
//!
//! Callbacks run on the thread calling [`TickMultiplexer::tick`], after the
//! registry lock has been released, so a callback may register or unregister
//! timers (including itself). Counters for all timers are advanced before any
//! callback runs, which keeps timers independent of each other's callbacks.

use crate::error::{MonitorError, Result};
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

type TimerCallback = Arc<Mutex<Box<dyn FnMut() + Send>>>;

/// Identifies a registered timer.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct TimerHandle(u64);

struct TimerSlot {
    handle: TimerHandle,
    period: u32,
    count: u32,
    active: Arc<AtomicBool>,
    on_fire: TimerCallback,
}

#[derive(Default)]
pub struct TickMultiplexer {
    timers: Mutex<Vec<TimerSlot>>,
    next_handle: AtomicU64,
}

impl TickMultiplexer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fire `on_fire` every `period` ticks.
    pub fn register(
        &self,
        period: u32,
        on_fire: impl FnMut() + Send + 'static,
    ) -> Result<TimerHandle> {
        if period == 0 {
            return Err(MonitorError::InvalidConfig(
                "timer period must be at least one tick".to_string(),
            ));
        }

        let handle = TimerHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        self.timers.lock().push(TimerSlot {
            handle,
            period,
            count: 0,
            active: Arc::new(AtomicBool::new(true)),
            on_fire: Arc::new(Mutex::new(Box::new(on_fire))),
        });
        Ok(handle)
    }

    /// Remove a timer. Returns false if it was not registered.
    ///
    /// A timer removed from inside a callback does not fire again, even if it
    /// was due in the tick being processed.
    pub fn unregister(&self, handle: TimerHandle) -> bool {
        let mut timers = self.timers.lock();
        let Some(position) = timers.iter().position(|t| t.handle == handle) else {
            return false;
        };
        let slot = timers.remove(position);
        slot.active.store(false, Ordering::Release);
        true
    }

    pub fn len(&self) -> usize {
        self.timers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Advance every timer by one base tick and run the ones that are due.
    pub fn tick(&self) {
        let due: Vec<(Arc<AtomicBool>, TimerCallback)> = {
            let mut timers = self.timers.lock();
            timers
                .iter_mut()
                .filter_map(|slot| {
                    slot.count += 1;
                    if slot.count < slot.period {
                        return None;
                    }
                    slot.count = 0;
                    Some((Arc::clone(&slot.active), Arc::clone(&slot.on_fire)))
                })
                .collect()
        };

        for (active, on_fire) in due {
            if active.load(Ordering::Acquire) {
                let mut on_fire = on_fire.lock();
                (*on_fire)();
            }
        }
    }
}
