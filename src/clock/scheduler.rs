//! Base tick source.
//!
//! A dedicated thread calls [`TickMultiplexer::tick`] at a fixed interval
//! until the scheduler is stopped or dropped. Sleeping is deadline based so
//! slow callbacks do not accumulate drift.

use super::TickMultiplexer;
use crate::error::Result;
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

pub struct Scheduler {
    running: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    interval: Duration,
}

impl Scheduler {
    /// Start ticking `clock` every `interval`.
    pub fn start(clock: Arc<TickMultiplexer>, interval: Duration) -> Result<Self> {
        let running = Arc::new(AtomicBool::new(true));
        let flag = Arc::clone(&running);

        let handle = std::thread::Builder::new()
            .name("tick-scheduler".into())
            .spawn(move || {
                let mut deadline = Instant::now() + interval;
                while flag.load(Ordering::Acquire) {
                    std::thread::sleep(deadline.saturating_duration_since(Instant::now()));
                    if !flag.load(Ordering::Acquire) {
                        break;
                    }
                    clock.tick();

                    deadline += interval;
                    let now = Instant::now();
                    if deadline < now {
                        // fell behind by more than a tick; do not burst to catch up
                        deadline = now + interval;
                    }
                }
            })?;

        info!("Tick scheduler started ({:?} per tick)", interval);
        Ok(Self {
            running,
            handle: Some(handle),
            interval,
        })
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Stop ticking and wait for the thread to exit.
    pub fn stop(&mut self) {
        self.running.store(false, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("Tick scheduler thread panicked");
            }
            info!("Tick scheduler stopped");
        }
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_scheduler_ticks_until_stopped() {
        let clock = Arc::new(TickMultiplexer::new());
        let count = Arc::new(AtomicUsize::new(0));
        let inner = Arc::clone(&count);
        clock
            .register(1, move || {
                inner.fetch_add(1, Ordering::SeqCst);
            })
            .unwrap();

        let mut scheduler = Scheduler::start(Arc::clone(&clock), Duration::from_millis(1)).unwrap();
        let started = Instant::now();
        while count.load(Ordering::SeqCst) < 5 && started.elapsed() < Duration::from_secs(5) {
            std::thread::sleep(Duration::from_millis(1));
        }
        scheduler.stop();
        assert!(!scheduler.is_running());

        let after_stop = count.load(Ordering::SeqCst);
        assert!(after_stop >= 5);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(count.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn test_drop_stops_thread() {
        let clock = Arc::new(TickMultiplexer::new());
        let scheduler = Scheduler::start(Arc::clone(&clock), Duration::from_millis(1)).unwrap();
        drop(scheduler);
        // only the test's own reference is left once the thread has exited
        assert_eq!(Arc::strong_count(&clock), 1);
    }
}
