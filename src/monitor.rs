//! Foreground poll loop.
//!
//! Repeatedly gives every observable a chance to handle its pending wake.
//! Sensor reads happen here, never on the scheduler thread.

use crate::observe::SensorObservable;
use log::{debug, info};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

pub struct PollLoop {
    observables: Vec<Box<dyn SensorObservable>>,
    running: Arc<AtomicBool>,
    idle: Duration,
}

impl PollLoop {
    /// `idle` is slept between passes; zero spins.
    pub fn new(idle: Duration) -> Self {
        Self {
            observables: Vec::new(),
            running: Arc::new(AtomicBool::new(true)),
            idle,
        }
    }

    pub fn add(&mut self, observable: Box<dyn SensorObservable>) {
        self.observables.push(observable);
    }

    /// Flag shared with whoever stops the loop.
    pub fn running(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    /// One pass over every observable. Returns how many notified.
    pub fn run_once(&mut self) -> usize {
        let mut notified = 0;
        for observable in self.observables.iter_mut() {
            if observable.check() {
                debug!("{} observable published", observable.name());
                notified += 1;
            }
        }
        notified
    }

    /// Poll until the running flag is cleared. Returns the observables so
    /// the caller can shut their sensors down.
    pub fn run(mut self) -> Vec<Box<dyn SensorObservable>> {
        info!("Poll loop running ({} observables)", self.observables.len());
        while self.running.load(Ordering::Acquire) {
            self.run_once();
            if !self.idle.is_zero() {
                std::thread::sleep(self.idle);
            }
        }
        info!("Poll loop stopped");
        self.observables
    }
}
