//! Push-button observable.
//!
//! Reads the debounced switch state on its own wake period and notifies
//! observers when the state flips. Sampling runs on a separate, faster timer
//! owned by the switch driver.

use super::SensorObservable;
use super::channel::{Observer, ObserverSet};
use crate::clock::{TickMultiplexer, TimerHandle, WakeSignal};
use crate::error::Result;
use crate::sensors::SwitchSource;
use log::info;
use std::sync::Arc;

pub const DEFAULT_SAMPLE_TICKS: u32 = 5;
pub const DEFAULT_READ_TICKS: u32 = 50;

pub struct SwitchObservable {
    switch: Box<dyn SwitchSource>,
    observers: ObserverSet<SwitchObservable>,
    on: bool,
    wake: WakeSignal,
}

impl SwitchObservable {
    pub fn new(switch: Box<dyn SwitchSource>) -> Self {
        Self {
            switch,
            observers: ObserverSet::new(),
            on: false,
            wake: WakeSignal::new(),
        }
    }

    pub fn is_on(&self) -> bool {
        self.on
    }

    pub fn wake_signal(&self) -> WakeSignal {
        self.wake.clone()
    }

    pub fn start(&self, clock: &TickMultiplexer, period_ticks: u32) -> Result<TimerHandle> {
        let wake = self.wake.clone();
        clock.register(period_ticks, move || wake.raise())
    }

    pub fn add_observer<O: Observer<SwitchObservable> + 'static>(
        &mut self,
        observer: &Arc<O>,
    ) -> bool {
        self.observers.add(observer)
    }

    pub fn remove_observer<O: Observer<SwitchObservable> + 'static>(
        &mut self,
        observer: &Arc<O>,
    ) -> bool {
        self.observers.remove(observer)
    }

    /// Process a pending wake. Returns true if the state flipped.
    pub fn check(&mut self) -> bool {
        if !self.wake.take() {
            return false;
        }

        let on = self.switch.read();
        if on == self.on {
            return false;
        }
        self.on = on;
        info!("Switch turned {}", if on { "on" } else { "off" });
        self.observers.notify(self);
        true
    }
}

impl SensorObservable for SwitchObservable {
    fn name(&self) -> &'static str {
        "switch"
    }

    fn check(&mut self) -> bool {
        SwitchObservable::check(self)
    }

    fn close(&mut self) {}
}
