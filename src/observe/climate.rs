//! Humidity/temperature observable.
//!
//! Each wake takes one reading. Good readings go into a pair of sample
//! windows; when the windows close a lap the means are compared against the
//! published values and observers are notified on any difference.
//!
//! A failed or all-zero reading does not enter the windows. After
//! `20 × window_size` of them in a row, observers are notified with the
//! current values anyway so the display shows the monitor is still alive.

use super::SensorObservable;
use super::channel::{Observer, ObserverSet};
use crate::clock::{TickMultiplexer, TimerHandle, WakeSignal};
use crate::error::{MonitorError, Result};
use crate::sensors::{ClimateSource, SampleWindow};
use log::{debug, error, warn};
use std::sync::Arc;

pub const DEFAULT_WINDOW_SIZE: usize = 3;
pub const DEFAULT_PERIOD_TICKS: u32 = 10;

/// Degenerate reads tolerated per window slot before a forced notification.
pub const ZERO_STREAK_FACTOR: usize = 20;

pub struct ClimateObservable {
    sensor: Box<dyn ClimateSource>,
    observers: ObserverSet<ClimateObservable>,
    temperatures: SampleWindow,
    humidities: SampleWindow,
    temperature: f64,
    humidity: f64,
    published_temperature: f64,
    published_humidity: f64,
    zero_streak: usize,
    wake: WakeSignal,
}

impl ClimateObservable {
    pub fn new(sensor: Box<dyn ClimateSource>, window_size: usize) -> Result<Self> {
        Ok(Self {
            sensor,
            observers: ObserverSet::new(),
            temperatures: SampleWindow::new(window_size)?,
            humidities: SampleWindow::new(window_size)?,
            temperature: 0.0,
            humidity: 0.0,
            published_temperature: 0.0,
            published_humidity: 0.0,
            zero_streak: 0,
            wake: WakeSignal::new(),
        })
    }

    /// Last published temperature (°C).
    pub fn temperature(&self) -> f64 {
        self.published_temperature
    }

    /// Last published relative humidity (%).
    pub fn humidity(&self) -> f64 {
        self.published_humidity
    }

    pub fn window_size(&self) -> usize {
        self.temperatures.capacity()
    }

    pub fn zero_streak(&self) -> usize {
        self.zero_streak
    }

    pub fn wake_signal(&self) -> WakeSignal {
        self.wake.clone()
    }

    /// Register a wake timer firing every `period_ticks` base ticks.
    pub fn start(&self, clock: &TickMultiplexer, period_ticks: u32) -> Result<TimerHandle> {
        let wake = self.wake.clone();
        clock.register(period_ticks, move || wake.raise())
    }

    pub fn add_observer<O: Observer<ClimateObservable> + 'static>(
        &mut self,
        observer: &Arc<O>,
    ) -> bool {
        self.observers.add(observer)
    }

    pub fn remove_observer<O: Observer<ClimateObservable> + 'static>(
        &mut self,
        observer: &Arc<O>,
    ) -> bool {
        self.observers.remove(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Publish the current means and notify.
    fn set_changed(&mut self) {
        self.published_temperature = self.temperature;
        self.published_humidity = self.humidity;
        debug!(
            "Climate published: temperature={:.1} humidity={:.1}",
            self.published_temperature, self.published_humidity
        );
        self.observers.notify(self);
    }

    fn on_degenerate(&mut self) -> bool {
        self.zero_streak += 1;
        if self.zero_streak < ZERO_STREAK_FACTOR * self.window_size() {
            return false;
        }
        warn!(
            "Climate sensor produced {} unusable readings in a row; republishing last values",
            self.zero_streak
        );
        self.zero_streak = 0;
        self.set_changed();
        true
    }

    /// Process a pending wake. Returns true if observers were notified.
    pub fn check(&mut self) -> bool {
        if !self.wake.take() {
            return false;
        }

        let reading = match self.sensor.read() {
            Ok(reading) if !reading.is_degenerate() => reading,
            Ok(_) => {
                debug!("Climate sensor returned an all-zero reading");
                return self.on_degenerate();
            }
            Err(MonitorError::Decode(e)) => {
                debug!("Climate frame rejected: {}", e);
                return self.on_degenerate();
            }
            Err(e) => {
                error!("Climate sensor read failed: {}", e);
                return self.on_degenerate();
            }
        };
        self.zero_streak = 0;

        let temperature = self.temperatures.push(f64::from(reading.temperature));
        let humidity = self.humidities.push(f64::from(reading.humidity));
        let (Some(temperature), Some(humidity)) = (temperature, humidity) else {
            return false;
        };
        self.temperature = temperature;
        self.humidity = humidity;

        // exact comparison: any difference in the means is a change
        if self.temperature != self.published_temperature
            || self.humidity != self.published_humidity
        {
            self.set_changed();
            return true;
        }
        false
    }
}

impl SensorObservable for ClimateObservable {
    fn name(&self) -> &'static str {
        "climate"
    }

    fn check(&mut self) -> bool {
        ClimateObservable::check(self)
    }

    fn close(&mut self) {
        if let Err(e) = self.sensor.close() {
            error!("Climate sensor close failed: {}", e);
        }
    }
}
