//! Soil moisture observable.
//!
//! Same windowed-mean scheme as the climate observable, over a single value.
//! A failed read is logged and skipped; there is no forced republish.

use super::SensorObservable;
use super::channel::{Observer, ObserverSet};
use crate::clock::{TickMultiplexer, TimerHandle, WakeSignal};
use crate::error::Result;
use crate::sensors::{MoistureSource, SampleWindow};
use log::{debug, error, warn};
use std::sync::Arc;

pub const DEFAULT_WINDOW_SIZE: usize = 7;
pub const DEFAULT_PERIOD_TICKS: u32 = 20;

pub struct SoilObservable {
    sensor: Box<dyn MoistureSource>,
    observers: ObserverSet<SoilObservable>,
    samples: SampleWindow,
    moisture: f64,
    wake: WakeSignal,
}

impl SoilObservable {
    pub fn new(sensor: Box<dyn MoistureSource>, window_size: usize) -> Result<Self> {
        Ok(Self {
            sensor,
            observers: ObserverSet::new(),
            samples: SampleWindow::new(window_size)?,
            moisture: 0.0,
            wake: WakeSignal::new(),
        })
    }

    /// Last published soil moisture (%).
    pub fn moisture(&self) -> f64 {
        self.moisture
    }

    pub fn window_size(&self) -> usize {
        self.samples.capacity()
    }

    pub fn wake_signal(&self) -> WakeSignal {
        self.wake.clone()
    }

    /// Register a wake timer firing every `period_ticks` base ticks.
    pub fn start(&self, clock: &TickMultiplexer, period_ticks: u32) -> Result<TimerHandle> {
        let wake = self.wake.clone();
        clock.register(period_ticks, move || wake.raise())
    }

    pub fn add_observer<O: Observer<SoilObservable> + 'static>(&mut self, observer: &Arc<O>) -> bool {
        self.observers.add(observer)
    }

    pub fn remove_observer<O: Observer<SoilObservable> + 'static>(
        &mut self,
        observer: &Arc<O>,
    ) -> bool {
        self.observers.remove(observer)
    }

    pub fn observer_count(&self) -> usize {
        self.observers.len()
    }

    /// Process a pending wake. Returns true if observers were notified.
    pub fn check(&mut self) -> bool {
        if !self.wake.take() {
            return false;
        }

        let value = match self.sensor.read() {
            Ok(value) => value,
            Err(e) => {
                warn!("Soil moisture read failed: {}", e);
                return false;
            }
        };

        let Some(mean) = self.samples.push(value) else {
            return false;
        };
        if mean == self.moisture {
            return false;
        }
        self.moisture = mean;
        debug!("Soil moisture published: {:.1}", self.moisture);
        self.observers.notify(self);
        true
    }
}

impl SensorObservable for SoilObservable {
    fn name(&self) -> &'static str {
        "soil"
    }

    fn check(&mut self) -> bool {
        SoilObservable::check(self)
    }

    fn close(&mut self) {
        if let Err(e) = self.sensor.close() {
            error!("Soil sensor close failed: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use parking_lot::Mutex;
    use std::collections::VecDeque;

    struct Scripted(VecDeque<Result<f64>>);

    impl MoistureSource for Scripted {
        fn read(&mut self) -> Result<f64> {
            self.0.pop_front().unwrap_or(Ok(0.0))
        }
    }

    #[derive(Default)]
    struct Seen(Mutex<Vec<f64>>);

    impl Observer<SoilObservable> for Seen {
        fn update(&self, source: &SoilObservable) {
            self.0.lock().push(source.moisture());
        }
    }

    fn scripted(readings: Vec<Result<f64>>) -> SoilObservable {
        let sensor = Box::new(Scripted(readings.into()));
        SoilObservable::new(sensor, DEFAULT_WINDOW_SIZE).unwrap()
    }

    fn wake_and_check(soil: &mut SoilObservable) -> bool {
        soil.wake_signal().raise();
        soil.check()
    }

    #[test]
    fn test_publishes_after_full_window() {
        let readings = [50.0, 50.0, 50.0, 50.0, 50.0, 50.0, 60.0]
            .into_iter()
            .map(Ok)
            .collect();
        let mut soil = scripted(readings);
        let seen = Arc::new(Seen::default());
        soil.add_observer(&seen);

        let notified: Vec<bool> = (0..7).map(|_| wake_and_check(&mut soil)).collect();
        assert_eq!(notified, vec![false, false, false, false, false, false, true]);

        let published = seen.0.lock().clone();
        assert_eq!(published.len(), 1);
        assert!((published[0] - 360.0 / 7.0).abs() < 1e-9);
        assert!((soil.moisture() - 51.43).abs() < 0.01);
    }

    #[test]
    fn test_failed_read_is_skipped() {
        let mut readings: Vec<Result<f64>> = vec![Err(MonitorError::Spi {
            channel: 0,
            reason: "no reply".into(),
        })];
        readings.extend((0..7).map(|_| Ok(40.0)));
        let mut soil = scripted(readings);

        assert!(!wake_and_check(&mut soil));
        let notified = (0..7).filter(|_| wake_and_check(&mut soil)).count();
        assert_eq!(notified, 1);
        assert_eq!(soil.moisture(), 40.0);
    }

    #[test]
    fn test_unchanged_mean_does_not_notify() {
        let readings = (0..14).map(|_| Ok(30.0)).collect();
        let mut soil = scripted(readings);
        let seen = Arc::new(Seen::default());
        soil.add_observer(&seen);

        for _ in 0..14 {
            wake_and_check(&mut soil);
        }
        assert_eq!(*seen.0.lock(), vec![30.0]);
    }

    #[test]
    fn test_check_without_wake_is_idle() {
        let mut soil = scripted(vec![Ok(99.0)]);
        assert!(!soil.check());
        assert_eq!(soil.moisture(), 0.0);
    }

    #[test]
    fn test_start_registers_wake_timer() {
        let clock = TickMultiplexer::new();
        let soil = scripted(vec![]);
        soil.start(&clock, DEFAULT_PERIOD_TICKS).unwrap();
        for _ in 0..DEFAULT_PERIOD_TICKS {
            clock.tick();
        }
        assert!(soil.wake_signal().is_raised());
    }
}
