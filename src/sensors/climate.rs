//! Humidity/temperature sensor on a single GPIO line.
//!
//! A read pulls the line low for the start pulse, releases it, arms the pin
//! watchdog and waits for the sensor to clock a frame out. The edges are
//! decoded in the driver's callback context by an [`EdgeDecoder`] owned by
//! the callback; the result is picked up here from the shared [`FrameCell`].
//!
//! A read blocks for the start pulse plus the response wait (about 220 ms with
//! the default timing).
//!
//! A failed read does not erase the last good reading; it stays available
//! through [`ClimateSensor::last_reading`] until the next good frame.

use super::ClimateSource;
use super::decoder::{DecodedReading, EdgeDecoder, FrameCell};
use crate::error::{DecodeError, Result};
use crate::hardware::{CallbackId, Edge, GpioDriver, Level, PinMode, Pull};
use log::{debug, info, warn};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

/// Timing of one read cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClimateTiming {
    /// How long the host holds the line low to request a frame.
    pub start_pulse: Duration,
    /// How long to wait for the frame after releasing the line.
    pub response_wait: Duration,
    /// Watchdog armed while the frame is expected.
    pub watchdog_ms: u32,
}

impl Default for ClimateTiming {
    fn default() -> Self {
        Self {
            start_pulse: Duration::from_millis(17),
            response_wait: Duration::from_millis(200),
            watchdog_ms: 200,
        }
    }
}

pub struct ClimateSensor<D: GpioDriver + 'static> {
    driver: Arc<D>,
    pin: u32,
    timing: ClimateTiming,
    frames: Arc<FrameCell>,
    callback: Option<CallbackId>,
    last_sequence: Option<u32>,
    last_reading: Option<DecodedReading>,
    disarm_failures: Arc<AtomicU32>,
    reported_failures: u32,
}

impl<D: GpioDriver + 'static> ClimateSensor<D> {
    pub fn new(driver: Arc<D>, pin: u32, timing: ClimateTiming) -> Self {
        Self {
            driver,
            pin,
            timing,
            frames: Arc::new(FrameCell::new()),
            callback: None,
            last_sequence: None,
            last_reading: None,
            disarm_failures: Arc::new(AtomicU32::new(0)),
            reported_failures: 0,
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Shared cell the edge callback publishes frames into.
    pub fn frames(&self) -> Arc<FrameCell> {
        Arc::clone(&self.frames)
    }

    /// Most recent frame that decoded with a good checksum.
    pub fn last_reading(&self) -> Option<DecodedReading> {
        self.last_reading
    }

    /// Times the edge callback failed to disarm the watchdog.
    pub fn watchdog_disarm_failures(&self) -> u32 {
        self.disarm_failures.load(Ordering::Relaxed)
    }

    /// Initialise the driver and hook the decoder to the pin.
    ///
    /// Any failure here aborts this sensor's startup.
    pub fn setup(&mut self) -> Result<()> {
        self.driver.initialize()?;
        self.driver.set_pull_up_down(self.pin, Pull::Off)?;
        self.driver.set_watchdog(self.pin, 0)?;

        if self.callback.is_none() {
            let handler = decode_handler(
                Arc::downgrade(&self.driver),
                Arc::clone(&self.frames),
                Arc::clone(&self.disarm_failures),
            );
            self.callback = Some(
                self.driver
                    .register_edge_callback(self.pin, Edge::Either, handler)?,
            );
        }
        info!("Climate sensor ready on GPIO {}", self.pin);
        Ok(())
    }

    /// Send the start pulse and wait for the frame window to pass.
    fn trigger(&self) -> Result<()> {
        self.driver.set_mode(self.pin, PinMode::Output)?;
        self.driver.digital_write(self.pin, Level::Low)?;
        std::thread::sleep(self.timing.start_pulse);
        self.driver.set_mode(self.pin, PinMode::Input)?;
        self.driver.set_watchdog(self.pin, self.timing.watchdog_ms)?;
        std::thread::sleep(self.timing.response_wait);
        Ok(())
    }

    /// Request a frame and return it.
    ///
    /// Checksum mismatches, watchdog expiries and missing frames come back as
    /// [`DecodeError`]s wrapped in the crate error.
    pub fn read(&mut self) -> Result<DecodedReading> {
        self.trigger()?;

        let failures = self.watchdog_disarm_failures();
        if failures != self.reported_failures {
            warn!(
                "GPIO {}: watchdog disarm failed {} time(s)",
                self.pin,
                failures.wrapping_sub(self.reported_failures)
            );
            self.reported_failures = failures;
        }

        let frame = self.frames.load().ok_or(DecodeError::NoFrame)?;
        if self.last_sequence == Some(frame.sequence) {
            return Err(DecodeError::NoFrame.into());
        }
        self.last_sequence = Some(frame.sequence);

        let reading = frame.event.into_result()?;
        self.last_reading = Some(reading);
        debug!(
            "Climate frame: humidity={} temperature={}",
            reading.humidity, reading.temperature
        );
        Ok(reading)
    }

    /// Disarm the watchdog and detach the decoder.
    pub fn close(&mut self) -> Result<()> {
        self.driver.set_watchdog(self.pin, 0)?;
        if let Some(id) = self.callback.take() {
            self.driver.cancel_callback(id);
            info!("Climate sensor on GPIO {} closed", self.pin);
        }
        Ok(())
    }
}

impl<D: GpioDriver + 'static> ClimateSource for ClimateSensor<D> {
    fn read(&mut self) -> Result<DecodedReading> {
        ClimateSensor::read(self)
    }

    fn close(&mut self) -> Result<()> {
        ClimateSensor::close(self)
    }
}

impl<D: GpioDriver + 'static> Drop for ClimateSensor<D> {
    fn drop(&mut self) {
        if let Some(id) = self.callback.take() {
            self.driver.cancel_callback(id);
        }
    }
}

/// Edge callback owning the decoder.
///
/// Holds the driver weakly; the driver owns the callback.
fn decode_handler<D: GpioDriver + 'static>(
    driver: Weak<D>,
    frames: Arc<FrameCell>,
    disarm_failures: Arc<AtomicU32>,
) -> Box<dyn FnMut(u32, Edge, u32) + Send> {
    let mut decoder = EdgeDecoder::new();
    Box::new(move |pin, edge, tick| {
        let event = decoder.handle(edge, tick);
        if let Some(event) = event {
            frames.publish(event);
        }
        if (edge == Edge::Either || event.is_some())
            && let Some(driver) = driver.upgrade()
            && driver.set_watchdog(pin, 0).is_err()
        {
            // reported by the next read
            disarm_failures.fetch_add(1, Ordering::Relaxed);
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::input::simulation::SimulatedGpio;

    fn instant() -> ClimateTiming {
        ClimateTiming {
            start_pulse: Duration::ZERO,
            response_wait: Duration::ZERO,
            watchdog_ms: 200,
        }
    }

    #[test]
    fn test_read_decodes_simulated_frame() {
        let gpio = Arc::new(SimulatedGpio::new());
        gpio.attach_climate_source(27, || Some((48, 22)));
        let mut sensor = ClimateSensor::new(Arc::clone(&gpio), 27, instant());
        sensor.setup().unwrap();

        let reading = sensor.read().unwrap();
        assert_eq!((reading.humidity, reading.temperature), (48, 22));
        assert_eq!(gpio.watchdog(27), 0);
        assert_eq!(gpio.pull(27), Some(Pull::Off));
    }

    #[test]
    fn test_silent_sensor_times_out() {
        let gpio = Arc::new(SimulatedGpio::new());
        gpio.attach_climate_source(4, || None);
        let mut sensor = ClimateSensor::new(Arc::clone(&gpio), 4, instant());
        sensor.setup().unwrap();

        let err = sensor.read().unwrap_err();
        assert!(matches!(
            err,
            MonitorError::Decode(DecodeError::Timeout { bit_index: -2 })
        ));
        assert_eq!(gpio.watchdog(4), 0);
    }

    #[test]
    fn test_no_new_frame_is_reported() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut sensor = ClimateSensor::new(Arc::clone(&gpio), 17, instant());
        sensor.setup().unwrap();

        // no sensor attached: the line stays quiet
        assert!(matches!(
            sensor.read(),
            Err(MonitorError::Decode(DecodeError::NoFrame))
        ));
    }

    #[test]
    fn test_timeout_keeps_last_good_reading() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut answers = vec![None, Some((48, 22))];
        gpio.attach_climate_source(27, move || answers.pop().flatten());
        let mut sensor = ClimateSensor::new(Arc::clone(&gpio), 27, instant());
        sensor.setup().unwrap();
        assert_eq!(sensor.last_reading(), None);

        sensor.read().unwrap();
        assert!(matches!(
            sensor.read(),
            Err(MonitorError::Decode(DecodeError::Timeout { .. }))
        ));
        assert_eq!(sensor.last_reading(), Some(DecodedReading::new(48, 22)));
    }

    #[test]
    fn test_watchdog_disarm_failures_are_counted() {
        let gpio = Arc::new(SimulatedGpio::new());
        gpio.attach_climate_source(27, || Some((50, 20)));
        let mut sensor = ClimateSensor::new(Arc::clone(&gpio), 27, instant());
        sensor.setup().unwrap();

        gpio.set_watchdog_fault(true);
        let reading = sensor.read().unwrap();
        assert_eq!((reading.humidity, reading.temperature), (50, 20));
        assert_eq!(sensor.watchdog_disarm_failures(), 1);
        assert_eq!(gpio.watchdog(27), 200);

        sensor.read().unwrap();
        assert_eq!(sensor.watchdog_disarm_failures(), 2);

        gpio.set_watchdog_fault(false);
        sensor.close().unwrap();
        assert_eq!(gpio.watchdog(27), 0);
    }

    #[test]
    fn test_setup_failure_is_surfaced() {
        let gpio = Arc::new(SimulatedGpio::failing());
        let mut sensor = ClimateSensor::new(gpio, 27, instant());
        assert!(matches!(sensor.setup(), Err(MonitorError::HardwareSetup(_))));
    }

    #[test]
    fn test_close_cancels_callback() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut sensor = ClimateSensor::new(Arc::clone(&gpio), 27, instant());
        sensor.setup().unwrap();
        assert_eq!(gpio.callback_count(), 1);

        sensor.close().unwrap();
        assert_eq!(gpio.callback_count(), 0);
    }
}
