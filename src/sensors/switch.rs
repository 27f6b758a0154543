//! Debounced push-button on a GPIO input.
//!
//! The line is sampled on a timer into an 8-bit shift register. Each sample
//! is OR-ed into bit 0 and the register is then shifted left, so bit 0 is
//! always clear and bits 1..4 hold the three most recent samples. A read
//! settles the state only when the low nibble is `0b1110` (three high
//! samples) or `0b0000` (three low samples), and clears the register when
//! it does. Anything else keeps the previous state.
//!
//! A cleared register also reads as `0b0000`, so reads must be spaced at
//! least three sample periods apart.

use super::SwitchSource;
use crate::clock::{TickMultiplexer, TimerHandle};
use crate::error::Result;
use crate::hardware::{GpioDriver, Level, PinMode, Pull};
use log::{info, warn};
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

const SAMPLE_MASK: u8 = 0x0F;
const ON_PATTERN: u8 = 0b0000_1110;
const OFF_PATTERN: u8 = 0b0000_0000;

/// Shift register fed by the sampling timer and drained by reads.
#[derive(Debug, Default)]
struct SampleRegister(AtomicU8);

impl SampleRegister {
    fn shift_in(&self, high: bool) {
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            Some((bits | u8::from(high)) << 1)
        });
    }

    /// Settled state, if the recent samples agree. Clears the register then.
    fn settle(&self) -> Option<bool> {
        let mut settled = None;
        let _ = self.0.fetch_update(Ordering::AcqRel, Ordering::Acquire, |bits| {
            settled = match bits & SAMPLE_MASK {
                ON_PATTERN => Some(true),
                OFF_PATTERN => Some(false),
                _ => None,
            };
            settled.map(|_| 0)
        });
        settled
    }

    fn bits(&self) -> u8 {
        self.0.load(Ordering::Acquire)
    }
}

pub struct Switch<D: GpioDriver + 'static> {
    driver: Arc<D>,
    pin: u32,
    samples: Arc<SampleRegister>,
    on: bool,
}

impl<D: GpioDriver + 'static> Switch<D> {
    pub fn new(driver: Arc<D>, pin: u32) -> Self {
        Self {
            driver,
            pin,
            samples: Arc::new(SampleRegister::default()),
            on: false,
        }
    }

    pub fn pin(&self) -> u32 {
        self.pin
    }

    /// Raw shift register contents.
    pub fn sample_bits(&self) -> u8 {
        self.samples.bits()
    }

    /// Configure the pin as an input with the pull-up enabled.
    pub fn setup(&mut self) -> Result<()> {
        self.driver.initialize()?;
        self.driver.set_mode(self.pin, PinMode::Input)?;
        self.driver.set_pull_up_down(self.pin, Pull::Up)?;
        info!("Switch ready on GPIO {}", self.pin);
        Ok(())
    }

    /// Take one sample of the line.
    pub fn sample(&self) -> Result<()> {
        sample_into(self.driver.as_ref(), self.pin, &self.samples)
    }

    /// Debounced state. Unsettled samples keep the previous state.
    pub fn read(&mut self) -> bool {
        if let Some(on) = self.samples.settle() {
            self.on = on;
        }
        self.on
    }

    /// Sample the line every `period_ticks` base ticks.
    pub fn start(&self, clock: &TickMultiplexer, period_ticks: u32) -> Result<TimerHandle> {
        let driver = Arc::clone(&self.driver);
        let samples = Arc::clone(&self.samples);
        let pin = self.pin;
        clock.register(period_ticks, move || {
            if let Err(e) = sample_into(driver.as_ref(), pin, &samples) {
                warn!("Switch sample on GPIO {} failed: {}", pin, e);
            }
        })
    }
}

fn sample_into<D: GpioDriver>(driver: &D, pin: u32, samples: &SampleRegister) -> Result<()> {
    let level = driver.digital_read(pin)?;
    samples.shift_in(level == Level::High);
    Ok(())
}

impl<D: GpioDriver + 'static> SwitchSource for Switch<D> {
    fn read(&mut self) -> bool {
        Switch::read(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::input::simulation::SimulatedGpio;

    const PIN: u32 = 26;

    fn switch(gpio: &Arc<SimulatedGpio>) -> Switch<SimulatedGpio> {
        let mut switch = Switch::new(Arc::clone(gpio), PIN);
        switch.setup().unwrap();
        switch
    }

    fn sample_levels(gpio: &SimulatedGpio, switch: &Switch<SimulatedGpio>, levels: &[Level]) {
        for &level in levels {
            gpio.set_input_level(PIN, level);
            switch.sample().unwrap();
        }
    }

    #[test]
    fn test_setup_enables_pull_up() {
        let gpio = Arc::new(SimulatedGpio::new());
        switch(&gpio);
        assert_eq!(gpio.mode(PIN), Some(PinMode::Input));
        assert_eq!(gpio.pull(PIN), Some(Pull::Up));
    }

    #[test]
    fn test_three_high_samples_turn_on() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut switch = switch(&gpio);
        assert!(!switch.read());

        sample_levels(&gpio, &switch, &[Level::High, Level::High]);
        assert!(!switch.read());
        sample_levels(&gpio, &switch, &[Level::High]);
        assert_eq!(switch.sample_bits() & SAMPLE_MASK, ON_PATTERN);
        assert!(switch.read());
        assert_eq!(switch.sample_bits(), 0);
    }

    #[test]
    fn test_bouncing_line_keeps_state() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut switch = switch(&gpio);
        sample_levels(&gpio, &switch, &[Level::High; 3]);
        assert!(switch.read());

        sample_levels(&gpio, &switch, &[Level::Low, Level::High, Level::Low]);
        assert!(switch.read());
        sample_levels(&gpio, &switch, &[Level::High, Level::Low, Level::High]);
        assert!(switch.read());
    }

    #[test]
    fn test_three_low_samples_turn_off() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut switch = switch(&gpio);
        sample_levels(&gpio, &switch, &[Level::High; 3]);
        assert!(switch.read());

        sample_levels(&gpio, &switch, &[Level::Low; 3]);
        assert!(!switch.read());
    }

    #[test]
    fn test_older_samples_are_ignored() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut switch = switch(&gpio);
        sample_levels(&gpio, &switch, &[Level::Low, Level::Low, Level::High, Level::High]);
        // register now ends in 0b0110
        assert!(!switch.read());
        assert_ne!(switch.sample_bits(), 0);
        sample_levels(&gpio, &switch, &[Level::High]);
        assert!(switch.read());
    }

    #[test]
    fn test_timer_drives_sampling() {
        let gpio = Arc::new(SimulatedGpio::new());
        let mut switch = switch(&gpio);
        let clock = TickMultiplexer::new();
        switch.start(&clock, 5).unwrap();

        for _ in 0..14 {
            clock.tick();
        }
        assert!(!switch.read());
        clock.tick();
        assert!(switch.read());
    }

    #[test]
    fn test_sample_on_bad_pin_fails() {
        let gpio = Arc::new(SimulatedGpio::new());
        let switch = Switch::new(gpio, 99);
        assert!(switch.sample().is_err());
    }
}
