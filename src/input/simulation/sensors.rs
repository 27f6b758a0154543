//! Sensor simulation for hardware-less runs.
//!
//! Random-walk models that feed [`SimulatedGpio`] with readings that drift
//! slowly, plus the occasional missing frame, so the smoothing and
//! change-detection paths get exercised.

use super::SimulatedGpio;
use rand::Rng;

/// Humidity/temperature that wander around a starting point.
pub struct ClimateDrift {
    humidity: f64,
    temperature: f64,
    dropout_rate: f64,
}

impl ClimateDrift {
    pub fn new(humidity: f64, temperature: f64) -> Self {
        Self {
            humidity,
            temperature,
            dropout_rate: 0.0,
        }
    }

    /// Probability that a start pulse gets no answer at all.
    pub fn with_dropout(mut self, rate: f64) -> Self {
        self.dropout_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn next_frame(&mut self) -> Option<(u8, u8)> {
        let mut rng = rand::thread_rng();
        if rng.gen_bool(self.dropout_rate) {
            return None;
        }
        self.humidity = (self.humidity + rng.gen_range(-0.6..=0.6)).clamp(20.0, 90.0);
        self.temperature = (self.temperature + rng.gen_range(-0.3..=0.3)).clamp(0.0, 50.0);
        Some((self.humidity.round() as u8, self.temperature.round() as u8))
    }
}

/// Raw ADC value of a probe in slowly drying soil.
pub struct SoilDrift {
    raw: f64,
}

impl SoilDrift {
    pub fn new(raw: f64) -> Self {
        Self { raw }
    }

    pub fn next_raw(&mut self, _channel: u8) -> u16 {
        let mut rng = rand::thread_rng();
        self.raw = (self.raw + rng.gen_range(-4.0..=6.0)).clamp(0.0, 4095.0);
        self.raw.round() as u16
    }
}

/// Attach drifting climate and soil models to `gpio`.
pub fn attach_demo_sensors(gpio: &SimulatedGpio, climate_pin: u32) {
    let mut climate = ClimateDrift::new(55.0, 22.0).with_dropout(0.05);
    gpio.attach_climate_source(climate_pin, move || climate.next_frame());

    let mut soil = SoilDrift::new(2900.0);
    gpio.attach_adc(move |channel| soil.next_raw(channel));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_climate_drift_stays_in_range() {
        let mut drift = ClimateDrift::new(89.9, 49.9);
        for _ in 0..500 {
            let (humidity, temperature) = drift.next_frame().unwrap();
            assert!((20..=90).contains(&humidity));
            assert!(temperature <= 50);
        }
    }

    #[test]
    fn test_full_dropout_never_answers() {
        let mut drift = ClimateDrift::new(50.0, 20.0).with_dropout(3.0);
        assert!((0..20).all(|_| drift.next_frame().is_none()));
    }

    #[test]
    fn test_soil_drift_is_twelve_bit() {
        let mut drift = SoilDrift::new(4094.0);
        for _ in 0..500 {
            assert!(drift.next_raw(0) <= 4095);
        }
    }
}
