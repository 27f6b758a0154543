//! Monitoring screen: renders published sensor values onto a character
//! display.
//!
//! The screen owns one observer per observable kind. Each observer caches
//! the last values it was handed and redraws its own rows; the rows never
//! overlap, so the two observers can update independently.

use crate::display::CharacterDisplay;
use crate::error::{MonitorError, Result};
use crate::observe::{ClimateObservable, Observer, SoilObservable};
use log::{error, info};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;

pub const TEMPERATURE_ROW: usize = 0;
pub const HUMIDITY_ROW: usize = 1;
pub const SOIL_ROW: usize = 2;

pub fn temperature_row(temperature: f64) -> String {
    format!("Temperature: {:.1}", temperature)
}

pub fn humidity_row(humidity: f64) -> String {
    format!("Humidity   : {:.1}", humidity)
}

/// Moisture is shown as a whole percentage, truncated, right-aligned in
/// three columns.
pub fn soil_row(moisture: f64) -> String {
    format!("SoilMoisture: {:>3}", moisture.trunc() as i64)
}

struct ScreenWriter {
    display: Mutex<Box<dyn CharacterDisplay>>,
}

impl ScreenWriter {
    fn write(&self, text: &str, row: usize) {
        if let Err(e) = self.display.lock().write_str(text, row, 0) {
            error!("Failed to write display row {}: {}", row, e);
        }
    }
}

/// Shows temperature and humidity.
pub struct ClimateObserver {
    writer: Arc<ScreenWriter>,
    values: RwLock<(f64, f64)>,
}

impl ClimateObserver {
    pub fn temperature(&self) -> f64 {
        self.values.read().0
    }

    pub fn humidity(&self) -> f64 {
        self.values.read().1
    }
}

impl Observer<ClimateObservable> for ClimateObserver {
    fn update(&self, source: &ClimateObservable) {
        let (temperature, humidity) = (source.temperature(), source.humidity());
        *self.values.write() = (temperature, humidity);
        self.writer.write(&temperature_row(temperature), TEMPERATURE_ROW);
        self.writer.write(&humidity_row(humidity), HUMIDITY_ROW);
    }
}

/// Shows soil moisture.
pub struct SoilObserver {
    writer: Arc<ScreenWriter>,
    moisture: RwLock<f64>,
}

impl SoilObserver {
    pub fn moisture(&self) -> f64 {
        *self.moisture.read()
    }
}

impl Observer<SoilObservable> for SoilObserver {
    fn update(&self, source: &SoilObservable) {
        let moisture = source.moisture();
        *self.moisture.write() = moisture;
        self.writer.write(&soil_row(moisture), SOIL_ROW);
    }
}

pub struct MonitoringScreen {
    climate: Arc<ClimateObserver>,
    soil: Arc<SoilObserver>,
}

impl MonitoringScreen {
    /// Take ownership of `display`, set it up and clear it.
    pub fn new(mut display: impl CharacterDisplay + 'static) -> Result<Self> {
        display
            .setup()
            .and_then(|_| display.clear())
            .map_err(|e| MonitorError::HardwareSetup(format!("display: {}", e)))?;
        info!("Monitoring screen ready");

        let writer = Arc::new(ScreenWriter {
            display: Mutex::new(Box::new(display)),
        });
        Ok(Self {
            climate: Arc::new(ClimateObserver {
                writer: Arc::clone(&writer),
                values: RwLock::new((0.0, 0.0)),
            }),
            soil: Arc::new(SoilObserver {
                writer,
                moisture: RwLock::new(0.0),
            }),
        })
    }

    pub fn watch_climate(&self, observable: &mut ClimateObservable) {
        observable.add_observer(&self.climate);
    }

    pub fn watch_soil(&self, observable: &mut SoilObservable) {
        observable.add_observer(&self.soil);
    }

    pub fn climate_observer(&self) -> &Arc<ClimateObserver> {
        &self.climate
    }

    pub fn soil_observer(&self) -> &Arc<SoilObserver> {
        &self.soil
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::display::MemoryDisplay;
    use crate::sensors::MoistureSource;

    #[test]
    fn test_row_formats() {
        assert_eq!(temperature_row(21.0), "Temperature: 21.0");
        assert_eq!(temperature_row(21.66), "Temperature: 21.7");
        assert_eq!(humidity_row(48.333), "Humidity   : 48.3");
        assert_eq!(soil_row(51.43), "SoilMoisture:  51");
        assert_eq!(soil_row(7.9), "SoilMoisture:   7");
        assert_eq!(soil_row(100.0), "SoilMoisture: 100");
    }

    struct Failing;

    impl CharacterDisplay for Failing {
        fn setup(&mut self) -> Result<()> {
            Err(MonitorError::Display("no bus".into()))
        }

        fn clear(&mut self) -> Result<()> {
            Ok(())
        }

        fn write_str(&mut self, _text: &str, _row: usize, _col: usize) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_setup_failure_surfaces() {
        assert!(matches!(
            MonitoringScreen::new(Failing),
            Err(MonitorError::HardwareSetup(_))
        ));
    }

    #[test]
    fn test_new_clears_display() {
        let mut display = MemoryDisplay::new();
        display.write_str("stale", 0, 0).unwrap();
        let _screen = MonitoringScreen::new(display.clone()).unwrap();
        assert_eq!(display.row(0).unwrap(), "");
    }

    struct Constant(f64);

    impl MoistureSource for Constant {
        fn read(&mut self) -> Result<f64> {
            Ok(self.0)
        }
    }

    #[test]
    fn test_soil_observer_draws_row() {
        let display = MemoryDisplay::new();
        let screen = MonitoringScreen::new(display.clone()).unwrap();
        let mut soil = SoilObservable::new(Box::new(Constant(42.8)), 1).unwrap();
        screen.watch_soil(&mut soil);
        assert_eq!(soil.observer_count(), 1);

        soil.wake_signal().raise();
        assert!(soil.check());
        assert_eq!(screen.soil_observer().moisture(), 42.8);
        assert_eq!(display.row(SOIL_ROW).unwrap(), "SoilMoisture:  42");
    }
}
