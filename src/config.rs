use crate::error::{MonitorError, Result};
use crate::sensors::MoistureCalibration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Load environment variables from a local `.env` file.
/// Values may contain spaces without quotes; variables already set win.
pub fn load_dotenv() {
    let env_path = Path::new(".env");
    let Ok(content) = fs::read_to_string(env_path) else {
        return;
    };

    for (key, value) in parse_dotenv(&content) {
        if std::env::var(&key).is_err() {
            // SAFETY: called from main before the runtime or any thread starts
            unsafe { std::env::set_var(key, value) };
        }
    }
}

fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let (key, value) = line.split_once('=')?;
            let mut value = value.trim();
            if value.len() >= 2
                && ((value.starts_with('"') && value.ends_with('"'))
                    || (value.starts_with('\'') && value.ends_with('\'')))
            {
                value = &value[1..value.len() - 1];
            }
            Some((key.trim().to_string(), value.to_string()))
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub climate: ClimateConfig,
    pub soil: SoilConfig,
    pub switch: SwitchConfig,
    pub clock: ClockConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClimateConfig {
    /// GPIO (BCM numbering) the sensor data line is wired to.
    pub pin: u32,
    pub period_ticks: u32,
    pub window: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SoilConfig {
    pub spi_channel: u32,
    pub adc_channel: u8,
    pub spi_speed_hz: u32,
    pub period_ticks: u32,
    pub window: usize,
    pub calibration: MoistureCalibration,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchConfig {
    pub enabled: bool,
    pub pin: u32,
    /// Ticks between line samples.
    pub sample_ticks: u32,
    /// Ticks between debounced state reads.
    pub read_ticks: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockConfig {
    pub tick_interval_ms: u64,
    /// Sleep between poll loop passes.
    pub poll_interval_ms: u64,
}

impl Default for ClimateConfig {
    fn default() -> Self {
        Self {
            pin: 27,
            period_ticks: 10,
            window: 3,
        }
    }
}

impl Default for SoilConfig {
    fn default() -> Self {
        Self {
            spi_channel: 0,
            adc_channel: 0,
            spi_speed_hz: crate::sensors::soil::DEFAULT_SPI_SPEED_HZ,
            period_ticks: 20,
            window: 7,
            calibration: MoistureCalibration::default(),
        }
    }
}

impl Default for SwitchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            pin: 26,
            sample_ticks: crate::observe::switch::DEFAULT_SAMPLE_TICKS,
            read_ticks: crate::observe::switch::DEFAULT_READ_TICKS,
        }
    }
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 10,
            poll_interval_ms: 5,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            climate: ClimateConfig::default(),
            soil: SoilConfig::default(),
            switch: SwitchConfig::default(),
            clock: ClockConfig::default(),
        }
    }
}

/// Parse `key` from `lookup` into `target`, leaving it untouched when the
/// variable is missing or unparsable.
fn override_from<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    target: &mut T,
) {
    if let Some(raw) = lookup(key) {
        match raw.trim().parse() {
            Ok(value) => *target = value,
            Err(_) => log::warn!("Ignoring unparsable {}={:?}", key, raw),
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok());
        config
    }

    /// Read a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Override fields from variables resolved through `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        override_from(&lookup, "CLIMATE_PIN", &mut self.climate.pin);
        override_from(&lookup, "CLIMATE_PERIOD_TICKS", &mut self.climate.period_ticks);
        override_from(&lookup, "CLIMATE_WINDOW", &mut self.climate.window);

        override_from(&lookup, "SOIL_SPI_CHANNEL", &mut self.soil.spi_channel);
        override_from(&lookup, "SOIL_ADC_CHANNEL", &mut self.soil.adc_channel);
        override_from(&lookup, "SOIL_PERIOD_TICKS", &mut self.soil.period_ticks);
        override_from(&lookup, "SOIL_WINDOW", &mut self.soil.window);
        override_from(&lookup, "SOIL_DRY_THRESHOLD", &mut self.soil.calibration.dry);
        override_from(&lookup, "SOIL_WATER_THRESHOLD", &mut self.soil.calibration.water);

        override_from(&lookup, "SWITCH_ENABLED", &mut self.switch.enabled);
        override_from(&lookup, "SWITCH_PIN", &mut self.switch.pin);
        override_from(&lookup, "SWITCH_SAMPLE_TICKS", &mut self.switch.sample_ticks);
        override_from(&lookup, "SWITCH_READ_TICKS", &mut self.switch.read_ticks);

        override_from(&lookup, "TICK_INTERVAL_MS", &mut self.clock.tick_interval_ms);
        override_from(&lookup, "POLL_INTERVAL_MS", &mut self.clock.poll_interval_ms);
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(MonitorError::InvalidConfig(msg));

        if self.climate.window == 0 || self.soil.window == 0 {
            return invalid("sample windows need at least one slot".to_string());
        }
        if self.climate.period_ticks == 0 || self.soil.period_ticks == 0 {
            return invalid("wake periods must be at least one tick".to_string());
        }
        if self.switch.enabled {
            if self.switch.sample_ticks == 0 {
                return invalid("switch sample period must be at least one tick".to_string());
            }
            // three samples must land between reads, see sensors::switch
            if self.switch.read_ticks < self.switch.sample_ticks.saturating_mul(3) {
                return invalid(format!(
                    "switch read period {} is shorter than three samples of {}",
                    self.switch.read_ticks, self.switch.sample_ticks
                ));
            }
            if self.switch.pin == self.climate.pin {
                return invalid(format!("GPIO {} used twice", self.switch.pin));
            }
        }
        if self.clock.tick_interval_ms == 0 {
            return invalid("tick interval must be positive".to_string());
        }
        if crate::sensors::soil::chip_select_pin(self.soil.spi_channel).is_none() {
            return invalid(format!("unsupported SPI channel {}", self.soil.spi_channel));
        }
        if self.soil.adc_channel >= crate::sensors::soil::ADC_CHANNELS {
            return invalid(format!("ADC channel {} out of range", self.soil.adc_channel));
        }
        let calibration = self.soil.calibration;
        if calibration.dry <= calibration.water {
            return invalid(format!(
                "dry threshold {} must exceed water threshold {}",
                calibration.dry, calibration.water
            ));
        }
        Ok(())
    }
}
