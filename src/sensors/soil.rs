//! Soil-moisture probe behind a 12-bit SPI ADC.
//!
//! The probe voltage is read through an MCP3208-style converter and mapped
//! linearly onto 0..=100 % between a "dry" and a "in water" raw value.

use super::MoistureSource;
use crate::error::{MonitorError, Result};
use crate::hardware::{GpioDriver, Level};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub const DEFAULT_SPI_SPEED_HZ: u32 = 10_000_000;
pub const ADC_CHANNELS: u8 = 8;

/// Chip-select GPIO wired to an SPI channel (CE0, CE1).
pub fn chip_select_pin(spi_channel: u32) -> Option<u32> {
    match spi_channel {
        0 => Some(8),
        1 => Some(7),
        _ => None,
    }
}

/// Single-ended conversion request for `channel`.
fn conversion_request(channel: u8) -> [u8; 3] {
    [0x06 | (channel >> 2), (channel & 0x03) << 6, 0x00]
}

/// 12-bit SPI analog-to-digital converter.
pub struct SpiAdc<D: GpioDriver> {
    driver: Arc<D>,
    spi_channel: u32,
    chip_select: u32,
    speed_hz: u32,
}

impl<D: GpioDriver> SpiAdc<D> {
    pub fn new(driver: Arc<D>, spi_channel: u32, speed_hz: u32) -> Result<Self> {
        let chip_select = chip_select_pin(spi_channel).ok_or_else(|| {
            MonitorError::InvalidConfig(format!("no chip select for SPI channel {spi_channel}"))
        })?;
        Ok(Self {
            driver,
            spi_channel,
            chip_select,
            speed_hz,
        })
    }

    pub fn setup(&self) -> Result<()> {
        self.driver.initialize()?;
        self.driver.spi_open(self.spi_channel, self.speed_hz, 0)
    }

    /// Raw 12-bit conversion of one input channel.
    pub fn read(&self, channel: u8) -> Result<u16> {
        if channel >= ADC_CHANNELS {
            return Err(MonitorError::InvalidConfig(format!(
                "ADC channel {channel} out of range"
            )));
        }

        self.driver.digital_write(self.chip_select, Level::Low)?;
        let reply = self
            .driver
            .spi_transfer(self.spi_channel, &conversion_request(channel));
        self.driver.digital_write(self.chip_select, Level::High)?;

        match reply?.as_slice() {
            [_, high, low, ..] => Ok(u16::from(high & 0x0F) << 8 | u16::from(*low)),
            short => Err(MonitorError::Spi {
                channel: self.spi_channel,
                reason: format!("expected 3 reply bytes, got {}", short.len()),
            }),
        }
    }

    pub fn close(&self) {
        self.driver.spi_close(self.spi_channel);
    }
}

/// Raw ADC values of a dry probe and a probe standing in water.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MoistureCalibration {
    pub dry: u16,
    pub water: u16,
}

impl Default for MoistureCalibration {
    fn default() -> Self {
        Self {
            dry: 4094,
            water: 2047,
        }
    }
}

impl MoistureCalibration {
    /// Moisture in percent, clamped to 0..=100.
    pub fn percent(&self, raw: u16) -> f64 {
        let span = f64::from(self.dry) - f64::from(self.water);
        let wet_share = (f64::from(raw) - f64::from(self.water)) * 100.0 / span;
        (100.0 - wet_share).clamp(0.0, 100.0)
    }
}

pub struct SoilSensor<D: GpioDriver> {
    adc: SpiAdc<D>,
    adc_channel: u8,
    calibration: MoistureCalibration,
}

impl<D: GpioDriver> SoilSensor<D> {
    pub fn new(adc: SpiAdc<D>, adc_channel: u8, calibration: MoistureCalibration) -> Self {
        Self {
            adc,
            adc_channel,
            calibration,
        }
    }

    pub fn setup(&mut self) -> Result<()> {
        self.adc.setup()?;
        info!(
            "Soil sensor ready on SPI channel {} (ADC input {})",
            self.adc.spi_channel, self.adc_channel
        );
        Ok(())
    }

    pub fn read(&mut self) -> Result<f64> {
        let raw = self.adc.read(self.adc_channel)?;
        let moisture = self.calibration.percent(raw);
        debug!("Soil ADC raw={} moisture={:.1}%", raw, moisture);
        Ok(moisture)
    }

    pub fn close(&mut self) {
        self.adc.close();
        info!("Soil sensor on SPI channel {} closed", self.adc.spi_channel);
    }
}

impl<D: GpioDriver> MoistureSource for SoilSensor<D> {
    fn read(&mut self) -> Result<f64> {
        SoilSensor::read(self)
    }

    fn close(&mut self) -> Result<()> {
        SoilSensor::close(self);
        Ok(())
    }
}
