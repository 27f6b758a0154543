//! Sensor drivers and the signal processing behind them.
//!
//! Observables do not care where readings come from; they pull them through
//! [`ClimateSource`], [`MoistureSource`] and [`SwitchSource`], which the
//! hardware drivers here implement and tests replace with scripted fakes.

pub mod climate;
pub mod decoder;
pub mod soil;
pub mod switch;
pub mod window;

pub use climate::{ClimateSensor, ClimateTiming};
pub use decoder::{DecodedReading, EdgeDecoder, FrameCell, FrameEvent};
pub use soil::{MoistureCalibration, SoilSensor, SpiAdc};
pub use switch::Switch;
pub use window::SampleWindow;

use crate::error::Result;

/// Something that yields humidity/temperature readings on demand.
pub trait ClimateSource: Send {
    /// Take one reading. May block for the sensor's protocol hold time.
    fn read(&mut self) -> Result<DecodedReading>;

    /// Release the hardware behind the source.
    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Something that yields soil moisture in percent on demand.
pub trait MoistureSource: Send {
    fn read(&mut self) -> Result<f64>;

    fn close(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Something that yields a debounced on/off state.
pub trait SwitchSource: Send {
    fn read(&mut self) -> bool;
}
