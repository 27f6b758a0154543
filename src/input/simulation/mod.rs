//! Hardware simulation.
//!
//! [`SimulatedGpio`] stands in for the board driver; the models in
//! [`sensors`] give it plausible values to answer with.

pub mod gpio;
pub mod sensors;

pub use gpio::{SimulatedGpio, frame_edges};
pub use sensors::{ClimateDrift, SoilDrift, attach_demo_sensors};
