//! Plant monitor library.
//!
//! Samples a single-wire humidity/temperature sensor and an SPI soil-moisture
//! probe on independent timer periods, smooths the readings and pushes
//! changes to a character display through observers. A debounced push-button
//! input is sampled alongside them.

pub mod clock;
pub mod config;
pub mod display;
pub mod error;
pub mod hardware;
pub mod input;
pub mod monitor;
pub mod observe;
pub mod screen;
pub mod sensors;
