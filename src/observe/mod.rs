//! Sensor observables.
//!
//! An observable owns one sensor, samples it when its timer wakes it, and
//! notifies registered observers when the smoothed value changes.

pub mod channel;
pub mod climate;
pub mod soil;
pub mod switch;

pub use channel::{Observer, ObserverSet};
pub use climate::ClimateObservable;
pub use soil::SoilObservable;
pub use switch::SwitchObservable;

/// An observable driven by the poll loop.
pub trait SensorObservable: Send {
    fn name(&self) -> &'static str;

    /// Handle a pending wake, if any. Returns true if observers were notified.
    fn check(&mut self) -> bool;

    /// Release the underlying sensor.
    fn close(&mut self);
}
