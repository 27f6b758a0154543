//! Hardware capability surface.
//!
//! The monitor never touches GPIO or SPI registers itself. Everything it needs
//! from the board goes through [`GpioDriver`], which mirrors the subset of the
//! pigpio API the sensors use: pin modes and levels, pull resistors, the
//! per-pin watchdog, edge callbacks and a raw SPI channel.
//!
//! Edge callbacks are invoked from the driver's own callback context. Handlers
//! must return quickly and must not block; see [`EdgeHandler`].

use crate::error::Result;
use strum::FromRepr;

/// Direction of a GPIO pin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinMode {
    Input,
    Output,
}

/// Logic level of a GPIO pin.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Level {
    Low,
    High,
}

/// Internal pull resistor configuration.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Pull {
    Off,
    Down,
    Up,
}

/// Edge kind reported to callbacks.
///
/// Discriminants follow the pigpio level numbering. `Either` is both the
/// registration filter for "all edges" and the kind reported when the pin's
/// watchdog expires without any edge.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, FromRepr)]
#[repr(u8)]
pub enum Edge {
    Rising = 0,
    Falling = 1,
    Either = 2,
}

impl Edge {
    /// Whether a callback registered for `self` should see an event of `kind`.
    pub fn accepts(self, kind: Edge) -> bool {
        self == Edge::Either || self == kind
    }

    /// Edge for a pigpio callback level (0 rising, 1 falling, 2 timeout).
    pub fn from_level(level: u32) -> Option<Edge> {
        u8::try_from(level).ok().and_then(Edge::from_repr)
    }
}

/// Handler invoked as `(pin, edge, tick)` for every matching edge.
///
/// Runs in interrupt-like context: no blocking, no unbounded allocation.
pub type EdgeHandler = Box<dyn FnMut(u32, Edge, u32) + Send>;

/// Identifies a registered edge callback so it can be cancelled.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct CallbackId(pub u64);

/// Board capabilities required by the sensor drivers.
///
/// All methods take `&self`; implementations synchronise internally so the
/// same driver can be shared by the poll loop and the edge callback context.
pub trait GpioDriver: Send + Sync {
    /// Connect to / initialise the driver. Failures abort sensor startup.
    fn initialize(&self) -> Result<()>;

    fn set_mode(&self, pin: u32, mode: PinMode) -> Result<()>;

    fn digital_write(&self, pin: u32, level: Level) -> Result<()>;

    fn digital_read(&self, pin: u32) -> Result<Level>;

    fn set_pull_up_down(&self, pin: u32, pull: Pull) -> Result<()>;

    /// Arm the pin watchdog. A timeout of 0 disarms it.
    fn set_watchdog(&self, pin: u32, timeout_ms: u32) -> Result<()>;

    fn register_edge_callback(&self, pin: u32, edge: Edge, handler: EdgeHandler)
    -> Result<CallbackId>;

    /// Cancel a callback. Unknown ids are ignored.
    fn cancel_callback(&self, id: CallbackId);

    fn spi_open(&self, channel: u32, speed_hz: u32, mode: u8) -> Result<()>;

    /// Full-duplex transfer; returns the bytes clocked in.
    fn spi_transfer(&self, channel: u32, tx: &[u8]) -> Result<Vec<u8>>;

    fn spi_close(&self, channel: u32);
}

/// Ticks elapsed from `earlier` to `later` on the wrapping 32-bit
/// microsecond counter.
pub fn tick_diff(earlier: u32, later: u32) -> u32 {
    later.wrapping_sub(earlier)
}
