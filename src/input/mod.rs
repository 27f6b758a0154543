//! Input sources for the monitor.
//!
//! Current input sources:
//! - `simulation`: in-memory GPIO driver and drifting sensor models, used
//!   by the tests and by hardware-less runs of the binary

pub mod simulation;
