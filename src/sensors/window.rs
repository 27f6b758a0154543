//! Fixed-capacity sample window with a once-per-lap mean.
//!
//! The mean is not a sliding average. It is computed only when the last slot
//! of the buffer is written, over every slot as it stands at that moment, so
//! a window of capacity N yields one mean per N pushes.

use crate::error::{MonitorError, Result};

#[derive(Debug, Clone)]
pub struct SampleWindow {
    buffer: Vec<f64>,
    write_index: usize,
    filled_once: bool,
}

impl SampleWindow {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(MonitorError::InvalidConfig(
                "sample window capacity must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            buffer: vec![0.0; capacity],
            write_index: 0,
            filled_once: false,
        })
    }

    pub fn capacity(&self) -> usize {
        self.buffer.len()
    }

    /// True once every slot has been written at least once.
    pub fn is_filled(&self) -> bool {
        self.filled_once
    }

    /// Slot index the next push writes to.
    pub fn write_index(&self) -> usize {
        self.write_index
    }

    pub fn values(&self) -> &[f64] {
        &self.buffer
    }

    /// Store `value`; returns the window mean when this push closed a lap.
    pub fn push(&mut self, value: f64) -> Option<f64> {
        let last_slot = self.capacity() - 1;
        let index = self.write_index;
        self.buffer[index] = value;
        self.write_index = (index + 1) % self.capacity();

        if index != last_slot {
            return None;
        }
        self.filled_once = true;
        Some(self.buffer.iter().sum::<f64>() / self.capacity() as f64)
    }
}
