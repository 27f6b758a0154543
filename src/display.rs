//! Character display abstraction.

use crate::error::{MonitorError, Result};
use log::info;
use parking_lot::Mutex;
use std::sync::Arc;

/// A row/column addressed text display.
pub trait CharacterDisplay: Send {
    fn setup(&mut self) -> Result<()>;

    fn clear(&mut self) -> Result<()>;

    /// Write `text` starting at (`row`, `col`), overwriting what is there.
    fn write_str(&mut self, text: &str, row: usize, col: usize) -> Result<()>;
}

/// In-memory display used by the demo binary and tests.
///
/// Clones share the same row buffer, so a test can keep one handle while the
/// screen owns another.
#[derive(Clone, Debug)]
pub struct MemoryDisplay {
    rows: Arc<Mutex<Vec<String>>>,
    row_count: usize,
    columns: usize,
}

impl MemoryDisplay {
    /// 20x4, the usual HD44780 character module size.
    pub fn new() -> Self {
        Self::with_size(4, 20)
    }

    pub fn with_size(row_count: usize, columns: usize) -> Self {
        Self {
            rows: Arc::new(Mutex::new(vec![String::new(); row_count])),
            row_count,
            columns,
        }
    }

    /// Contents of `row` with trailing blanks removed.
    pub fn row(&self, row: usize) -> Option<String> {
        self.rows
            .lock()
            .get(row)
            .map(|line| line.trim_end().to_string())
    }

    pub fn rows(&self) -> Vec<String> {
        self.rows
            .lock()
            .iter()
            .map(|line| line.trim_end().to_string())
            .collect()
    }
}

impl Default for MemoryDisplay {
    fn default() -> Self {
        Self::new()
    }
}

impl CharacterDisplay for MemoryDisplay {
    fn setup(&mut self) -> Result<()> {
        info!(
            "Memory display ready ({} rows x {} columns)",
            self.row_count, self.columns
        );
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        for line in self.rows.lock().iter_mut() {
            line.clear();
        }
        Ok(())
    }

    fn write_str(&mut self, text: &str, row: usize, col: usize) -> Result<()> {
        if row >= self.row_count || col >= self.columns {
            return Err(MonitorError::Display(format!(
                "position ({}, {}) outside {}x{} display",
                row, col, self.row_count, self.columns
            )));
        }

        let mut rows = self.rows.lock();
        let mut cells: Vec<char> = rows[row].chars().collect();
        if cells.len() < col {
            cells.resize(col, ' ');
        }
        // text running past the last column is cut off
        for (offset, ch) in text.chars().take(self.columns - col).enumerate() {
            let index = col + offset;
            if index < cells.len() {
                cells[index] = ch;
            } else {
                cells.push(ch);
            }
        }
        rows[row] = cells.into_iter().collect();
        info!("Display [{}]: {}", row, rows[row].trim_end());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_overwrites_in_place() {
        let mut display = MemoryDisplay::new();
        display.write_str("Humidity   : 55.0", 1, 0).unwrap();
        display.write_str("6", 1, 13).unwrap();
        assert_eq!(display.row(1).unwrap(), "Humidity   : 65.0");
    }

    #[test]
    fn test_write_pads_to_column() {
        let mut display = MemoryDisplay::new();
        display.write_str("ok", 0, 3).unwrap();
        assert_eq!(display.row(0).unwrap(), "   ok");
    }

    #[test]
    fn test_write_truncates_at_edge() {
        let mut display = MemoryDisplay::with_size(2, 8);
        display.write_str("Temperature", 0, 0).unwrap();
        assert_eq!(display.row(0).unwrap(), "Temperat");
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut display = MemoryDisplay::with_size(2, 8);
        assert!(matches!(
            display.write_str("x", 2, 0),
            Err(MonitorError::Display(_))
        ));
        assert!(display.write_str("x", 0, 8).is_err());
    }

    #[test]
    fn test_clones_share_rows_and_clear() {
        let mut display = MemoryDisplay::new();
        let viewer = display.clone();
        display.write_str("hello", 3, 0).unwrap();
        assert_eq!(viewer.row(3).unwrap(), "hello");

        display.clear().unwrap();
        assert!(viewer.rows().iter().all(String::is_empty));
    }
}
