use thiserror::Error as ThisError;

#[derive(ThisError, Debug)]
pub enum MonitorError {
    #[error("Hardware setup failed: {0}")]
    HardwareSetup(String),

    #[error("GPIO operation failed on pin {pin}: {reason}")]
    Gpio { pin: u32, reason: String },

    #[error("SPI transfer failed on channel {channel}: {reason}")]
    Spi { channel: u32, reason: String },

    #[error("Display error: {0}")]
    Display(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    SerdeJsonError(#[from] serde_json::Error),
}

/// Why a humidity/temperature frame could not be turned into a reading.
///
/// These are recovered locally: the decoder goes back to idle and waits for
/// the next frame. The poll loop sees them as degenerate reads.
#[derive(ThisError, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeError {
    #[error("Frame checksum mismatch: computed {computed:#04x}, received {received:#x}")]
    Checksum { computed: u8, received: u16 },

    #[error("Watchdog expired mid-frame at bit {bit_index}")]
    Timeout { bit_index: i8 },

    #[error("No frame decoded since the previous read")]
    NoFrame,
}

pub type Result<T> = std::result::Result<T, MonitorError>;
