//! Error types for ideaflash.

use std::io;
use thiserror::Error;

/// Result type for ideaflash operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for ideaflash operations.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (serial port, file operations).
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Serial port error.
    #[cfg(feature = "native")]
    #[error("Serial port error: {0}")]
    Serial(#[from] serialport::Error),

    /// The bootloader client reported a failure.
    #[error("{0}")]
    Loader(String),

    /// No serial device available or the picker returned nothing.
    #[error("No serial device found")]
    DeviceNotFound,

    /// The user aborted device acquisition.
    #[error("Cancelled: {0}")]
    Cancelled(String),

    /// Handshake with the ROM bootloader failed.
    #[error("Handshake failed: {0}")]
    Handshake(String),

    /// The firmware source has no image with this identifier.
    #[error("Failed to fetch firmware")]
    FirmwareNotFound(String),

    /// Firmware identifier or payload is malformed.
    #[error("Invalid firmware: {0}")]
    InvalidFirmware(String),

    /// An operation needs an open session.
    #[error("Not connected")]
    NotConnected,

    /// The port is held by another program.
    #[error("Busy: {0}")]
    Busy(String),

    /// Unsupported operation or option.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Config(String),
}
