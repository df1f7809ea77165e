//! Byte-oriented transport abstraction.
//!
//! A [`Transport`] is one open serial connection to the board. The session
//! controller owns the primary handle exclusively while connected and hands
//! a cloned handle to the read loop, which relays device output.
//!
//! ```text
//! +------------------+     +------------------+
//! | Session / Loader |     |    Read Loop     |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          v                        v
//! +--------+---------+     +--------+---------+
//! |  Transport trait |     | Transport clone  |
//! +--------+---------+     +--------+---------+
//!          |                        |
//!          +-----------+------------+
//!                      v
//!             +--------+---------+
//!             | serialport (OS)  |
//!             +------------------+
//! ```

#[cfg(feature = "native")]
pub mod native;

use std::time::Duration;

use crate::error::Result;

/// Read timeout used for transports shared with a read loop, so that
/// cancellation is observed promptly.
pub const READ_POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Serial port configuration. Lines are always 8N1 without flow control.
#[derive(Debug, Clone)]
pub struct SerialConfig {
    /// Port name/path (e.g., "/dev/ttyUSB0", "COM3").
    pub port_name: String,
    /// Baud rate.
    pub baud_rate: u32,
    /// Read/write timeout.
    pub timeout: Duration,
}

impl SerialConfig {
    /// Create a new configuration with port name and baud rate.
    pub fn new(port_name: impl Into<String>, baud_rate: u32) -> Self {
        Self {
            port_name: port_name.into(),
            baud_rate,
            timeout: READ_POLL_INTERVAL,
        }
    }
}

/// Outcome of a single transport read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadEvent {
    /// `n` bytes were placed at the start of the buffer.
    Data(usize),
    /// Nothing arrived within the read timeout.
    Idle,
    /// The stream ended; no further data will arrive.
    Closed,
}

/// One open byte stream to the device.
pub trait Transport: Send {
    /// Port name/path this transport is bound to.
    fn name(&self) -> &str;

    /// Read the next chunk of bytes.
    fn read(&mut self, buf: &mut [u8]) -> Result<ReadEvent>;

    /// Write all bytes and flush.
    fn write(&mut self, data: &[u8]) -> Result<()>;

    /// Open a second handle onto the same stream.
    fn try_clone(&self) -> Result<Box<dyn Transport>>;

    /// Close the stream. Closing twice is not an error.
    fn close(&mut self) -> Result<()>;
}

#[cfg(feature = "native")]
pub use native::SerialTransport;
