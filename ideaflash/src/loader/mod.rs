//! Bootloader client seam.
//!
//! The flashing protocol itself (ROM handshake, stub upload, SLIP framing,
//! flash commands) belongs to the client implementation. The session
//! controller only drives the four operations of [`BootloaderClient`].

#[cfg(feature = "native")]
pub mod esp;

use std::{fmt, sync::Arc};

use crate::{error::Result, log_sink::LogSink, payload::BinaryString, payload::ChecksumFn};

/// How the client treats the flash size field of the image header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FlashSizePolicy {
    /// Leave the header untouched.
    #[default]
    Keep,
    /// Let the client detect the attached flash and patch the header.
    Detect,
}

impl fmt::Display for FlashSizePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Keep => write!(f, "keep"),
            Self::Detect => write!(f, "detect"),
        }
    }
}

/// Parameters of one flash write.
pub struct FlashOptions<'a> {
    /// Image in binary-string form.
    pub data: &'a BinaryString,
    /// Target flash address.
    pub address: u32,
    /// Flash size header policy.
    pub flash_size: FlashSizePolicy,
    /// Erase the whole chip before writing.
    pub erase_all: bool,
    /// Transfer compressed blocks.
    pub compress: bool,
    /// Called with `(written, total)` bytes as blocks complete.
    pub report_progress: &'a mut dyn FnMut(usize, usize),
    /// Digest used to verify the written image.
    pub checksum: ChecksumFn,
}

impl fmt::Debug for FlashOptions<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FlashOptions")
            .field("len", &self.data.len())
            .field("address", &format_args!("0x{:x}", self.address))
            .field("flash_size", &self.flash_size)
            .field("erase_all", &self.erase_all)
            .field("compress", &self.compress)
            .finish_non_exhaustive()
    }
}

/// Client for the chip's ROM bootloader.
pub trait BootloaderClient {
    /// Reset into the bootloader, handshake and switch to `baud`.
    ///
    /// Status lines the client produces go to `terminal`.
    fn initialize(&mut self, baud: u32, terminal: Arc<dyn LogSink>) -> Result<()>;

    /// Erase the entire flash.
    fn erase_flash(&mut self) -> Result<()>;

    /// Write one image.
    fn write_flash(&mut self, options: FlashOptions<'_>) -> Result<()>;

    /// Reboot the chip into the application without closing the port.
    fn soft_reset(&mut self) -> Result<()>;
}
