//! # ideaflash
//!
//! A library for flashing firmware onto ESP32 Ideaboards over a serial port.
//!
//! The flashing protocol itself is delegated to a bootloader client
//! ([`loader::BootloaderClient`], backed by `espflash` on native targets).
//! This crate provides what sits around it:
//!
//! - a session controller with connect/disconnect/program workflows
//! - a background read loop relaying device output
//! - a status log with progress line coalescing
//! - a firmware catalogue and the byte/char payload mapping
//! - serial port discovery for common ESP32 USB bridges
//!
//! ## Features
//!
//! - `native` (default): serial ports via `serialport`, flashing via `espflash`
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use ideaflash::{DirectorySource, MemoryLog, SessionConfig, SessionController};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     #[cfg(feature = "native")]
//!     {
//!         use ideaflash::loader::esp::EspHost;
//!
//!         let host = EspHost::with_port(ideaflash::auto_detect_port()?);
//!         let log = Arc::new(MemoryLog::new());
//!         let mut session = SessionController::new(
//!             host,
//!             Box::new(DirectorySource::new(".")),
//!             Box::new(|_: &str| true),
//!             log.clone(),
//!             SessionConfig::default(),
//!         );
//!
//!         let _ = session.connect();
//!         session.select_firmware(Some("firmware/ideaboardfirmware03202025.bin".into()));
//!         let _ = session.program();
//!         let _ = session.disconnect();
//!
//!         for line in log.lines() {
//!             println!("{line}");
//!         }
//!     }
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::sync::{Arc, OnceLock};

pub mod device;
pub mod error;
pub mod firmware;
pub mod host;
pub mod loader;
pub mod log_sink;
pub mod monitor;
pub mod payload;
pub mod session;
pub mod transport;

static INTERRUPT_CHECKER: OnceLock<Arc<dyn Fn() -> bool + Send + Sync>> = OnceLock::new();

/// Register a global interruption checker used by long-running library loops.
///
/// The checker should return `true` when the current operation should stop
/// (for example after receiving Ctrl-C in CLI applications).
pub fn set_interrupt_checker<F>(checker: F)
where
    F: Fn() -> bool + Send + Sync + 'static,
{
    let _ = INTERRUPT_CHECKER.set(Arc::new(checker));
}

/// Returns whether interruption was requested by the embedding application.
#[must_use]
pub fn is_interrupted_requested() -> bool {
    INTERRUPT_CHECKER
        .get()
        .is_some_and(|checker| checker())
}

#[cfg(test)]
pub(crate) fn test_set_interrupted(value: bool) {
    use std::sync::atomic::{AtomicBool, Ordering};

    static TEST_INTERRUPT_FLAG: OnceLock<Arc<AtomicBool>> = OnceLock::new();

    let flag = TEST_INTERRUPT_FLAG
        .get_or_init(|| {
            let shared = Arc::new(AtomicBool::new(false));
            let checker = Arc::clone(&shared);
            set_interrupt_checker(move || checker.load(Ordering::Relaxed));
            shared
        })
        .clone();

    flag.store(value, Ordering::Relaxed);
}

// Re-exports for convenience
#[cfg(feature = "native")]
pub use {
    loader::esp::{EspHost, EspLoader},
    transport::SerialTransport,
};
pub use {
    device::{DetectedPort, DeviceKind, format_port_list},
    error::{Error, Result},
    firmware::{DEFAULT_CATALOG, DirectorySource, FirmwareEntry, FirmwareSource, display_name},
    host::{DeviceHandle, Host, Link, auto_detect_port, discover_ports},
    loader::{BootloaderClient, FlashOptions, FlashSizePolicy},
    log_sink::{LogSink, MemoryLog, log_line},
    monitor::{LineAssembler, clean_monitor_text, drain_utf8_lossy},
    payload::{BinaryString, md5_latin1},
    session::{
        Controls, Outcome, Prompt, ReadLoop, SessionConfig, SessionController, SessionState,
    },
    transport::{ReadEvent, SerialConfig, Transport},
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interrupt_checker_default_false() {
        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }

    #[test]
    fn test_interrupt_checker_toggle_true_false() {
        test_set_interrupted(true);
        assert!(is_interrupted_requested());

        test_set_interrupted(false);
        assert!(!is_interrupted_requested());
    }
}
