//! Host environment: device acquisition and port discovery.

use crate::{
    device::{self, DetectedPort},
    error::Result,
    loader::BootloaderClient,
    transport::Transport,
};

/// A serial device granted by the host, not yet opened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceHandle {
    /// The port the device was found on.
    pub port: DetectedPort,
}

impl DeviceHandle {
    /// Port name/path.
    pub fn name(&self) -> &str {
        &self
            .port
            .name
    }
}

/// An opened device: the raw transport plus a bootloader client bound to it.
pub struct Link {
    /// Byte stream to the device.
    pub transport: Box<dyn Transport>,
    /// Bootloader client sharing the same port.
    pub client: Box<dyn BootloaderClient>,
}

/// Platform services the session controller depends on.
pub trait Host {
    /// Ask the user (or auto-detection) for a device.
    fn request_port(&mut self) -> Result<DeviceHandle>;

    /// Open the device; the client is initialized separately.
    fn open(&mut self, device: &DeviceHandle, baud: u32) -> Result<Link>;

    /// Give the device back once the port is closed.
    fn release(&mut self, device: DeviceHandle) -> Result<()>;
}

/// Discover all available serial ports.
#[must_use]
pub fn discover_ports() -> Vec<DetectedPort> {
    device::detect_ports()
}

/// Auto-detect a single best serial port candidate.
pub fn auto_detect_port() -> Result<DetectedPort> {
    device::auto_detect_port()
}
