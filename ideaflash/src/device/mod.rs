//! Serial device discovery and classification.
//!
//! Ideaboards expose their UART through a USB bridge (CP2102 on most
//! revisions, CH340/CH9102 on clones) or through the ESP32-S3/C3 native
//! USB-Serial-JTAG peripheral.

use {
    crate::error::{Error, Result},
    log::info,
};

#[cfg(feature = "native")]
use log::{debug, trace};

/// Known USB bridge/device kinds found on ESP32 boards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceKind {
    /// Silicon Labs CP210x USB-to-Serial converter.
    Cp210x,
    /// WCH CH340/CH341/CH9102 USB-to-Serial converter.
    Ch340,
    /// FTDI FT232/FT2232 USB-to-Serial converter.
    Ftdi,
    /// Prolific PL2303 USB-to-Serial converter.
    Prolific,
    /// Espressif native USB-Serial-JTAG.
    EspressifUsb,
    /// Unknown device.
    Unknown,
}

/// Known USB VID/PID pairs. An empty PID list matches any product.
const KNOWN_USB_DEVICES: &[(u16, &[u16], DeviceKind)] = &[
    (0x10C4, &[0xEA60, 0xEA70, 0xEA71, 0xEA63], DeviceKind::Cp210x),
    (
        0x1A86,
        &[0x7523, 0x7522, 0x5523, 0x55D3, 0x55D4],
        DeviceKind::Ch340,
    ),
    (0x0403, &[0x6001, 0x6010, 0x6014, 0x6015], DeviceKind::Ftdi),
    (0x067B, &[0x2303, 0x23A3], DeviceKind::Prolific),
    (0x303A, &[], DeviceKind::EspressifUsb),
];

impl DeviceKind {
    /// Classify a VID/PID combination.
    #[must_use]
    pub fn from_vid_pid(vid: u16, pid: u16) -> Self {
        for (known_vid, pids, device) in KNOWN_USB_DEVICES {
            if vid == *known_vid && (pids.is_empty() || pids.contains(&pid)) {
                return *device;
            }
        }
        Self::Unknown
    }

    /// Get a human-readable name for the device kind.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Cp210x => "CP210x",
            Self::Ch340 => "CH340/CH9102",
            Self::Ftdi => "FTDI",
            Self::Prolific => "PL2303",
            Self::EspressifUsb => "ESP USB-Serial-JTAG",
            Self::Unknown => "Unknown",
        }
    }

    /// Check if this is a known/expected device kind.
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }

    /// Check if this device kind should be preferred during auto-selection.
    pub fn is_high_priority(&self) -> bool {
        matches!(self, Self::EspressifUsb | Self::Cp210x | Self::Ch340)
    }
}

/// Discovered serial port with USB metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectedPort {
    /// Port name/path (e.g., "/dev/ttyUSB0" or "COM3").
    pub name: String,
    /// Classified device kind.
    pub device: DeviceKind,
    /// USB Vendor ID (if available).
    pub vid: Option<u16>,
    /// USB Product ID (if available).
    pub pid: Option<u16>,
    /// Device manufacturer string (if available).
    pub manufacturer: Option<String>,
    /// Device product string (if available).
    pub product: Option<String>,
    /// Serial number (if available).
    pub serial: Option<String>,
}

impl DetectedPort {
    /// A port known only by name, without USB metadata.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            device: DeviceKind::Unknown,
            vid: None,
            pid: None,
            manufacturer: None,
            product: None,
            serial: None,
        }
    }

    /// Check if this port is likely an ESP32 board.
    pub fn is_likely_board(&self) -> bool {
        self.device
            .is_known()
    }
}

/// Detect all available serial ports with metadata.
#[cfg(feature = "native")]
pub fn detect_ports() -> Vec<DetectedPort> {
    let mut result = Vec::new();

    match serialport::available_ports() {
        Ok(ports) => {
            for port_info in ports {
                let mut detected = DetectedPort::named(port_info.port_name.clone());

                if let serialport::SerialPortType::UsbPort(usb_info) = port_info.port_type {
                    detected.vid = Some(usb_info.vid);
                    detected.pid = Some(usb_info.pid);
                    detected.manufacturer = usb_info.manufacturer;
                    detected.product = usb_info.product;
                    detected.serial = usb_info.serial_number;
                    detected.device = DeviceKind::from_vid_pid(usb_info.vid, usb_info.pid);

                    trace!(
                        "Found USB port: {} (VID: {:04X}, PID: {:04X}, Device: {:?})",
                        port_info.port_name, usb_info.vid, usb_info.pid, detected.device
                    );
                }

                result.push(detected);
            }
        },
        Err(e) => {
            debug!("Failed to enumerate serial ports: {e}");
        },
    }

    result
}

/// Detect all available serial ports (always empty without native support).
#[cfg(not(feature = "native"))]
pub fn detect_ports() -> Vec<DetectedPort> {
    Vec::new()
}

/// Pick the best candidate from a list of ports.
///
/// Native Espressif USB wins, then high priority bridges, then any known
/// bridge, then the first port.
pub fn pick_best_port(ports: Vec<DetectedPort>) -> Result<DetectedPort> {
    let rank = |port: &DetectedPort| match port.device {
        DeviceKind::EspressifUsb => 0,
        kind if kind.is_high_priority() => 1,
        kind if kind.is_known() => 2,
        _ => 3,
    };

    ports
        .into_iter()
        .enumerate()
        .min_by_key(|(index, port)| (rank(port), *index))
        .map(|(_, port)| port)
        .ok_or(Error::DeviceNotFound)
}

/// Auto-detect a single board port.
pub fn auto_detect_port() -> Result<DetectedPort> {
    let port = pick_best_port(detect_ports())?;
    if port.device.is_known() {
        info!("Auto-detected {} USB device: {}", port.device.name(), port.name);
    } else {
        info!("Using first available port: {}", port.name);
    }
    Ok(port)
}

/// Format a list of detected ports for display.
pub fn format_port_list(ports: &[DetectedPort]) -> Vec<String> {
    let mut result = Vec::new();

    for port in ports {
        let device_info = if port.device.is_known() {
            format!(" [{}]", port.device.name())
        } else if let (Some(vid), Some(pid)) = (port.vid, port.pid) {
            format!(" [VID:{vid:04X} PID:{pid:04X}]")
        } else {
            String::new()
        };

        let product_info = port
            .product
            .as_ref()
            .map(|p| format!(" - {p}"))
            .unwrap_or_default();

        result.push(format!("{}{}{}", port.name, device_info, product_info));
    }

    result
}
