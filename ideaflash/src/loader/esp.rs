//! Bootloader client and host backed by the `espflash` crate.

use {
    crate::{
        device::DetectedPort,
        error::{Error, Result},
        host::{DeviceHandle, Host, Link},
        loader::{BootloaderClient, FlashOptions, FlashSizePolicy},
        log_sink::{LogSink, log_line},
        transport::{READ_POLL_INTERVAL, SerialTransport, native::open_error},
    },
    espflash::{
        connection::{Connection, ResetAfterOperation, ResetBeforeOperation},
        flasher::Flasher,
        image_format::Segment,
        target::ProgressCallbacks,
    },
    log::{debug, info},
    serialport::{SerialPort, SerialPortType, UsbPortInfo},
    std::{borrow::Cow, sync::Arc, time::Duration},
};

/// Baud rate the ROM bootloader listens at after reset.
pub const ROM_BAUD: u32 = 115_200;

/// Baud rate applications print at after a soft reset.
pub const APP_BAUD: u32 = 115_200;

const OPEN_TIMEOUT: Duration = Duration::from_millis(3000);
const USE_STUB: bool = true;

/// [`BootloaderClient`] driving the ESP ROM loader through espflash.
pub struct EspLoader {
    pending: Option<Connection>,
    flasher: Option<Flasher>,
    terminal: Option<Arc<dyn LogSink>>,
}

impl EspLoader {
    /// Wrap an unopened connection.
    pub fn new(connection: Connection) -> Self {
        Self {
            pending: Some(connection),
            flasher: None,
            terminal: None,
        }
    }

    fn flasher(&mut self) -> Result<&mut Flasher> {
        self.flasher
            .as_mut()
            .ok_or(Error::NotConnected)
    }
}

impl BootloaderClient for EspLoader {
    fn initialize(&mut self, baud: u32, terminal: Arc<dyn LogSink>) -> Result<()> {
        let connection = self
            .pending
            .take()
            .ok_or_else(|| Error::Handshake("loader already initialized".to_string()))?;

        let flasher = Flasher::connect(connection, USE_STUB, true, false, None, Some(baud))
            .map_err(|e| Error::Handshake(e.to_string()))?;

        let chip = flasher.chip();
        info!("Connected to {chip} at {baud} baud");
        terminal.write_line(&format!("Chip is {chip}"));

        self.flasher = Some(flasher);
        self.terminal = Some(terminal);
        Ok(())
    }

    fn erase_flash(&mut self) -> Result<()> {
        self.flasher()?
            .erase_flash()
            .map_err(|e| Error::Loader(format!("Flash erase failed: {e}")))
    }

    fn write_flash(&mut self, options: FlashOptions<'_>) -> Result<()> {
        if !options.compress {
            return Err(Error::Unsupported(
                "uncompressed flash writes".to_string(),
            ));
        }
        if options.flash_size != FlashSizePolicy::Keep {
            return Err(Error::Unsupported(format!(
                "flash size policy '{}'",
                options.flash_size
            )));
        }
        if options.erase_all {
            self.erase_flash()?;
        }

        let digest = (options.checksum)(options.data.as_str())?;
        debug!("{options:?} md5={digest}");

        let data = options
            .data
            .to_bytes()?;
        let len = data.len();
        let length = u32::try_from(len)
            .map_err(|_| Error::InvalidFirmware(format!("image of {len} bytes is too large")))?;
        let segment = Segment {
            addr: options.address,
            data: Cow::Owned(data),
        };

        let mut progress = LogProgress {
            terminal: self
                .terminal
                .clone(),
            report: options.report_progress,
            addr: options.address,
            len,
            blocks: 0,
        };

        let flasher = self.flasher()?;
        flasher
            .write_bins_to_flash(&[segment], &mut progress)
            .map_err(|e| Error::Loader(format!("Flash write failed: {e}")))?;

        let written = flasher
            .checksum_md5(options.address, length)
            .map_err(|e| Error::Loader(format!("Flash checksum failed: {e}")))?;
        check_digest(&digest, written)
    }

    fn soft_reset(&mut self) -> Result<()> {
        let flasher = self.flasher()?;
        let chip = flasher.chip();
        let connection = flasher.connection();
        debug!("Resetting {chip} into the application");
        connection
            .reset_after(USE_STUB, chip)
            .map_err(|e| Error::Loader(format!("Reset failed: {e}")))?;
        connection
            .set_baud(APP_BAUD)
            .map_err(|e| Error::Loader(format!("Reset failed: {e}")))
    }
}

/// Compare the image digest with the one the device computed over flash.
fn check_digest(expected: &str, device: u128) -> Result<()> {
    let actual = format!("{device:032x}");
    if actual != expected {
        return Err(Error::Loader(format!(
            "MD5 mismatch: expected {expected}, flash has {actual}"
        )));
    }
    debug!("Flash MD5 {actual} verified");
    Ok(())
}

/// Forwards espflash progress to the log sink and the caller's callback.
///
/// espflash counts compressed blocks; they are scaled back to image bytes.
struct LogProgress<'a> {
    terminal: Option<Arc<dyn LogSink>>,
    report: &'a mut dyn FnMut(usize, usize),
    addr: u32,
    len: usize,
    blocks: usize,
}

impl LogProgress<'_> {
    fn bytes_written(&self, block: usize) -> usize {
        (self.len * block.min(self.blocks))
            .checked_div(self.blocks)
            .unwrap_or(self.len)
    }
}

impl ProgressCallbacks for LogProgress<'_> {
    fn init(&mut self, addr: u32, blocks: usize) {
        self.addr = addr;
        self.blocks = blocks;
        (self.report)(0, self.len);
    }

    fn update(&mut self, current: usize) {
        let written = self.bytes_written(current);
        (self.report)(written, self.len);
        if let Some(terminal) = &self.terminal {
            let offset = u32::try_from(written).unwrap_or(u32::MAX);
            let percent = (written * 100)
                .checked_div(self.len)
                .unwrap_or(100);
            log_line(
                terminal.as_ref(),
                &format!(
                    "Writing at 0x{:08x}... ({percent}%)",
                    self.addr
                        .saturating_add(offset)
                ),
            );
        }
    }

    fn verifying(&mut self) {
        debug!("Verifying 0x{:x}", self.addr);
    }

    fn finish(&mut self, skipped: bool) {
        if skipped {
            debug!("Segment at 0x{:x} already up to date", self.addr);
        }
        (self.report)(self.len, self.len);
    }
}

/// Picks the port to connect to.
pub type PortPicker = Box<dyn FnMut() -> Result<DetectedPort>>;

/// [`Host`] for native serial ports.
pub struct EspHost {
    picker: PortPicker,
}

impl EspHost {
    /// Host that asks `picker` for a port on every connect.
    pub fn new(picker: PortPicker) -> Self {
        Self { picker }
    }

    /// Host bound to one fixed port.
    pub fn with_port(port: DetectedPort) -> Self {
        Self::new(Box::new(move || Ok(port.clone())))
    }
}

impl Host for EspHost {
    fn request_port(&mut self) -> Result<DeviceHandle> {
        let port = (self.picker)()?;
        debug!("Selected port {}", port.name);
        Ok(DeviceHandle { port })
    }

    fn open(&mut self, device: &DeviceHandle, baud: u32) -> Result<Link> {
        debug!(
            "Opening {} at {ROM_BAUD} baud (target {baud})",
            device.name()
        );
        let usb_info = usb_port_info(device.name());

        let serial = serialport::new(device.name(), ROM_BAUD)
            .timeout(OPEN_TIMEOUT)
            .open_native()
            .map_err(|e| open_error(device.name(), e))?;
        let mut reader = serial.try_clone()?;
        reader.set_timeout(READ_POLL_INTERVAL)?;

        let connection = Connection::new(
            serial,
            usb_info,
            ResetAfterOperation::HardReset,
            ResetBeforeOperation::DefaultReset,
            ROM_BAUD,
        );

        Ok(Link {
            transport: Box::new(SerialTransport::from_port(reader, device.name())),
            client: Box::new(EspLoader::new(connection)),
        })
    }

    fn release(&mut self, device: DeviceHandle) -> Result<()> {
        debug!("Released {}", device.name());
        Ok(())
    }
}

fn usb_port_info(name: &str) -> UsbPortInfo {
    let found = serialport::available_ports()
        .ok()
        .and_then(|ports| {
            ports
                .into_iter()
                .find(|p| p.port_name == name)
        })
        .and_then(|p| match p.port_type {
            SerialPortType::UsbPort(info) => Some(info),
            _ => None,
        });

    found.unwrap_or(UsbPortInfo {
        vid: 0,
        pid: 0,
        serial_number: None,
        manufacturer: None,
        product: None,
    })
}
