//! Session controller: connection lifecycle and the program workflow.
//!
//! ```text
//!                 connect                 handshake ok
//! Disconnected ----------> Connecting ------------------> ConnectedIdle
//!      ^                       |                             |     ^
//!      |     handshake fails   |                     program |     | done / failed
//!      +-----------------------+                             v     |
//!      |                                                  Programming
//!      |              disconnect                             |
//!      +-----------------------------------------------------+
//! ```
//!
//! Errors never escape an operation: each one is logged once through the
//! [`LogSink`] and reflected in the returned [`Outcome`].

pub mod read_loop;

use {
    crate::{
        error::{Error, Result},
        firmware::{FirmwareEntry, FirmwareSource},
        host::{DeviceHandle, Host, Link},
        is_interrupted_requested,
        loader::{BootloaderClient, FlashOptions, FlashSizePolicy},
        log_sink::LogSink,
        payload::{BinaryString, md5_latin1},
        transport::{READ_POLL_INTERVAL, Transport},
    },
    log::{debug, info, warn},
    std::{
        fmt,
        sync::Arc,
        thread,
        time::{Duration, Instant},
    },
};

pub use read_loop::{ParkGuard, ReadLoop};

/// Default session baud rate.
pub const DEFAULT_BAUD: u32 = 921_600;

/// Default flash address for application images.
pub const DEFAULT_FLASH_OFFSET: u32 = 0x0;

/// Default wait between closing the port and releasing the device.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_millis(1500);

/// Confirmation asked before erasing and programming.
pub const CONFIRM_PROGRAM: &str = "This will erase and program the flash. Continue?";

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No device open.
    Disconnected,
    /// Acquiring the device and handshaking.
    Connecting,
    /// Connected; the read loop is relaying output.
    ConnectedIdle,
    /// A program operation is running.
    Programming,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::ConnectedIdle => "connected",
            Self::Programming => "programming",
        };
        f.write_str(text)
    }
}

/// What the user interface should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Controls {
    /// Label of the connect/disconnect action.
    pub connect_label: &'static str,
    /// Whether the program action may be triggered.
    pub program_enabled: bool,
}

/// Result of a user-facing operation.
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The operation completed.
    Done,
    /// The operation did not start (precondition or user declined).
    Aborted,
    /// The operation started and failed; the error was logged.
    Failed,
}

impl Outcome {
    /// Whether the operation completed.
    pub fn is_done(self) -> bool {
        self == Self::Done
    }
}

/// Tunables of a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Baud rate requested from the bootloader after the handshake.
    pub baud: u32,
    /// Flash address images are written to.
    pub flash_offset: u32,
    /// Reboot into the new firmware after programming.
    pub soft_reset: bool,
    /// Wait between closing the port and releasing the device.
    pub settle_delay: Duration,
    /// Sleep granularity of the read loop while parked.
    pub poll: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            baud: DEFAULT_BAUD,
            flash_offset: DEFAULT_FLASH_OFFSET,
            soft_reset: true,
            settle_delay: DEFAULT_SETTLE_DELAY,
            poll: READ_POLL_INTERVAL,
        }
    }
}

/// Yes/no question put to the user.
pub trait Prompt {
    /// Ask `message`; `true` means go ahead.
    fn confirm(&mut self, message: &str) -> bool;
}

impl<F> Prompt for F
where
    F: FnMut(&str) -> bool,
{
    fn confirm(&mut self, message: &str) -> bool {
        self(message)
    }
}

/// Observer of `(written, total)` byte counts during a flash write.
pub type ProgressObserver = Box<dyn FnMut(usize, usize)>;

struct Connection {
    device: DeviceHandle,
    transport: Box<dyn Transport>,
    client: Box<dyn BootloaderClient>,
    read_loop: Option<ReadLoop>,
}

impl Connection {
    /// Run a client call with the read loop parked.
    fn with_client<T>(
        &mut self,
        op: impl FnOnce(&mut dyn BootloaderClient) -> Result<T>,
    ) -> Result<T> {
        let _parked = self
            .read_loop
            .as_ref()
            .map(ReadLoop::park);
        op(self
            .client
            .as_mut())
    }
}

/// Owns one serial session and mediates every user action on it.
pub struct SessionController<H: Host> {
    host: H,
    firmware: Box<dyn FirmwareSource>,
    prompt: Box<dyn Prompt>,
    log: Arc<dyn LogSink>,
    config: SessionConfig,
    state: SessionState,
    selected: Option<String>,
    connection: Option<Connection>,
    progress: Option<ProgressObserver>,
}

impl<H: Host> SessionController<H> {
    /// Create a disconnected controller.
    pub fn new(
        host: H,
        firmware: Box<dyn FirmwareSource>,
        prompt: Box<dyn Prompt>,
        log: Arc<dyn LogSink>,
        config: SessionConfig,
    ) -> Self {
        Self {
            host,
            firmware,
            prompt,
            log,
            config,
            state: SessionState::Disconnected,
            selected: None,
            connection: None,
            progress: None,
        }
    }

    /// Forward flash write progress to `observer`.
    #[must_use]
    pub fn with_progress(mut self, observer: ProgressObserver) -> Self {
        self.progress = Some(observer);
        self
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Whether a device is open.
    pub fn is_connected(&self) -> bool {
        self.connection
            .is_some()
    }

    /// Button model for the current state.
    pub fn controls(&self) -> Controls {
        match self.state {
            SessionState::Disconnected | SessionState::Connecting => Controls {
                connect_label: "Connect",
                program_enabled: false,
            },
            SessionState::ConnectedIdle => Controls {
                connect_label: "Disconnect",
                program_enabled: true,
            },
            SessionState::Programming => Controls {
                connect_label: "Disconnect",
                program_enabled: false,
            },
        }
    }

    /// Session tunables.
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The log every status line goes to.
    pub fn log(&self) -> &Arc<dyn LogSink> {
        &self.log
    }

    /// Name of the open port, if connected.
    pub fn port_name(&self) -> Option<&str> {
        self.connection
            .as_ref()
            .map(|c| c.device.name())
    }

    /// Images the firmware source offers.
    pub fn catalog(&self) -> Result<Vec<FirmwareEntry>> {
        self.firmware
            .list()
    }

    /// Choose the image `program` will write. `None` clears the selection.
    pub fn select_firmware(&mut self, id: Option<String>) {
        debug!("Selected firmware: {id:?}");
        self.selected = id;
    }

    /// Currently selected image identifier.
    pub fn selected_firmware(&self) -> Option<&str> {
        self.selected
            .as_deref()
    }

    /// The single connect/disconnect button.
    pub fn click_connect(&mut self) -> Outcome {
        if self.is_connected() {
            self.disconnect()
        } else {
            self.connect()
        }
    }

    /// Acquire a device, handshake and start the read loop.
    pub fn connect(&mut self) -> Outcome {
        if self.is_connected() {
            debug!("connect ignored: already connected");
            return Outcome::Aborted;
        }

        self.state = SessionState::Connecting;
        match self.open_connection() {
            Ok(connection) => {
                info!("Connected to {}", connection.device.name());
                self.connection = Some(connection);
                self.state = SessionState::ConnectedIdle;
                self.log
                    .write_line(&format!("Connected at {} baud.", self.config.baud));
                Outcome::Done
            },
            Err(e) => {
                self.state = SessionState::Disconnected;
                self.log
                    .error(&e.to_string());
                Outcome::Failed
            },
        }
    }

    fn open_connection(&mut self) -> Result<Connection> {
        let device = self
            .host
            .request_port()?;
        let baud = self.config.baud;

        let Link {
            mut transport,
            mut client,
        } = match self
            .host
            .open(&device, baud)
        {
            Ok(link) => link,
            Err(e) => {
                self.release_quietly(device);
                return Err(e);
            },
        };

        let started = client
            .initialize(baud, Arc::clone(&self.log))
            .and_then(|()| transport.try_clone())
            .and_then(|reader| ReadLoop::spawn(reader, Arc::clone(&self.log), self.config.poll));

        match started {
            Ok(read_loop) => Ok(Connection {
                device,
                transport,
                client,
                read_loop: Some(read_loop),
            }),
            Err(e) => {
                drop(client);
                if let Err(close_err) = transport.close() {
                    warn!("Closing {} failed: {close_err}", device.name());
                }
                self.release_quietly(device);
                Err(e)
            },
        }
    }

    fn release_quietly(&mut self, device: DeviceHandle) {
        if let Err(e) = self
            .host
            .release(device)
        {
            warn!("Releasing device failed: {e}");
        }
    }

    /// Tear the session down.
    ///
    /// The read loop is cancelled and joined before the transport closes,
    /// and the device is released only after the settle delay.
    pub fn disconnect(&mut self) -> Outcome {
        let Some(mut connection) = self
            .connection
            .take()
        else {
            debug!("disconnect ignored: not connected");
            return Outcome::Aborted;
        };

        if let Some(read_loop) = connection
            .read_loop
            .take()
        {
            read_loop.cancel();
        }
        if let Err(e) = connection
            .transport
            .close()
        {
            warn!("Closing {} failed: {e}", connection.device.name());
        }
        drop(connection.client);

        if !self
            .config
            .settle_delay
            .is_zero()
        {
            thread::sleep(self.config.settle_delay);
        }
        self.state = SessionState::Disconnected;

        match self
            .host
            .release(connection.device)
        {
            Ok(()) => Outcome::Done,
            Err(e) => {
                self.log
                    .error(&e.to_string());
                Outcome::Failed
            },
        }
    }

    /// Erase and program the selected image.
    pub fn program(&mut self) -> Outcome {
        let Some(id) = self
            .selected
            .clone()
        else {
            self.log
                .error("Please select a firmware file first");
            return Outcome::Aborted;
        };
        if !self.is_connected() {
            self.log
                .error(&Error::NotConnected.to_string());
            return Outcome::Aborted;
        }
        if !self
            .prompt
            .confirm(CONFIRM_PROGRAM)
        {
            debug!("program declined");
            return Outcome::Aborted;
        }

        self.state = SessionState::Programming;
        self.log
            .end_progress();
        let result = self.run_program(&id);
        self.log
            .end_progress();
        self.state = if self.is_connected() {
            SessionState::ConnectedIdle
        } else {
            SessionState::Disconnected
        };

        match result {
            Ok(()) => Outcome::Done,
            Err(e) => {
                self.log
                    .error(&e.to_string());
                Outcome::Failed
            },
        }
    }

    fn run_program(&mut self, id: &str) -> Result<()> {
        let log = Arc::clone(&self.log);
        let offset = self.config.flash_offset;
        let soft_reset = self.config.soft_reset;
        let connection = self
            .connection
            .as_mut()
            .ok_or(Error::NotConnected)?;

        log.write_line("Erasing flash...");
        let start = Instant::now();
        connection.with_client(|client| client.erase_flash())?;
        log.write_line(&format!(
            "Erase completed in {}ms.",
            start
                .elapsed()
                .as_millis()
        ));

        log.write_line("Fetching firmware...");
        let bytes = self
            .firmware
            .fetch(id)?;
        debug!("Fetched {id}: {} bytes", bytes.len());
        let payload = BinaryString::from_bytes(&bytes);

        log.write_line(&format!("Programming firmware at offset 0x{offset:x}..."));
        let start = Instant::now();
        let mut ignore = |_: usize, _: usize| {};
        let report: &mut dyn FnMut(usize, usize) = match self.progress.as_mut() {
            Some(observer) => observer.as_mut(),
            None => &mut ignore,
        };
        connection.with_client(|client| {
            client.write_flash(FlashOptions {
                data: &payload,
                address: offset,
                flash_size: FlashSizePolicy::Keep,
                erase_all: false,
                compress: true,
                report_progress: report,
                checksum: md5_latin1,
            })
        })?;
        log.end_progress();
        log.write_line(&format!(
            "Programming completed in {}ms.",
            start
                .elapsed()
                .as_millis()
        ));

        if soft_reset {
            log.write_line(
                "Firmware installed successfully. Device will now reset and show output...",
            );
            connection.with_client(|client| client.soft_reset())?;
        } else {
            log.write_line("Firmware installed successfully. Reset your device to run it.");
        }
        Ok(())
    }

    /// Erase the whole flash without writing an image.
    pub fn erase(&mut self) -> Outcome {
        let Some(connection) = self
            .connection
            .as_mut()
        else {
            self.log
                .error(&Error::NotConnected.to_string());
            return Outcome::Aborted;
        };

        self.state = SessionState::Programming;
        self.log
            .write_line("Erasing flash...");
        let start = Instant::now();
        let result = connection.with_client(|client| client.erase_flash());
        self.state = SessionState::ConnectedIdle;

        match result {
            Ok(()) => {
                self.log
                    .write_line(&format!(
                        "Erase completed in {}ms.",
                        start
                            .elapsed()
                            .as_millis()
                    ));
                Outcome::Done
            },
            Err(e) => {
                self.log
                    .error(&e.to_string());
                Outcome::Failed
            },
        }
    }

    /// Block while device output is relayed, until interrupted or the
    /// reader stops.
    pub fn relay_until_interrupted(&self) {
        let Some(read_loop) = self
            .connection
            .as_ref()
            .and_then(|c| c.read_loop.as_ref())
        else {
            return;
        };
        while read_loop.is_running() && !is_interrupted_requested() {
            thread::sleep(self.config.poll);
        }
    }
}

impl<H: Host> Drop for SessionController<H> {
    fn drop(&mut self) {
        if self.is_connected() {
            let _ = self.disconnect();
        }
    }
}
