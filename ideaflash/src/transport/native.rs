//! Native serial transport using the `serialport` crate.

use {
    crate::{
        error::{Error, Result},
        transport::{ReadEvent, SerialConfig, Transport},
    },
    log::trace,
    std::io::{ErrorKind, Read, Write},
};

/// Serial port backed transport.
pub struct SerialTransport {
    port: Option<Box<dyn serialport::SerialPort>>,
    name: String,
}

impl SerialTransport {
    /// Open a serial port with the given configuration.
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port_name, config.baud_rate)
            .timeout(config.timeout)
            .open()
            .map_err(|e| open_error(&config.port_name, e))?;

        Ok(Self::from_port(port, &config.port_name))
    }

    /// Wrap an already opened port handle.
    pub fn from_port(port: Box<dyn serialport::SerialPort>, name: &str) -> Self {
        Self {
            port: Some(port),
            name: name.to_string(),
        }
    }

    fn port_mut(&mut self) -> Result<&mut Box<dyn serialport::SerialPort>> {
        self.port
            .as_mut()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    ErrorKind::NotConnected,
                    "port closed",
                ))
            })
    }
}

/// Map a failed open, singling out ports another program holds.
pub(crate) fn open_error(name: &str, err: serialport::Error) -> Error {
    match err.kind() {
        serialport::ErrorKind::Io(ErrorKind::ResourceBusy) => {
            Error::Busy(format!("{name} is in use by another program"))
        },
        _ => Error::Serial(err),
    }
}

impl Transport for SerialTransport {
    fn name(&self) -> &str {
        &self.name
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<ReadEvent> {
        let Some(port) = self
            .port
            .as_mut()
        else {
            return Ok(ReadEvent::Closed);
        };

        match port.read(buf) {
            Ok(0) => Ok(ReadEvent::Idle),
            Ok(n) => {
                trace!("{}: read {n} bytes", self.name);
                Ok(ReadEvent::Data(n))
            },
            Err(e) => classify_read_error(e),
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let port = self.port_mut()?;
        port.write_all(data)?;
        port.flush()?;
        Ok(())
    }

    fn try_clone(&self) -> Result<Box<dyn Transport>> {
        let port = self
            .port
            .as_ref()
            .ok_or_else(|| {
                Error::Io(std::io::Error::new(
                    ErrorKind::NotConnected,
                    "port closed",
                ))
            })?
            .try_clone()?;
        Ok(Box::new(Self::from_port(port, &self.name)))
    }

    fn close(&mut self) -> Result<()> {
        if self
            .port
            .take()
            .is_some()
        {
            trace!("{}: closed", self.name);
        }
        Ok(())
    }
}

fn classify_read_error(e: std::io::Error) -> Result<ReadEvent> {
    match e.kind() {
        ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::Interrupted => {
            Ok(ReadEvent::Idle)
        },
        ErrorKind::BrokenPipe | ErrorKind::NotConnected | ErrorKind::UnexpectedEof => {
            Ok(ReadEvent::Closed)
        },
        _ => Err(Error::Io(e)),
    }
}
