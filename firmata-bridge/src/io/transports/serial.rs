use crate::errors::ConnectionError::NoPortAvailable;
use crate::errors::Error;
use crate::errors::ProtocolError::NotInitialized;
use crate::io::{IoTransport, PortProvider};
use log::trace;
use parking_lot::Mutex;
use serialport::{DataBits, FlowControl, Parity, SerialPort, StopBits};
use std::fmt::{Display, Formatter};
use std::io::{Read, Write};
use std::sync::Arc;
use std::time::Duration;

/// Firmata default baud rate.
pub const DEFAULT_BAUD_RATE: u32 = 57_600;

/// A serial port transport.
#[derive(Clone, Debug)]
pub struct Serial {
    /// The connection port.
    port: String,
    /// The baud rate used when opening the port.
    baud_rate: u32,
    /// The write side of the port, shared by all clones.
    io: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
    /// A handle cloned from `io` for reads: a blocked read never holds the `io` lock.
    reader: Arc<Mutex<Option<Box<dyn SerialPort>>>>,
}

impl Serial {
    /// Constructs a new `Serial` transport layer instance for communication through the specified port.
    pub fn new<P: Into<String>>(port: P) -> Self {
        Self {
            port: port.into(),
            baud_rate: DEFAULT_BAUD_RATE,
            io: Arc::new(Mutex::new(None)),
            reader: Arc::new(Mutex::new(None)),
        }
    }

    /// Sets the baud rate used by the next `open()`.
    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    /// Retrieves the configured port.
    pub fn get_port(&self) -> String {
        self.port.clone()
    }

    /// Retrieves the configured baud rate.
    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }
}

impl Display for Serial {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Serial({}@{})", self.port, self.baud_rate)
    }
}

impl IoTransport for Serial {
    #[cfg(not(tarpaulin_include))]
    fn open(&mut self) -> Result<(), Error> {
        let connexion = serialport::new(self.port.clone(), self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(Duration::from_secs(10))
            .open_native()?;
        trace!("Serial port is now opened: {:?}", connexion);

        let reader = connexion.try_clone()?;
        *self.reader.lock() = Some(reader);
        *self.io.lock() = Some(Box::new(connexion));
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        *self.io.lock() = None;
        // A read in progress keeps its handle until it returns: it drops it then.
        if let Some(mut reader) = self.reader.try_lock() {
            *reader = None;
        }
        trace!("Serial port {} is now closed", self.port);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.io.lock().is_some()
    }

    fn set_timeout(&mut self, duration: Duration) -> Result<(), Error> {
        self.io
            .lock()
            .as_mut()
            .ok_or(NotInitialized)?
            .set_timeout(duration)?;
        if let Some(reader) = self.reader.lock().as_mut() {
            reader.set_timeout(duration)?;
        }
        Ok(())
    }

    fn available(&self) -> Result<usize, Error> {
        let lock = self.io.lock();
        let count = lock.as_ref().ok_or(NotInitialized)?.bytes_to_read()?;
        Ok(count as usize)
    }

    fn write(&mut self, buf: &[u8]) -> Result<(), Error> {
        let mut lock = self.io.lock();
        lock.as_mut().ok_or(NotInitialized)?.write_all(buf)?;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error> {
        let mut reader = self.reader.lock();
        if !self.is_open() {
            *reader = None;
            return Err(NotInitialized.into());
        }
        let result = reader.as_mut().ok_or(NotInitialized)?.read_exact(buf);
        if !self.is_open() {
            *reader = None;
        }
        result?;
        Ok(())
    }
}

impl From<serialport::Error> for Error {
    fn from(value: serialport::Error) -> Self {
        std::io::Error::from(value).into()
    }
}

/// Hands out serial ports: either a fixed port name, or the first port the system lists.
#[derive(Clone, Debug, Default)]
pub struct SerialPortProvider {
    port: Option<String>,
}

impl SerialPortProvider {
    /// Always provides the given port.
    pub fn new<P: Into<String>>(port: P) -> Self {
        Self {
            port: Some(port.into()),
        }
    }
}

impl PortProvider for SerialPortProvider {
    fn request_port(&self, baud_rate: u32) -> Result<Box<dyn IoTransport>, Error> {
        let port = match &self.port {
            Some(port) => port.clone(),
            None => serialport::available_ports()?
                .first()
                .map(|info| info.port_name.clone())
                .ok_or(NoPortAvailable)?,
        };
        trace!("Port requested: {}", port);
        Ok(Box::new(Serial::new(port).with_baud_rate(baud_rate)))
    }
}
