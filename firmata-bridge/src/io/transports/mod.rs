use crate::errors::Error;
use dyn_clone::DynClone;
use std::fmt::{Debug, Display};
use std::time::Duration;

pub mod serial;

dyn_clone::clone_trait_object!(IoTransport);
dyn_clone::clone_trait_object!(PortProvider);

/// Defines the byte carrier a board talks through.
///
/// Clones of a transport share the same underlying port: closing one clone closes them all.
pub trait IoTransport: Debug + Display + DynClone + Send + Sync {
    /// Opens communication (in a blocking way) using the transport layer.
    ///
    /// # Notes
    ///  The method is sync and may block until the connection is established.
    fn open(&mut self) -> Result<(), Error>;

    /// Gracefully shuts down the transport layer.
    fn close(&mut self) -> Result<(), Error>;

    /// Checks whether the transport is currently opened.
    fn is_open(&self) -> bool;

    /// Sets a timeout for blocking reads.
    fn set_timeout(&mut self, duration: Duration) -> Result<(), Error>;

    /// Returns the number of bytes ready to be read without blocking.
    fn available(&self) -> Result<usize, Error>;

    /// Write bytes to the internal connection. For more details see [`std::io::Write::write`].
    ///
    /// # Notes
    /// This function blocks until the write operation is complete.
    fn write(&mut self, buf: &[u8]) -> Result<(), Error>;

    /// Reads from the internal connection. For more details see [`std::io::Read::read_exact`].
    ///
    /// # Notes
    /// This function blocks until the buffer is filled or the timeout elapses.
    fn read_exact(&mut self, buf: &mut [u8]) -> Result<(), Error>;
}

/// The environment capability to hand out a physical port on request.
///
/// The returned transport is not opened yet: the controller opens it at its configured baud rate.
pub trait PortProvider: Debug + DynClone + Send + Sync {
    /// Requests a port to connect to.
    ///
    /// # Errors
    /// * `NoPortAvailable`: the environment has no port to offer.
    fn request_port(&self, baud_rate: u32) -> Result<Box<dyn IoTransport>, Error>;
}
