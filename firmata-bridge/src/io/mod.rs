//! Defines the board layer the controller drives: pin descriptors, the Firmata protocol and
//! its transports.

mod data;
pub mod firmata;
mod protocol;
mod transports;

pub use data::*;
pub use firmata::FirmataIo;
pub use protocol::*;
pub use transports::serial::{Serial, SerialPortProvider, DEFAULT_BAUD_RATE};
pub use transports::*;
