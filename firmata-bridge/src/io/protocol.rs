//! Defines the board handle: the protocol layer exposing pin descriptors and pin operations.

use std::any::type_name;
use std::fmt::{Debug, Display};
use std::sync::Arc;

use dyn_clone::DynClone;
use parking_lot::RwLock;

use crate::errors::*;
use crate::io::{IoData, PinModeId};
use crate::utils::Range;

// Makes a Box<dyn IoProtocol> clone (clones share the same board).
dyn_clone::clone_trait_object!(IoProtocol);

/// Callback receiving the raw values reported by the board for a pin (or analog channel).
pub type ReadCallback = Arc<dyn Fn(u16) + Send + Sync>;

/// Defines the trait all protocols must implement.
pub trait IoProtocol: DynClone + Send + Sync + Debug + Display {
    // ########################################
    // Inner data related functions

    /// Returns a protected arc to the inner [`IoData`].
    fn get_io(&self) -> &Arc<RwLock<IoData>>;

    /// Returns the protocol name (used for Display only)
    fn get_protocol_name(&self) -> &'static str {
        type_name::<Self>().split("::").last().unwrap_or_default()
    }

    // ########################################
    // Functions specifically bound to the protocol.

    /// Performs the handshake over the (already opened) transport: the board is ready when this returns.
    ///
    /// # Notes
    /// The method is sync and blocks until the board answered the handshake.
    fn open(&mut self) -> Result<(), Error>;
    /// Gracefully shuts down the communication and releases the transport.
    fn close(&mut self) -> Result<(), Error>;
    /// Checks if the handshake completed and the communication is still opened.
    fn is_connected(&self) -> bool;

    // ########################################
    // Read/Write on pins

    /// Sets the `mode` of the specified `pin`.
    ///
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    fn set_pin_mode(&mut self, pin: u8, mode: PinModeId) -> Result<(), Error>;

    /// Writes `level` to the digital `pin`.
    ///
    /// Send an DIGITAL_MESSAGE (0x90 - set digital value).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#message-types>
    fn digital_write(&mut self, pin: u8, level: bool) -> Result<(), Error>;

    /// Writes `level` to the analog `pin`.
    ///
    /// Send an ANALOG_MESSAGE (0xE0 - set analog value).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#message-types>
    fn analog_write(&mut self, pin: u8, level: u16) -> Result<(), Error>;

    /// Moves the servo on `pin` to `value` (degrees, or microseconds above 544).
    ///
    /// Servos are driven through the same ANALOG_MESSAGE as PWM.
    fn servo_write(&mut self, pin: u8, value: u16) -> Result<(), Error> {
        self.analog_write(pin, value)
    }

    /// Requests the digital `pin` value: enables the reporting of its port and registers the
    /// `callback` that receives each reported value (0 or 1).
    fn digital_read(&mut self, pin: u8, callback: ReadCallback) -> Result<(), Error>;

    /// Requests the analog `channel` value: enables the reporting of that channel and registers
    /// the `callback` that receives each reported raw value.
    fn analog_read(&mut self, channel: u8, callback: ReadCallback) -> Result<(), Error>;

    /// Sets the sampling interval (in ms): how often the board reports analog values.
    ///
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#sampling-interval>
    fn sampling_interval(&mut self, interval: u16) -> Result<(), Error>;

    // ########################################
    // SERVO

    /// Sends a SERVO_CONFIG command (0x70 - configure servo)
    /// <https://github.com/firmata/protocol/blob/master/servos.md>
    fn servo_config(&mut self, pin: u8, pwm_range: Range<u16>) -> Result<(), Error>;
}
