use std::collections::HashMap;
use std::fmt::{Debug, Display, Formatter};

use crate::errors::HardwareError::{UnknownChannel, UnknownPin};
use crate::errors::*;

/// Represents the board descriptors an [`IoProtocol`](crate::io::IoProtocol) handles.
///
/// This struct is hidden behind an `Arc<RwLock<IoData>>` shared by every clone of the
/// board handle. Pins are filled in by the handshake (capability and analog mapping
/// responses) and are read-only for the controller, except for the current mode and value
/// the board layer maintains.
#[derive(Clone, Debug, Default)]
pub struct IoData {
    /// All `Pin` instances, keyed by pin index.
    pub pins: HashMap<u8, Pin>,
    /// A string indicating the version of the protocol.
    pub protocol_version: String,
    /// A string representing the name of the firmware.
    pub firmware_name: String,
    /// A string representing the version of the firmware.
    pub firmware_version: String,
    /// Whether the handshake completed and the board accepts commands.
    pub connected: bool,
}

impl IoData {
    /// Retrieves a reference to a pin by its index.
    ///
    /// # Errors
    /// * `UnknownPin` - the board does not declare that pin.
    pub fn get_pin(&self, pin: u8) -> Result<&Pin, Error> {
        self.pins.get(&pin).ok_or(Error::from(UnknownPin { pin }))
    }

    /// Retrieves a mutable reference to a pin by its index.
    ///
    /// # Errors
    /// * `UnknownPin` - the board does not declare that pin.
    pub fn get_pin_mut(&mut self, pin: u8) -> Result<&mut Pin, Error> {
        self.pins.get_mut(&pin).ok_or(Error::from(UnknownPin { pin }))
    }

    /// Retrieves the pin bound to the given analog `channel` ("A3" => 3).
    ///
    /// # Errors
    /// * `UnknownChannel` - no pin is mapped to that channel.
    pub fn get_pin_by_channel(&self, channel: u8) -> Result<&Pin, Error> {
        self.pins
            .values()
            .find(|pin| pin.channel == Some(channel))
            .ok_or(Error::from(UnknownChannel { channel }))
    }

    /// Returns all pins ordered by index.
    pub fn sorted_pins(&self) -> Vec<&Pin> {
        let mut pins: Vec<&Pin> = self.pins.values().collect();
        pins.sort_by_key(|pin| pin.id);
        pins
    }
}

/// Represents the current state and static configuration of a pin.
#[derive(Clone, Default)]
pub struct Pin {
    /// The pin index, which also is the key in [`IoData::pins`].
    pub id: u8,
    /// Alternative representation of the pin: 'D13', 'A0'.
    pub name: String,
    /// Currently configured mode: `None` until something sets it.
    pub mode: Option<PinMode>,
    /// All pin supported modes.
    pub supported_modes: Vec<PinMode>,
    /// For analog pin, this is the channel number ie "A0"=>0, "A1"=>1, etc...
    pub channel: Option<u8>,
    /// Last written or reported value.
    pub value: u16,
}

impl Pin {
    /// Verifies if a pin supports the given mode and returns it if it does.
    pub fn supports_mode(&self, mode: PinModeId) -> Option<PinMode> {
        self.supported_modes.iter().find(|m| m.id == mode).copied()
    }

    /// Checks whether the pin currently is in the given mode.
    pub fn is_in_mode(&self, mode: PinModeId) -> bool {
        self.mode.map(|current| current.id) == Some(mode)
    }
}

impl Debug for Pin {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let mode_str = match self.mode {
            Some(mode) => format!("{}", mode),
            None => String::from("UNSET"),
        };

        f.debug_struct("Pin")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("mode", &mode_str)
            .field("supported modes", &self.supported_modes)
            .field("channel", &self.channel)
            .field("value", &self.value)
            .finish()
    }
}

// ########################################

/// Represents a mode configuration for a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Default, Copy, PartialEq)]
pub struct PinMode {
    /// The mode.
    pub id: PinModeId,
    /// Resolution (number of bits) this mode uses.
    pub resolution: u8,
}

impl PinMode {
    /// Get the max value this pinMode can reach according to its resolution.
    pub fn get_max_possible_value(&self) -> u16 {
        ((1u32 << self.resolution) - 1) as u16
    }
}

impl Display for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl Debug for PinMode {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self.id {
            PinModeId::UNSUPPORTED => write!(f, "[{}]", self.id),
            _ => write!(f, "[id: {}, resolution: {}]", self.id, self.resolution),
        }
    }
}

// ########################################

/// Enumerates the possible modes for a pin.
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy, Default)]
#[repr(u8)]
pub enum PinModeId {
    /// Same as INPUT defined in Arduino.
    INPUT = 0,
    /// Same as OUTPUT defined in Arduino.h
    OUTPUT = 1,
    /// Analog pin in analogInput mode
    ANALOG = 2,
    /// Digital pin in PWM output mode
    PWM = 3,
    /// Digital pin in Servo output mode
    SERVO = 4,
    /// shiftIn/shiftOut mode
    SHIFT = 5,
    /// Pin included in I2C setup
    I2C = 6,
    /// Pin configured for 1-wire
    ONEWIRE = 7,
    /// Pin configured for stepper motor
    STEPPER = 8,
    /// Pin configured for rotary encoders
    ENCODER = 9,
    /// Pin configured for serial communication
    SERIAL = 0x0A,
    /// Enable internal pull-up resistor for pin
    PULLUP = 0x0B,
    /// Pin configured for SPI
    SPI = 0x0C,
    /// Pin configured for proximity sensors
    SONAR = 0x0D,
    /// Pin configured for piezzo buzzer tone generation
    TONE = 0x0E,
    /// Pin configured for DHT humidity and temperature sensors
    DHT = 0x0F,
    /// Pin configured to be ignored by digitalWrite and capabilityResponse
    #[default]
    UNSUPPORTED = 0x7F,
}

impl PinModeId {
    /// Converts a `u8` byte value into a `PinModeId`.
    ///
    /// # Errors
    /// * `UnknownError`: The value does not match any known pin mode.
    pub fn from_u8(value: u8) -> Result<PinModeId, Error> {
        match value {
            0 => Ok(PinModeId::INPUT),
            1 => Ok(PinModeId::OUTPUT),
            2 => Ok(PinModeId::ANALOG),
            3 => Ok(PinModeId::PWM),
            4 => Ok(PinModeId::SERVO),
            5 => Ok(PinModeId::SHIFT),
            6 => Ok(PinModeId::I2C),
            7 => Ok(PinModeId::ONEWIRE),
            8 => Ok(PinModeId::STEPPER),
            9 => Ok(PinModeId::ENCODER),
            0x0A => Ok(PinModeId::SERIAL),
            0x0B => Ok(PinModeId::PULLUP),
            0x0C => Ok(PinModeId::SPI),
            0x0D => Ok(PinModeId::SONAR),
            0x0E => Ok(PinModeId::TONE),
            0x0F => Ok(PinModeId::DHT),
            0x7F => Ok(PinModeId::UNSUPPORTED),
            x => Err(UnknownError {
                info: format!("PinMode not found with value: {}", x),
            }),
        }
    }
}

impl From<PinModeId> for u8 {
    fn from(mode: PinModeId) -> u8 {
        mode as u8
    }
}

impl Display for PinModeId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}
