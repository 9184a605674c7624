//! Test doubles for the board layer: an in-memory transport, a port provider handing it out and
//! the descriptors of a small fake board.

mod port_provider;
mod transport_layer;

use std::collections::HashMap;

pub use port_provider::MockPortProvider;
pub use transport_layer::MockTransportLayer;

use crate::io::{IoData, Pin, PinMode, PinModeId};

/// Pins supporting PWM on the fake board.
const PWM_PINS: [u8; 6] = [3, 5, 6, 9, 10, 11];

fn mode(id: PinModeId, resolution: u8) -> PinMode {
    PinMode { id, resolution }
}

/// Describes a 20 pins fake board, as it stands right after the handshake:
/// - pins 0-1: reserved for the serial line (no modes)
/// - pins 2-13: digital (INPUT, OUTPUT, PULLUP, SERVO), PWM on 3, 5, 6, 9, 10, 11
/// - pins 14-19: analog channels A0-A5 (INPUT, OUTPUT, ANALOG, PULLUP)
pub fn create_test_io_data() -> IoData {
    let mut pins = HashMap::new();
    for id in 0..20u8 {
        let pin = match id {
            0..=1 => Pin {
                id,
                name: format!("D{}", id),
                ..Default::default()
            },
            2..=13 => {
                let mut supported_modes = vec![
                    mode(PinModeId::INPUT, 1),
                    mode(PinModeId::OUTPUT, 1),
                    mode(PinModeId::PULLUP, 1),
                    mode(PinModeId::SERVO, 14),
                ];
                if PWM_PINS.contains(&id) {
                    supported_modes.push(mode(PinModeId::PWM, 8));
                }
                Pin {
                    id,
                    name: format!("D{}", id),
                    supported_modes,
                    ..Default::default()
                }
            }
            _ => Pin {
                id,
                name: format!("A{}", id - 14),
                mode: Some(mode(PinModeId::ANALOG, 10)),
                supported_modes: vec![
                    mode(PinModeId::INPUT, 1),
                    mode(PinModeId::OUTPUT, 1),
                    mode(PinModeId::ANALOG, 10),
                    mode(PinModeId::PULLUP, 1),
                ],
                channel: Some(id - 14),
                value: 0,
            },
        };
        pins.insert(id, pin);
    }

    IoData {
        pins,
        protocol_version: String::from("2.5"),
        firmware_name: String::from("Fake"),
        firmware_version: String::from("2.5"),
        connected: true,
    }
}

/// Builds the bytes the fake board of [`create_test_io_data`] answers to a handshake with:
/// protocol version, firmware report, capability response and analog mapping response.
pub fn create_test_handshake() -> Vec<u8> {
    let data = create_test_io_data();
    let mut bytes = vec![0xF9, 0x02, 0x05];

    bytes.extend([0xF0, 0x79, 0x02, 0x05]);
    for byte in data.firmware_name.bytes() {
        bytes.extend([byte, 0x00]);
    }
    bytes.push(0xF7);

    bytes.extend([0xF0, 0x6C]);
    for pin in data.sorted_pins() {
        for supported in &pin.supported_modes {
            bytes.extend([supported.id as u8, supported.resolution]);
        }
        bytes.push(0x7F);
    }
    bytes.push(0xF7);

    bytes.extend([0xF0, 0x6A]);
    for pin in data.sorted_pins() {
        bytes.push(pin.channel.unwrap_or(0x7F));
    }
    bytes.push(0xF7);

    bytes
}
