//! Official Firmata documentation: https://github.com/firmata/protocol
//! Helper unofficial documentation: https://github.com/martin-eden/firmata_protocol/blob/main/protocol.md

pub(crate) mod constants;

use crate::errors::{Error, HardwareError, ProtocolError};
use crate::io::firmata::constants::*;
use crate::io::{IoData, IoProtocol, IoTransport, Pin, PinMode, PinModeId, ReadCallback};
use crate::pause;
use crate::utils::task::TaskHandler;
use crate::utils::{format_as_hex, task, Range};
use log::{debug, trace};
use parking_lot::{Mutex, RwLock};
use std::collections::{HashMap, HashSet};
use std::fmt::{Debug, Display, Formatter};
use std::sync::Arc;
use std::time::Duration;

/// Default read timeout once the handshake is done.
const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_millis(50);

/// Read requests registered on the board: value callbacks and the reporting already enabled.
#[derive(Default)]
struct Reporting {
    /// Callbacks per digital pin.
    digital: HashMap<u8, Vec<ReadCallback>>,
    /// Callbacks per analog channel.
    analog: HashMap<u8, Vec<ReadCallback>>,
    /// Digital ports with reporting enabled.
    ports: HashSet<u8>,
    /// Analog channels with reporting enabled.
    channels: HashSet<u8>,
}

impl Debug for Reporting {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reporting")
            .field("ports", &self.ports)
            .field("channels", &self.channels)
            .finish()
    }
}

/// Implements the [Firmata protocol](https://github.com/firmata/protocol) within an [`IoProtocol`].
#[derive(Debug, Clone)]
pub struct FirmataIo {
    /// Transport layer used to communicate with the device.
    transport: Box<dyn IoTransport>,
    /// Read timeout applied once the handshake is done.
    poll_timeout: Duration,

    // ########################################
    // # Volatile utility data.
    data: Arc<RwLock<IoData>>,
    reporting: Arc<Mutex<Reporting>>,
    /// Inner handler to the polling task.
    handler: Arc<RwLock<Option<TaskHandler>>>,
}

impl FirmataIo {
    /// Creates a Firmata board speaking through the given (boxed) transport.
    pub fn with_transport(transport: Box<dyn IoTransport>) -> Self {
        Self {
            transport,
            poll_timeout: DEFAULT_POLL_TIMEOUT,
            data: Arc::new(Default::default()),
            reporting: Arc::new(Default::default()),
            handler: Arc::new(RwLock::new(None)),
        }
    }

    /// Sets the read timeout applied once the handshake is done.
    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }
}

impl<T: IoTransport + 'static> From<T> for FirmataIo {
    fn from(transport: T) -> Self {
        Self::with_transport(Box::new(transport))
    }
}

impl IoProtocol for FirmataIo {
    fn get_io(&self) -> &Arc<RwLock<IoData>> {
        &self.data
    }

    fn open(&mut self) -> Result<(), Error> {
        self.data.write().connected = false;

        // Perform handshake.
        self.handshake()?;

        // Reduce timeout.
        self.transport.set_timeout(self.poll_timeout)?;

        self.data.write().connected = true;
        Ok(())
    }

    fn close(&mut self) -> Result<(), Error> {
        self.stop_polling();
        self.data.write().connected = false;
        *self.reporting.lock() = Reporting::default();
        self.transport.close()?;
        trace!("Firmata board closed");
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.data.read().connected && self.transport.is_open()
    }

    fn set_pin_mode(&mut self, pin: u8, mode: PinModeId) -> Result<(), Error> {
        {
            let mut lock = self.data.write();
            let pin_instance = lock.get_pin_mut(pin)?;
            let _mode =
                pin_instance
                    .supports_mode(mode)
                    .ok_or(HardwareError::IncompatibleMode {
                        pin,
                        mode,
                        context: "try to set pin mode",
                    })?;
            pin_instance.mode = Some(_mode);
        }

        let payload = &[SET_PIN_MODE, pin, mode as u8];
        trace!("Set pin mode: {}", format_as_hex(payload));
        self.transport.write(payload)
    }

    fn digital_write(&mut self, pin: u8, level: bool) -> Result<(), Error> {
        let port = pin / 8;
        let mut value: u16 = 0;

        {
            let mut lock = self.data.write();

            let pin_instance = lock.get_pin_mut(pin)?;
            if !pin_instance.is_in_mode(PinModeId::OUTPUT) {
                return Err(HardwareError::IncompatibleMode {
                    pin,
                    mode: PinModeId::OUTPUT,
                    context: "digital_write",
                }
                .into());
            }
            pin_instance.value = u16::from(level);

            // Concatenate the value of the 8 pins of the port: 00100000 sets pin 5 of port 0.
            for i in 0..8 {
                if let Some(other) = lock.pins.get(&(8 * port + i)) {
                    if other.value != 0 && other.is_in_mode(PinModeId::OUTPUT) {
                        value |= 1 << i;
                    }
                }
            }
        }

        let payload = &[
            DIGITAL_MESSAGE | port,
            value as u8 & SYSEX_REALTIME,
            (value >> 7) as u8 & SYSEX_REALTIME,
        ];
        trace!("Digital write: {}", format_as_hex(payload));
        self.transport.write(payload)
    }

    fn analog_write(&mut self, pin: u8, level: u16) -> Result<(), Error> {
        self.data.write().get_pin_mut(pin)?.value = level;

        let payload = if pin > 15 {
            // Extended analog message
            let mut payload = vec![
                START_SYSEX,
                EXTENDED_ANALOG,
                pin,
                level as u8 & SYSEX_REALTIME,
                (level >> 7) as u8 & SYSEX_REALTIME,
            ];
            if level >= 0x00004000 {
                payload.push((level >> 14) as u8 & SYSEX_REALTIME);
            }
            payload.push(END_SYSEX);
            payload
        } else {
            // Standard analog message
            vec![
                ANALOG_MESSAGE | pin,
                level as u8 & SYSEX_REALTIME,
                (level >> 7) as u8 & SYSEX_REALTIME,
            ]
        };

        trace!("Analog write: {}", format_as_hex(&payload));
        self.transport.write(&payload)
    }

    fn digital_read(&mut self, pin: u8, callback: ReadCallback) -> Result<(), Error> {
        self.data.read().get_pin(pin)?;
        let port = pin / 8;

        let enable = {
            let mut lock = self.reporting.lock();
            lock.digital.entry(pin).or_default().push(callback);
            lock.ports.insert(port)
        };
        if enable {
            let payload = &[REPORT_DIGITAL | port, 1];
            trace!("Report digital: {}", format_as_hex(payload));
            self.transport.write(payload)?;
        }
        self.start_polling()
    }

    fn analog_read(&mut self, channel: u8, callback: ReadCallback) -> Result<(), Error> {
        self.data.read().get_pin_by_channel(channel)?;

        let enable = {
            let mut lock = self.reporting.lock();
            lock.analog.entry(channel).or_default().push(callback);
            lock.channels.insert(channel)
        };
        if enable {
            let payload = &[REPORT_ANALOG | channel, 1];
            trace!("Report analog: {}", format_as_hex(payload));
            self.transport.write(payload)?;
        }
        self.start_polling()
    }

    fn sampling_interval(&mut self, interval: u16) -> Result<(), Error> {
        self.transport.write(&[
            START_SYSEX,
            SAMPLING_INTERVAL,
            interval as u8 & SYSEX_REALTIME,
            (interval >> 7) as u8 & SYSEX_REALTIME,
            END_SYSEX,
        ])
    }

    fn servo_config(&mut self, pin: u8, pwm_range: Range<u16>) -> Result<(), Error> {
        self.transport.write(&[
            START_SYSEX,
            SERVO_CONFIG,
            pin,
            pwm_range.start as u8 & SYSEX_REALTIME,
            (pwm_range.start >> 7) as u8 & SYSEX_REALTIME,
            pwm_range.end as u8 & SYSEX_REALTIME,
            (pwm_range.end >> 7) as u8 & SYSEX_REALTIME,
            END_SYSEX,
        ])
    }
}

impl FirmataIo {
    /// Sends a software reset request.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md>
    fn software_reset(&mut self) -> Result<(), Error> {
        self.transport.write(&[SYSTEM_RESET])
    }

    /// Starts a conversation with the board: firmware version, pin capabilities and analog mapping.
    fn handshake(&mut self) -> Result<(), Error> {
        // Some boards do not restart when the port opens: reporting left on by a previous
        // session would keep flowing otherwise.
        self.software_reset()?;

        // The firmware is supposed to announce itself on reset but does not always do so:
        // querying puts us in sync without waiting for a read timeout.
        self.query_firmware()?;
        while self.read_and_decode()? != Message::ReportFirmwareVersion {}

        self.query_capabilities()?;
        while self.read_and_decode()? != Message::CapabilityResponse {}
        self.query_analog_mapping()?;
        while self.read_and_decode()? != Message::AnalogMappingResponse {}

        trace!("Handshake done: {:#?}", self.data.read().pins);
        Ok(())
    }

    /// Query the board for current firmware and protocol information.
    fn query_firmware(&mut self) -> Result<(), Error> {
        self.transport.write(&[START_SYSEX, REPORT_FIRMWARE, END_SYSEX])
    }

    /// Query the board for all available capabilities.
    fn query_capabilities(&mut self) -> Result<(), Error> {
        self.transport
            .write(&[START_SYSEX, CAPABILITY_QUERY, END_SYSEX])
    }

    /// Query the board for available analog pins.
    fn query_analog_mapping(&mut self) -> Result<(), Error> {
        self.transport
            .write(&[START_SYSEX, ANALOG_MAPPING_QUERY, END_SYSEX])
    }

    // ########################################
    // Firmata read & handle functions

    /// Decodes one message if a full one is waiting: used by the polling task so it never
    /// blocks on an idle line.
    fn poll(&mut self) -> Result<Message, Error> {
        match self.transport.available()? {
            0..=2 => Ok(Message::EmptyResponse),
            _ => self.read_and_decode(),
        }
    }

    /// Read from the protocol, parse and return its type.
    /// The following method should use Firmata protocol such as defined here:
    /// <https://github.com/firmata/protocol/blob/master/protocol.md>
    fn read_and_decode(&mut self) -> Result<Message, Error> {
        let mut buf = vec![0; 1];
        self.transport.read_exact(&mut buf)?;

        match buf[0] {
            START_SYSEX => return self.handle_sysex_message(&mut buf),
            REPORT_PROTOCOL_VERSION
            | ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND
            | DIGITAL_MESSAGE..=DIGITAL_MESSAGE_BOUND => {
                buf.resize(3, 0);
                self.transport.read_exact(&mut buf[1..])?;
            }
            _ => {
                trace!("Unexpected data: {}", format_as_hex(&buf));
                return Ok(Message::EmptyResponse);
            }
        }

        match buf[0] {
            REPORT_PROTOCOL_VERSION => self.handle_protocol_version(&buf),
            ANALOG_MESSAGE..=ANALOG_MESSAGE_BOUND => self.handle_analog_message(&buf),
            _ => self.handle_digital_message(&buf),
        }
    }

    /// Handle a REPORT_VERSION_RESPONSE message (0xF9 - return the firmware version).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#message-types>
    fn handle_protocol_version(&mut self, buf: &[u8]) -> Result<Message, Error> {
        let mut lock = self.data.write();
        lock.protocol_version = format!("{}.{}", buf[1], buf[2]);
        trace!("Received protocol version: {}", lock.protocol_version);
        Ok(Message::ReportProtocolVersion)
    }

    /// Handle an ANALOG_MESSAGE message (0xE0 - report state of an analog channel)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    fn handle_analog_message(&mut self, buf: &[u8]) -> Result<Message, Error> {
        let channel = buf[0] & 0x0F;
        let value = (buf[1] as u16) | ((buf[2] as u16) << 7);
        trace!("Received analog message: channel({})={}", channel, value);

        {
            let mut lock = self.data.write();
            let pin = lock.get_pin_by_channel(channel)?.id;
            lock.get_pin_mut(pin)?.value = value;
        }

        let callbacks = self
            .reporting
            .lock()
            .analog
            .get(&channel)
            .cloned()
            .unwrap_or_default();
        for callback in callbacks {
            callback(value);
        }
        Ok(Message::Analog)
    }

    /// Handle a DIGITAL_MESSAGE message (0x90 - report state of a digital pin/port)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#data-message-expansion>
    fn handle_digital_message(&mut self, buf: &[u8]) -> Result<Message, Error> {
        let port = buf[0] & 0x0F;
        let value = (buf[1] as u16) | ((buf[2] as u16) << 7);
        trace!("Received digital message: port({})={}", port, value);

        let mut reported: Vec<(u8, u16)> = vec![];
        {
            let mut lock = self.data.write();
            for i in 0..8 {
                let id = (8 * port) + i;
                if let Some(pin) = lock.pins.get_mut(&id) {
                    if pin.is_in_mode(PinModeId::INPUT) || pin.is_in_mode(PinModeId::PULLUP) {
                        pin.value = (value >> i) & 0x01;
                        reported.push((id, pin.value));
                    }
                }
            }
        }

        let lock = self.reporting.lock();
        let calls: Vec<(ReadCallback, u16)> = reported
            .into_iter()
            .flat_map(|(id, value)| {
                lock.digital
                    .get(&id)
                    .into_iter()
                    .flatten()
                    .map(move |callback| (callback.clone(), value))
            })
            .collect();
        drop(lock);
        for (callback, value) in calls {
            callback(value);
        }
        Ok(Message::Digital)
    }

    /// Handle a START_SYSEX message: dispatch to various message/command/response using the sysex format.
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#sysex-message-format>
    fn handle_sysex_message(&mut self, buf: &mut Vec<u8>) -> Result<Message, Error> {
        loop {
            // Read until END_SYSEX.
            let mut byte = [0];
            self.transport.read_exact(&mut byte)?;
            buf.push(byte[0]);
            if byte[0] == END_SYSEX {
                break;
            }
        }
        if buf.len() < 3 {
            return Ok(Message::EmptyResponse);
        }
        match buf[1] {
            ANALOG_MAPPING_RESPONSE => self.handle_analog_mapping_response(buf),
            CAPABILITY_RESPONSE => self.handle_capability_response(buf),
            REPORT_FIRMWARE => self.handle_firmware_report(buf),
            _ => {
                trace!("Sysex: unexpected data: {}", format_as_hex(buf));
                Ok(Message::EmptyResponse)
            }
        }
    }

    /// Handle an ANALOG_MAPPING_RESPONSE message (0x6A - reply with analog pins mapping info).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#analog-mapping-query>
    fn handle_analog_mapping_response(&mut self, buf: &[u8]) -> Result<Message, Error> {
        let mut lock = self.data.write();
        let mut i = 2;
        while buf[i] != END_SYSEX {
            if buf[i] != SYSEX_REALTIME {
                let pin = lock.get_pin_mut((i - 2) as u8)?;
                if let Some(mode) = pin.supports_mode(PinModeId::ANALOG) {
                    pin.mode = Some(mode);
                }
                pin.name = format!("A{}", buf[i]);
                pin.channel = Some(buf[i]);
            }
            i += 1;
        }
        Ok(Message::AnalogMappingResponse)
    }

    /// Handle a CAPABILITY_RESPONSE message (0x6C - reply with supported modes and resolution)
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#capability-query>
    fn handle_capability_response(&mut self, buf: &[u8]) -> Result<Message, Error> {
        let mut id = 0;
        let mut i = 2;
        let mut lock = self.data.write();
        lock.pins = HashMap::new();

        while buf[i] != END_SYSEX {
            let mut supported_modes: Vec<PinMode> = vec![];

            while buf[i] != SYSEX_REALTIME {
                if i + 1 >= buf.len() {
                    return Err(Error::from(ProtocolError::MessageTooShort {
                        operation: "handle_capability_response",
                        expected: i + 2,
                        received: buf.len(),
                    }));
                }
                supported_modes.push(PinMode {
                    id: PinModeId::from_u8(buf[i])?,
                    resolution: buf[i + 1],
                });
                i += 2;
            }

            let pin = Pin {
                id,
                name: format!("D{}", id),
                supported_modes,
                ..Default::default()
            };
            lock.pins.insert(pin.id, pin);

            i += 1;
            id += 1;
        }

        debug!("Received capabilities for {} pins", lock.pins.len());
        Ok(Message::CapabilityResponse)
    }

    /// Handle a REPORT_FIRMWARE message (0x79 - report name and version of the firmware).
    /// <https://github.com/firmata/protocol/blob/master/protocol.md#query-firmware-name-and-version>
    fn handle_firmware_report(&mut self, buf: &[u8]) -> Result<Message, Error> {
        if buf.len() < 5 {
            return Err(Error::from(ProtocolError::MessageTooShort {
                operation: "handle_firmware_report",
                expected: 5,
                received: buf.len(),
            }));
        }
        let major = buf[2];
        let minor = buf[3];
        let mut lock = self.data.write();
        lock.firmware_version = format!("{}.{}", major, minor);
        if buf.len() > 5 {
            lock.firmware_name = std::str::from_utf8(&buf[4..buf.len() - 1])?
                .to_string()
                .replace('\0', "");
        }
        trace!(
            "Received firmware: {} {}",
            lock.firmware_name,
            lock.firmware_version
        );
        Ok(Message::ReportFirmwareVersion)
    }

    /// Starts the task decoding the reports the board sends: required for read callbacks to fire.
    /// Does nothing if the task already runs.
    fn start_polling(&self) -> Result<(), Error> {
        let mut handler = self.handler.write();
        if handler.is_none() {
            let mut self_clone = self.clone();
            *handler = Some(task::run(async move {
                while self_clone.transport.is_open() {
                    if let Err(err) = self_clone.poll() {
                        trace!("Polling error: {}", err);
                    }
                    pause!(1);
                }
                trace!("Polling stopped: transport closed");
                Ok(())
            })?);
        }
        Ok(())
    }

    /// Stops the task decoding the board reports.
    fn stop_polling(&self) {
        if let Some(handler) = self.handler.write().take() {
            handler.abort();
        }
    }
}

impl Display for FirmataIo {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let data = self.data.read();
        write!(
            f,
            "{} [firmware={}, version={}, protocol={}, transport={}]",
            self.get_protocol_name(),
            data.firmware_name,
            data.firmware_version,
            data.protocol_version,
            self.transport
        )
    }
}

#[cfg(test)]
mod tests {
    use crate::io::firmata::constants::Message;
    use crate::io::{FirmataIo, IoProtocol, IoTransport, PinModeId};
    use crate::mocks::{create_test_handshake, create_test_io_data, MockTransportLayer};
    use crate::pause;
    use crate::utils::Range;
    use parking_lot::RwLock;
    use serial_test::serial;
    use std::sync::atomic::{AtomicU16, Ordering};
    use std::sync::Arc;

    fn _create_mock_protocol() -> (FirmataIo, MockTransportLayer) {
        let transport = MockTransportLayer::opened();
        let mut protocol = FirmataIo::from(transport.clone());
        protocol.data = Arc::new(RwLock::new(create_test_io_data()));
        (protocol, transport)
    }

    #[test]
    fn test_software_reset() {
        let (mut protocol, transport) = _create_mock_protocol();
        assert!(protocol.software_reset().is_ok());
        assert_eq!(transport.written(), vec![vec![0xFF]]);
    }

    #[test]
    fn test_handshake() {
        let transport = MockTransportLayer::opened();
        transport.push_incoming(&create_test_handshake());
        let mut protocol = FirmataIo::from(transport.clone());

        let result = protocol.open();
        assert!(result.is_ok(), "{:?}", result);
        assert!(protocol.is_connected());
        assert_eq!(
            transport.written(),
            vec![
                vec![0xFF],             // software reset
                vec![0xF0, 0x79, 0xF7], // query firmware
                vec![0xF0, 0x6B, 0xF7], // query capabilities
                vec![0xF0, 0x69, 0xF7], // query analog mapping
            ],
            "Sending sequence is correct"
        );

        let data = protocol.get_io().read();
        assert_eq!(data.firmware_version, "2.5");
        assert_eq!(data.pins.len(), 20);
        let pin = data.get_pin(5).unwrap();
        assert_eq!(pin.name, "D5");
        assert!(pin.mode.is_none(), "Digital pins have no mode after handshake");
        assert!(pin.supports_mode(PinModeId::PWM).is_some());
        let pin = data.get_pin(17).unwrap();
        assert_eq!(pin.name, "A3");
        assert_eq!(pin.channel, Some(3));
        assert!(pin.is_in_mode(PinModeId::ANALOG));
        assert!(data.get_pin(0).unwrap().supported_modes.is_empty());
    }

    #[test]
    fn test_handshake_without_answer() {
        let transport = MockTransportLayer::opened();
        let mut protocol = FirmataIo::from(transport);
        assert!(protocol.open().is_err());
        assert!(!protocol.is_connected());
    }

    #[test]
    fn test_set_pin_mode() {
        let (mut protocol, transport) = _create_mock_protocol();

        let result = protocol.set_pin_mode(8, PinModeId::OUTPUT);
        assert!(result.is_ok(), "{:?}", result);
        assert_eq!(transport.written(), vec![vec![0xF4, 0x08, 0x01]]);
        assert!(protocol
            .get_io()
            .read()
            .get_pin(8)
            .unwrap()
            .is_in_mode(PinModeId::OUTPUT));

        let result = protocol.set_pin_mode(8, PinModeId::ANALOG);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Pin (8) not compatible with mode (ANALOG) - try to set pin mode."
        );
        assert_eq!(transport.written().len(), 1, "Nothing sent on error");
    }

    #[test]
    fn test_digital_write() {
        let (mut protocol, transport) = _create_mock_protocol();

        let result = protocol.digital_write(5, true);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Pin (5) not compatible with mode (OUTPUT) - digital_write."
        );

        protocol.set_pin_mode(5, PinModeId::OUTPUT).unwrap();
        protocol.set_pin_mode(7, PinModeId::OUTPUT).unwrap();
        transport.clear_written();

        assert!(protocol.digital_write(5, true).is_ok());
        assert!(protocol.digital_write(7, true).is_ok());
        assert!(protocol.digital_write(5, false).is_ok());
        assert_eq!(
            transport.written(),
            vec![
                vec![0x90, 0x20, 0x00],
                vec![0x90, 0x20, 0x01],
                vec![0x90, 0x00, 0x01],
            ]
        );
        assert_eq!(protocol.get_io().read().get_pin(7).unwrap().value, 1);

        let result = protocol.digital_write(66, true);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Unknown pin 66."
        );
    }

    #[test]
    fn test_analog_write() {
        let (mut protocol, transport) = _create_mock_protocol();

        assert!(protocol.analog_write(3, 170).is_ok());
        // Pin over 15 and value over 16384: extended multibyte message.
        assert!(protocol.analog_write(17, 17000).is_ok());
        // 16384 is the first value needing the third byte.
        assert!(protocol.analog_write(17, 16384).is_ok());
        assert!(protocol.analog_write(17, 16383).is_ok());
        assert_eq!(
            transport.written(),
            vec![
                vec![0xE3, 0x2A, 0x01],
                vec![0xF0, 0x6F, 0x11, 0x68, 0x04, 0x01, 0xF7],
                vec![0xF0, 0x6F, 0x11, 0x00, 0x00, 0x01, 0xF7],
                vec![0xF0, 0x6F, 0x11, 0x7F, 0x7F, 0xF7],
            ]
        );
        assert_eq!(protocol.get_io().read().get_pin(3).unwrap().value, 170);

        let result = protocol.analog_write(42, 0);
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Unknown pin 42."
        );
    }

    #[test]
    fn test_servo_write_and_config() {
        let (mut protocol, transport) = _create_mock_protocol();

        assert!(protocol.servo_config(8, Range::from([500, 2500])).is_ok());
        assert!(protocol.servo_write(8, 90).is_ok());
        assert_eq!(
            transport.written(),
            vec![
                vec![0xF0, 0x70, 0x08, 0x74, 0x03, 0x44, 0x13, 0xF7],
                vec![0xE8, 0x5A, 0x00],
            ]
        );
    }

    #[test]
    fn test_sampling_interval() {
        let (mut protocol, transport) = _create_mock_protocol();
        assert!(protocol.sampling_interval(100).is_ok());
        assert_eq!(
            transport.written(),
            vec![vec![0xF0, 0x7A, 0x64, 0x00, 0xF7]]
        );
    }

    #[test]
    fn test_handle_protocol_version() {
        let (mut protocol, transport) = _create_mock_protocol();
        transport.push_incoming(&[0xF9, 0x02, 0x05]);
        assert_eq!(
            protocol.read_and_decode().unwrap(),
            Message::ReportProtocolVersion
        );
        assert_eq!(protocol.get_io().read().protocol_version, "2.5");
    }

    #[test]
    fn test_handle_firmware_report() {
        let (mut protocol, transport) = _create_mock_protocol();
        transport.push_incoming(&[0xF0, 0x79, 0x02, 0x05, b'F', 0x00, b'W', 0x00, 0xF7]);
        assert_eq!(
            protocol.read_and_decode().unwrap(),
            Message::ReportFirmwareVersion
        );
        let data = protocol.get_io().read();
        assert_eq!(data.firmware_version, "2.5");
        assert_eq!(data.firmware_name, "FW");
    }

    #[test]
    fn test_unexpected_data() {
        let (mut protocol, transport) = _create_mock_protocol();
        transport.push_incoming(&[0x01, 0xF0, 0x42, 0x01, 0xF7, 0xF9, 0x02, 0x05]);
        // Stray byte, then unknown sysex: both skipped without losing the next message.
        assert_eq!(protocol.read_and_decode().unwrap(), Message::EmptyResponse);
        assert_eq!(protocol.read_and_decode().unwrap(), Message::EmptyResponse);
        assert_eq!(
            protocol.read_and_decode().unwrap(),
            Message::ReportProtocolVersion
        );
    }

    #[test]
    fn test_empty_sysex_keeps_next_message() {
        let (mut protocol, transport) = _create_mock_protocol();
        transport.push_incoming(&[0xF0, 0xF7, 0xE3, 0x00, 0x04]);
        assert_eq!(protocol.read_and_decode().unwrap(), Message::EmptyResponse);
        assert_eq!(protocol.read_and_decode().unwrap(), Message::Analog);
        assert_eq!(protocol.get_io().read().get_pin(17).unwrap().value, 512);
    }

    #[tokio::test]
    #[serial]
    async fn test_analog_read_dispatches_reports() {
        let (mut protocol, transport) = _create_mock_protocol();
        let received = Arc::new(AtomicU16::new(0));
        let captured = received.clone();

        let result = protocol.analog_read(
            3,
            Arc::new(move |value| captured.store(value, Ordering::SeqCst)),
        );
        assert!(result.is_ok(), "{:?}", result);
        // Reporting is enabled once per channel.
        let _ = protocol.analog_read(3, Arc::new(|_| {}));
        assert_eq!(transport.written(), vec![vec![0xC3, 0x01]]);
        assert!(protocol.handler.read().is_some(), "Polling task started");

        // 512 = 0x200 => LSB 0x00, MSB 0x04
        transport.push_incoming(&[0xE3, 0x00, 0x04]);
        pause!(50);
        assert_eq!(received.load(Ordering::SeqCst), 512);
        assert_eq!(protocol.get_io().read().get_pin(17).unwrap().value, 512);

        let result = protocol.analog_read(9, Arc::new(|_| {}));
        assert_eq!(
            result.err().unwrap().to_string(),
            "Hardware error: Unknown analog channel 9."
        );

        assert!(protocol.close().is_ok());
        assert!(protocol.handler.read().is_none(), "Polling task stopped");
    }

    #[tokio::test]
    #[serial]
    async fn test_digital_read_dispatches_reports() {
        let (mut protocol, transport) = _create_mock_protocol();
        protocol.set_pin_mode(10, PinModeId::INPUT).unwrap();
        protocol.set_pin_mode(12, PinModeId::INPUT).unwrap();
        transport.clear_written();

        let received = Arc::new(AtomicU16::new(42));
        let captured = received.clone();
        let result = protocol.digital_read(
            10,
            Arc::new(move |value| captured.store(value, Ordering::SeqCst)),
        );
        assert!(result.is_ok(), "{:?}", result);
        // Same port (pins 8-15): no second report request.
        let _ = protocol.digital_read(12, Arc::new(|_| {}));
        assert_eq!(transport.written(), vec![vec![0xD1, 0x01]]);

        // Port 1, bit 2 (pin 10) high.
        transport.push_incoming(&[0x91, 0x04, 0x00]);
        pause!(50);
        assert_eq!(received.load(Ordering::SeqCst), 1);
        assert_eq!(protocol.get_io().read().get_pin(10).unwrap().value, 1);
        assert_eq!(protocol.get_io().read().get_pin(12).unwrap().value, 0);

        assert!(protocol.close().is_ok());
    }

    #[test]
    fn test_close() {
        let (mut protocol, transport) = _create_mock_protocol();
        protocol.data.write().connected = true;
        assert!(protocol.is_connected());
        assert!(protocol.close().is_ok());
        assert!(!protocol.is_connected());
        assert!(!transport.is_open());
    }

    #[test]
    fn test_display() {
        let (protocol, _) = _create_mock_protocol();
        protocol.data.write().firmware_name = String::from("Fake protocol");
        assert_eq!(
            format!("{}", protocol),
            "FirmataIo [firmware=Fake protocol, version=2.5, protocol=2.5, transport=MockTransportLayer]"
        );
    }
}
