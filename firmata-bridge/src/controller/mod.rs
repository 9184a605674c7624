//! Defines the controller: the connection lifecycle of a single board and the pin I/O on top of it.

mod cache;
mod config;
mod menu;

use std::fmt::{Display, Formatter};
use std::sync::{Arc, Weak};

use log::{debug, error, trace, warn};
use parking_lot::RwLock;

pub use cache::{Reading, ReadingCache};
pub use config::ControllerConfig;
pub use menu::{format_menu, Menu, MenuKind};

use crate::errors::{ConnectionError, Error, HardwareError, UnknownError};
use crate::io::{
    FirmataIo, IoProtocol, IoTransport, PinModeId, PortProvider, ReadCallback, SerialPortProvider,
};
use crate::utils::{task, EventHandler, EventManager};

/// Pseudo channel the board uses for pins without analog capability.
const NO_CHANNEL: u8 = 0x7F;

/// Lists all events a Controller can emit.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerEvent {
    /// Triggered when a connection attempt starts.
    OnConnecting,
    /// Triggered when the board answered the handshake and accepts pin operations.
    OnConnected,
    /// Triggered when the connection is closed (not emitted by quiet disconnections).
    OnDisconnected,
    /// Triggered when a connection attempt fails or times out.
    OnFailed,
}

/// Convert events to string to facilitate usage with [`EventManager`].
impl From<ControllerEvent> for String {
    fn from(value: ControllerEvent) -> Self {
        let event = match value {
            ControllerEvent::OnConnecting => "connecting",
            ControllerEvent::OnConnected => "connected",
            ControllerEvent::OnDisconnected => "disconnected",
            ControllerEvent::OnFailed => "failed",
        };
        event.into()
    }
}

/// The payload of every [`ControllerEvent`]: a message meant for the user.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Notification {
    pub event: ControllerEvent,
    pub message: String,
}

/// The lifecycle of the connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    /// A port was requested: waiting for it to open.
    Connecting,
    /// The port is opened: waiting for the board handshake.
    Open,
    /// The board accepts pin operations.
    Ready,
}

/// Identifies a connection attempt: every `connect()` gets a new one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl Display for ConnectionId {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Inner {
    state: ConnectionState,
    last_id: u64,
    /// The live connection (or connection attempt).
    current: Option<ConnectionId>,
    port: Option<Box<dyn IoTransport>>,
    board: Option<Box<dyn IoProtocol>>,
    /// Keyed by analog channel.
    analog: ReadingCache<u16>,
    /// Keyed by pin.
    digital: ReadingCache<bool>,
}

impl Inner {
    fn is_current(&self, id: ConnectionId) -> bool {
        self.current == Some(id)
    }

    fn clear_readings(&mut self) {
        self.analog.clear();
        self.digital.clear();
    }
}

/// Drives one board: connects to it through a [`PortProvider`] and exposes pin-level I/O.
///
/// Every operation is fail-soft: nothing is returned to the caller on failure, the issue is
/// logged instead. Pin operations are no-ops until the connection is [`ConnectionState::Ready`].
///
/// Clones share the same connection.
///
/// # Example
/// ```no_run
/// use firmata_bridge::controller::{Controller, ControllerEvent, Notification};
///
/// #[tokio::main]
/// async fn main() {
///     let controller = Controller::default();
///     controller.on(ControllerEvent::OnConnected, |notification: Notification| async move {
///         println!("{}", notification.message);
///         Ok(())
///     });
///     controller.connect();
/// }
/// ```
#[derive(Clone, Debug)]
pub struct Controller {
    provider: Box<dyn PortProvider>,
    config: ControllerConfig,
    events: EventManager,
    inner: Arc<RwLock<Inner>>,
}

impl Default for Controller {
    /// Creates a controller connecting to the first serial port the system lists.
    fn default() -> Self {
        Self::new(SerialPortProvider::default())
    }
}

impl Controller {
    /// Creates a controller requesting its ports from the given provider (default configuration).
    pub fn new<P: PortProvider + 'static>(provider: P) -> Self {
        Self::with_config(provider, ControllerConfig::default())
    }

    /// Creates a controller requesting its ports from the given provider.
    pub fn with_config<P: PortProvider + 'static>(provider: P, config: ControllerConfig) -> Self {
        Self {
            provider: Box::new(provider),
            config,
            events: EventManager::default(),
            inner: Arc::new(RwLock::new(Inner::default())),
        }
    }

    pub fn get_config(&self) -> &ControllerConfig {
        &self.config
    }

    /// Returns the connection state.
    pub fn state(&self) -> ConnectionState {
        self.inner.read().state
    }

    /// Returns the identifier of the live connection (or connection attempt).
    pub fn connection_id(&self) -> Option<ConnectionId> {
        self.inner.read().current
    }

    /// Checks whether the board accepts pin operations.
    pub fn is_ready(&self) -> bool {
        self.state() == ConnectionState::Ready
    }

    /// Registers a callback to be executed on a given event.
    ///
    /// Available events are defined by the enum: [`ControllerEvent`]. All of them carry a
    /// [`Notification`]:
    /// - **`OnConnecting` | `connecting`:** a connection attempt starts.
    /// - **`OnConnected` | `connected`:** the board is ready.
    /// - **`OnDisconnected` | `disconnected`:** the connection was closed.
    /// - **`OnFailed` | `failed`:** the connection attempt failed (the message tells why).
    pub fn on<S, F, T, Fut>(&self, event: S, callback: F) -> EventHandler
    where
        S: Into<String>,
        T: 'static + Send + Sync + Clone,
        F: FnMut(T) -> Fut + Send + 'static,
        Fut: std::future::Future<Output = Result<(), Error>> + Send + 'static,
    {
        self.events.on(event, callback)
    }

    /// Unregisters a callback previously registered with [`Controller::on`].
    pub fn unregister(&self, handler: EventHandler) {
        self.events.unregister(handler)
    }

    fn notify<M: Into<String>>(&self, event: ControllerEvent, message: M) {
        let notification = Notification {
            event,
            message: message.into(),
        };
        self.events.emit(event, notification);
    }

    // ########################################
    // Connection manager

    /// Starts a connection attempt and returns right away: the outcome is notified through
    /// [`ControllerEvent::OnConnected`] or [`ControllerEvent::OnFailed`].
    ///
    /// A live connection is closed quietly first. The attempt (port request, opening and
    /// handshake) is bounded by the configured `ready_timeout`.
    ///
    /// # Notes
    /// Must be called within a tokio runtime: otherwise the attempt fails right away.
    pub fn connect(&self) {
        if self.connection_id().is_some() {
            self.disconnect(true);
        }

        let id = {
            let mut inner = self.inner.write();
            inner.last_id += 1;
            let id = ConnectionId(inner.last_id);
            inner.current = Some(id);
            inner.state = ConnectionState::Connecting;
            id
        };
        trace!("Connection {}: connecting", id);
        self.notify(ControllerEvent::OnConnecting, "Trying to connect...");

        let controller = self.clone();
        let timeout = self.config.get_ready_timeout();
        let spawned = task::run(async move {
            match tokio::time::timeout(timeout, controller.establish(id)).await {
                Ok(Ok(())) => {}
                Ok(Err(err)) => controller.abandon(id, err),
                Err(_) => controller.abandon(
                    id,
                    ConnectionError::HandshakeTimeout {
                        timeout_ms: timeout.as_millis(),
                    }
                    .into(),
                ),
            }
        });
        if let Err(err) = spawned {
            self.abandon(id, err);
        }
    }

    /// Requests and opens the port, then performs the handshake.
    /// Each step checks the attempt is still the live one before committing its outcome.
    async fn establish(&self, id: ConnectionId) -> Result<(), Error> {
        let provider = self.provider.clone();
        let baud_rate = self.config.get_baud_rate();
        let mut port = tokio::task::spawn_blocking(move || {
            let mut port = provider.request_port(baud_rate)?;
            port.open()?;
            Ok::<_, Error>(port)
        })
        .await
        .map_err(|err| UnknownError {
            info: err.to_string(),
        })??;

        {
            let mut inner = self.inner.write();
            if !inner.is_current(id) {
                drop(inner);
                port.close()?;
                return Err(ConnectionError::Aborted.into());
            }
            inner.state = ConnectionState::Open;
            inner.clear_readings();
            inner.port = Some(port.clone());
        }
        trace!("Connection {}: port opened {}", id, port);

        let poll_timeout = self.config.get_poll_timeout();
        let mut board: Box<dyn IoProtocol> =
            Box::new(FirmataIo::with_transport(port).with_poll_timeout(poll_timeout));
        let mut board = tokio::task::spawn_blocking(move || {
            board.open()?;
            Ok::<_, Error>(board)
        })
        .await
        .map_err(|err| UnknownError {
            info: err.to_string(),
        })??;

        {
            let mut inner = self.inner.write();
            if !inner.is_current(id) {
                drop(inner);
                board.close()?;
                return Err(ConnectionError::Aborted.into());
            }
            inner.state = ConnectionState::Ready;
            inner.board = Some(board.clone());
        }
        debug!("Connection {}: board ready {}", id, board);
        self.notify(
            ControllerEvent::OnConnected,
            "Connection successful.\nHappy prototyping!",
        );
        Ok(())
    }

    /// Gives up a connection attempt: the port is released and the failure notified.
    /// Does nothing if the attempt no longer is the live one.
    fn abandon(&self, id: ConnectionId, err: Error) {
        let port = {
            let mut inner = self.inner.write();
            if !inner.is_current(id) {
                trace!("Connection {}: stale attempt dropped ({})", id, err);
                return;
            }
            inner.current = None;
            inner.state = ConnectionState::Disconnected;
            inner.clear_readings();
            inner.board = None;
            inner.port.take()
        };
        if let Some(mut port) = port {
            if let Err(close_err) = port.close() {
                warn!("Connection {}: port not released: {}", id, close_err);
            }
        }
        error!("Connection {} failed: {}", id, err);
        self.notify(
            ControllerEvent::OnFailed,
            format!("Connection failed: {}", err),
        );
    }

    /// Closes the connection (if any) and forgets all readings.
    ///
    /// A pending connection attempt is cancelled. Emits [`ControllerEvent::OnDisconnected`]
    /// unless `quiet`.
    pub fn disconnect(&self, quiet: bool) {
        let (id, board, port) = {
            let mut inner = self.inner.write();
            inner.state = ConnectionState::Disconnected;
            inner.clear_readings();
            (inner.current.take(), inner.board.take(), inner.port.take())
        };

        let closed = match (board, port) {
            (Some(mut board), _) => board.close(),
            (None, Some(mut port)) => port.close(),
            (None, None) => Ok(()),
        };
        if let Err(err) = closed {
            warn!("Connection close failed: {}", err);
        }
        if let Some(id) = id {
            trace!("Connection {}: closed", id);
        }

        if !quiet {
            self.notify(ControllerEvent::OnDisconnected, "Connection closed.");
        }
    }

    // ########################################
    // Pin I/O

    /// Returns the board of the live connection, if ready.
    fn ready_board(&self) -> Option<(ConnectionId, Box<dyn IoProtocol>)> {
        let inner = self.inner.read();
        match (inner.state, inner.current, &inner.board) {
            (ConnectionState::Ready, Some(id), Some(board)) => Some((id, board.clone())),
            _ => None,
        }
    }

    /// Switches the pin to `mode` unless it already is in that mode.
    fn ensure_mode(board: &mut dyn IoProtocol, pin: u8, mode: PinModeId) -> Result<(), Error> {
        let in_mode = board.get_io().read().get_pin(pin)?.is_in_mode(mode);
        if !in_mode {
            trace!("Pin {} switched to {}", pin, mode);
            board.set_pin_mode(pin, mode)?;
        }
        Ok(())
    }

    /// Sets the digital `pin` high or low (switching it to OUTPUT if needed).
    pub fn digital_write(&self, pin: u8, value: bool) {
        let Some((_, mut board)) = self.ready_board() else {
            trace!("Digital write on pin {} ignored: board not ready", pin);
            return;
        };
        let result = Self::ensure_mode(board.as_mut(), pin, PinModeId::OUTPUT)
            .and_then(|_| board.digital_write(pin, value));
        if let Err(err) = result {
            warn!("Digital write on pin {} failed: {}", pin, err);
        }
    }

    /// Writes a PWM `value` to the `pin` (switching it to PWM if needed).
    ///
    /// Values outside the configured `pwm_range` are rejected.
    pub fn analog_write(&self, pin: u8, value: u16) {
        let Some((_, mut board)) = self.ready_board() else {
            trace!("Analog write on pin {} ignored: board not ready", pin);
            return;
        };
        let result = Self::check_range(pin, value, self.config.get_pwm_range())
            .and_then(|_| Self::ensure_mode(board.as_mut(), pin, PinModeId::PWM))
            .and_then(|_| board.analog_write(pin, value));
        if let Err(err) = result {
            warn!("Analog write on pin {} failed: {}", pin, err);
        }
    }

    /// Moves the servo on `pin` to `value` (switching it to SERVO if needed).
    ///
    /// Values outside the configured `servo_range` are rejected.
    pub fn servo_write(&self, pin: u8, value: u16) {
        let Some((_, mut board)) = self.ready_board() else {
            trace!("Servo write on pin {} ignored: board not ready", pin);
            return;
        };
        let result = Self::check_range(pin, value, self.config.get_servo_range())
            .and_then(|_| Self::ensure_mode(board.as_mut(), pin, PinModeId::SERVO))
            .and_then(|_| board.servo_write(pin, value));
        if let Err(err) = result {
            warn!("Servo write on pin {} failed: {}", pin, err);
        }
    }

    fn check_range(pin: u8, value: u16, range: crate::utils::Range<u16>) -> Result<(), Error> {
        match range.contains(&value) {
            true => Ok(()),
            false => Err(HardwareError::ValueOutOfRange { pin, value, range }.into()),
        }
    }

    /// Returns the last value reported for the digital `pin` (switching it to INPUT if needed).
    ///
    /// The first call requests the value from the board and returns [`Reading::Pending`]: poll
    /// until it resolves. Resolved values keep following the board reports.
    pub fn digital_read(&self, pin: u8) -> Reading<bool> {
        let Some((id, mut board)) = self.ready_board() else {
            return Reading::Absent;
        };
        if let Err(err) = Self::ensure_mode(board.as_mut(), pin, PinModeId::INPUT) {
            warn!("Digital read on pin {} failed: {}", pin, err);
            return self.inner.read().digital.get(pin);
        }

        let (reading, request) = {
            let mut inner = self.inner.write();
            if !inner.is_current(id) {
                return Reading::Absent;
            }
            let request = inner.digital.request(pin);
            (inner.digital.get(pin), request)
        };
        if request {
            debug!("Digital read on pin {}: pending", pin);
            let callback = Self::read_callback(Arc::downgrade(&self.inner), id, move |inner, value| {
                if inner.digital.resolve(pin, value == 1) {
                    trace!("Digital read on pin {}: {}", pin, value == 1);
                }
            });
            if let Err(err) = board.digital_read(pin, callback) {
                warn!("Digital read on pin {} failed: {}", pin, err);
                self.revert(id, |inner| inner.digital.revert(pin));
                return Reading::Absent;
            }
        }
        reading
    }

    /// Returns the last value reported for the analog `channel` (switching its pin to ANALOG if
    /// needed).
    ///
    /// The first call requests the value from the board and returns [`Reading::Pending`]: poll
    /// until it resolves. Resolved values keep following the board reports.
    pub fn analog_read(&self, channel: u8) -> Reading<u16> {
        let Some((id, mut board)) = self.ready_board() else {
            return Reading::Absent;
        };
        let pin = board
            .get_io()
            .read()
            .get_pin_by_channel(channel)
            .map(|pin| pin.id);
        if let Err(err) = pin.and_then(|pin| Self::ensure_mode(board.as_mut(), pin, PinModeId::ANALOG)) {
            warn!("Analog read on channel {} failed: {}", channel, err);
            return self.inner.read().analog.get(channel);
        }

        let (reading, request) = {
            let mut inner = self.inner.write();
            if !inner.is_current(id) {
                return Reading::Absent;
            }
            let request = inner.analog.request(channel);
            (inner.analog.get(channel), request)
        };
        if request {
            debug!("Analog read on channel {}: pending", channel);
            let callback = Self::read_callback(Arc::downgrade(&self.inner), id, move |inner, value| {
                if inner.analog.resolve(channel, value) {
                    trace!("Analog read on channel {}: {}", channel, value);
                }
            });
            if let Err(err) = board.analog_read(channel, callback) {
                warn!("Analog read on channel {} failed: {}", channel, err);
                self.revert(id, |inner| inner.analog.revert(channel));
                return Reading::Absent;
            }
        }
        reading
    }

    /// Wraps a cache update into a board callback: reports reaching a connection that is no
    /// longer the live one are dropped.
    fn read_callback<F>(inner: Weak<RwLock<Inner>>, id: ConnectionId, apply: F) -> ReadCallback
    where
        F: Fn(&mut Inner, u16) + Send + Sync + 'static,
    {
        Arc::new(move |value: u16| {
            let Some(inner) = inner.upgrade() else {
                return;
            };
            let mut inner = inner.write();
            match inner.is_current(id) {
                true => apply(&mut *inner, value),
                false => trace!("Connection {}: stale report dropped", id),
            }
        })
    }

    fn revert<F: FnOnce(&mut Inner)>(&self, id: ConnectionId, apply: F) {
        let mut inner = self.inner.write();
        if inner.is_current(id) {
            apply(&mut *inner);
        }
    }

    // ########################################
    // Capability queries

    /// Returns (ordered) the pins supporting the given `mode`: empty unless the board is ready.
    pub fn pins_that_support(&self, mode: PinModeId) -> Vec<u8> {
        let Some((_, board)) = self.ready_board() else {
            return vec![];
        };
        let io = board.get_io().read();
        io.sorted_pins()
            .into_iter()
            .filter(|pin| pin.supports_mode(mode).is_some())
            .map(|pin| pin.id)
            .collect()
    }

    /// Returns (ordered) the analog channels of the board: empty unless the board is ready.
    pub fn analog_input_channels(&self) -> Vec<u8> {
        let Some((_, board)) = self.ready_board() else {
            return vec![];
        };
        let io = board.get_io().read();
        let mut channels: Vec<u8> = io
            .pins
            .values()
            .filter_map(|pin| pin.channel)
            .filter(|channel| *channel < NO_CHANNEL)
            .collect();
        channels.sort_unstable();
        channels
    }

    /// Builds the menu of the given kind from the board capabilities.
    pub fn menu(&self, kind: MenuKind) -> Menu {
        let pins = match kind {
            MenuKind::DigitalOutputs => self.pins_that_support(PinModeId::OUTPUT),
            MenuKind::AnalogOutputs => self.pins_that_support(PinModeId::PWM),
            MenuKind::ServoOutputs => self.pins_that_support(PinModeId::SERVO),
            MenuKind::AnalogInputs => self.analog_input_channels(),
            MenuKind::DigitalInputs => self.pins_that_support(PinModeId::INPUT),
        };
        format_menu(&pins)
    }
}

impl Display for Controller {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.read();
        match &inner.board {
            Some(board) => write!(f, "Controller [{:?}] ({})", inner.state, board),
            None => write!(f, "Controller [{:?}]", inner.state),
        }
    }
}
