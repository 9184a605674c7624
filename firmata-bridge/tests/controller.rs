use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serial_test::serial;

use firmata_bridge::controller::{
    ConnectionState, Controller, ControllerConfig, ControllerEvent, MenuKind, Notification, Reading,
};
use firmata_bridge::io::PinModeId;
use firmata_bridge::mocks::{create_test_handshake, MockPortProvider, MockTransportLayer};
use firmata_bridge::pause;

async fn wait_until_ready(controller: &Controller) {
    for _ in 0..50 {
        if controller.is_ready() {
            return;
        }
        pause!(10);
    }
    panic!("The controller never got ready: {}", controller);
}

fn record(controller: &Controller, event: ControllerEvent) -> Arc<Mutex<Vec<String>>> {
    let messages = Arc::new(Mutex::new(vec![]));
    let captured = messages.clone();
    controller.on(event, move |notification: Notification| {
        let captured = captured.clone();
        async move {
            captured.lock().push(notification.message);
            Ok(())
        }
    });
    messages
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_session() {
    let transport = MockTransportLayer::default();
    transport.push_incoming(&create_test_handshake());
    let provider = MockPortProvider::new(transport.clone());
    let controller = Controller::with_config(
        provider.clone(),
        ControllerConfig::default().with_ready_timeout(Duration::from_secs(1)),
    );
    let connected = record(&controller, ControllerEvent::OnConnected);
    let disconnected = record(&controller, ControllerEvent::OnDisconnected);

    // Connect.
    controller.connect();
    wait_until_ready(&controller).await;
    transport.clear_written();

    // Capabilities.
    assert_eq!(
        controller.pins_that_support(PinModeId::PWM),
        vec![3, 5, 6, 9, 10, 11]
    );
    assert_eq!(controller.menu(MenuKind::AnalogInputs).get("3"), Some(3));

    // Writes: the mode is switched once.
    controller.digital_write(5, true);
    controller.digital_write(5, true);
    assert_eq!(
        transport.written(),
        vec![
            vec![0xF4, 0x05, 0x01],
            vec![0x90, 0x20, 0x00],
            vec![0x90, 0x20, 0x00],
        ]
    );
    transport.clear_written();

    // Reads: pending until the board reports, requested once.
    assert_eq!(controller.analog_read(3), Reading::Pending);
    assert_eq!(controller.analog_read(3), Reading::Pending);
    transport.push_incoming(&[0xE3, 0x00, 0x04]);
    pause!(50);
    assert_eq!(controller.analog_read(3), Reading::Resolved(512));
    assert_eq!(transport.written(), vec![vec![0xC3, 0x01]]);

    // Disconnect: readings are forgotten, operations are no-ops.
    controller.disconnect(false);
    assert_eq!(controller.state(), ConnectionState::Disconnected);
    assert_eq!(controller.analog_read(3), Reading::Absent);
    assert!(controller.pins_that_support(PinModeId::PWM).is_empty());

    pause!(50);
    assert_eq!(
        connected.lock().clone(),
        vec![String::from("Connection successful.\nHappy prototyping!")]
    );
    assert_eq!(
        disconnected.lock().clone(),
        vec![String::from("Connection closed.")]
    );
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_reconnect_forgets_readings() {
    let transport = MockTransportLayer::default();
    transport.push_incoming(&create_test_handshake());
    let controller = Controller::new(MockPortProvider::new(transport.clone()));
    let disconnected = record(&controller, ControllerEvent::OnDisconnected);

    controller.connect();
    wait_until_ready(&controller).await;
    let first = controller.connection_id();

    assert_eq!(controller.digital_read(10), Reading::Pending);
    transport.push_incoming(&[0x91, 0x04, 0x00]);
    pause!(50);
    assert_eq!(controller.digital_read(10), Reading::Resolved(true));

    // The board answers the second handshake once the previous session is closed.
    transport.set_wait_for_data(true);
    controller.connect();
    transport.push_incoming(&create_test_handshake());
    wait_until_ready(&controller).await;
    assert_ne!(controller.connection_id(), first);
    assert_eq!(transport.open_count(), 2);

    transport.clear_written();
    assert_eq!(controller.digital_read(10), Reading::Pending, "Readings were forgotten");
    assert_eq!(
        transport.written(),
        vec![vec![0xF4, 0x0A, 0x00], vec![0xD1, 0x01]],
        "The new board starts with unset modes"
    );

    controller.disconnect(true);
    pause!(50);
    assert!(disconnected.lock().is_empty(), "Quiet disconnections only");
}

#[tokio::test(flavor = "multi_thread")]
#[serial]
async fn test_failed_attempt_can_be_retried() {
    let transport = MockTransportLayer::default();
    let provider = MockPortProvider::new(transport.clone());
    provider.set_unavailable(true);
    let controller = Controller::new(provider.clone());
    let failed = record(&controller, ControllerEvent::OnFailed);

    controller.connect();
    pause!(100);
    assert_eq!(controller.state(), ConnectionState::Disconnected);
    assert_eq!(failed.lock().len(), 1);

    provider.set_unavailable(false);
    transport.push_incoming(&create_test_handshake());
    controller.connect();
    wait_until_ready(&controller).await;
    assert_eq!(provider.requests(), 2);
    controller.disconnect(true);
}
