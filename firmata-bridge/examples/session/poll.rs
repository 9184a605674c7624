//! This example shows how to read values: reads never block, the caller polls until the value
//! is resolved (the way a UI refreshing every tick would).
//!
//! It prints the pins menus, then the value of the analog channel A0 and of the digital pin 2
//! every 200ms.
//!
//! # Notes
//! - The first read of a pin requests the value from the board and returns `Reading::Pending`.
//! - Once resolved, the reading follows the values the board reports.
//! - A disconnection (or new connection) forgets all readings.

use firmata_bridge::controller::{Controller, ControllerEvent, MenuKind, Notification, Reading};
use firmata_bridge::pause;

#[tokio::main]
async fn main() {
    let controller = Controller::default();
    controller.on(ControllerEvent::OnFailed, |notification: Notification| async move {
        println!("{}", notification.message);
        Ok(())
    });
    controller.connect();

    while !controller.is_ready() {
        if controller.connection_id().is_none() {
            // The attempt failed.
            return;
        }
        pause!(100);
    }

    for kind in [
        MenuKind::DigitalOutputs,
        MenuKind::AnalogOutputs,
        MenuKind::ServoOutputs,
        MenuKind::AnalogInputs,
        MenuKind::DigitalInputs,
    ] {
        let labels: Vec<String> = controller
            .menu(kind)
            .into_iter()
            .map(|(label, _)| label)
            .collect();
        println!("{:?}: {}", kind, labels.join(", "));
    }

    for _ in 0..50 {
        match (controller.analog_read(0), controller.digital_read(2)) {
            (Reading::Resolved(a0), Reading::Resolved(d2)) => println!("A0={} D2={}", a0, d2),
            (a0, d2) => println!("Waiting: A0={:?} D2={:?}", a0, d2),
        }
        pause!(200);
    }

    controller.disconnect(true);
}
