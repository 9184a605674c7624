//! This example shows a whole controller session: connect, blink the embedded led, disconnect.
//!
//! # Notes
//! - The [`Controller.on`] method registers the notification handlers.
//! - The [`ControllerEvent`] enum lists all events a controller may emit.
//! - `connect()` returns right away: the board is usable once the controller `is_ready()`.
//! - Pin 13 is switched to OUTPUT by the first `digital_write`: no explicit mode setting needed.
//! - Pass the port name as first argument to skip the auto-detection (ie `/dev/ttyACM0`, `COM4`).

use firmata_bridge::controller::{Controller, ControllerEvent, Notification};
use firmata_bridge::io::SerialPortProvider;
use firmata_bridge::pause;

#[tokio::main]
async fn main() {
    let controller = match std::env::args().nth(1) {
        Some(port) => Controller::new(SerialPortProvider::new(port)),
        None => Controller::default(),
    };

    for event in [
        ControllerEvent::OnConnecting,
        ControllerEvent::OnConnected,
        ControllerEvent::OnDisconnected,
        ControllerEvent::OnFailed,
    ] {
        controller.on(event, |notification: Notification| async move {
            println!("[{}] {}", String::from(notification.event), notification.message);
            Ok(())
        });
    }

    controller.connect();
    for _ in 0..100 {
        if controller.is_ready() {
            break;
        }
        pause!(100);
    }
    if !controller.is_ready() {
        return;
    }

    for i in 0..20 {
        controller.digital_write(13, i % 2 == 0);
        pause!(500);
    }

    controller.disconnect(false);
    // Leaves time for the last notification to print.
    pause!(100);
}
