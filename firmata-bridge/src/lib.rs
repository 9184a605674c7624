#![doc(html_root_url = "https://docs.rs/firmata-bridge/0.1.0")]

//! <h1 align="center">FIRMATA-BRIDGE - Pin-level control of a Firmata board</h1>
//! <div style="text-align:center;font-style:italic;">Connect to a microcontroller running Firmata and drive its pins from a host application.</div>
//!
//! # Features
//!
//! **Firmata-Bridge** manages a single connection to an Arduino (or compatible) board running
//! the [Firmata protocol](https://github.com/firmata/protocol) and exposes its pins to the host
//! application (typically a block-based programming UI):
//!
//! - Connect to / disconnect from a board through a [`Controller`](controller::Controller), with
//!   lifecycle notifications (connecting, connected, disconnected, failed).
//! - Write digital, PWM and servo values: the pin mode is switched on demand.
//! - Read digital and analog values without blocking: poll the read until it resolves.
//! - List the pins supporting a given mode, formatted as [`Menu`](controller::Menu)s.
//!
//! # Prerequisites
//!
//! - [StandardFirmataPlus.ino](https://github.com/firmata/arduino/blob/main/examples/StandardFirmataPlus/StandardFirmataPlus.ino) Arduino sketch **MUST** be installed on the board.
//!   _This code is available by default in Arduino IDE under the Firmata samples sketch menu._
//!
//! # Getting Started
//!
//! The following code blinks the Arduino embedded led on pin 13.
//! ```no_run
//! use firmata_bridge::controller::{Controller, ControllerEvent, Notification};
//! use firmata_bridge::pause;
//!
//! #[tokio::main]
//! async fn main() {
//!     // Connects to the first serial port available.
//!     let controller = Controller::default();
//!     controller.on(ControllerEvent::OnFailed, |notification: Notification| async move {
//!         println!("{}", notification.message);
//!         Ok(())
//!     });
//!     controller.connect();
//!
//!     while !controller.is_ready() {
//!         pause!(100);
//!     }
//!     for i in 0..10 {
//!         controller.digital_write(13, i % 2 == 0);
//!         pause!(500);
//!     }
//!     controller.disconnect(false);
//! }
//! ```
//!
//! # Feature flags
//!
//! - **libudev** -- (enabled by default) Activates `serialport` crate _libudev_ feature under-the-hood (required on Linux only for port listing).
//! - **serde** -- Enables serialize/deserialize capabilities for the configuration and pin descriptors.
//! - **mocks** -- Provides a mocked transport and port provider (useful for tests mostly).

pub mod controller;
pub mod errors;
pub mod io;
#[cfg(any(test, feature = "mocks"))]
pub mod mocks;
pub mod utils;
