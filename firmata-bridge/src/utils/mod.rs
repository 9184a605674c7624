//! Shared helpers: the notification event manager, the task runner and value ranges.

pub mod events;
mod range;
pub mod task;

pub use events::{EventHandler, EventManager};
pub use range::Range;
pub use task::TaskHandler;

/// Formats a byte payload as a hex string: used to trace wire payloads and in test assertions.
pub fn format_as_hex(buf: &[u8]) -> String {
    buf.iter()
        .map(|byte| format!("{:02X}", byte))
        .collect::<Vec<String>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_as_hex() {
        assert_eq!(format_as_hex(&[0xF0, 0x79, 0x0A, 0xF7]), "F0 79 0A F7");
        assert_eq!(format_as_hex(&[]), "");
    }
}
