use std::time::Duration;

use crate::io::DEFAULT_BAUD_RATE;
use crate::utils::Range;

/// Settings of a [`Controller`](crate::controller::Controller).
///
/// # Example
/// ```
/// use std::time::Duration;
/// use firmata_bridge::controller::ControllerConfig;
///
/// let config = ControllerConfig::default()
///     .with_ready_timeout(Duration::from_secs(5))
///     .with_servo_range([0, 90]);
/// assert_eq!(config.get_baud_rate(), 57600);
/// ```
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Clone, Debug, PartialEq)]
pub struct ControllerConfig {
    /// Baud rate the port opens at.
    baud_rate: u32,
    /// Bound on the whole connection attempt (port opening and handshake).
    ready_timeout: Duration,
    /// Read timeout of the port once the board is ready.
    poll_timeout: Duration,
    /// Accepted values for `analog_write`.
    pwm_range: Range<u16>,
    /// Accepted values for `servo_write`.
    servo_range: Range<u16>,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            ready_timeout: Duration::from_secs(10),
            poll_timeout: Duration::from_millis(50),
            pwm_range: Range::from([0, 255]),
            servo_range: Range::from([0, 180]),
        }
    }
}

impl ControllerConfig {
    // ########################################
    // Setters

    pub fn with_baud_rate(mut self, baud_rate: u32) -> Self {
        self.baud_rate = baud_rate;
        self
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    pub fn with_poll_timeout(mut self, poll_timeout: Duration) -> Self {
        self.poll_timeout = poll_timeout;
        self
    }

    /// Sets the accepted `analog_write` values: any value outside is rejected.
    pub fn with_pwm_range<R: Into<Range<u16>>>(mut self, pwm_range: R) -> Self {
        self.pwm_range = pwm_range.into();
        self
    }

    /// Sets the accepted `servo_write` values: any value outside is rejected.
    pub fn with_servo_range<R: Into<Range<u16>>>(mut self, servo_range: R) -> Self {
        self.servo_range = servo_range.into();
        self
    }

    // ########################################
    // Getters

    pub fn get_baud_rate(&self) -> u32 {
        self.baud_rate
    }

    pub fn get_ready_timeout(&self) -> Duration {
        self.ready_timeout
    }

    pub fn get_poll_timeout(&self) -> Duration {
        self.poll_timeout
    }

    pub fn get_pwm_range(&self) -> Range<u16> {
        self.pwm_range
    }

    pub fn get_servo_range(&self) -> Range<u16> {
        self.servo_range
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ControllerConfig::default();
        assert_eq!(config.get_baud_rate(), 57_600);
        assert_eq!(config.get_ready_timeout(), Duration::from_secs(10));
        assert_eq!(config.get_poll_timeout(), Duration::from_millis(50));
        assert_eq!(config.get_pwm_range(), Range::from([0, 255]));
        assert_eq!(config.get_servo_range(), Range::from([0, 180]));
    }

    #[test]
    fn test_builder() {
        let config = ControllerConfig::default()
            .with_baud_rate(115_200)
            .with_ready_timeout(Duration::from_millis(300))
            .with_poll_timeout(Duration::from_millis(10))
            .with_pwm_range([0, 1023])
            .with_servo_range(Range::from([10, 170]));
        assert_eq!(config.get_baud_rate(), 115_200);
        assert_eq!(config.get_ready_timeout(), Duration::from_millis(300));
        assert_eq!(config.get_poll_timeout(), Duration::from_millis(10));
        assert_eq!(config.get_pwm_range(), Range::from([0, 1023]));
        assert_eq!(config.get_servo_range(), Range::from([10, 170]));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serialize_config() {
        let config = ControllerConfig::default().with_servo_range([0, 90]);
        let json = serde_json::to_string(&config).unwrap();
        assert_eq!(
            json,
            r#"{"baud_rate":57600,"ready_timeout":{"secs":10,"nanos":0},"poll_timeout":{"secs":0,"nanos":50000000},"pwm_range":[0,255],"servo_range":[0,90]}"#
        );
        let back: ControllerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back, config);
    }
}
