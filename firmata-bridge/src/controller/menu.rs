/// Lists the menus the UI offers to pick a pin from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MenuKind {
    /// Pins supporting OUTPUT.
    DigitalOutputs,
    /// Pins supporting PWM.
    AnalogOutputs,
    /// Pins supporting SERVO.
    ServoOutputs,
    /// Analog channels.
    AnalogInputs,
    /// Pins supporting INPUT.
    DigitalInputs,
}

/// An ordered list of `(label, pin)` entries the UI renders as a dropdown.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Menu(Vec<(String, u8)>);

impl Menu {
    /// Returns the entries, in display order.
    pub fn entries(&self) -> &[(String, u8)] {
        &self.0
    }

    /// Retrieves the pin bound to a label.
    pub fn get(&self, label: &str) -> Option<u8> {
        self.0
            .iter()
            .find(|(entry, _)| entry == label)
            .map(|(_, pin)| *pin)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl IntoIterator for Menu {
    type Item = (String, u8);
    type IntoIter = std::vec::IntoIter<(String, u8)>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

/// Maps each pin to a menu entry labelled by its index.
pub fn format_menu(pins: &[u8]) -> Menu {
    Menu(pins.iter().map(|pin| (pin.to_string(), *pin)).collect())
}
