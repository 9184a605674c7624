use std::collections::HashMap;
use std::fmt::Debug;

/// The content of a reading slot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Reading<T> {
    /// Never requested (or cleared since).
    #[default]
    Absent,
    /// Requested: the board did not report a value yet.
    Pending,
    /// Last value reported by the board.
    Resolved(T),
}

impl<T> Reading<T> {
    /// Checks whether a request is in flight for this slot.
    pub fn is_pending(&self) -> bool {
        matches!(self, Reading::Pending)
    }

    /// Returns the resolved value, if any.
    pub fn value(self) -> Option<T> {
        match self {
            Reading::Resolved(value) => Some(value),
            _ => None,
        }
    }
}

/// Sparse reading slots, keyed by pin (or analog channel).
///
/// A slot only goes `Absent -> Pending -> Resolved`, stays resolved (each report overwrites the
/// value) and gets back to `Absent` when cleared or when its request could not be sent.
#[derive(Clone, Debug)]
pub struct ReadingCache<T> {
    slots: HashMap<u8, Reading<T>>,
}

impl<T> Default for ReadingCache<T> {
    fn default() -> Self {
        Self {
            slots: HashMap::new(),
        }
    }
}

impl<T: Copy + Debug> ReadingCache<T> {
    /// Returns the slot content for `key`.
    pub fn get(&self, key: u8) -> Reading<T> {
        self.slots.get(&key).copied().unwrap_or_default()
    }

    /// Marks an absent slot as pending.
    ///
    /// Returns true when the caller must issue the request: false if the slot already is
    /// pending or resolved.
    pub fn request(&mut self, key: u8) -> bool {
        match self.get(key) {
            Reading::Absent => {
                self.slots.insert(key, Reading::Pending);
                true
            }
            _ => false,
        }
    }

    /// Stores a reported value. Ignored if the slot was never requested (or was cleared).
    pub fn resolve(&mut self, key: u8, value: T) -> bool {
        match self.slots.get_mut(&key) {
            Some(slot) => {
                *slot = Reading::Resolved(value);
                true
            }
            None => false,
        }
    }

    /// Reverts a pending slot to absent: its request could not be sent.
    pub fn revert(&mut self, key: u8) {
        if self.get(key).is_pending() {
            self.slots.remove(&key);
        }
    }

    /// Forgets all slots.
    pub fn clear(&mut self) {
        self.slots.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reading_helpers() {
        assert_eq!(Reading::<u16>::default(), Reading::Absent);
        assert!(Reading::<u16>::Pending.is_pending());
        assert!(!Reading::Resolved(3).is_pending());
        assert_eq!(Reading::Resolved(512).value(), Some(512));
        assert_eq!(Reading::<u16>::Pending.value(), None);
    }

    #[test]
    fn test_slot_lifecycle() {
        let mut cache: ReadingCache<u16> = Default::default();
        assert_eq!(cache.get(3), Reading::Absent);

        assert!(cache.request(3), "First request must be issued");
        assert_eq!(cache.get(3), Reading::Pending);
        assert!(!cache.request(3), "No second request while pending");

        assert!(cache.resolve(3, 512));
        assert_eq!(cache.get(3), Reading::Resolved(512));
        assert!(!cache.request(3), "No request once resolved");

        // Later reports overwrite the value.
        assert!(cache.resolve(3, 600));
        assert_eq!(cache.get(3), Reading::Resolved(600));
    }

    #[test]
    fn test_resolve_unrequested_slot() {
        let mut cache: ReadingCache<bool> = Default::default();
        assert!(!cache.resolve(5, true));
        assert_eq!(cache.get(5), Reading::Absent);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_revert_and_clear() {
        let mut cache: ReadingCache<bool> = Default::default();
        cache.request(2);
        cache.request(4);
        cache.resolve(4, true);

        cache.revert(2);
        cache.revert(4);
        assert_eq!(cache.get(2), Reading::Absent);
        assert_eq!(cache.get(4), Reading::Resolved(true), "Only pending slots revert");

        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.get(4), Reading::Absent);
    }
}
