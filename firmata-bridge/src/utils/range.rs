/// Inclusive bounds `[start, end]`: used to validate values sent to PWM and servo pins.
#[derive(Copy, Clone, PartialEq, Debug)]
pub struct Range<T> {
    pub start: T,
    pub end: T,
}

impl<T: PartialOrd> Range<T> {
    /// Checks whether `value` lies within the bounds (both ends included).
    pub fn contains(&self, value: &T) -> bool {
        *value >= self.start && *value <= self.end
    }
}

impl<T: Copy> From<[T; 2]> for Range<T> {
    fn from(value: [T; 2]) -> Self {
        Self {
            start: value[0],
            end: value[1],
        }
    }
}

#[cfg(feature = "serde")]
impl<T> serde::Serialize for Range<T>
where
    T: serde::Serialize + Copy,
{
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Serialized as an array [start, end]
        [self.start, self.end].serialize(serializer)
    }
}

#[cfg(feature = "serde")]
impl<'de, T> serde::Deserialize<'de> for Range<T>
where
    T: serde::Deserialize<'de> + Copy,
{
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let array: [T; 2] = serde::Deserialize::deserialize(deserializer)?;
        Ok(Self::from(array))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_range_from_array() {
        let range: Range<u16> = [5, 15].into();
        assert_eq!(range.start, 5);
        assert_eq!(range.end, 15);
    }

    #[test]
    fn test_range_contains_bounds() {
        let range = Range::from([0u16, 180]);
        assert!(range.contains(&0));
        assert!(range.contains(&90));
        assert!(range.contains(&180));
        assert!(!range.contains(&181));

        let range = Range::from([10u16, 20]);
        assert!(!range.contains(&9));
    }

    #[test]
    fn test_range_debug() {
        let range = Range { start: 4, end: 10 };
        assert_eq!(format!("{:?}", range), "Range { start: 4, end: 10 }");
    }

    #[cfg(feature = "serde")]
    mod serde_tests {
        use super::*;

        #[test]
        fn test_range_serde() {
            let range = Range { start: 6u16, end: 12 };
            let json = serde_json::to_string(&range).unwrap();
            assert_eq!(json, r#"[6,12]"#);
            let range: Range<u16> = serde_json::from_str(r#"[7,14]"#).unwrap();
            assert_eq!(range, Range { start: 7, end: 14 });
        }
    }
}
