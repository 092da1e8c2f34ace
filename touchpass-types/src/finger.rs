//! Finger identities and stored records

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Which hand a logical finger belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Hand {
    Left,
    Right,
}

/// Host-side finger identifier, 0-9
///
/// Independent of the library slot the sensor assigned. Ids 0-4 are the
/// left index, middle, ring, pinky and thumb; 5-9 the same on the right.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct LogicalFingerId(u8);

impl LogicalFingerId {
    pub const MAX: u8 = 9;

    pub fn new(id: u8) -> Result<Self> {
        if id > Self::MAX {
            return Err(Error::Validation(format!(
                "finger id {} out of range 0-{}",
                id,
                Self::MAX
            )));
        }
        Ok(Self(id))
    }

    pub fn get(self) -> u8 {
        self.0
    }

    pub fn hand(self) -> Hand {
        if self.0 < 5 { Hand::Left } else { Hand::Right }
    }

    /// Display name, e.g. "Left Index"
    pub fn name(self) -> &'static str {
        const NAMES: [&str; 10] = [
            "Left Index",
            "Left Middle",
            "Left Ring",
            "Left Pinky",
            "Left Thumb",
            "Right Index",
            "Right Middle",
            "Right Ring",
            "Right Pinky",
            "Right Thumb",
        ];
        NAMES[self.0 as usize]
    }
}

impl TryFrom<u8> for LogicalFingerId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<LogicalFingerId> for u8 {
    fn from(id: LogicalFingerId) -> u8 {
        id.0
    }
}

impl fmt::Display for LogicalFingerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name(), self.0)
    }
}

/// Metadata stored per library slot
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FingerRecord {
    /// Display name
    pub name: String,

    /// Text typed on a match
    pub credential: String,

    /// Press Enter after typing
    pub press_enter: bool,

    /// Which finger this is
    pub finger_id: LogicalFingerId,
}

impl FingerRecord {
    pub fn new(
        name: impl Into<String>,
        credential: impl Into<String>,
        press_enter: bool,
        finger_id: LogicalFingerId,
    ) -> Self {
        Self {
            name: name.into(),
            credential: credential.into(),
            press_enter,
            finger_id,
        }
    }

    pub fn has_credential(&self) -> bool {
        !self.credential.is_empty()
    }

    /// Name to show for the record stored at `slot`
    ///
    /// Unnamed records show as `Finger <slot>`.
    pub fn display_name(&self, slot: u16) -> String {
        if self.name.is_empty() {
            format!("Finger {}", slot)
        } else {
            self.name.clone()
        }
    }
}

// Keep credentials out of logs
impl fmt::Debug for FingerRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FingerRecord")
            .field("name", &self.name)
            .field("credential", &"<redacted>")
            .field("press_enter", &self.press_enter)
            .field("finger_id", &self.finger_id)
            .finish()
    }
}

/// Best library match for a char buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchMatch {
    /// Library slot of the matching template
    pub slot: u16,

    /// Match score reported by the module
    pub score: u16,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_logical_id_range() {
        assert!(LogicalFingerId::new(0).is_ok());
        assert!(LogicalFingerId::new(9).is_ok());
        assert!(matches!(LogicalFingerId::new(10), Err(Error::Validation(_))));
    }

    #[test]
    fn test_logical_id_hand_mapping() {
        let left_thumb = LogicalFingerId::new(4).unwrap();
        let right_index = LogicalFingerId::new(5).unwrap();

        assert_eq!(left_thumb.hand(), Hand::Left);
        assert_eq!(left_thumb.name(), "Left Thumb");
        assert_eq!(right_index.hand(), Hand::Right);
        assert_eq!(right_index.to_string(), "Right Index (5)");
    }

    #[test]
    fn test_display_name_defaults_to_slot() {
        let id = LogicalFingerId::new(2).unwrap();
        assert_eq!(FingerRecord::new("", "", false, id).display_name(7), "Finger 7");
        assert_eq!(FingerRecord::new("Work", "", false, id).display_name(7), "Work");
    }

    #[test]
    fn test_record_debug_hides_credential() {
        let record = FingerRecord::new("Work", "secret123", true, LogicalFingerId::new(0).unwrap());
        let debug = format!("{:?}", record);

        assert!(!debug.contains("secret123"));
        assert!(debug.contains("Work"));
    }
}
