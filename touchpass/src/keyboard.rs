//! Keystroke output
//!
//! USB and BLE HID keyboards live outside this crate; they implement
//! [`Keyboard`].

use crate::error::Result;

/// HID keyboard that types credentials
#[cfg_attr(test, mockall::automock)]
pub trait Keyboard: Send {
    /// Whether a host is listening
    fn is_connected(&self) -> bool;

    fn type_text(&mut self, text: &str) -> Result<()>;

    fn press_enter(&mut self) -> Result<()>;

    /// Release every held key
    fn release_all(&mut self) -> Result<()>;
}
