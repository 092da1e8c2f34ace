//! Confirmation codes
//!
//! First payload byte of every acknowledge frame.

use std::fmt;

/// Status byte reported by the module
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ConfirmationCode {
    /// Command executed
    Success,
    /// Error when receiving the command packet
    PacketError,
    /// No finger on the sensor
    NoFinger,
    /// Failed to capture the image
    ImageFailed,
    /// Image too disorderly to extract characteristics
    ImageDisorderly,
    /// Too few feature points in the image
    ImageTooSmall,
    /// Finger does not match
    NoMatch,
    /// No matching template in the library
    NotFound,
    /// Char buffers could not be merged
    MergeFailed,
    /// Slot number beyond the library
    SlotOutOfRange,
    /// Failed reading a template from the library
    TemplateReadFailed,
    /// Failed uploading a template
    UploadFailed,
    /// Module cannot receive following data packets
    DataPacketError,
    /// Failed uploading an image
    ImageUploadFailed,
    /// Failed deleting templates
    DeleteFailed,
    /// Failed clearing the library
    EmptyFailed,
    /// Wrong handshake password
    WrongPassword,
    /// No valid primary image
    InvalidPrimaryImage,
    /// Error writing flash
    FlashWriteFailed,
    /// Invalid register number
    InvalidRegister,
    /// Library has no free slot
    LibraryFull,
    /// Wrong module address
    AddressError,
    /// Password must be verified first
    PasswordRequired,
    /// Any code this driver does not name
    Other(u8),
}

impl ConfirmationCode {
    /// Whether the module accepted the command
    pub fn is_success(self) -> bool {
        self == Self::Success
    }

    /// Human readable description
    pub fn description(self) -> &'static str {
        match self {
            Self::Success => "ok",
            Self::PacketError => "communication error",
            Self::NoFinger => "no finger",
            Self::ImageFailed => "image capture failed",
            Self::ImageDisorderly => "image too messy",
            Self::ImageTooSmall => "too few feature points",
            Self::NoMatch => "no match",
            Self::NotFound => "not found",
            Self::MergeFailed => "merge failed",
            Self::SlotOutOfRange => "slot out of range",
            Self::TemplateReadFailed => "template read failed",
            Self::UploadFailed => "template upload failed",
            Self::DataPacketError => "data packet error",
            Self::ImageUploadFailed => "image upload failed",
            Self::DeleteFailed => "delete failed",
            Self::EmptyFailed => "library clear failed",
            Self::WrongPassword => "wrong password",
            Self::InvalidPrimaryImage => "no valid primary image",
            Self::FlashWriteFailed => "flash write failed",
            Self::InvalidRegister => "invalid register",
            Self::LibraryFull => "library full",
            Self::AddressError => "address error",
            Self::PasswordRequired => "password required",
            Self::Other(_) => "unknown error",
        }
    }
}

impl From<u8> for ConfirmationCode {
    fn from(value: u8) -> Self {
        match value {
            0x00 => Self::Success,
            0x01 => Self::PacketError,
            0x02 => Self::NoFinger,
            0x03 => Self::ImageFailed,
            0x06 => Self::ImageDisorderly,
            0x07 => Self::ImageTooSmall,
            0x08 => Self::NoMatch,
            0x09 => Self::NotFound,
            0x0A => Self::MergeFailed,
            0x0B => Self::SlotOutOfRange,
            0x0C => Self::TemplateReadFailed,
            0x0D => Self::UploadFailed,
            0x0E => Self::DataPacketError,
            0x0F => Self::ImageUploadFailed,
            0x10 => Self::DeleteFailed,
            0x11 => Self::EmptyFailed,
            0x13 => Self::WrongPassword,
            0x15 => Self::InvalidPrimaryImage,
            0x18 => Self::FlashWriteFailed,
            0x1A => Self::InvalidRegister,
            0x1F => Self::LibraryFull,
            0x20 => Self::AddressError,
            0x21 => Self::PasswordRequired,
            other => Self::Other(other),
        }
    }
}

impl From<ConfirmationCode> for u8 {
    fn from(code: ConfirmationCode) -> u8 {
        match code {
            ConfirmationCode::Success => 0x00,
            ConfirmationCode::PacketError => 0x01,
            ConfirmationCode::NoFinger => 0x02,
            ConfirmationCode::ImageFailed => 0x03,
            ConfirmationCode::ImageDisorderly => 0x06,
            ConfirmationCode::ImageTooSmall => 0x07,
            ConfirmationCode::NoMatch => 0x08,
            ConfirmationCode::NotFound => 0x09,
            ConfirmationCode::MergeFailed => 0x0A,
            ConfirmationCode::SlotOutOfRange => 0x0B,
            ConfirmationCode::TemplateReadFailed => 0x0C,
            ConfirmationCode::UploadFailed => 0x0D,
            ConfirmationCode::DataPacketError => 0x0E,
            ConfirmationCode::ImageUploadFailed => 0x0F,
            ConfirmationCode::DeleteFailed => 0x10,
            ConfirmationCode::EmptyFailed => 0x11,
            ConfirmationCode::WrongPassword => 0x13,
            ConfirmationCode::InvalidPrimaryImage => 0x15,
            ConfirmationCode::FlashWriteFailed => 0x18,
            ConfirmationCode::InvalidRegister => 0x1A,
            ConfirmationCode::LibraryFull => 0x1F,
            ConfirmationCode::AddressError => 0x20,
            ConfirmationCode::PasswordRequired => 0x21,
            ConfirmationCode::Other(value) => value,
        }
    }
}

impl fmt::Display for ConfirmationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} (0x{:02X})", self.description(), u8::from(*self))
    }
}
