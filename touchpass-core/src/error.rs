//! Error types for touchpass-core

/// Result type alias for touchpass-core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core protocol errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Error {
    /// Buffer is too short to hold a complete frame
    #[error("Frame too short: expected at least {expected} bytes, got {actual} bytes")]
    PacketTooShort {
        expected: usize,
        actual: usize,
    },

    /// Frame does not start with the 0xEF01 marker
    #[error("Bad frame header: 0x{0:04X}")]
    BadHeader(u16),

    /// Checksum verification failed
    #[error("Checksum mismatch: expected 0x{expected:04X}, received 0x{received:04X}")]
    ChecksumMismatch {
        expected: u16,
        received: u16,
    },

    /// Length field outside 2..=256
    #[error("Invalid length field: {0}")]
    InvalidLength(u16),

    /// Buffer size disagrees with the length field
    #[error("Length mismatch: length field says {declared} bytes, buffer has {actual} bytes")]
    LengthMismatch {
        declared: usize,
        actual: usize,
    },

    /// Frame addressed from an unexpected module
    #[error("Address mismatch: expected 0x{expected:08X}, got 0x{actual:08X}")]
    AddressMismatch {
        expected: u32,
        actual: u32,
    },

    /// Unknown packet identifier
    #[error("Unknown packet identifier: 0x{0:02X}")]
    UnknownPacketId(u8),

    /// Unknown instruction code
    #[error("Unknown instruction code: 0x{0:02X}")]
    UnknownCommand(u8),

    /// Payload too large for a single frame
    #[error("Payload too large: {size} bytes (max: {max} bytes)")]
    PayloadTooLarge {
        size: usize,
        max: usize,
    },

    /// Too many raw bytes consumed without completing a frame
    #[error("No complete frame after {consumed} bytes")]
    FrameOverrun {
        consumed: usize,
    },
}

impl Error {
    /// Framing errors are local to one frame; the decoder resynchronizes on the next header
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::BadHeader(_)
                | Self::ChecksumMismatch { .. }
                | Self::InvalidLength(_)
                | Self::LengthMismatch { .. }
                | Self::AddressMismatch { .. }
                | Self::UnknownPacketId(_)
                | Self::FrameOverrun { .. }
                | Self::PacketTooShort { .. }
        )
    }
}
