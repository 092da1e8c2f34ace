//! High-level error types

use std::time::Duration;

use touchpass_core::{Command, ConfirmationCode};

pub type Result<T> = std::result::Result<T, Error>;

/// Confirmation byte reported for failures the module did not report itself
pub const LEGACY_FAILURE_CODE: u8 = 0xFF;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Framing error: {0}")]
    Core(#[from] touchpass_core::Error),

    #[error("Transport error: {0}")]
    Transport(#[from] touchpass_transport::Error),

    #[error("Type error: {0}")]
    Types(#[from] touchpass_types::Error),

    #[error("{command} timed out after {after:?}")]
    Timeout { command: Command, after: Duration },

    #[error("{command} failed: {code}")]
    Sensor {
        command: Command,
        code: ConfirmationCode,
    },

    #[error("Empty response to {0}")]
    EmptyResponse(Command),

    #[error("Invalid response to {command}: {reason}")]
    InvalidResponse { command: Command, reason: String },

    #[error("No finger record at slot {0}")]
    NoRecord(u16),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Failed to parse config: {0}")]
    Config(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Confirmation code reported by the module, if this is a sensor error
    pub fn sensor_code(&self) -> Option<ConfirmationCode> {
        match self {
            Self::Sensor { code, .. } => Some(*code),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Transport(touchpass_transport::Error::ReadTimeout)
        )
    }

    /// Whether retrying the same command may succeed
    ///
    /// Timeouts, framing damage and module-reported codes are per-exchange;
    /// a closed link or bad configuration is not.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Timeout { .. } | Self::Sensor { .. } | Self::EmptyResponse(_) => true,
            Self::Core(e) => e.is_framing(),
            Self::Transport(e) => matches!(e, touchpass_transport::Error::ReadTimeout),
            _ => false,
        }
    }

    /// Single status byte for hosts that expect one
    ///
    /// Module-reported codes pass through; everything else collapses to
    /// [`LEGACY_FAILURE_CODE`].
    pub fn legacy_code(&self) -> u8 {
        self.sensor_code()
            .map(u8::from)
            .unwrap_or(LEGACY_FAILURE_CODE)
    }
}
