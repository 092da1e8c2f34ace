//! Sensor instruction codes

use std::fmt;
use std::time::Duration;

use crate::constants::timeouts;
use crate::error::{Error, Result};

/// Instruction codes understood by the sensor module
///
/// Only the subset of the vendor command set that the driver issues.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Command {
    /// Capture a finger image into the image buffer
    GenImg = 0x01,

    /// Extract characteristics from the image buffer into a char buffer
    Img2Tz = 0x02,

    /// Search the library with a char buffer
    Search = 0x04,

    /// Merge char buffers into a template
    RegModel = 0x05,

    /// Store a template into a library slot
    Store = 0x06,

    /// Delete a run of templates
    DeletChar = 0x0C,

    /// Wipe the whole library
    Empty = 0x0D,

    /// Read basic system parameters
    ReadSysPara = 0x0F,

    /// Read number of stored templates
    TemplateNum = 0x1D,

    /// Read a 256-slot occupancy page
    ReadIndexTable = 0x1F,

    /// Configure the aura LED ring
    AuraLedConfig = 0x35,

    /// Sensor self check
    CheckSensor = 0x36,

    /// Link handshake
    HandShake = 0x40,
}

impl Command {
    /// Get command name
    pub fn name(self) -> &'static str {
        match self {
            Self::GenImg => "GenImg",
            Self::Img2Tz => "Img2Tz",
            Self::Search => "Search",
            Self::RegModel => "RegModel",
            Self::Store => "Store",
            Self::DeletChar => "DeletChar",
            Self::Empty => "Empty",
            Self::ReadSysPara => "ReadSysPara",
            Self::TemplateNum => "TempleteNum",
            Self::ReadIndexTable => "ReadIndexTable",
            Self::AuraLedConfig => "AuraLedConfig",
            Self::CheckSensor => "CheckSensor",
            Self::HandShake => "HandShake",
        }
    }

    /// Expected processing latency of the module for this instruction
    ///
    /// Measured from command issue to a complete acknowledge.
    pub fn default_timeout(self) -> Duration {
        let ms = match self {
            Self::HandShake | Self::CheckSensor => timeouts::HANDSHAKE_MS,
            Self::GenImg => timeouts::CAPTURE_MS,
            Self::Img2Tz => timeouts::EXTRACT_MS,
            Self::RegModel => timeouts::MERGE_MS,
            Self::Store => timeouts::STORE_MS,
            Self::DeletChar => timeouts::DELETE_MS,
            Self::Empty => timeouts::EMPTY_MS,
            Self::Search => timeouts::SEARCH_MS,
            Self::ReadIndexTable => timeouts::INDEX_TABLE_MS,
            Self::ReadSysPara | Self::TemplateNum | Self::AuraLedConfig => timeouts::QUERY_MS,
        };
        Duration::from_millis(ms)
    }
}

impl From<Command> for u8 {
    fn from(cmd: Command) -> u8 {
        cmd as u8
    }
}

impl TryFrom<u8> for Command {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::GenImg),
            0x02 => Ok(Self::Img2Tz),
            0x04 => Ok(Self::Search),
            0x05 => Ok(Self::RegModel),
            0x06 => Ok(Self::Store),
            0x0C => Ok(Self::DeletChar),
            0x0D => Ok(Self::Empty),
            0x0F => Ok(Self::ReadSysPara),
            0x1D => Ok(Self::TemplateNum),
            0x1F => Ok(Self::ReadIndexTable),
            0x35 => Ok(Self::AuraLedConfig),
            0x36 => Ok(Self::CheckSensor),
            0x40 => Ok(Self::HandShake),
            _ => Err(Error::UnknownCommand(value)),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(0x{:02X})", self.name(), *self as u8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_conversion() {
        assert_eq!(u8::from(Command::HandShake), 0x40);
        assert_eq!(Command::try_from(0x1F).unwrap(), Command::ReadIndexTable);
    }

    #[test]
    fn test_unknown_command() {
        assert_eq!(Command::try_from(0x99), Err(Error::UnknownCommand(0x99)));
    }

    #[test]
    fn test_default_timeouts() {
        assert_eq!(Command::HandShake.default_timeout(), Duration::from_millis(500));
        assert_eq!(Command::GenImg.default_timeout(), Duration::from_millis(3000));
        assert_eq!(Command::Img2Tz.default_timeout(), Duration::from_millis(2000));
        assert_eq!(Command::Empty.default_timeout(), Duration::from_millis(3000));
        assert_eq!(Command::ReadIndexTable.default_timeout(), Duration::from_millis(1000));
    }

    #[test]
    fn test_command_display() {
        assert_eq!(Command::Store.to_string(), "Store(0x06)");
    }
}
