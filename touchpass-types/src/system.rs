//! Module system parameters

use std::fmt;
use std::io::Cursor;

use bitflags::bitflags;
use byteorder::{BigEndian, ReadBytesExt};
use serde::Serialize;

use crate::error::{Error, Result};

bitflags! {
    /// Status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct StatusRegister: u16 {
        /// Module is executing a command
        const BUSY = 1 << 0;
        /// Last verification matched
        const PASS = 1 << 1;
        /// Handshake password verified
        const PWD = 1 << 2;
        /// Image buffer holds a valid image
        const IMG_BUF_STAT = 1 << 3;
    }
}

/// Contents of the `ReadSysPara` response
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SystemParameters {
    #[serde(skip)]
    pub status: StatusRegister,

    /// Fixed system identifier
    pub system_id: u16,

    /// Template library capacity
    pub library_size: u16,

    /// Matching threshold level, 1-5
    pub security_level: u16,

    /// Module address
    pub address: u32,

    /// Data packet size code, 0-3
    pub packet_size_code: u16,

    /// Baud rate as a multiple of 9600
    pub baud_multiplier: u16,
}

impl SystemParameters {
    /// Encoded size in bytes
    pub const SIZE: usize = 16;

    /// Parse the 16 data bytes following the confirmation code
    pub fn parse(data: &[u8]) -> Result<Self> {
        if data.len() < Self::SIZE {
            return Err(Error::Parse(format!(
                "system parameters need {} bytes, got {}",
                Self::SIZE,
                data.len()
            )));
        }

        let mut rdr = Cursor::new(data);
        let io = |e: std::io::Error| Error::Parse(e.to_string());

        Ok(Self {
            status: StatusRegister::from_bits_truncate(rdr.read_u16::<BigEndian>().map_err(io)?),
            system_id: rdr.read_u16::<BigEndian>().map_err(io)?,
            library_size: rdr.read_u16::<BigEndian>().map_err(io)?,
            security_level: rdr.read_u16::<BigEndian>().map_err(io)?,
            address: rdr.read_u32::<BigEndian>().map_err(io)?,
            packet_size_code: rdr.read_u16::<BigEndian>().map_err(io)?,
            baud_multiplier: rdr.read_u16::<BigEndian>().map_err(io)?,
        })
    }

    /// Data packet size in bytes
    pub fn packet_size(&self) -> usize {
        32usize << self.packet_size_code.min(3)
    }

    /// UART baud rate
    pub fn baud_rate(&self) -> u32 {
        u32::from(self.baud_multiplier) * 9600
    }
}

impl fmt::Display for SystemParameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Sensor[addr: 0x{:08X}, library: {}, security: {}, baud: {}]",
            self.address,
            self.library_size,
            self.security_level,
            self.baud_rate()
        )
    }
}
