//! Sensor frame structure and encoding/decoding

use bytes::{Buf, BufMut, Bytes, BytesMut};
use std::fmt;

use crate::{
    checksum,
    command::Command,
    confirm::ConfirmationCode,
    error::{Error, Result},
    HEADER, MAX_PACKET_LENGTH, PREAMBLE_SIZE,
};

/// Packet identifier byte
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketId {
    /// Host to module instruction
    Command = 0x01,
    /// Data packet following a command or acknowledge
    Data = 0x02,
    /// Module to host acknowledge
    Ack = 0x07,
    /// Last data packet of a transfer
    EndOfData = 0x08,
}

impl From<PacketId> for u8 {
    fn from(pid: PacketId) -> u8 {
        pid as u8
    }
}

impl TryFrom<u8> for PacketId {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            0x01 => Ok(Self::Command),
            0x02 => Ok(Self::Data),
            0x07 => Ok(Self::Ack),
            0x08 => Ok(Self::EndOfData),
            _ => Err(Error::UnknownPacketId(value)),
        }
    }
}

/// Sensor protocol frame
///
/// # Frame Structure
///
/// ```text
/// ┌──────────┬───────────┬──────────┬──────────┬─────────────┬──────────┐
/// │  Header  │  Address  │   PID    │  Length  │   Payload   │ Checksum │
/// │ 2 bytes  │  4 bytes  │  1 byte  │ 2 bytes  │   N bytes   │ 2 bytes  │
/// │ (0xEF01) │  (BE u32) │          │ (BE, N+2)│             │ (BE u16) │
/// └──────────┴───────────┴──────────┴──────────┴─────────────┴──────────┘
/// ```
///
/// All multi-byte values are big-endian. The checksum covers the packet
/// identifier, the length field and the payload; it does not cover the
/// header or the address.
///
/// # Examples
///
/// ```
/// use touchpass_core::{Command, Packet, DEFAULT_ADDRESS};
///
/// let packet = Packet::command(DEFAULT_ADDRESS, Command::HandShake, &[]).unwrap();
/// let encoded = packet.encode();
///
/// let decoded = Packet::decode(encoded).unwrap();
/// assert_eq!(packet, decoded);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct Packet {
    /// Module address
    pub address: u32,

    /// Packet identifier
    pub packet_id: PacketId,

    /// Instruction + parameters, or confirmation code + data
    pub payload: Bytes,
}

impl Packet {
    /// Maximum payload size
    pub const MAX_PAYLOAD_SIZE: usize = MAX_PACKET_LENGTH - 2;

    /// Smallest complete frame: preamble + checksum
    pub const MIN_FRAME_SIZE: usize = PREAMBLE_SIZE + 2;

    /// Create a packet
    pub fn new(address: u32, packet_id: PacketId, payload: impl Into<Bytes>) -> Result<Self> {
        let payload = payload.into();
        if payload.len() > Self::MAX_PAYLOAD_SIZE {
            return Err(Error::PayloadTooLarge {
                size: payload.len(),
                max: Self::MAX_PAYLOAD_SIZE,
            });
        }

        Ok(Self {
            address,
            packet_id,
            payload,
        })
    }

    /// Create a command packet: instruction code followed by its parameters
    ///
    /// # Examples
    ///
    /// ```
    /// use touchpass_core::{Command, Packet, PacketId};
    ///
    /// let packet = Packet::command(0xFFFF_FFFF, Command::Img2Tz, &[1]).unwrap();
    /// assert_eq!(packet.packet_id, PacketId::Command);
    /// assert_eq!(packet.payload.as_ref(), &[0x02, 0x01]);
    /// ```
    pub fn command(address: u32, command: Command, params: &[u8]) -> Result<Self> {
        let mut payload = BytesMut::with_capacity(1 + params.len());
        payload.put_u8(command.into());
        payload.put_slice(params);

        Self::new(address, PacketId::Command, payload.freeze())
    }

    /// Create an acknowledge packet: confirmation code followed by data
    pub fn ack(address: u32, code: ConfirmationCode, data: &[u8]) -> Result<Self> {
        let mut payload = BytesMut::with_capacity(1 + data.len());
        payload.put_u8(code.into());
        payload.put_slice(data);

        Self::new(address, PacketId::Ack, payload.freeze())
    }

    /// Value of the length field
    pub fn length(&self) -> u16 {
        (self.payload.len() + 2) as u16
    }

    /// Calculate checksum for this packet
    pub fn checksum(&self) -> u16 {
        checksum::calculate(self.packet_id.into(), self.length(), &self.payload)
    }

    /// Encode packet to bytes
    ///
    /// # Examples
    ///
    /// ```
    /// use touchpass_core::{Command, Packet};
    ///
    /// let packet = Packet::command(0xFFFF_FFFF, Command::GenImg, &[]).unwrap();
    /// assert_eq!(
    ///     packet.encode().as_ref(),
    ///     &[0xEF, 0x01, 0xFF, 0xFF, 0xFF, 0xFF, 0x01, 0x00, 0x03, 0x01, 0x00, 0x05]
    /// );
    /// ```
    pub fn encode(&self) -> BytesMut {
        let mut buf = BytesMut::with_capacity(self.size());

        buf.put_u16(HEADER);
        buf.put_u32(self.address);
        buf.put_u8(self.packet_id.into());
        buf.put_u16(self.length());
        buf.put_slice(&self.payload);
        buf.put_u16(self.checksum());

        buf
    }

    /// Decode one complete frame
    ///
    /// The buffer must hold exactly one frame: its size has to agree with
    /// the length field.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - Buffer is shorter than the smallest frame
    /// - Header is not 0xEF01
    /// - Packet identifier is unknown
    /// - Length field is out of range or disagrees with the buffer size
    /// - Checksum verification fails
    pub fn decode(mut buf: BytesMut) -> Result<Self> {
        if buf.len() < Self::MIN_FRAME_SIZE {
            return Err(Error::PacketTooShort {
                expected: Self::MIN_FRAME_SIZE,
                actual: buf.len(),
            });
        }

        let header = buf.get_u16();
        if header != HEADER {
            return Err(Error::BadHeader(header));
        }

        let address = buf.get_u32();
        let packet_id = PacketId::try_from(buf.get_u8())?;

        let length = buf.get_u16();
        if !(2..=MAX_PACKET_LENGTH as u16).contains(&length) {
            return Err(Error::InvalidLength(length));
        }
        if buf.len() != length as usize {
            return Err(Error::LengthMismatch {
                declared: length as usize,
                actual: buf.len(),
            });
        }

        let payload = buf.split_to(length as usize - 2).freeze();
        let checksum_received = buf.get_u16();

        let packet = Self {
            address,
            packet_id,
            payload,
        };

        let checksum_calculated = packet.checksum();
        if checksum_calculated != checksum_received {
            return Err(Error::ChecksumMismatch {
                expected: checksum_calculated,
                received: checksum_received,
            });
        }

        Ok(packet)
    }

    /// Decode one complete frame and check it came from `address`
    pub fn decode_from(buf: BytesMut, address: u32) -> Result<Self> {
        let packet = Self::decode(buf)?;
        if packet.address != address {
            return Err(Error::AddressMismatch {
                expected: address,
                actual: packet.address,
            });
        }
        Ok(packet)
    }

    /// Check if this is an acknowledge packet
    pub fn is_ack(&self) -> bool {
        self.packet_id == PacketId::Ack
    }

    /// Confirmation code of an acknowledge packet
    pub fn confirmation_code(&self) -> Option<ConfirmationCode> {
        if !self.is_ack() {
            return None;
        }
        self.payload.first().map(|&b| ConfirmationCode::from(b))
    }

    /// Instruction code of a command packet
    pub fn command_code(&self) -> Option<Command> {
        if self.packet_id != PacketId::Command {
            return None;
        }
        self.payload.first().and_then(|&b| Command::try_from(b).ok())
    }

    /// Payload after the leading instruction or confirmation byte
    pub fn data(&self) -> Bytes {
        if self.payload.is_empty() {
            Bytes::new()
        } else {
            self.payload.slice(1..)
        }
    }

    /// Get total frame size
    pub fn size(&self) -> usize {
        PREAMBLE_SIZE + self.payload.len() + 2
    }
}

impl fmt::Debug for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Packet")
            .field("address", &format!("0x{:08X}", self.address))
            .field("packet_id", &self.packet_id)
            .field("checksum", &format!("0x{:04X}", self.checksum()))
            .field("payload", &hex::encode(&self.payload))
            .finish()
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.command_code(), self.confirmation_code()) {
            (Some(command), _) => write!(f, "Packet[{}](len={})", command, self.payload.len()),
            (_, Some(code)) => write!(f, "Packet[ack {}](len={})", code, self.payload.len()),
            _ => write!(f, "Packet[{:?}](len={})", self.packet_id, self.payload.len()),
        }
    }
}
