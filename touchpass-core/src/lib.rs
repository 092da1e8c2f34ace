//! # touchpass-core
//!
//! Core protocol implementation for R502/R503 style optical fingerprint sensors.
//!
//! This crate provides the low-level protocol primitives:
//! - Frame structure and encoding/decoding
//! - Checksum calculation
//! - Instruction codes and confirmation codes
//! - Streaming frame decoder with resynchronization
//! - Protocol constants and default timeouts

pub mod checksum;
pub mod command;
pub mod confirm;
pub mod constants;
pub mod decoder;
pub mod error;
pub mod packet;

pub use command::Command;
pub use confirm::ConfirmationCode;
pub use decoder::FrameDecoder;
pub use error::{Error, Result};
pub use packet::{Packet, PacketId};

/// Frame start marker, high byte transmitted first
pub const HEADER: u16 = 0xEF01;

/// Broadcast device address used by factory-fresh modules
pub const DEFAULT_ADDRESS: u32 = 0xFFFF_FFFF;

/// Bytes before the payload: header (2) + address (4) + packet id (1) + length (2)
pub const PREAMBLE_SIZE: usize = 9;

/// Largest value the length field may carry (payload + checksum)
pub const MAX_PACKET_LENGTH: usize = 256;
