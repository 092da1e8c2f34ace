//! Streaming frame decoder
//!
//! Bytes arrive from the UART one at a time and may contain line noise,
//! stale replies or half frames. The decoder hunts for the 0xEF01 marker,
//! learns the frame size from the length field and hands complete frames
//! to [`Packet::decode`] for checksum verification.

use bytes::{Buf, BufMut, BytesMut};
use tracing::{debug, trace};

use crate::{
    constants::DEFAULT_MAX_RAW_BYTES,
    error::{Error, Result},
    packet::{Packet, PacketId},
    HEADER, MAX_PACKET_LENGTH, PREAMBLE_SIZE,
};

const HEADER_HI: u8 = (HEADER >> 8) as u8;
const HEADER_LO: u8 = (HEADER & 0xFF) as u8;

/// Byte-at-a-time frame decoder
///
/// # Resynchronization
///
/// A byte that cannot start or continue the header is dropped, shifting the
/// search window by one. A header followed by an unknown packet identifier
/// or an out-of-range length is treated as a false match: its first byte is
/// dropped and the buffered remainder is scanned again. A complete frame
/// that fails verification is rescanned the same way, so a real header
/// inside a false frame is still found.
///
/// # Errors
///
/// [`push`](Self::push) surfaces two conditions:
/// - [`Error::ChecksumMismatch`] when a complete frame fails verification
/// - [`Error::FrameOverrun`] when more than the raw byte cap has been
///   consumed without completing a frame
///
/// `push` stops at the first frame or error. Bytes queued for rescanning
/// are decoded by calling [`advance`](Self::advance) until it returns
/// `Ok(None)`.
///
/// # Examples
///
/// ```
/// use touchpass_core::{Command, FrameDecoder, Packet, DEFAULT_ADDRESS};
///
/// let frame = Packet::command(DEFAULT_ADDRESS, Command::HandShake, &[]).unwrap().encode();
///
/// let mut decoder = FrameDecoder::new();
/// let mut found = Vec::new();
/// for &byte in [0xEF, 0x33].iter().chain(frame.iter()) {
///     let mut outcome = decoder.push(byte);
///     while let Ok(Some(packet)) = outcome {
///         found.push(packet);
///         outcome = decoder.advance();
///     }
/// }
/// assert_eq!(found.len(), 1);
/// ```
#[derive(Debug)]
pub struct FrameDecoder {
    buf: BytesMut,
    /// Bytes waiting to be scanned
    queue: BytesMut,
    /// Leading queued bytes that were already counted once
    rescan: usize,
    /// Total frame size once the length field has been read
    expected: Option<usize>,
    /// Raw bytes consumed since the last frame or error
    consumed: usize,
    max_raw_bytes: usize,
}

impl FrameDecoder {
    /// Create a decoder with the default raw byte cap
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(PREAMBLE_SIZE + MAX_PACKET_LENGTH),
            queue: BytesMut::new(),
            rescan: 0,
            expected: None,
            consumed: 0,
            max_raw_bytes: DEFAULT_MAX_RAW_BYTES,
        }
    }

    /// Set the raw byte cap
    pub fn with_max_raw_bytes(mut self, max_raw_bytes: usize) -> Self {
        self.max_raw_bytes = max_raw_bytes.max(Packet::MIN_FRAME_SIZE);
        self
    }

    /// Raw bytes consumed since the last frame or error
    pub fn consumed(&self) -> usize {
        self.consumed
    }

    /// Whether the decoder is inside a frame
    pub fn in_frame(&self) -> bool {
        !self.buf.is_empty()
    }

    /// Whether bytes are still queued for scanning
    pub fn has_pending(&self) -> bool {
        !self.queue.is_empty()
    }

    /// Drop any partial frame, queued bytes and the raw byte count
    pub fn reset(&mut self) {
        self.buf.clear();
        self.queue.clear();
        self.rescan = 0;
        self.expected = None;
        self.consumed = 0;
    }

    /// Feed one byte; returns a packet when it completes a verified frame
    pub fn push(&mut self, byte: u8) -> Result<Option<Packet>> {
        self.queue.put_u8(byte);
        self.advance()
    }

    /// Scan queued bytes up to the next frame or error
    ///
    /// Returns `Ok(None)` once the queue is empty.
    pub fn advance(&mut self) -> Result<Option<Packet>> {
        while self.queue.has_remaining() {
            let byte = self.queue.get_u8();
            if self.rescan > 0 {
                self.rescan -= 1;
            } else {
                self.consumed += 1;
            }

            match self.feed(byte) {
                Ok(Some(packet)) => {
                    self.consumed = 0;
                    return Ok(Some(packet));
                }
                Ok(None) if self.consumed >= self.max_raw_bytes => {
                    let consumed = self.consumed;
                    self.reset();
                    return Err(Error::FrameOverrun { consumed });
                }
                Ok(None) => {}
                Err(e) => {
                    self.consumed = 0;
                    return Err(e);
                }
            }
        }

        Ok(None)
    }

    fn feed(&mut self, byte: u8) -> Result<Option<Packet>> {
        match self.buf.len() {
            0 => {
                if byte == HEADER_HI {
                    self.buf.put_u8(byte);
                } else {
                    trace!(byte = format!("0x{:02X}", byte), "Discarding byte outside frame");
                }
                Ok(None)
            }
            1 => {
                if byte == HEADER_LO {
                    self.buf.put_u8(byte);
                } else {
                    // Shift by one: the new byte may itself start a header
                    self.buf.clear();
                    if byte == HEADER_HI {
                        self.buf.put_u8(byte);
                    }
                }
                Ok(None)
            }
            _ => {
                self.buf.put_u8(byte);

                if self.buf.len() == PREAMBLE_SIZE {
                    match Self::frame_size(&self.buf) {
                        Ok(size) => self.expected = Some(size),
                        Err(e) => {
                            debug!(error = %e, "False header match, resynchronizing");
                            self.slide();
                        }
                    }
                    return Ok(None);
                }

                match self.expected {
                    Some(size) if self.buf.len() == size => {
                        self.expected = None;
                        let frame = self.buf.split();
                        match Packet::decode(frame.clone()) {
                            Ok(packet) => Ok(Some(packet)),
                            Err(e) => {
                                debug!(error = %e, "Rejected frame, rescanning its body");
                                self.requeue(&frame[1..]);
                                Err(e)
                            }
                        }
                    }
                    _ => Ok(None),
                }
            }
        }
    }

    /// Validate packet id and length of a buffered preamble
    fn frame_size(preamble: &[u8]) -> Result<usize> {
        PacketId::try_from(preamble[6])?;

        let length = u16::from_be_bytes([preamble[7], preamble[8]]);
        if !(2..=MAX_PACKET_LENGTH as u16).contains(&length) {
            return Err(Error::InvalidLength(length));
        }

        Ok(PREAMBLE_SIZE + length as usize)
    }

    /// Drop the first buffered byte and rescan the rest
    fn slide(&mut self) {
        let rest = self.buf.split_off(1);
        self.buf.clear();
        self.expected = None;
        self.requeue(&rest);
    }

    /// Put already counted bytes in front of the queue
    fn requeue(&mut self, bytes: &[u8]) {
        let mut queue = BytesMut::with_capacity(bytes.len() + self.queue.len());
        queue.extend_from_slice(bytes);
        queue.extend_from_slice(&self.queue);
        self.queue = queue;
        self.rescan += bytes.len();
    }
}

impl Default for FrameDecoder {
    fn default() -> Self {
        Self::new()
    }
}
