//! Frame checksum
//!
//! From the module datasheet: the checksum is the arithmetic sum of the
//! packet identifier, both bytes of the length field and every payload
//! byte. Overflowing bits are omitted and the result is sent high byte
//! first.

use tracing::trace;

/// Calculate the frame checksum
///
/// # Algorithm
///
/// ```text
/// sum = pid + (len >> 8) + (len & 0xFF) + payload[0] + ... + payload[n-1]
/// checksum = sum mod 0x10000
/// ```
///
/// `length` is the value of the length field, i.e. payload length + 2.
///
/// # Examples
///
/// ```
/// use touchpass_core::checksum;
///
/// // Handshake command: pid 0x01, length 3, instruction 0x40
/// assert_eq!(checksum::calculate(0x01, 3, &[0x40]), 0x0044);
/// ```
pub fn calculate(packet_id: u8, length: u16, payload: &[u8]) -> u16 {
    let [len_hi, len_lo] = length.to_be_bytes();

    let sum = payload.iter().fold(
        u16::from(packet_id)
            .wrapping_add(u16::from(len_hi))
            .wrapping_add(u16::from(len_lo)),
        |acc, &b| acc.wrapping_add(u16::from(b)),
    );

    trace!(
        packet_id = packet_id,
        length = length,
        payload_len = payload.len(),
        checksum = format!("0x{:04X}", sum),
        "Calculated checksum"
    );

    sum
}

/// Verify checksum
pub fn verify(packet_id: u8, length: u16, payload: &[u8], expected: u16) -> bool {
    calculate(packet_id, length, payload) == expected
}
