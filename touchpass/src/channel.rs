//! Command/response exchange with the sensor module
//!
//! The link is half duplex and the module answers every instruction with
//! one acknowledge frame. A [`Channel`] writes a command, then feeds
//! incoming bytes through a [`FrameDecoder`] until an acknowledge from the
//! configured address completes or the deadline passes.

use std::time::Duration;

use bytes::Bytes;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use touchpass_core::{
    constants::DEFAULT_MAX_RAW_BYTES, Command, ConfirmationCode, FrameDecoder, Packet,
    DEFAULT_ADDRESS,
};
use touchpass_transport::Transport;

use crate::error::{Error, Result};

/// Acknowledge for one command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// Confirmation code reported by the module
    pub code: ConfirmationCode,

    /// Bytes following the confirmation code
    pub data: Bytes,
}

impl Response {
    pub fn is_success(&self) -> bool {
        self.code.is_success()
    }

    /// Turn a non-success confirmation code into [`Error::Sensor`]
    pub fn into_result(self, command: Command) -> Result<Bytes> {
        if self.code.is_success() {
            Ok(self.data)
        } else {
            Err(Error::Sensor {
                command,
                code: self.code,
            })
        }
    }
}

/// Serial channel to one sensor module
pub struct Channel<T> {
    transport: T,
    address: u32,
    max_raw_bytes: usize,
}

impl<T: Transport> Channel<T> {
    /// Create a channel talking to the broadcast address
    pub fn new(transport: T) -> Self {
        Self {
            transport,
            address: DEFAULT_ADDRESS,
            max_raw_bytes: DEFAULT_MAX_RAW_BYTES,
        }
    }

    /// Set the module address
    pub fn with_address(mut self, address: u32) -> Self {
        self.address = address;
        self
    }

    /// Set the raw byte cap for one response
    pub fn with_max_raw_bytes(mut self, max_raw_bytes: usize) -> Self {
        self.max_raw_bytes = max_raw_bytes;
        self
    }

    pub fn address(&self) -> u32 {
        self.address
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub fn transport_mut(&mut self) -> &mut T {
        &mut self.transport
    }

    /// Open the link if it is not open yet
    pub async fn connect(&mut self) -> Result<()> {
        if !self.transport.is_connected() {
            debug!("Opening link to {}", self.transport.endpoint());
            self.transport.connect().await?;
        }
        Ok(())
    }

    pub async fn disconnect(&mut self) -> Result<()> {
        self.transport.disconnect().await?;
        Ok(())
    }

    pub fn is_connected(&self) -> bool {
        self.transport.is_connected()
    }

    /// Send `command` and wait up to `timeout` for its acknowledge
    ///
    /// Bytes left over from an earlier exchange are discarded before the
    /// command is written, so the first acknowledge from our address is
    /// the answer. Frames of other types or for other addresses are
    /// skipped. No retries.
    ///
    /// A frame that fails its checksum or exhausts the raw byte cap is
    /// logged and the decoder resynchronizes; the wait goes on until the
    /// deadline.
    ///
    /// # Errors
    ///
    /// - [`Error::Timeout`] when no complete acknowledge arrived in time;
    ///   a half-received frame is never interpreted
    /// - [`Error::Core`] instead of the timeout when a framing error was
    ///   seen during the wait
    /// - [`Error::EmptyResponse`] for an acknowledge without a
    ///   confirmation code
    /// - [`Error::Transport`] for link failures
    pub async fn call(&mut self, command: Command, params: &[u8], timeout: Duration) -> Result<Response> {
        let frame = Packet::command(self.address, command, params)?.encode();

        let stale = self.transport.clear_input().await?;
        if stale > 0 {
            warn!(bytes = stale, "Discarded stale input before {}", command);
        }

        debug!("-> {} {}", command, hex_params(params));
        self.transport.send(&frame).await?;

        let deadline = Instant::now() + timeout;
        let mut decoder = FrameDecoder::new().with_max_raw_bytes(self.max_raw_bytes);
        let mut framing = None;

        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(expired(command, timeout, framing));
            }

            let chunk = match self.transport.receive(remaining).await {
                Ok(chunk) => chunk,
                Err(touchpass_transport::Error::ReadTimeout) => {
                    return Err(expired(command, timeout, framing));
                }
                Err(e) => return Err(e.into()),
            };

            for byte in chunk {
                let mut outcome = decoder.push(byte);
                loop {
                    match outcome {
                        Ok(Some(packet)) => {
                            if let Some(response) = self.accept(command, packet)? {
                                return Ok(response);
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            warn!(error = %e, "Framing error while waiting for {}", command);
                            framing = Some(e);
                        }
                    }
                    outcome = decoder.advance();
                }
            }
        }
    }

    /// Check a decoded frame; `None` means keep waiting
    fn accept(&self, command: Command, packet: Packet) -> Result<Option<Response>> {
        if packet.address != self.address {
            warn!(
                address = format!("0x{:08X}", packet.address),
                "Skipping frame from another address"
            );
            return Ok(None);
        }
        if !packet.is_ack() {
            warn!("Skipping {} while waiting for {}", packet, command);
            return Ok(None);
        }

        let code = packet
            .confirmation_code()
            .ok_or(Error::EmptyResponse(command))?;

        trace!("<- {} {:?}", command, packet);
        debug!("<- {} {}", command, code);

        Ok(Some(Response {
            code,
            data: packet.data(),
        }))
    }
}

/// Error for a wait that ran out, preferring the last framing error
fn expired(command: Command, after: Duration, framing: Option<touchpass_core::Error>) -> Error {
    match framing {
        Some(e) => Error::Core(e),
        None => Error::Timeout { command, after },
    }
}

fn hex_params(params: &[u8]) -> String {
    if params.is_empty() {
        String::new()
    } else {
        format!("[{}]", hex::encode(params))
    }
}
