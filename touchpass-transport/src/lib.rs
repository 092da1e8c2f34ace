//! Transport layer for the sensor link
//!
//! The module speaks over a half-duplex UART. This crate moves raw bytes:
//! - [`StreamTransport`] over any async byte stream (an opened serial device)
//! - [`TcpTransport`] to a serial-over-TCP bridge
//! - [`SimulatedSensor`], an in-process module model for tests and demos

pub mod error;
pub mod sim;
pub mod stream;
pub mod tcp;

pub use error::{Error, Result};
pub use sim::{FingerModel, SimHandle, SimulatedSensor};
pub use stream::StreamTransport;
pub use tcp::TcpTransport;

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;

/// Upper bound on reads performed by [`Transport::clear_input`]
const MAX_DRAIN_READS: usize = 64;

/// Byte pipe to the sensor module
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open the link
    async fn connect(&mut self) -> Result<()>;

    /// Close the link
    async fn disconnect(&mut self) -> Result<()>;

    /// Check if connected
    fn is_connected(&self) -> bool;

    /// Send raw bytes
    async fn send(&mut self, data: &[u8]) -> Result<()>;

    /// Receive whatever bytes are available, waiting at most `timeout`
    ///
    /// Returns [`Error::ReadTimeout`] if nothing arrived in time.
    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut>;

    /// Discard bytes already waiting on the link, returning how many
    async fn clear_input(&mut self) -> Result<usize> {
        let mut drained = 0;
        for _ in 0..MAX_DRAIN_READS {
            match self.receive(Duration::ZERO).await {
                Ok(buf) => drained += buf.len(),
                Err(Error::ReadTimeout) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(drained)
    }

    /// Human readable link endpoint
    fn endpoint(&self) -> String;
}
