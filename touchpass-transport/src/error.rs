//! Link errors

use std::io;

pub type Result<T> = std::result::Result<T, Error>;

/// Failure moving bytes to or from the module
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The link has not been opened
    #[error("Sensor link not open")]
    NotConnected,

    #[error("Sensor link already open")]
    AlreadyConnected,

    /// The bridge did not accept the connection in time
    #[error("Timed out opening sensor link")]
    ConnectionTimeout,

    /// Nothing arrived from the module within the wait
    #[error("No bytes from sensor within the wait")]
    ReadTimeout,

    /// The serial device or bridge went away
    #[error("Sensor link closed by remote end")]
    ConnectionClosed,

    #[error("Link I/O error: {0}")]
    Io(#[from] io::Error),

    /// Bridge host or port could not be resolved
    #[error("Invalid bridge address: {0}")]
    InvalidAddress(String),
}
