//! Transport over an already opened byte stream
//!
//! Serial port crates hand out `AsyncRead + AsyncWrite` handles; wrap one
//! here. Tests use `tokio::io::duplex`.

use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::time::timeout;
use tracing::{debug, trace};

use crate::{error::*, Transport};

const READ_CHUNK: usize = 256;

/// Transport over any async byte stream
pub struct StreamTransport<S> {
    name: String,
    stream: Option<S>,
}

impl<S> StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Sync + Unpin,
{
    /// Wrap an open stream; `name` is used in logs (e.g. "/dev/ttyUSB0")
    pub fn new(stream: S, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            stream: Some(stream),
        }
    }

    /// Take back the underlying stream
    pub fn into_inner(self) -> Option<S> {
        self.stream
    }
}

/// Write a whole buffer and flush
pub(crate) async fn write_all<W>(writer: &mut W, data: &[u8]) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    trace!("Sending {} bytes: {}", data.len(), hex::encode(&data[..data.len().min(32)]));

    writer.write_all(data).await?;
    writer.flush().await?;

    Ok(())
}

/// Read one chunk of available bytes within `wait`
pub(crate) async fn read_available<R>(reader: &mut R, wait: Duration) -> Result<BytesMut>
where
    R: AsyncRead + Unpin,
{
    let mut buf = BytesMut::with_capacity(READ_CHUNK);

    let n = timeout(wait, reader.read_buf(&mut buf))
        .await
        .map_err(|_| Error::ReadTimeout)?
        .map_err(Error::Io)?;

    if n == 0 {
        return Err(Error::ConnectionClosed);
    }

    trace!("Received {} bytes: {}", n, hex::encode(&buf[..n.min(32)]));

    Ok(buf)
}

#[async_trait]
impl<S> Transport for StreamTransport<S>
where
    S: AsyncRead + AsyncWrite + Send + Sync + Unpin,
{
    async fn connect(&mut self) -> Result<()> {
        // The stream is opened by the caller; a closed one cannot be reopened
        if self.stream.is_some() {
            Ok(())
        } else {
            Err(Error::ConnectionClosed)
        }
    }

    async fn disconnect(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            debug!("Closing {}...", self.name);
            let _ = stream.shutdown().await;
        }
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    async fn send(&mut self, data: &[u8]) -> Result<()> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        write_all(stream, data).await
    }

    async fn receive(&mut self, timeout: Duration) -> Result<BytesMut> {
        let stream = self.stream.as_mut().ok_or(Error::NotConnected)?;
        read_available(stream, timeout).await
    }

    fn endpoint(&self) -> String {
        self.name.clone()
    }
}
