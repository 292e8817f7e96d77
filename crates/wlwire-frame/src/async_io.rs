use std::io;

use bytes::BytesMut;
use tracing::debug;
use wlwire_transport::{AsyncWireStream, TransportError};

use crate::builder::{MessageBuilder, OutgoingMessage};
use crate::codec::{FrameConfig, Header, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::reader::{check_size, finish_envelope, read_error};

/// Async counterpart of [`MessageReader`](crate::MessageReader).
pub struct AsyncMessageReader {
    inner: AsyncWireStream,
    ancillary: Vec<u8>,
    config: FrameConfig,
}

impl AsyncMessageReader {
    pub fn new(inner: AsyncWireStream) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: AsyncWireStream, config: FrameConfig) -> Self {
        Self {
            inner,
            ancillary: Vec::new(),
            config,
        }
    }

    /// Read the next complete message.
    pub async fn read_message(&mut self) -> Result<Message> {
        self.ancillary.clear();
        let framed = self.read_envelope().await;
        finish_envelope(framed, &self.ancillary, &self.config)
    }

    async fn read_envelope(&mut self) -> Result<(Header, BytesMut)> {
        let mut raw = [0u8; HEADER_SIZE];
        let n = self.read_full(&mut raw[..4]).await?;
        if n == 0 {
            return Err(FrameError::ConnectionClosed);
        }
        if n < 4 {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: n,
            });
        }
        let n = self.read_full(&mut raw[4..]).await?;
        if n < 4 {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: 4 + n,
            });
        }

        let header = Header::decode(raw, self.config.byte_order)?;
        check_size(&header, self.config.size_limit())?;

        let mut payload = BytesMut::zeroed(header.payload_len());
        let n = self.read_full(&mut payload).await?;
        if n < payload.len() {
            return Err(FrameError::Truncated {
                expected: header.size as usize,
                received: HEADER_SIZE + n,
            });
        }
        Ok((header, payload))
    }

    async fn read_full(&mut self, buf: &mut [u8]) -> Result<usize> {
        let mut filled = 0usize;
        while filled < buf.len() {
            let n = self
                .inner
                .recv_with_ancillary(
                    &mut buf[filled..],
                    self.config.max_fds_per_read,
                    &mut self.ancillary,
                )
                .await
                .map_err(transport_error)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        Ok(filled)
    }

    pub fn get_ref(&self) -> &AsyncWireStream {
        &self.inner
    }

    pub fn into_inner(self) -> AsyncWireStream {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

/// Async counterpart of [`MessageWriter`](crate::MessageWriter).
pub struct AsyncMessageWriter {
    inner: AsyncWireStream,
    config: FrameConfig,
}

impl AsyncMessageWriter {
    pub fn new(inner: AsyncWireStream) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    pub fn with_config(inner: AsyncWireStream, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Start a message in this writer's byte order.
    pub fn builder(&self, sender: u32, opcode: u16) -> MessageBuilder {
        MessageBuilder::with_order(sender, opcode, self.config.byte_order)
    }

    /// Send a complete message, descriptors on the first send.
    pub async fn send(&mut self, message: OutgoingMessage) -> Result<()> {
        let limit = self.config.size_limit();
        if message.size() as usize > limit {
            return Err(FrameError::MessageTooLarge {
                size: message.size() as usize,
                max: limit,
            });
        }

        let bytes = message.as_bytes();
        let fds = message.borrowed_fds();
        let mut pending = fds.as_slice();
        let mut offset = 0usize;
        while offset < bytes.len() {
            match self.inner.send_with_fds(&bytes[offset..], pending).await {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => {
                    offset += n;
                    pending = &[];
                }
                Err(err)
                    if matches!(
                        err.kind(),
                        io::ErrorKind::BrokenPipe | io::ErrorKind::ConnectionReset
                    ) =>
                {
                    return Err(FrameError::ConnectionClosed)
                }
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
        debug!(
            sender = message.sender(),
            opcode = message.opcode(),
            size = message.size(),
            fds = fds.len(),
            "sent message"
        );
        Ok(())
    }

    pub fn get_ref(&self) -> &AsyncWireStream {
        &self.inner
    }

    pub fn into_inner(self) -> AsyncWireStream {
        self.inner
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

fn transport_error(err: TransportError) -> FrameError {
    read_error(io::Error::from(err))
}
