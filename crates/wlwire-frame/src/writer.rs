use std::io::{self, ErrorKind};
use std::os::fd::BorrowedFd;

use tracing::debug;
use wlwire_transport::{AncillaryWrite, WireStream};

use crate::builder::{MessageBuilder, OutgoingMessage};
use crate::codec::FrameConfig;
use crate::error::{FrameError, Result};

/// Writes complete messages, with their descriptors, to a socket.
///
/// All descriptors of a message ride on the first send that carries any of
/// its bytes, so a peer reading message by message always finds them before
/// the payload that refers to them.
pub struct MessageWriter<S> {
    inner: S,
    config: FrameConfig,
}

impl<S: AncillaryWrite> MessageWriter<S> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: S, config: FrameConfig) -> Self {
        Self { inner, config }
    }

    /// Start a message in this writer's byte order.
    pub fn builder(&self, sender: u32, opcode: u16) -> MessageBuilder {
        MessageBuilder::with_order(sender, opcode, self.config.byte_order)
    }

    /// Send a complete message (blocking). The descriptors it carries are
    /// closed locally once the kernel holds its own references.
    pub fn send(&mut self, message: OutgoingMessage) -> Result<()> {
        let limit = self.config.size_limit();
        if message.size() as usize > limit {
            return Err(FrameError::MessageTooLarge {
                size: message.size() as usize,
                max: limit,
            });
        }
        if message.byte_order() != self.config.byte_order {
            debug!(
                message = %message.byte_order(),
                writer = %self.config.byte_order,
                "sending message encoded in a different byte order"
            );
        }

        let fds = message.borrowed_fds();
        write_all_with_fds(&mut self.inner, message.as_bytes(), &fds)?;
        debug!(
            sender = message.sender(),
            opcode = message.opcode(),
            size = message.size(),
            fds = fds.len(),
            "sent message"
        );
        self.flush()
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush_stream() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Current message writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageWriter<WireStream> {
    /// Create a message writer for `WireStream` and apply write timeout from config.
    pub fn with_config_stream(inner: WireStream, config: FrameConfig) -> Result<Self> {
        inner.set_write_timeout(config.write_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

fn write_all_with_fds<S: AncillaryWrite>(
    stream: &mut S,
    bytes: &[u8],
    fds: &[BorrowedFd<'_>],
) -> Result<()> {
    let mut offset = 0usize;
    let mut pending = fds;
    while offset < bytes.len() {
        match stream.send_with_fds(&bytes[offset..], pending) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => {
                offset += n;
                pending = &[];
            }
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) if err.kind() == ErrorKind::WouldBlock => continue,
            Err(err) if is_closed(&err) => return Err(FrameError::ConnectionClosed),
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

fn is_closed(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        ErrorKind::BrokenPipe | ErrorKind::ConnectionReset
    )
}
