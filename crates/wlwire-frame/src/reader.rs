use std::io::{self, ErrorKind, Read};

use bytes::BytesMut;
use tracing::debug;
use wlwire_transport::control::{close_descriptors, take_descriptors};
use wlwire_transport::{AncillaryRead, AncillaryReader, TransportError, WireStream};

use crate::codec::{FrameConfig, Header, HEADER_SIZE};
use crate::error::{FrameError, Result};
use crate::message::Message;

const INITIAL_ANCILLARY_CAPACITY: usize = 256;

/// Reads complete messages, with their descriptors, from a socket.
///
/// Each call to [`read_message`](Self::read_message) reads exactly one
/// message: header, then payload, then the descriptors that arrived on any
/// of those reads. Nothing is read ahead, so descriptors belonging to the
/// next message stay in the kernel.
pub struct MessageReader<S> {
    inner: S,
    ancillary: Vec<u8>,
    config: FrameConfig,
}

impl<S: AncillaryRead> MessageReader<S> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: S) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: S, config: FrameConfig) -> Self {
        Self {
            inner,
            ancillary: Vec::with_capacity(INITIAL_ANCILLARY_CAPACITY),
            config,
        }
    }

    /// Read the next complete message (blocking).
    ///
    /// Returns `Err(FrameError::ConnectionClosed)` when EOF is reached on a
    /// message boundary. Any other error leaves the stream desynchronized.
    pub fn read_message(&mut self) -> Result<Message> {
        self.ancillary.clear();
        let framed = self.read_envelope();
        finish_envelope(framed, &self.ancillary, &self.config)
    }

    fn read_envelope(&mut self) -> Result<(Header, BytesMut)> {
        let order = self.config.byte_order;
        let limit = self.config.size_limit();
        let mut reader = AncillaryReader::with_max_fds(
            &mut self.inner,
            &mut self.ancillary,
            self.config.max_fds_per_read,
        );

        let mut raw = [0u8; HEADER_SIZE];
        let n = read_full(&mut reader, &mut raw[..4])?;
        if n == 0 {
            return Err(FrameError::ConnectionClosed);
        }
        if n < 4 {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: n,
            });
        }
        let n = read_full(&mut reader, &mut raw[4..])?;
        if n < 4 {
            return Err(FrameError::Truncated {
                expected: HEADER_SIZE,
                received: 4 + n,
            });
        }

        let header = Header::decode(raw, order)?;
        check_size(&header, limit)?;

        let mut payload = BytesMut::zeroed(header.payload_len());
        let n = read_full(&mut reader, &mut payload)?;
        if n < payload.len() {
            return Err(FrameError::Truncated {
                expected: header.size as usize,
                received: HEADER_SIZE + n,
            });
        }

        Ok((header, payload))
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> S {
        self.inner
    }

    /// Current message reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageReader<WireStream> {
    /// Create a message reader for `WireStream` and apply read timeout from config.
    pub fn with_config_stream(inner: WireStream, config: FrameConfig) -> Result<Self> {
        inner.set_read_timeout(config.read_timeout)?;
        Ok(Self::with_config(inner, config))
    }
}

pub(crate) fn check_size(header: &Header, limit: usize) -> Result<()> {
    if header.size as usize > limit {
        return Err(FrameError::MessageTooLarge {
            size: header.size as usize,
            max: limit,
        });
    }
    Ok(())
}

/// Attach descriptors to a framed payload, or release them if framing failed.
pub(crate) fn finish_envelope(
    framed: Result<(Header, BytesMut)>,
    ancillary: &[u8],
    config: &FrameConfig,
) -> Result<Message> {
    let (header, payload) = match framed {
        Ok(framed) => framed,
        Err(err) => {
            // SAFETY: the buffer only holds control data from this
            // connection's receives, not yet claimed by anyone.
            let closed = unsafe { close_descriptors(ancillary) };
            if closed > 0 {
                debug!(closed, "closed descriptors of unreadable message");
            }
            return Err(err);
        }
    };

    // SAFETY: as above; ownership moves into the message.
    let fds = match unsafe { take_descriptors(ancillary) } {
        Ok(fds) => fds,
        Err(err) => {
            let closed = unsafe { close_descriptors(ancillary) };
            debug!(closed, %err, "ancillary data unusable");
            return Err(err.into());
        }
    };

    debug!(
        sender = header.sender,
        opcode = header.opcode,
        size = header.size,
        fds = fds.len(),
        "framed message"
    );
    Ok(Message::framed(
        header,
        payload.freeze(),
        fds,
        config.byte_order,
    ))
}

/// Fill `buf`, stopping early only at EOF. Returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> Result<usize> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(read_error(err)),
        }
    }
    Ok(filled)
}

/// Recover the typed transport error carried through `io::Read`.
pub(crate) fn read_error(err: io::Error) -> FrameError {
    if !err
        .get_ref()
        .is_some_and(|inner| inner.is::<TransportError>())
    {
        return FrameError::Io(err);
    }
    let kind = err.kind();
    match err.into_inner().map(|inner| inner.downcast::<TransportError>()) {
        Some(Ok(transport)) => FrameError::Transport(*transport),
        Some(Err(other)) => FrameError::Io(io::Error::new(kind, other)),
        None => FrameError::Io(io::Error::from(kind)),
    }
}
