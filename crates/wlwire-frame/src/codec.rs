use bytes::{Buf, BytesMut};

use crate::error::{FrameError, Result};
use crate::message::Message;
use crate::order::ByteOrder;

/// Message header: sender (4) + size/opcode word (4) = 8 bytes.
pub const HEADER_SIZE: usize = 8;

/// Largest message the 16-bit size field can describe.
pub const MAX_MESSAGE_SIZE: usize = u16::MAX as usize;

/// Pack the second header word: size in the high half, opcode in the low.
pub const fn pack_header_word(size: u16, opcode: u16) -> u32 {
    ((size as u32) << 16) | opcode as u32
}

/// Split the second header word into `(size, opcode)`.
pub const fn unpack_header_word(word: u32) -> (u16, u16) {
    ((word >> 16) as u16, (word & 0xFFFF) as u16)
}

/// The fixed part of every message.
///
/// Wire format (byte order per [`FrameConfig::byte_order`]):
/// ```text
/// ┌───────────────┬──────────────────────────┬─────────────────────┐
/// │ Sender (4B)   │ Size << 16 | Opcode (4B) │ Payload             │
/// │ object id     │ one u32                  │ (Size - 8 bytes)    │
/// └───────────────┴──────────────────────────┴─────────────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Object id of the sender.
    pub sender: u32,
    /// Request or event number within the sender's interface.
    pub opcode: u16,
    /// Total size including this header.
    pub size: u16,
}

impl Header {
    pub fn decode(bytes: [u8; HEADER_SIZE], order: ByteOrder) -> Result<Self> {
        let sender = order.u32_from_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let word = order.u32_from_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let (size, opcode) = unpack_header_word(word);
        if (size as usize) < HEADER_SIZE {
            return Err(FrameError::InvalidSize { size });
        }
        Ok(Self {
            sender,
            opcode,
            size,
        })
    }

    pub fn encode(&self, order: ByteOrder, dst: &mut BytesMut) {
        dst.reserve(HEADER_SIZE);
        order.put_u32(dst, self.sender);
        order.put_u32(dst, pack_header_word(self.size, self.opcode));
    }

    /// Payload length declared by the header.
    pub fn payload_len(&self) -> usize {
        (self.size as usize).saturating_sub(HEADER_SIZE)
    }
}

/// Decode one message from a buffer of plain bytes (no descriptors).
///
/// Returns `Ok(None)` if the buffer doesn't contain a complete message yet.
/// On success, consumes the message bytes from the buffer.
pub fn decode_message(src: &mut BytesMut, order: ByteOrder) -> Result<Option<Message>> {
    if src.len() < HEADER_SIZE {
        return Ok(None); // Need more data
    }

    let mut raw = [0u8; HEADER_SIZE];
    raw.copy_from_slice(&src[..HEADER_SIZE]);
    let header = Header::decode(raw, order)?;

    if src.len() < header.size as usize {
        return Ok(None); // Need more data
    }

    src.advance(HEADER_SIZE);
    let payload = src.split_to(header.payload_len()).freeze();

    Ok(Some(Message::framed(header, payload, Vec::new(), order)))
}

/// Configuration for the message codec.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Byte order of every integer on the wire. Default: host order.
    pub byte_order: ByteOrder,
    /// Maximum total message size in bytes. Default and ceiling: 65535.
    pub max_message_size: usize,
    /// Descriptors each receive's control buffer is sized for. Default: 253.
    pub max_fds_per_read: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<std::time::Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<std::time::Duration>,
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            byte_order: ByteOrder::native(),
            max_message_size: MAX_MESSAGE_SIZE,
            max_fds_per_read: wlwire_transport::DEFAULT_MAX_FDS,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

impl FrameConfig {
    /// Default configuration with an explicit byte order.
    pub fn with_byte_order(byte_order: ByteOrder) -> Self {
        Self {
            byte_order,
            ..Self::default()
        }
    }

    pub(crate) fn size_limit(&self) -> usize {
        self.max_message_size.min(MAX_MESSAGE_SIZE)
    }
}
