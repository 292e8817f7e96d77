use std::collections::VecDeque;
use std::fmt;
use std::os::fd::OwnedFd;

use bytes::{Buf, Bytes};
use tracing::warn;

use crate::arg::{Arg, ArgType, WireArg};
use crate::codec::Header;
use crate::error::CodecError;
use crate::fixed::Fixed;
use crate::order::ByteOrder;
use crate::signature::Signature;

/// One framed message: header fields, a forward-only payload cursor and the
/// descriptors that arrived with it.
///
/// Arguments must be decoded in the order they were encoded. Descriptors
/// move out to the caller one at a time; any left when the message is
/// dropped are closed and logged. Call [`Message::finish`] to turn leftovers
/// into an error instead.
pub struct Message {
    sender: u32,
    opcode: u16,
    size: u16,
    payload: Bytes,
    fds: VecDeque<OwnedFd>,
    fd_index: usize,
    order: ByteOrder,
}

impl Message {
    pub(crate) fn framed(header: Header, payload: Bytes, fds: Vec<OwnedFd>, order: ByteOrder) -> Self {
        Self {
            sender: header.sender,
            opcode: header.opcode,
            size: header.size,
            payload,
            fds: fds.into(),
            fd_index: 0,
            order,
        }
    }

    /// Object id of the sender.
    pub fn sender(&self) -> u32 {
        self.sender
    }

    /// Opcode of the message.
    pub fn opcode(&self) -> u16 {
        self.opcode
    }

    /// Total size of the message, including the 8 byte header.
    pub fn size(&self) -> u16 {
        self.size
    }

    /// Byte order the payload is read with.
    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Payload bytes not yet decoded.
    pub fn remaining(&self) -> usize {
        self.payload.remaining()
    }

    pub fn remaining_bytes(&self) -> &[u8] {
        self.payload.chunk()
    }

    /// Descriptors not yet decoded.
    pub fn remaining_fds(&self) -> usize {
        self.fds.len()
    }

    /// Descriptors handed out so far.
    pub fn fds_consumed(&self) -> usize {
        self.fd_index
    }

    /// Decode the next argument as `T`.
    pub fn decode<T: WireArg>(&mut self) -> Result<T, CodecError> {
        T::decode(self)
    }

    /// Decode the next argument as the runtime type `ty`.
    pub fn decode_arg(&mut self, ty: &ArgType) -> Result<Arg, CodecError> {
        Arg::decode(self, ty)
    }

    /// Decode one argument per entry of `signature`, in order.
    ///
    /// All or nothing: if any argument fails, the ones already decoded are
    /// dropped and descriptors among them are closed. Callers that need to
    /// keep earlier descriptors decode with [`decode_arg`](Self::decode_arg)
    /// one entry at a time.
    pub fn decode_args(&mut self, signature: &Signature) -> Result<Vec<Arg>, CodecError> {
        signature
            .types()
            .iter()
            .map(|ty| self.decode_arg(ty))
            .collect()
    }

    /// Check that every byte and descriptor was consumed.
    ///
    /// Leftover descriptors are closed before the error is returned.
    pub fn finish(mut self) -> Result<(), CodecError> {
        if self.payload.has_remaining() {
            return Err(CodecError::TrailingBytes {
                count: self.payload.remaining(),
            });
        }
        let leftover = std::mem::take(&mut self.fds);
        if !leftover.is_empty() {
            return Err(CodecError::TrailingDescriptors {
                count: leftover.len(),
            });
        }
        Ok(())
    }

    /// Take every descriptor not yet decoded.
    pub fn take_remaining_fds(&mut self) -> Vec<OwnedFd> {
        let taken: Vec<OwnedFd> = self.fds.drain(..).collect();
        self.fd_index += taken.len();
        taken
    }

    pub fn read_u32(&mut self) -> Result<u32, CodecError> {
        self.ensure(4)?;
        Ok(self.order.get_u32(&mut self.payload))
    }

    pub fn read_i32(&mut self) -> Result<i32, CodecError> {
        self.ensure(4)?;
        Ok(self.order.get_i32(&mut self.payload))
    }

    pub fn read_fixed(&mut self) -> Result<Fixed, CodecError> {
        self.read_i32().map(Fixed::from_bits)
    }

    /// Length-prefixed, NUL-terminated, padded string.
    ///
    /// The length counts the terminator, so zero is invalid. The terminator
    /// is checked before the padding is required, so a bad terminator is
    /// reported as such even on a short payload.
    pub fn read_string(&mut self) -> Result<String, CodecError> {
        let len = self.read_u32()? as usize;
        if len == 0 {
            return Err(CodecError::ZeroLengthString);
        }
        self.ensure(len)?;
        if self.payload[len - 1] != 0 {
            return Err(CodecError::MalformedString);
        }

        let mut field = self.split_padded(len)?;
        field.truncate(len - 1);
        String::from_utf8(field.to_vec()).map_err(|_| CodecError::InvalidUtf8)
    }

    /// Length-prefixed, padded opaque bytes.
    pub fn read_array(&mut self) -> Result<Bytes, CodecError> {
        let len = self.read_u32()? as usize;
        let mut field = self.split_padded(len)?;
        field.truncate(len);
        Ok(field)
    }

    /// Hand the next descriptor to the caller.
    pub fn take_fd(&mut self) -> Result<OwnedFd, CodecError> {
        let fd = self.fds.pop_front().ok_or(CodecError::DescriptorUnderflow {
            index: self.fd_index,
        })?;
        self.fd_index += 1;
        Ok(fd)
    }

    fn ensure(&self, needed: usize) -> Result<(), CodecError> {
        let remaining = self.payload.remaining();
        if remaining < needed {
            return Err(CodecError::Truncated { needed, remaining });
        }
        Ok(())
    }

    fn split_padded(&mut self, len: usize) -> Result<Bytes, CodecError> {
        let padded = len
            .checked_add(padding_for(len))
            .ok_or(CodecError::LengthOverflow { len })?;
        self.ensure(padded)?;
        Ok(self.payload.split_to(padded))
    }
}

/// Bytes of padding after a field of `len` bytes to reach a 4-byte boundary.
pub const fn padding_for(len: usize) -> usize {
    (4 - len % 4) % 4
}

impl Drop for Message {
    fn drop(&mut self) {
        if !self.fds.is_empty() {
            warn!(
                sender = self.sender,
                opcode = self.opcode,
                count = self.fds.len(),
                "closing undecoded file descriptors"
            );
        }
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Message")
            .field("sender", &self.sender)
            .field("opcode", &self.opcode)
            .field("size", &self.size)
            .field("remaining", &self.payload.remaining())
            .field("fds", &self.fds.len())
            .field("fd_index", &self.fd_index)
            .finish()
    }
}
