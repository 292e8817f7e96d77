use std::fmt;
use std::os::fd::{AsFd, BorrowedFd, OwnedFd};

use bytes::{BufMut, Bytes, BytesMut};

use crate::arg::{type_contract, Arg, WireArg};
use crate::codec::{Header, HEADER_SIZE, MAX_MESSAGE_SIZE};
use crate::error::CodecError;
use crate::fixed::Fixed;
use crate::message::{padding_for, Message};
use crate::order::ByteOrder;
use crate::signature::Signature;

/// Builds one outgoing message, argument by argument.
///
/// ```
/// use wlwire_frame::{MessageBuilder, NewId};
///
/// let mut builder = MessageBuilder::new(1, 0);
/// builder.put(NewId::new("wl_compositor", 4))?.put(2u32)?;
/// let message = builder.finish()?;
/// assert_eq!(message.size() as usize, message.as_bytes().len());
/// # Ok::<(), wlwire_frame::CodecError>(())
/// ```
pub struct MessageBuilder {
    sender: u32,
    opcode: u16,
    order: ByteOrder,
    payload: BytesMut,
    fds: Vec<OwnedFd>,
}

impl MessageBuilder {
    /// Start a message in host byte order.
    pub fn new(sender: u32, opcode: u16) -> Self {
        Self::with_order(sender, opcode, ByteOrder::native())
    }

    pub fn with_order(sender: u32, opcode: u16, order: ByteOrder) -> Self {
        Self {
            sender,
            opcode,
            order,
            payload: BytesMut::new(),
            fds: Vec::new(),
        }
    }

    /// Append a typed argument.
    pub fn put<T: WireArg>(&mut self, value: T) -> Result<&mut Self, CodecError> {
        self.append(|out| value.encode(out))
    }

    /// Append a runtime-typed argument.
    pub fn put_arg(&mut self, arg: Arg) -> Result<&mut Self, CodecError> {
        self.append(|out| arg.encode(out))
    }

    /// Append one argument per entry of `signature`, checking each against
    /// its declared type.
    ///
    /// Every argument is checked before the first is written; on error the
    /// builder holds exactly what it held before the call.
    pub fn put_args(&mut self, signature: &Signature, args: Vec<Arg>) -> Result<&mut Self, CodecError> {
        if signature.len() != args.len() {
            return Err(CodecError::TypeContract {
                expected: format!("{} arguments ({signature})", signature.len()),
                found: format!("{} arguments", args.len()),
            });
        }
        let types = signature.types();
        if let Some((ty, arg)) = types.iter().zip(&args).find(|(ty, arg)| !arg.conforms_to(ty)) {
            return Err(type_contract(ty, arg));
        }
        self.append(|out| {
            for (ty, arg) in types.iter().zip(args) {
                arg.encode_as(ty, out)?;
            }
            Ok(())
        })
    }

    /// Run `encode`, discarding whatever it wrote if it fails. Descriptors it
    /// queued are closed with the discarded bytes.
    fn append<F>(&mut self, encode: F) -> Result<&mut Self, CodecError>
    where
        F: FnOnce(&mut Self) -> Result<(), CodecError>,
    {
        let payload_len = self.payload.len();
        let fd_count = self.fds.len();
        if let Err(err) = encode(self) {
            self.payload.truncate(payload_len);
            self.fds.truncate(fd_count);
            return Err(err);
        }
        Ok(self)
    }

    pub fn put_u32(&mut self, value: u32) {
        self.order.put_u32(&mut self.payload, value);
    }

    pub fn put_i32(&mut self, value: i32) {
        self.order.put_i32(&mut self.payload, value);
    }

    pub fn put_fixed(&mut self, value: Fixed) {
        self.put_i32(value.to_bits());
    }

    /// Length prefix (including the terminator), bytes, NUL, zero padding.
    pub fn put_string(&mut self, value: &str) -> Result<(), CodecError> {
        let len = value.len() + 1;
        self.put_len(len)?;
        self.payload.put_slice(value.as_bytes());
        self.payload.put_u8(0);
        self.payload.put_bytes(0, padding_for(len));
        Ok(())
    }

    /// Length prefix, bytes, zero padding.
    pub fn put_array(&mut self, value: &[u8]) -> Result<(), CodecError> {
        self.put_len(value.len())?;
        self.payload.put_slice(value);
        self.payload.put_bytes(0, padding_for(value.len()));
        Ok(())
    }

    /// Element count of a sequence.
    pub fn put_count(&mut self, count: usize) -> Result<(), CodecError> {
        self.put_len(count)
    }

    /// Queue a descriptor; it is sent with the message and closed locally
    /// once sent.
    pub fn push_fd(&mut self, fd: OwnedFd) {
        self.fds.push(fd);
    }

    /// Payload bytes written so far.
    pub fn payload_len(&self) -> usize {
        self.payload.len()
    }

    /// Prepend the header and seal the message.
    pub fn finish(self) -> Result<OutgoingMessage, CodecError> {
        let total = HEADER_SIZE + self.payload.len();
        if total > MAX_MESSAGE_SIZE {
            return Err(CodecError::MessageTooLarge {
                size: total,
                max: MAX_MESSAGE_SIZE,
            });
        }

        let header = Header {
            sender: self.sender,
            opcode: self.opcode,
            size: total as u16,
        };
        let mut bytes = BytesMut::with_capacity(total);
        header.encode(self.order, &mut bytes);
        bytes.put_slice(&self.payload);

        Ok(OutgoingMessage {
            header,
            order: self.order,
            bytes: bytes.freeze(),
            fds: self.fds,
        })
    }

    fn put_len(&mut self, len: usize) -> Result<(), CodecError> {
        let len = u32::try_from(len).map_err(|_| CodecError::LengthOverflow { len })?;
        self.put_u32(len);
        Ok(())
    }
}

impl fmt::Debug for MessageBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageBuilder")
            .field("sender", &self.sender)
            .field("opcode", &self.opcode)
            .field("payload_len", &self.payload.len())
            .field("fds", &self.fds.len())
            .finish()
    }
}

/// A fully encoded message with the descriptors to send alongside it.
#[derive(Debug)]
pub struct OutgoingMessage {
    header: Header,
    order: ByteOrder,
    bytes: Bytes,
    fds: Vec<OwnedFd>,
}

impl OutgoingMessage {
    pub fn sender(&self) -> u32 {
        self.header.sender
    }

    pub fn opcode(&self) -> u16 {
        self.header.opcode
    }

    /// Total size including the header.
    pub fn size(&self) -> u16 {
        self.header.size
    }

    pub fn byte_order(&self) -> ByteOrder {
        self.order
    }

    /// Header and payload exactly as they go on the wire.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Payload without the header.
    pub fn payload(&self) -> &[u8] {
        &self.bytes[HEADER_SIZE..]
    }

    pub fn fds(&self) -> &[OwnedFd] {
        &self.fds
    }

    pub(crate) fn borrowed_fds(&self) -> Vec<BorrowedFd<'_>> {
        self.fds.iter().map(AsFd::as_fd).collect()
    }

    /// Turn this message into a received one without a socket in between.
    pub fn into_message(self) -> Message {
        let payload = self.bytes.slice(HEADER_SIZE..);
        Message::framed(self.header, payload, self.fds, self.order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::pack_header_word;

    #[test]
    fn header_is_prepended_with_total_size() {
        let mut builder = MessageBuilder::with_order(7, 3, ByteOrder::Little);
        builder.put_u32(1);
        builder.put_u32(2);
        let msg = builder.finish().unwrap();

        assert_eq!(msg.size(), 16);
        assert_eq!(&msg.as_bytes()[..4], &7u32.to_le_bytes());
        assert_eq!(&msg.as_bytes()[4..8], &pack_header_word(16, 3).to_le_bytes());
        assert_eq!(msg.payload().len(), 8);
    }

    #[test]
    fn string_layout_is_terminated_and_padded() {
        for (text, total) in [("", 8), ("abc", 8), ("abcd", 12), ("hello", 12)] {
            let mut builder = MessageBuilder::with_order(1, 0, ByteOrder::Little);
            builder.put_string(text).unwrap();
            let payload = builder.payload.clone();

            assert_eq!(payload.len(), 4 + (text.len() + 1).div_ceil(4) * 4, "{text:?}");
            assert_eq!(payload.len(), total, "{text:?}");
            assert_eq!(&payload[..4], &((text.len() + 1) as u32).to_le_bytes());
            assert_eq!(payload[4 + text.len()], 0, "{text:?}");
        }
    }

    #[test]
    fn array_layout_is_padded_without_terminator() {
        let mut builder = MessageBuilder::with_order(1, 0, ByteOrder::Big);
        builder.put_array(&[9, 8, 7, 6, 5]).unwrap();
        assert_eq!(builder.payload.as_ref(), &[0, 0, 0, 5, 9, 8, 7, 6, 5, 0, 0, 0]);
    }

    #[test]
    fn oversized_message_is_rejected() {
        let mut builder = MessageBuilder::new(1, 0);
        builder.put_array(&vec![0u8; MAX_MESSAGE_SIZE]).unwrap();
        assert!(matches!(
            builder.finish(),
            Err(CodecError::MessageTooLarge { .. })
        ));
    }

    #[test]
    fn largest_message_fits() {
        let mut builder = MessageBuilder::new(1, 0);
        // Payloads are word aligned, so the largest total is 65532.
        builder.put_array(&vec![0u8; 65520]).unwrap();
        assert_eq!(builder.finish().unwrap().size(), 65532);
    }

    #[test]
    fn into_message_exposes_same_fields() {
        let mut builder = MessageBuilder::new(4, 2);
        builder.put_i32(-5);
        let mut msg = builder.finish().unwrap().into_message();

        assert_eq!((msg.sender(), msg.opcode(), msg.size()), (4, 2, 12));
        assert_eq!(msg.read_i32().unwrap(), -5);
        msg.finish().unwrap();
    }
}
