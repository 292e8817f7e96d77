//! Message framing and argument codec for the Wayland-style wire protocol.
//!
//! Every message starts with an 8-byte header:
//! - A 4-byte sender object id
//! - A 4-byte word holding the total size (high 16 bits) and opcode (low 16)
//!
//! Integers are in an explicit [`ByteOrder`], host order by default. The
//! payload is a sequence of 32-bit aligned arguments; descriptors travel
//! out of band and are handed out in arrival order.

#![cfg(unix)]

pub mod arg;
#[cfg(feature = "async")]
pub mod async_io;
pub mod builder;
pub mod codec;
pub mod error;
pub mod fixed;
pub mod message;
pub mod order;
pub mod reader;
pub mod signature;
pub mod writer;

pub use arg::{Arg, ArgType, NewId, WireArg};
#[cfg(feature = "async")]
pub use async_io::{AsyncMessageReader, AsyncMessageWriter};
pub use builder::{MessageBuilder, OutgoingMessage};
pub use codec::{
    decode_message, pack_header_word, unpack_header_word, FrameConfig, Header, HEADER_SIZE,
    MAX_MESSAGE_SIZE,
};
pub use error::{CodecError, FrameError, Result, SignatureError};
pub use fixed::Fixed;
pub use message::{padding_for, Message};
pub use order::ByteOrder;
pub use reader::MessageReader;
pub use signature::Signature;
pub use writer::MessageWriter;
