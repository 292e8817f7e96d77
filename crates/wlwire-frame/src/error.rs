use wlwire_transport::{ControlError, TransportError};

/// Errors that end a connection: the stream or its framing is unusable.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The transport failed underneath the framer.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// An I/O error occurred while reading or writing messages.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed on a message boundary.
    #[error("connection closed")]
    ConnectionClosed,

    /// The connection ended part way through a message.
    #[error("truncated message ({received} of {expected} bytes)")]
    Truncated { expected: usize, received: usize },

    /// The header declares a size smaller than the header itself.
    #[error("invalid message size {size} (minimum 8)")]
    InvalidSize { size: u16 },

    /// The message exceeds the configured maximum size.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Ancillary data could not be parsed; descriptor accounting is lost.
    #[error("control message error: {0}")]
    Control(#[from] ControlError),

    /// Building or decoding message contents failed.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}

/// Errors from decoding or encoding individual arguments.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    /// The payload ended before the field did.
    #[error("payload truncated (needed {needed} bytes, {remaining} remaining)")]
    Truncated { needed: usize, remaining: usize },

    /// A string declared length zero; the terminator is always counted.
    #[error("string has zero length")]
    ZeroLengthString,

    /// The byte before a string's padding was not NUL.
    #[error("string is not null-terminated")]
    MalformedString,

    /// String contents were not UTF-8.
    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    /// A descriptor argument was decoded but none were left.
    #[error("no more file descriptors (argument {index})")]
    DescriptorUnderflow { index: usize },

    /// A length does not fit the 32-bit length prefix.
    #[error("length {len} does not fit in a 32-bit prefix")]
    LengthOverflow { len: usize },

    /// The encoded message does not fit the 16-bit size field.
    #[error("message too large ({size} bytes, max {max})")]
    MessageTooLarge { size: usize, max: usize },

    /// Payload bytes were left after the last expected argument.
    #[error("{count} trailing payload bytes")]
    TrailingBytes { count: usize },

    /// Descriptors were left after the last expected argument.
    #[error("{count} unconsumed file descriptors")]
    TrailingDescriptors { count: usize },

    /// The caller supplied a value that does not match the declared type.
    /// This is a programming error, not corrupt input.
    #[error("type contract violation: expected {expected}, got {found}")]
    TypeContract { expected: String, found: String },
}

impl CodecError {
    /// True for caller programming errors as opposed to bad input.
    pub fn is_type_contract(&self) -> bool {
        matches!(self, CodecError::TypeContract { .. })
    }
}

/// Errors from parsing a signature string.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SignatureError {
    /// A character that names no wire type.
    #[error("unknown argument type {ch:?} at position {position}")]
    UnknownType { ch: char, position: usize },

    /// A `[` without a matching `]`, or the reverse.
    #[error("unbalanced sequence bracket at position {position}")]
    Unbalanced { position: usize },

    /// `[]` names no element type.
    #[error("sequence without element type at position {position}")]
    EmptySequence { position: usize },
}

pub type Result<T> = std::result::Result<T, FrameError>;
