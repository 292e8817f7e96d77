//! Byte order of the wire.
//!
//! The protocol uses the host's order. It is carried as a value in
//! [`FrameConfig`](crate::FrameConfig) so the codec can be driven with either
//! order regardless of the machine it runs on.

use std::fmt;
use std::str::FromStr;

use bytes::{Buf, BufMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ByteOrder {
    Little,
    Big,
}

impl ByteOrder {
    /// Order of the machine this was compiled for.
    pub const fn native() -> Self {
        if cfg!(target_endian = "big") {
            ByteOrder::Big
        } else {
            ByteOrder::Little
        }
    }

    pub fn u32_from_bytes(self, bytes: [u8; 4]) -> u32 {
        match self {
            ByteOrder::Little => u32::from_le_bytes(bytes),
            ByteOrder::Big => u32::from_be_bytes(bytes),
        }
    }

    pub fn u32_to_bytes(self, value: u32) -> [u8; 4] {
        match self {
            ByteOrder::Little => value.to_le_bytes(),
            ByteOrder::Big => value.to_be_bytes(),
        }
    }

    /// Read a `u32`. The caller checks that four bytes remain.
    pub fn get_u32(self, buf: &mut impl Buf) -> u32 {
        match self {
            ByteOrder::Little => buf.get_u32_le(),
            ByteOrder::Big => buf.get_u32(),
        }
    }

    /// Read an `i32`. The caller checks that four bytes remain.
    pub fn get_i32(self, buf: &mut impl Buf) -> i32 {
        match self {
            ByteOrder::Little => buf.get_i32_le(),
            ByteOrder::Big => buf.get_i32(),
        }
    }

    pub fn put_u32(self, buf: &mut impl BufMut, value: u32) {
        match self {
            ByteOrder::Little => buf.put_u32_le(value),
            ByteOrder::Big => buf.put_u32(value),
        }
    }

    pub fn put_i32(self, buf: &mut impl BufMut, value: i32) {
        match self {
            ByteOrder::Little => buf.put_i32_le(value),
            ByteOrder::Big => buf.put_i32(value),
        }
    }
}

impl Default for ByteOrder {
    fn default() -> Self {
        Self::native()
    }
}

impl fmt::Display for ByteOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ByteOrder::Little => f.write_str("little"),
            ByteOrder::Big => f.write_str("big"),
        }
    }
}

impl FromStr for ByteOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "native" => Ok(Self::native()),
            "little" | "le" => Ok(ByteOrder::Little),
            "big" | "be" => Ok(ByteOrder::Big),
            other => Err(format!("unknown byte order: {other}")),
        }
    }
}
