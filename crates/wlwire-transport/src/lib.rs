//! Unix domain socket transport with descriptor passing.
//!
//! This is the lowest layer of wlwire. It provides:
//! - [`WireListener`] endpoints and [`WireStream`] connections
//! - One-call receive of bytes plus ancillary data ([`AncillaryRead`])
//! - One-call send of bytes plus `SCM_RIGHTS` descriptors ([`AncillaryWrite`])
//! - Parsing of accumulated control-message records ([`control`])
//!
//! Only Unix targets are supported; on other targets the crate is empty.

#![cfg(unix)]

pub mod ancillary;
pub mod control;
pub mod error;
pub mod listener;
pub mod stream;

#[cfg(feature = "async")]
pub mod async_stream;

pub use ancillary::{AncillaryRead, AncillaryReader, AncillaryWrite, DEFAULT_MAX_FDS};
pub use control::{ControlError, ControlMessage, ControlMessages, SCM_MAX_FD};
pub use error::{Result, TransportError};
pub use listener::{resolve_socket_path, WireListener, DEFAULT_SOCKET_MODE};
pub use stream::{PeerCredentials, WireStream};

#[cfg(feature = "async")]
pub use async_stream::AsyncWireStream;
