//! Wire-level codec for Wayland-style RPC over Unix domain sockets.
//!
//! Messages are framed by an 8-byte header and carry 32-bit aligned
//! arguments; file descriptors travel alongside as `SCM_RIGHTS` ancillary
//! data and are matched to `fd` arguments in arrival order.
//!
//! # Crate Structure
//!
//! - [`transport`]: sockets that carry bytes and descriptors together
//! - [`frame`]: message framing, fixed-point numbers and the argument codec

/// Re-export transport types.
pub mod transport {
    pub use wlwire_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use wlwire_frame::*;
}
