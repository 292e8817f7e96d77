//! Socket control-message (`cmsghdr`) records.
//!
//! Ancillary bytes are accumulated across several receive calls and parsed
//! afterwards, so records are read out of a plain byte buffer rather than
//! through `CMSG_FIRSTHDR`/`CMSG_NXTHDR` on a live `msghdr`. The buffer has no
//! alignment guarantee; headers are copied out with `read_unaligned`.

use std::mem::size_of;
use std::os::fd::{FromRawFd, OwnedFd, RawFd};

use tracing::trace;

/// Kernel limit on descriptors carried by a single `SCM_RIGHTS` record.
pub const SCM_MAX_FD: usize = 253;

/// Errors from parsing control-message records.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ControlError {
    /// A record header is inconsistent with the buffer it sits in.
    #[error("malformed control message at offset {offset} (length {len}, {available} bytes available)")]
    Malformed {
        offset: usize,
        len: usize,
        available: usize,
    },

    /// The record is valid but does not carry descriptors.
    #[error("control message is not SCM_RIGHTS (level {level}, type {kind})")]
    NotRights { level: i32, kind: i32 },
}

/// One control-message record borrowed from an ancillary buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlMessage<'a> {
    /// Originating protocol (`cmsg_level`).
    pub level: i32,
    /// Protocol-specific type (`cmsg_type`).
    pub kind: i32,
    /// Record payload without header or trailing alignment.
    pub data: &'a [u8],
}

impl ControlMessage<'_> {
    /// Raw descriptors carried by an `SCM_RIGHTS` record.
    pub fn unix_rights(&self) -> Result<Vec<RawFd>, ControlError> {
        if self.level != libc::SOL_SOCKET || self.kind != libc::SCM_RIGHTS {
            return Err(ControlError::NotRights {
                level: self.level,
                kind: self.kind,
            });
        }

        Ok(self
            .data
            .chunks_exact(size_of::<RawFd>())
            .map(|chunk| {
                let mut raw = [0u8; size_of::<RawFd>()];
                raw.copy_from_slice(chunk);
                RawFd::from_ne_bytes(raw)
            })
            .collect())
    }
}

/// Iterator over the records in an ancillary buffer.
///
/// Yields at most one error, after which iteration stops. Trailing bytes too
/// short to hold a header are ignored.
#[derive(Debug, Clone)]
pub struct ControlMessages<'a> {
    bytes: &'a [u8],
    offset: usize,
    failed: bool,
}

impl<'a> ControlMessages<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            failed: false,
        }
    }
}

impl<'a> Iterator for ControlMessages<'a> {
    type Item = Result<ControlMessage<'a>, ControlError>;

    fn next(&mut self) -> Option<Self::Item> {
        let header_len = header_len();
        let rest = &self.bytes[self.offset..];
        if self.failed || rest.len() < header_len {
            return None;
        }

        // SAFETY: `rest` holds at least `CMSG_LEN(0)` bytes, which is never
        // smaller than `cmsghdr`; the read tolerates any alignment.
        let header: libc::cmsghdr =
            unsafe { std::ptr::read_unaligned(rest.as_ptr().cast::<libc::cmsghdr>()) };
        let len = header.cmsg_len as usize;

        if len < header_len || len > rest.len() {
            self.failed = true;
            return Some(Err(ControlError::Malformed {
                offset: self.offset,
                len,
                available: rest.len(),
            }));
        }

        let record = ControlMessage {
            level: header.cmsg_level,
            kind: header.cmsg_type,
            data: &rest[header_len..len],
        };

        let stride = space_for_bytes(len - header_len);
        self.offset = (self.offset + stride).min(self.bytes.len());
        Some(Ok(record))
    }
}

/// Parse every record in an ancillary buffer.
pub fn parse_control_messages(bytes: &[u8]) -> Result<Vec<ControlMessage<'_>>, ControlError> {
    ControlMessages::new(bytes).collect()
}

/// Promote every descriptor in an ancillary buffer to an owned handle, in
/// encounter order. Records that are not `SCM_RIGHTS` are skipped.
///
/// On a malformed record nothing is promoted and the error is returned; use
/// [`close_descriptors`] to release what can still be found.
///
/// # Safety
///
/// `bytes` must be control data delivered to this process by the kernel (or
/// built by the caller from descriptors it owns), and no other owner may
/// exist for the descriptors it names. Each descriptor is closed when its
/// `OwnedFd` is dropped.
pub unsafe fn take_descriptors(bytes: &[u8]) -> Result<Vec<OwnedFd>, ControlError> {
    let mut raw = Vec::new();
    for record in ControlMessages::new(bytes) {
        let record = record?;
        match record.unix_rights() {
            Ok(fds) => raw.extend(fds),
            Err(ControlError::NotRights { level, kind }) => {
                trace!(level, kind, "skipping non-rights control message");
            }
            Err(err) => return Err(err),
        }
    }

    // SAFETY: guaranteed by the caller.
    Ok(raw
        .into_iter()
        .map(|fd| unsafe { OwnedFd::from_raw_fd(fd) })
        .collect())
}

/// Close every descriptor found in an ancillary buffer, stopping at the first
/// malformed record. Returns how many were closed.
///
/// # Safety
///
/// Same contract as [`take_descriptors`].
pub unsafe fn close_descriptors(bytes: &[u8]) -> usize {
    let mut closed = 0usize;
    for record in ControlMessages::new(bytes) {
        let Ok(record) = record else { break };
        if let Ok(fds) = record.unix_rights() {
            for fd in fds {
                // SAFETY: guaranteed by the caller.
                drop(unsafe { OwnedFd::from_raw_fd(fd) });
                closed += 1;
            }
        }
    }
    closed
}

/// Build one `SCM_RIGHTS` record carrying `fds`, padded to `CMSG_SPACE`.
pub fn encode_rights(fds: &[RawFd]) -> Vec<u8> {
    let data_len = std::mem::size_of_val(fds);
    let mut buf = vec![0u8; space_for_bytes(data_len)];

    // SAFETY: zeroed `cmsghdr` is a valid value; padding fields on some libcs
    // stay zero.
    let mut header: libc::cmsghdr = unsafe { std::mem::zeroed() };
    header.cmsg_len = (header_len() + data_len) as _;
    header.cmsg_level = libc::SOL_SOCKET;
    header.cmsg_type = libc::SCM_RIGHTS;
    // SAFETY: `buf` holds at least `CMSG_LEN(0)` bytes.
    unsafe { std::ptr::write_unaligned(buf.as_mut_ptr().cast::<libc::cmsghdr>(), header) };

    let start = header_len();
    for (i, fd) in fds.iter().enumerate() {
        let at = start + i * size_of::<RawFd>();
        buf[at..at + size_of::<RawFd>()].copy_from_slice(&fd.to_ne_bytes());
    }
    buf
}

/// Control buffer size needed to receive `max_fds` descriptors in one call.
pub fn control_space(max_fds: usize) -> usize {
    space_for_bytes(max_fds * size_of::<RawFd>())
}

fn header_len() -> usize {
    // SAFETY: pure arithmetic on the platform alignment rules.
    unsafe { libc::CMSG_LEN(0) as usize }
}

fn space_for_bytes(data_len: usize) -> usize {
    // SAFETY: pure arithmetic on the platform alignment rules.
    unsafe { libc::CMSG_SPACE(data_len as u32) as usize }
}
