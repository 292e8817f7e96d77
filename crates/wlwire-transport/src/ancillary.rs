//! Receive and send with ancillary data.
//!
//! A single `recvmsg(2)` returns ordinary bytes and the control data that
//! rode along with them. Both are handed to the caller from the same call so
//! descriptors can never be separated from the bytes they arrived with.

use std::io::{self, ErrorKind, Read, Write};
use std::os::fd::{AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::control::{close_descriptors, control_space, encode_rights, SCM_MAX_FD};
use crate::error::{Result, TransportError};

#[cfg(any(target_os = "linux", target_os = "android"))]
const RECV_FLAGS: libc::c_int = libc::MSG_CMSG_CLOEXEC;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const RECV_FLAGS: libc::c_int = 0;

#[cfg(any(target_os = "linux", target_os = "android"))]
const SEND_FLAGS: libc::c_int = libc::MSG_NOSIGNAL;
#[cfg(not(any(target_os = "linux", target_os = "android")))]
const SEND_FLAGS: libc::c_int = 0;

/// Default number of descriptors the receive control buffer is sized for.
pub const DEFAULT_MAX_FDS: usize = SCM_MAX_FD;

/// A stream that can deliver ancillary bytes alongside ordinary data.
///
/// # Safety
///
/// Descriptors named by the ancillary bytes an implementation hands out must
/// be owned by nobody else: the receiver promotes them to `OwnedFd` and
/// closes them. Kernel-delivered `SCM_RIGHTS` data satisfies this.
pub unsafe trait AncillaryRead {
    /// Perform exactly one receive. Ordinary bytes land in `buf`; raw control
    /// bytes are appended to `ancillary`. The control buffer is sized for
    /// `max_fds` descriptors.
    fn recv_with_ancillary<W: Write + ?Sized>(
        &mut self,
        buf: &mut [u8],
        max_fds: usize,
        ancillary: &mut W,
    ) -> Result<usize>;
}

/// A stream that can attach descriptors to outgoing bytes.
pub trait AncillaryWrite {
    /// Perform one send carrying `fds` in a single `SCM_RIGHTS` record.
    /// Returns how many bytes of `buf` were written.
    fn send_with_fds(&mut self, buf: &[u8], fds: &[BorrowedFd<'_>]) -> io::Result<usize>;

    /// Flush buffered data, if the stream buffers.
    fn flush_stream(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Presents an [`AncillaryRead`] stream as a plain [`Read`], collecting the
/// ancillary side channel into `ancillary`.
pub struct AncillaryReader<'a, S, W: ?Sized> {
    stream: &'a mut S,
    ancillary: &'a mut W,
    max_fds: usize,
}

impl<'a, S: AncillaryRead, W: Write + ?Sized> AncillaryReader<'a, S, W> {
    pub fn new(stream: &'a mut S, ancillary: &'a mut W) -> Self {
        Self::with_max_fds(stream, ancillary, DEFAULT_MAX_FDS)
    }

    pub fn with_max_fds(stream: &'a mut S, ancillary: &'a mut W, max_fds: usize) -> Self {
        Self {
            stream,
            ancillary,
            max_fds: max_fds.max(1),
        }
    }
}

impl<S: AncillaryRead, W: Write + ?Sized> Read for AncillaryReader<'_, S, W> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream
            .recv_with_ancillary(buf, self.max_fds, &mut *self.ancillary)
            .map_err(io::Error::from)
    }
}

/// Outcome of one `recvmsg` before the control bytes are handed off.
pub(crate) struct Received {
    pub(crate) len: usize,
    pub(crate) control: Vec<u8>,
    pub(crate) truncated: bool,
}

impl Received {
    /// Hand the control bytes to `ancillary` and fold both outcomes into one.
    pub(crate) fn deliver<W: Write + ?Sized>(
        self,
        ancillary: &mut W,
        max_fds: usize,
    ) -> Result<usize> {
        if !self.control.is_empty() {
            if let Err(err) = ancillary.write_all(&self.control) {
                // SAFETY: kernel-delivered control data nobody else has seen.
                unsafe { close_descriptors(&self.control) };
                return Err(TransportError::Receive {
                    recv: None,
                    ancillary: Some(err),
                });
            }
        }
        if self.truncated {
            return Err(TransportError::AncillaryTruncated { max_fds });
        }
        Ok(self.len)
    }
}

/// One `recvmsg(2)` call on `fd`.
pub(crate) fn recvmsg_once(fd: RawFd, buf: &mut [u8], max_fds: usize) -> io::Result<Received> {
    let mut control = vec![0u8; control_space(max_fds)];
    let mut iov = libc::iovec {
        iov_base: buf.as_mut_ptr().cast(),
        iov_len: buf.len(),
    };

    // SAFETY: zeroed msghdr is valid before assigning pointers.
    let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
    msghdr.msg_iov = &mut iov;
    msghdr.msg_iovlen = 1;
    msghdr.msg_control = control.as_mut_ptr().cast();
    msghdr.msg_controllen = control.len() as _;

    // SAFETY: msghdr points to live iov/control buffers.
    let n = unsafe { libc::recvmsg(fd, &mut msghdr, RECV_FLAGS) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }

    let control_len = (msghdr.msg_controllen as usize).min(control.len());
    control.truncate(control_len);
    Ok(Received {
        len: n as usize,
        control,
        truncated: (msghdr.msg_flags & libc::MSG_CTRUNC) != 0,
    })
}

/// Blocking receive with ancillary data on a raw socket.
pub fn recv_with_ancillary_fd<W: Write + ?Sized>(
    fd: BorrowedFd<'_>,
    buf: &mut [u8],
    max_fds: usize,
    ancillary: &mut W,
) -> Result<usize> {
    loop {
        match recvmsg_once(fd.as_raw_fd(), buf, max_fds) {
            Ok(received) => return received.deliver(ancillary, max_fds),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(TransportError::Receive {
                    recv: Some(err),
                    ancillary: None,
                })
            }
        }
    }
}

/// One `sendmsg(2)` call on `fd`.
pub(crate) fn sendmsg_once(fd: RawFd, buf: &[u8], fds: &[BorrowedFd<'_>]) -> io::Result<usize> {
    let raw: Vec<RawFd> = fds.iter().map(AsRawFd::as_raw_fd).collect();
    let mut control = if raw.is_empty() {
        Vec::new()
    } else {
        encode_rights(&raw)
    };

    let mut iov = libc::iovec {
        iov_base: buf.as_ptr() as *mut libc::c_void,
        iov_len: buf.len(),
    };

    // SAFETY: zeroed msghdr is valid before assigning pointers.
    let mut msghdr: libc::msghdr = unsafe { std::mem::zeroed() };
    msghdr.msg_iov = &mut iov;
    msghdr.msg_iovlen = 1;
    if !control.is_empty() {
        msghdr.msg_control = control.as_mut_ptr().cast();
        msghdr.msg_controllen = control.len() as _;
    }

    // SAFETY: msghdr points to live iov/control buffers; sendmsg only reads.
    let n = unsafe { libc::sendmsg(fd, &msghdr, SEND_FLAGS) };
    if n < 0 {
        return Err(io::Error::last_os_error());
    }
    Ok(n as usize)
}

/// Blocking send on a raw socket with descriptors attached.
pub fn send_with_fds_fd(
    fd: BorrowedFd<'_>,
    buf: &[u8],
    fds: &[BorrowedFd<'_>],
) -> io::Result<usize> {
    loop {
        match sendmsg_once(fd.as_raw_fd(), buf, fds) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

// SAFETY: descriptors come from the kernel via SCM_RIGHTS.
unsafe impl AncillaryRead for UnixStream {
    fn recv_with_ancillary<W: Write + ?Sized>(
        &mut self,
        buf: &mut [u8],
        max_fds: usize,
        ancillary: &mut W,
    ) -> Result<usize> {
        use std::os::fd::AsFd;
        recv_with_ancillary_fd(self.as_fd(), buf, max_fds, ancillary)
    }
}

impl AncillaryWrite for UnixStream {
    fn send_with_fds(&mut self, buf: &[u8], fds: &[BorrowedFd<'_>]) -> io::Result<usize> {
        use std::os::fd::AsFd;
        send_with_fds_fd(self.as_fd(), buf, fds)
    }
}
