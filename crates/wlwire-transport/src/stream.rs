use std::io::{Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, RawFd};
use std::os::unix::net::UnixStream;

use crate::ancillary::{recv_with_ancillary_fd, send_with_fds_fd, AncillaryRead, AncillaryWrite};
use crate::error::Result;

/// A connected wire stream. Implements `Read`/`Write` for plain bytes and
/// [`AncillaryRead`]/[`AncillaryWrite`] for descriptor passing.
pub struct WireStream {
    inner: UnixStream,
}

impl Read for WireStream {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        self.inner.read(buf)
    }
}

impl Write for WireStream {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

// SAFETY: descriptors come from the kernel via SCM_RIGHTS.
unsafe impl AncillaryRead for WireStream {
    fn recv_with_ancillary<W: Write + ?Sized>(
        &mut self,
        buf: &mut [u8],
        max_fds: usize,
        ancillary: &mut W,
    ) -> Result<usize> {
        recv_with_ancillary_fd(self.inner.as_fd(), buf, max_fds, ancillary)
    }
}

impl AncillaryWrite for WireStream {
    fn send_with_fds(&mut self, buf: &[u8], fds: &[BorrowedFd<'_>]) -> std::io::Result<usize> {
        send_with_fds_fd(self.inner.as_fd(), buf, fds)
    }

    fn flush_stream(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

impl WireStream {
    /// Create a connected pair of streams.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self::from_unix(left), Self::from_unix(right)))
    }

    /// Wrap an already-connected Unix domain socket stream.
    pub fn from_unix(stream: UnixStream) -> Self {
        Self { inner: stream }
    }

    /// Unwrap the underlying Unix domain socket stream.
    pub fn into_unix(self) -> UnixStream {
        self.inner
    }

    /// Set read timeout on the underlying stream.
    pub fn set_read_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner.set_read_timeout(timeout).map_err(Into::into)
    }

    /// Set write timeout on the underlying stream.
    pub fn set_write_timeout(&self, timeout: Option<std::time::Duration>) -> Result<()> {
        self.inner.set_write_timeout(timeout).map_err(Into::into)
    }

    /// Switch the underlying stream between blocking and non-blocking mode.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<()> {
        self.inner.set_nonblocking(nonblocking).map_err(Into::into)
    }

    /// Try to clone this stream (creates a new file descriptor).
    pub fn try_clone(&self) -> Result<Self> {
        let cloned = self.inner.try_clone()?;
        Ok(Self::from_unix(cloned))
    }

    /// Credentials of the process on the other end, where the platform
    /// reports them (`SO_PEERCRED` on Linux).
    pub fn peer_credentials(&self) -> Option<PeerCredentials> {
        peer_credentials(self.inner.as_raw_fd())
    }
}

/// Identity of the connected peer process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PeerCredentials {
    pub pid: u32,
    pub uid: u32,
    pub gid: u32,
}

#[cfg(target_os = "linux")]
fn peer_credentials(fd: RawFd) -> Option<PeerCredentials> {
    let mut cred = libc::ucred {
        pid: 0,
        uid: 0,
        gid: 0,
    };
    let mut len = std::mem::size_of::<libc::ucred>() as libc::socklen_t;

    // SAFETY: `cred` and `len` are writable and sized for SO_PEERCRED.
    let rc = unsafe {
        libc::getsockopt(
            fd,
            libc::SOL_SOCKET,
            libc::SO_PEERCRED,
            (&mut cred as *mut libc::ucred).cast::<libc::c_void>(),
            &mut len,
        )
    };
    (rc == 0 && len as usize == std::mem::size_of::<libc::ucred>()).then_some(PeerCredentials {
        pid: cred.pid as u32,
        uid: cred.uid,
        gid: cred.gid,
    })
}

#[cfg(not(target_os = "linux"))]
fn peer_credentials(_fd: RawFd) -> Option<PeerCredentials> {
    None
}

impl AsFd for WireStream {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl AsRawFd for WireStream {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl From<UnixStream> for WireStream {
    fn from(stream: UnixStream) -> Self {
        Self::from_unix(stream)
    }
}

impl std::fmt::Debug for WireStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WireStream")
            .field("fd", &self.inner.as_raw_fd())
            .finish()
    }
}
