use std::io::{self, ErrorKind, Write};
use std::os::fd::{AsRawFd, BorrowedFd};
use std::path::Path;

use tokio::io::Interest;
use tokio::net::UnixStream;
use tracing::debug;

use crate::ancillary::{recvmsg_once, sendmsg_once};
use crate::error::{Result, TransportError};
use crate::stream::WireStream;

/// Async counterpart of [`WireStream`] on the tokio reactor.
///
/// Each call still performs exactly one `recvmsg`/`sendmsg`; readiness is
/// awaited and `WouldBlock` retried.
#[derive(Debug)]
pub struct AsyncWireStream {
    inner: UnixStream,
}

impl AsyncWireStream {
    /// Connect to a listening socket.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let inner = UnixStream::connect(path)
            .await
            .map_err(|e| TransportError::Connect {
                path: path.to_path_buf(),
                source: e,
            })?;
        debug!(?path, "connected to unix domain socket");
        Ok(Self { inner })
    }

    /// Register a blocking stream with the current runtime.
    pub fn from_blocking(stream: WireStream) -> Result<Self> {
        stream.set_nonblocking(true)?;
        let inner = UnixStream::from_std(stream.into_unix())?;
        Ok(Self { inner })
    }

    /// Create a connected pair on the current runtime.
    pub fn pair() -> Result<(Self, Self)> {
        let (left, right) = UnixStream::pair()?;
        Ok((Self { inner: left }, Self { inner: right }))
    }

    /// Receive once, appending control bytes to `ancillary`.
    pub async fn recv_with_ancillary<W: Write + ?Sized>(
        &self,
        buf: &mut [u8],
        max_fds: usize,
        ancillary: &mut W,
    ) -> Result<usize> {
        let fd = self.inner.as_raw_fd();
        loop {
            self.inner.readable().await?;
            match self
                .inner
                .try_io(Interest::READABLE, || recvmsg_once(fd, buf, max_fds))
            {
                Ok(received) => return received.deliver(ancillary, max_fds),
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    continue
                }
                Err(err) => {
                    return Err(TransportError::Receive {
                        recv: Some(err),
                        ancillary: None,
                    })
                }
            }
        }
    }

    /// Send once with `fds` attached. Returns bytes written.
    pub async fn send_with_fds(&self, buf: &[u8], fds: &[BorrowedFd<'_>]) -> io::Result<usize> {
        let fd = self.inner.as_raw_fd();
        loop {
            self.inner.writable().await?;
            match self
                .inner
                .try_io(Interest::WRITABLE, || sendmsg_once(fd, buf, fds))
            {
                Err(err) if matches!(err.kind(), ErrorKind::WouldBlock | ErrorKind::Interrupted) => {
                    continue
                }
                other => return other,
            }
        }
    }

    /// Borrow the tokio stream.
    pub fn get_ref(&self) -> &UnixStream {
        &self.inner
    }
}
