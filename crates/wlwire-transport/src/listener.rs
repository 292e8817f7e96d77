//! Filesystem-path listening sockets.

use std::io;
use std::os::unix::fs::{FileTypeExt, MetadataExt, PermissionsExt};
use std::os::unix::net::{UnixListener, UnixStream};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Result, TransportError};
use crate::stream::WireStream;

/// Permission bits applied to a freshly bound socket path.
pub const DEFAULT_SOCKET_MODE: u32 = 0o600;

/// `sockaddr_un.sun_path` capacity, terminator included.
#[cfg(target_os = "linux")]
const SUN_PATH_LEN: usize = 108;
#[cfg(not(target_os = "linux"))]
const SUN_PATH_LEN: usize = 104;

/// Device and inode of the socket file this listener created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct SocketIdentity {
    dev: u64,
    ino: u64,
}

impl SocketIdentity {
    fn of(path: &Path) -> io::Result<Self> {
        let meta = std::fs::symlink_metadata(path)?;
        Ok(Self {
            dev: meta.dev(),
            ino: meta.ino(),
        })
    }

    /// Whether `path` still names this socket and not a replacement.
    fn still_at(&self, path: &Path) -> bool {
        std::fs::symlink_metadata(path).is_ok_and(|meta| {
            meta.file_type().is_socket() && meta.dev() == self.dev && meta.ino() == self.ino
        })
    }
}

/// A bound, listening socket that hands out [`WireStream`]s.
///
/// The socket file is unlinked on drop, unless something else has taken its
/// place in the meantime.
#[derive(Debug)]
pub struct WireListener {
    listener: UnixListener,
    path: PathBuf,
    identity: SocketIdentity,
}

impl WireListener {
    /// Bind `path` with [`DEFAULT_SOCKET_MODE`]. A stale socket file left at
    /// `path` is replaced; any other kind of file is an error.
    pub fn bind(path: impl AsRef<Path>) -> Result<Self> {
        Self::bind_with_mode(path, DEFAULT_SOCKET_MODE)
    }

    pub fn bind_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        check_path_len(&path)?;

        let bind_err = |source: io::Error| TransportError::Bind {
            path: path.clone(),
            source,
        };
        remove_stale_socket(&path).map_err(bind_err)?;
        let listener = UnixListener::bind(&path).map_err(bind_err)?;
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(bind_err)?;
        let identity = SocketIdentity::of(&path).map_err(bind_err)?;

        info!(?path, mode = format_args!("{mode:o}"), "listening");
        Ok(Self {
            listener,
            path,
            identity,
        })
    }

    /// Wait for the next client (blocking).
    pub fn accept(&self) -> Result<WireStream> {
        let (stream, _addr) = self.listener.accept().map_err(TransportError::Accept)?;
        let stream = WireStream::from_unix(stream);
        match stream.peer_credentials() {
            Some(peer) => debug!(pid = peer.pid, uid = peer.uid, "accepted client"),
            None => debug!("accepted client"),
        }
        Ok(stream)
    }

    /// Connect to a listening socket (blocking).
    pub fn connect(path: impl AsRef<Path>) -> Result<WireStream> {
        let path = path.as_ref();
        check_path_len(path)?;
        let stream = UnixStream::connect(path).map_err(|source| TransportError::Connect {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(?path, "connected");
        Ok(WireStream::from_unix(stream))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for WireListener {
    fn drop(&mut self) {
        if self.identity.still_at(&self.path) {
            debug!(path = ?self.path, "removing socket file");
            let _ = std::fs::remove_file(&self.path);
        } else {
            debug!(path = ?self.path, "socket file replaced; leaving it");
        }
    }
}

/// Where a display-style socket name lives: absolute names are used as-is,
/// anything else is relative to `runtime_dir`.
pub fn resolve_socket_path(name: impl AsRef<Path>, runtime_dir: impl AsRef<Path>) -> PathBuf {
    let name = name.as_ref();
    if name.is_absolute() {
        name.to_path_buf()
    } else {
        runtime_dir.as_ref().join(name)
    }
}

fn check_path_len(path: &Path) -> Result<()> {
    let len = path.as_os_str().len();
    if len >= SUN_PATH_LEN {
        return Err(TransportError::PathTooLong {
            path: path.to_path_buf(),
            len,
            max: SUN_PATH_LEN - 1,
        });
    }
    Ok(())
}

fn remove_stale_socket(path: &Path) -> io::Result<()> {
    let meta = match std::fs::symlink_metadata(path) {
        Ok(meta) => meta,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };
    if !meta.file_type().is_socket() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            "existing path is not a unix socket",
        ));
    }
    debug!(?path, "removing stale socket");
    std::fs::remove_file(path)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::os::fd::AsFd;

    use super::*;
    use crate::ancillary::{AncillaryRead, AncillaryWrite, DEFAULT_MAX_FDS};
    use crate::control::take_descriptors;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wlwire-{tag}-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn client_bytes_reach_accepted_stream() {
        let dir = scratch_dir("listen");
        let sock_path = dir.join("wayland-test");
        let listener = WireListener::bind(&sock_path).unwrap();

        let client_path = sock_path.clone();
        let client = std::thread::spawn(move || {
            let mut client = WireListener::connect(&client_path).unwrap();
            client.write_all(b"hello").unwrap();
        });

        let mut server = listener.accept().unwrap();
        let mut buf = [0u8; 5];
        server.read_exact(&mut buf).unwrap();
        assert_eq!(&buf, b"hello");
        client.join().unwrap();

        drop(listener);
        assert!(!sock_path.exists(), "socket file should be unlinked on drop");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn accepted_stream_receives_descriptors() {
        let dir = scratch_dir("fdpass");
        let sock_path = dir.join("fd.sock");
        let listener = WireListener::bind(&sock_path).unwrap();

        let client_path = sock_path.clone();
        let client = std::thread::spawn(move || {
            let mut client = WireListener::connect(&client_path).unwrap();
            let file = std::fs::File::open("/dev/null").unwrap();
            client.send_with_fds(b"fd", &[file.as_fd()]).unwrap();
        });

        let mut server = listener.accept().unwrap();
        client.join().unwrap();

        let mut ancillary = Vec::new();
        let mut buf = [0u8; 2];
        let n = server
            .recv_with_ancillary(&mut buf, DEFAULT_MAX_FDS, &mut ancillary)
            .unwrap();
        assert_eq!(&buf[..n], b"fd");
        assert_eq!(unsafe { take_descriptors(&ancillary) }.unwrap().len(), 1);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn overlong_path_is_rejected_before_binding() {
        let long_path = "/tmp/".to_string() + &"w".repeat(200);
        assert!(matches!(
            WireListener::bind(&long_path),
            Err(TransportError::PathTooLong { .. })
        ));
        assert!(matches!(
            WireListener::connect(&long_path),
            Err(TransportError::PathTooLong { .. })
        ));
    }

    #[test]
    fn socket_is_owner_only_by_default() {
        let dir = scratch_dir("mode");
        let sock_path = dir.join("mode.sock");

        let listener = WireListener::bind(&sock_path).unwrap();
        let mode = std::fs::metadata(&sock_path).unwrap().permissions().mode() & 0o777;
        assert_eq!(mode, DEFAULT_SOCKET_MODE);

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn stale_socket_is_replaced_but_regular_file_is_not() {
        let dir = scratch_dir("stale");
        let stale = dir.join("stale.sock");
        drop(UnixListener::bind(&stale).unwrap());
        assert!(stale.exists());
        let listener = WireListener::bind(&stale).unwrap();
        drop(listener);

        let regular = dir.join("regular");
        std::fs::write(&regular, b"not a socket").unwrap();
        assert!(matches!(
            WireListener::bind(&regular),
            Err(TransportError::Bind { .. })
        ));
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn replaced_path_survives_drop() {
        let dir = scratch_dir("replaced");
        let sock_path = dir.join("drop.sock");
        let listener = WireListener::bind(&sock_path).unwrap();

        std::fs::remove_file(&sock_path).unwrap();
        std::fs::write(&sock_path, b"replacement").unwrap();

        drop(listener);
        assert!(sock_path.exists(), "a replacement file must not be removed");
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn relative_names_resolve_under_runtime_dir() {
        assert_eq!(
            resolve_socket_path("wayland-1", "/run/user/1000"),
            PathBuf::from("/run/user/1000/wayland-1")
        );
        assert_eq!(
            resolve_socket_path("/tmp/custom.sock", "/run/user/1000"),
            PathBuf::from("/tmp/custom.sock")
        );
    }
}
