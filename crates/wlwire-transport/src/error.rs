use std::io;
use std::path::PathBuf;

/// Errors that can occur in transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Failed to bind to the specified address.
    #[error("failed to bind to {path}: {source}")]
    Bind {
        path: PathBuf,
        source: io::Error,
    },

    /// Failed to connect to the specified address.
    #[error("failed to connect to {path}: {source}")]
    Connect {
        path: PathBuf,
        source: io::Error,
    },

    /// Failed to accept an incoming connection.
    #[error("failed to accept connection: {0}")]
    Accept(io::Error),

    /// An I/O error occurred on the transport stream.
    #[error("transport I/O error: {0}")]
    Io(#[from] io::Error),

    /// A receive call failed. The receive itself and the hand-off of its
    /// ancillary bytes are reported together; either or both may be set.
    #[error("receive failed: {}", joint_receive_message(.recv, .ancillary))]
    Receive {
        recv: Option<io::Error>,
        ancillary: Option<io::Error>,
    },

    /// The kernel had more control data than the receive buffer could hold.
    /// Descriptors were dropped by the kernel and accounting is lost.
    #[error("ancillary data truncated (buffer sized for {max_fds} descriptors)")]
    AncillaryTruncated { max_fds: usize },

    /// The socket path is too long for the platform.
    #[error("socket path too long ({len} bytes, max {max}): {path}")]
    PathTooLong {
        path: PathBuf,
        len: usize,
        max: usize,
    },
}

fn joint_receive_message(recv: &Option<io::Error>, ancillary: &Option<io::Error>) -> String {
    match (recv, ancillary) {
        (Some(recv), Some(anc)) => format!("{recv}; ancillary data: {anc}"),
        (Some(recv), None) => recv.to_string(),
        (None, Some(anc)) => format!("ancillary data: {anc}"),
        (None, None) => "unknown error".to_string(),
    }
}

impl From<TransportError> for io::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(source)
            | TransportError::Receive {
                recv: Some(source),
                ancillary: None,
            } => source,
            other => io::Error::other(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
