//! Error types for the DUT client.
//!
//! Two classes never mix: a remote POSIX failure is data the DUT reported
//! ([`DutError::Posix`], produced only when a call's policy escalates it),
//! everything else means the harness itself is broken.

use remote_ipc::TransportError;
use std::fmt;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the client's error type.
pub type Result<T> = std::result::Result<T, DutError>;

/// An errno value reported by the DUT.
///
/// Only meaningful when the call it came with failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Errno(pub i32);

impl Errno {
    pub const NONE: Errno = Errno(0);

    pub fn raw(self) -> i32 {
        self.0
    }

    pub fn is_none(self) -> bool {
        self.0 == 0
    }

    /// The equivalent local I/O error, for matching on [`io::ErrorKind`].
    pub fn to_io_error(self) -> io::Error {
        io::Error::from_raw_os_error(self.0)
    }
}

impl fmt::Display for Errno {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_io_error())
    }
}

impl From<i32> for Errno {
    fn from(raw: i32) -> Self {
        Errno(raw)
    }
}

impl From<Errno> for io::Error {
    fn from(errno: Errno) -> Self {
        errno.to_io_error()
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {var}")]
    InvalidVar { var: &'static str, value: String },

    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("cannot resolve posix server address {addr}: {reason}")]
    Resolve { addr: String, reason: String },
}

#[derive(Debug, Error)]
pub enum DutError {
    /// The remote call ran and failed.
    #[error("failed to {op}: {errno}")]
    Posix { op: &'static str, errno: Errno },

    #[error("failed to call {method}: {source}")]
    Transport {
        method: String,
        #[source]
        source: TransportError,
    },

    #[error("can't parse Sockaddr: {0}")]
    UnrecognizedAddress(String),

    #[error("malformed {method} response: {reason}")]
    MalformedResponse { method: String, reason: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl DutError {
    /// True for a failure the DUT reported.
    pub fn is_remote(&self) -> bool {
        matches!(self, DutError::Posix { .. })
    }

    /// True for a failure of the harness itself.
    pub fn is_local(&self) -> bool {
        !self.is_remote()
    }

    /// The errno of a remote failure.
    pub fn errno(&self) -> Option<Errno> {
        match self {
            DutError::Posix { errno, .. } => Some(*errno),
            _ => None,
        }
    }

    /// True when the transport gave up waiting for a response.
    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(
            self,
            DutError::Transport {
                source: TransportError::DeadlineExceeded { .. } | TransportError::KeepaliveExpired(_),
                ..
            }
        )
    }
}
