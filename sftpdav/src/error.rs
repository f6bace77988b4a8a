use std::io;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RemoteError>;

/// Failures surfaced by a [`RemoteSession`](crate::session::RemoteSession)
/// and passed through the filesystem adapter untouched.
#[derive(Error, Debug)]
pub enum RemoteError {
    #[error("{0} not found")]
    NotFound(String), // Contains the resolved remote path

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0} is not a directory")]
    NotADirectory(String),

    #[error("{0} is not empty")]
    NotEmpty(String),

    // Any other status reported by the remote server
    #[error("remote failure on {path}: {message}")]
    Remote { path: String, message: String },

    // The session itself is broken (connection lost, channel closed, timeout)
    #[error("transport error: {0}")]
    Transport(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl RemoteError {
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => err.kind() == io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// Classifies a local I/O error raised while touching `path`.
    pub fn from_io(err: io::Error, path: &str) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound(path.to_string()),
            io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.to_string()),
            io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.to_string()),
            io::ErrorKind::NotADirectory => Self::NotADirectory(path.to_string()),
            io::ErrorKind::DirectoryNotEmpty => Self::NotEmpty(path.to_string()),
            _ => Self::Io(err),
        }
    }
}
