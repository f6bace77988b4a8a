//! Remote session layer
//!
//! A [`RemoteSession`] is an established file-transfer session that only
//! offers one-shot primitives: recursive mkdir, open, stat, list a whole
//! directory, remove a file, remove an empty directory and rename. Paths
//! handed to a session are already resolved; sessions never apply a root.
//!
//! Implementations:
//! - `sftp`: russh-sftp over an authenticated SSH channel.
//! - `local`: a directory on this host, used by `sftpdav local`.
//! - `memory`: in-memory tree used by unit tests.
pub mod connect;
pub mod local;
#[cfg(test)]
pub mod memory;
pub mod sftp;

use std::time::SystemTime;

use bitflags::bitflags;
use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite};

use crate::error::Result;

bitflags! {
    /// How a remote file is opened, mirroring the SFTP `SSH_FXF_*` bits.
    #[derive(Clone, Copy, Debug, PartialEq, Eq)]
    pub struct OpenFlags: u32 {
        const READ = 1;
        const WRITE = 1 << 1;
        const APPEND = 1 << 2;
        const CREATE = 1 << 3;
        const TRUNCATE = 1 << 4;
        /// Fail when the file already exists (with `CREATE`).
        const EXCLUSIVE = 1 << 5;
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Metadata {
    pub size: u64,
    /// Full `st_mode` bits when the remote reports them.
    pub permissions: Option<u32>,
    pub modified: Option<SystemTime>,
    pub is_dir: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub metadata: Metadata,
}

/// An open remote file. Reads, writes and seeks go through the tokio I/O
/// traits; `metadata` asks the remote for the live attributes of the open
/// file.
#[async_trait::async_trait]
pub trait RemoteFile: AsyncRead + AsyncWrite + AsyncSeek + Send + Unpin {
    async fn metadata(&mut self) -> Result<Metadata>;
}

#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    /// Creates `path` and every missing ancestor; an existing directory is fine.
    async fn create_dir_all(&self, path: &str) -> Result<()>;
    async fn open(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn RemoteFile>>;
    async fn stat(&self, path: &str) -> Result<Metadata>;
    /// Like [`stat`](Self::stat) but describes a symlink itself instead of
    /// its target.
    async fn symlink_metadata(&self, path: &str) -> Result<Metadata>;
    /// Lists the whole directory in one call. `.` and `..` are never returned.
    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>>;
    async fn remove_file(&self, path: &str) -> Result<()>;
    /// Removes an empty directory.
    async fn remove_dir(&self, path: &str) -> Result<()>;
    async fn rename(&self, from: &str, to: &str) -> Result<()>;
}
