use std::time::{Duration, UNIX_EPOCH};

use russh_sftp::client::SftpSession;
use russh_sftp::client::error::Error as SftpError;
use russh_sftp::client::fs::File;
use russh_sftp::protocol::{FileAttributes, OpenFlags as SftpOpenFlags, StatusCode};
use tracing::debug;

use crate::error::{RemoteError, Result};
use crate::session::{DirEntry, Metadata, OpenFlags, RemoteFile, RemoteSession};

const S_IFMT: u32 = 0o170000;
const S_IFDIR: u32 = 0o040000;

/// [`RemoteSession`] backed by a russh-sftp client. All requests share the
/// one SFTP channel; russh-sftp matches replies to requests by id, so the
/// session can be used from many tasks at once.
pub struct SftpRemote {
    sftp: SftpSession,
}

impl SftpRemote {
    pub fn new(sftp: SftpSession) -> Self {
        SftpRemote { sftp }
    }

    pub async fn close(&self) -> Result<()> {
        self.sftp
            .close()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))
    }
}

#[async_trait::async_trait]
impl RemoteSession for SftpRemote {
    async fn create_dir_all(&self, path: &str) -> Result<()> {
        // Fast path: one round trip when the directory is already there.
        match self.stat(path).await {
            Ok(meta) if meta.is_dir => return Ok(()),
            Ok(_) => return Err(RemoteError::NotADirectory(path.to_string())),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e),
        }

        let mut current = String::new();
        if path.starts_with('/') {
            current.push('/');
        }
        for component in path.split('/').filter(|c| !c.is_empty()) {
            if !current.is_empty() && !current.ends_with('/') {
                current.push('/');
            }
            current.push_str(component);
            match self.stat(&current).await {
                Ok(meta) if meta.is_dir => continue,
                Ok(_) => return Err(RemoteError::NotADirectory(current)),
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e),
            }
            debug!("sftp mkdir {current}");
            if let Err(err) = self.sftp.create_dir(current.as_str()).await {
                // Lost a race with another creator: fine as long as it is a directory now.
                match self.stat(&current).await {
                    Ok(meta) if meta.is_dir => continue,
                    _ => return Err(map_sftp_error(err, &current)),
                }
            }
        }
        Ok(())
    }

    async fn open(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn RemoteFile>> {
        debug!("sftp open {path} {flags:?}");
        let file = self
            .sftp
            .open_with_flags(path, to_sftp_flags(flags))
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        Ok(Box::new(SftpFile {
            file,
            path: path.to_string(),
        }))
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let attrs = self
            .sftp
            .metadata(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        Ok(to_metadata(&attrs))
    }

    async fn symlink_metadata(&self, path: &str) -> Result<Metadata> {
        let attrs = self
            .sftp
            .symlink_metadata(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        Ok(to_metadata(&attrs))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        debug!("sftp readdir {path}");
        let entries = self
            .sftp
            .read_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))?;
        Ok(entries
            .filter(|entry| {
                let name = entry.file_name();
                name != "." && name != ".."
            })
            .map(|entry| DirEntry {
                name: entry.file_name(),
                metadata: to_metadata(&entry.metadata()),
            })
            .collect())
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        debug!("sftp remove {path}");
        self.sftp
            .remove_file(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        debug!("sftp rmdir {path}");
        self.sftp
            .remove_dir(path)
            .await
            .map_err(|e| map_sftp_error(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        debug!("sftp rename {from} -> {to}");
        self.sftp
            .rename(from, to)
            .await
            .map_err(|e| map_sftp_error(e, from))
    }
}

struct SftpFile {
    file: File,
    path: String,
}

impl tokio::io::AsyncRead for SftpFile {
    fn poll_read(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &mut tokio::io::ReadBuf<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.file).poll_read(cx, buf)
    }
}

impl tokio::io::AsyncWrite for SftpFile {
    fn poll_write(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
        buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::pin::Pin::new(&mut self.file).poll_write(cx, buf)
    }

    fn poll_flush(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.file).poll_flush(cx)
    }

    fn poll_shutdown(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::pin::Pin::new(&mut self.file).poll_shutdown(cx)
    }
}

impl tokio::io::AsyncSeek for SftpFile {
    fn start_seek(
        mut self: std::pin::Pin<&mut Self>,
        position: std::io::SeekFrom,
    ) -> std::io::Result<()> {
        std::pin::Pin::new(&mut self.file).start_seek(position)
    }

    fn poll_complete(
        mut self: std::pin::Pin<&mut Self>,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<u64>> {
        std::pin::Pin::new(&mut self.file).poll_complete(cx)
    }
}

#[async_trait::async_trait]
impl RemoteFile for SftpFile {
    async fn metadata(&mut self) -> Result<Metadata> {
        let attrs = self
            .file
            .metadata()
            .await
            .map_err(|e| map_sftp_error(e, &self.path))?;
        Ok(to_metadata(&attrs))
    }
}

fn to_sftp_flags(flags: OpenFlags) -> SftpOpenFlags {
    let mut out = SftpOpenFlags::empty();
    if flags.contains(OpenFlags::READ) {
        out |= SftpOpenFlags::READ;
    }
    if flags.contains(OpenFlags::WRITE) {
        out |= SftpOpenFlags::WRITE;
    }
    if flags.contains(OpenFlags::APPEND) {
        out |= SftpOpenFlags::APPEND | SftpOpenFlags::WRITE;
    }
    if flags.contains(OpenFlags::CREATE) {
        out |= SftpOpenFlags::CREATE;
    }
    if flags.contains(OpenFlags::TRUNCATE) {
        out |= SftpOpenFlags::TRUNCATE;
    }
    if flags.contains(OpenFlags::EXCLUSIVE) {
        out |= SftpOpenFlags::EXCLUDE;
    }
    out
}

/// The file type is only known from the mode bits. A server that omits
/// permissions makes every entry look like a regular file, directories
/// included.
fn to_metadata(attrs: &FileAttributes) -> Metadata {
    if attrs.permissions.is_none() {
        debug!("sftp attributes without permissions, assuming a regular file");
    }
    Metadata {
        size: attrs.size.unwrap_or(0),
        permissions: attrs.permissions,
        modified: attrs
            .mtime
            .map(|secs| UNIX_EPOCH + Duration::from_secs(u64::from(secs))),
        is_dir: attrs
            .permissions
            .is_some_and(|mode| mode & S_IFMT == S_IFDIR),
    }
}

fn map_sftp_error(err: SftpError, path: &str) -> RemoteError {
    match err {
        SftpError::Status(status) => match status.status_code {
            StatusCode::NoSuchFile => RemoteError::NotFound(path.to_string()),
            StatusCode::PermissionDenied => RemoteError::PermissionDenied(path.to_string()),
            StatusCode::NoConnection | StatusCode::ConnectionLost => {
                RemoteError::Transport(status.error_message)
            }
            _ => RemoteError::Remote {
                path: path.to_string(),
                message: status.error_message,
            },
        },
        other => RemoteError::Transport(other.to_string()),
    }
}
