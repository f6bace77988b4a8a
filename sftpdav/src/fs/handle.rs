use std::fmt;
use std::io::SeekFrom;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use crate::error::Result;
use crate::session::{DirEntry, Metadata, RemoteFile, RemoteSession};

/// One open remote file.
///
/// Directory enumeration is served from a snapshot taken by the first
/// [`read_dir`](Self::read_dir) call and never refreshed, so later changes on
/// the remote side are not seen through this handle. The snapshot and its
/// cursor are plain fields behind `&mut self`: sharing one handle between
/// tasks needs external locking.
pub struct OpenFileHandle {
    file: Box<dyn RemoteFile>,
    session: Arc<dyn RemoteSession>,
    remote_path: String,

    dir_cache: Option<Vec<DirEntry>>,
    dir_pos: usize,
}

impl OpenFileHandle {
    pub(crate) fn new(
        file: Box<dyn RemoteFile>,
        session: Arc<dyn RemoteSession>,
        remote_path: String,
    ) -> Self {
        OpenFileHandle {
            file,
            session,
            remote_path,
            dir_cache: None,
            dir_pos: 0,
        }
    }

    /// Resolved remote path this handle was opened on.
    pub fn remote_path(&self) -> &str {
        &self.remote_path
    }

    /// Returns the next `count` directory entries, or everything left when
    /// `count <= 0`. An empty page means the listing is exhausted.
    pub async fn read_dir(&mut self, count: isize) -> Result<Vec<DirEntry>> {
        if self.dir_cache.is_none() {
            let entries = self.session.read_dir(&self.remote_path).await?;
            self.dir_cache = Some(entries);
        }
        let cache = self.dir_cache.as_deref().unwrap_or_default();

        let start = self.dir_pos.min(cache.len());
        let end = if count <= 0 {
            cache.len()
        } else {
            start.saturating_add(count as usize).min(cache.len())
        };
        let page = cache[start..end].to_vec();
        self.dir_pos = end;
        Ok(page)
    }

    /// Live attributes of the open file, not taken from the listing snapshot.
    pub async fn stat(&mut self) -> Result<Metadata> {
        self.file.metadata().await
    }

    /// Reads up to `max` bytes; a short result means end of file.
    pub async fn read(&mut self, max: usize) -> Result<Bytes> {
        let mut buf = BytesMut::zeroed(max);
        let mut filled = 0;
        while filled < max {
            let n = self.file.read(&mut buf[filled..]).await?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        buf.truncate(filled);
        Ok(buf.freeze())
    }

    pub async fn write_all(&mut self, data: &[u8]) -> Result<()> {
        self.file.write_all(data).await?;
        Ok(())
    }

    pub async fn seek(&mut self, pos: SeekFrom) -> Result<u64> {
        Ok(self.file.seek(pos).await?)
    }

    pub async fn flush(&mut self) -> Result<()> {
        self.file.flush().await?;
        Ok(())
    }

    /// Flushes and releases the remote file.
    pub async fn close(mut self) -> Result<()> {
        self.file.shutdown().await?;
        Ok(())
    }
}

impl fmt::Debug for OpenFileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenFileHandle")
            .field("remote_path", &self.remote_path)
            .field("cached_entries", &self.dir_cache.as_ref().map(Vec::len))
            .field("dir_pos", &self.dir_pos)
            .finish()
    }
}
