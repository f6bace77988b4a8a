//! WebDAV bridge
//!
//! Implements the `dav-server` filesystem traits on top of [`RemoteFs`] so
//! the generic WebDAV handler can serve it. Directory listings are pulled
//! from an [`OpenFileHandle`] one page at a time.
use std::fmt;
use std::io::SeekFrom;
use std::time::SystemTime;

use bytes::{Buf, Bytes};
use dav_server::davpath::DavPath;
use dav_server::fs::{
    DavDirEntry, DavFile, DavFileSystem, DavMetaData, FsError, FsFuture, FsResult, FsStream,
    OpenOptions, ReadDirMeta,
};
use futures::{FutureExt, TryStreamExt, stream};
use tokio::sync::Mutex;
use tracing::error;

use crate::error::{RemoteError, Result};
use crate::fs::{OpenFileHandle, RemoteFs};
use crate::session::{DirEntry, Metadata, OpenFlags};

/// Entries fetched from a handle per step of a directory stream.
pub const READ_DIR_PAGE: isize = 128;

impl From<RemoteError> for FsError {
    fn from(err: RemoteError) -> Self {
        match err {
            RemoteError::NotFound(_) => FsError::NotFound,
            RemoteError::PermissionDenied(_) => FsError::Forbidden,
            RemoteError::AlreadyExists(_) => FsError::Exists,
            RemoteError::Io(ref e) if e.kind() == std::io::ErrorKind::NotFound => {
                FsError::NotFound
            }
            other => {
                error!("remote operation failed: {other}");
                FsError::GeneralFailure
            }
        }
    }
}

pub fn open_flags(options: &OpenOptions) -> OpenFlags {
    let mut flags = OpenFlags::empty();
    if options.read {
        flags |= OpenFlags::READ;
    }
    if options.write {
        flags |= OpenFlags::WRITE;
    }
    if options.append {
        flags |= OpenFlags::APPEND;
    }
    if options.truncate {
        flags |= OpenFlags::TRUNCATE;
    }
    if options.create {
        flags |= OpenFlags::CREATE;
    }
    if options.create_new {
        flags |= OpenFlags::CREATE | OpenFlags::EXCLUSIVE;
    }
    flags
}

fn dav_name(path: &DavPath) -> String {
    format!("/{}", path.as_rel_ospath().to_string_lossy())
}

#[derive(Clone, Debug)]
struct DavMeta(Metadata);

impl DavMetaData for DavMeta {
    fn len(&self) -> u64 {
        self.0.size
    }

    fn modified(&self) -> FsResult<SystemTime> {
        self.0.modified.ok_or(FsError::NotImplemented)
    }

    fn is_dir(&self) -> bool {
        self.0.is_dir
    }

    fn executable(&self) -> FsResult<bool> {
        match self.0.permissions {
            Some(mode) if !self.0.is_dir => Ok(mode & 0o100 != 0),
            _ => Err(FsError::NotImplemented),
        }
    }
}

struct DavEntry {
    name: String,
    meta: DavMeta,
}

impl From<DirEntry> for DavEntry {
    fn from(entry: DirEntry) -> Self {
        DavEntry {
            name: entry.name,
            meta: DavMeta(entry.metadata),
        }
    }
}

impl DavDirEntry for DavEntry {
    fn name(&self) -> Vec<u8> {
        self.name.as_bytes().to_vec()
    }

    fn metadata(&self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        let meta = self.meta.clone();
        async move { Ok(Box::new(meta) as Box<dyn DavMetaData>) }.boxed()
    }
}

/// `DavFile` over an open handle. The mutex is never contended: every
/// method has `&mut self` and reaches the handle through `get_mut`.
struct DavHandle {
    handle: Mutex<OpenFileHandle>,
}

impl fmt::Debug for DavHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DavHandle").finish_non_exhaustive()
    }
}

impl DavFile for DavHandle {
    fn metadata(&mut self) -> FsFuture<'_, Box<dyn DavMetaData>> {
        async move {
            let meta = self.handle.get_mut().stat().await?;
            Ok(Box::new(DavMeta(meta)) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    fn write_buf(&mut self, mut buf: Box<dyn Buf + Send>) -> FsFuture<'_, ()> {
        async move {
            let data = buf.copy_to_bytes(buf.remaining());
            self.handle.get_mut().write_all(&data).await?;
            Ok(())
        }
        .boxed()
    }

    fn write_bytes(&mut self, buf: Bytes) -> FsFuture<'_, ()> {
        async move {
            self.handle.get_mut().write_all(&buf).await?;
            Ok(())
        }
        .boxed()
    }

    fn read_bytes(&mut self, count: usize) -> FsFuture<'_, Bytes> {
        async move { Ok(self.handle.get_mut().read(count).await?) }.boxed()
    }

    fn seek(&mut self, pos: SeekFrom) -> FsFuture<'_, u64> {
        async move { Ok(self.handle.get_mut().seek(pos).await?) }.boxed()
    }

    fn flush(&mut self) -> FsFuture<'_, ()> {
        async move {
            self.handle.get_mut().flush().await?;
            Ok(())
        }
        .boxed()
    }
}

async fn next_page(
    mut handle: OpenFileHandle,
) -> Result<Option<(Vec<DirEntry>, OpenFileHandle)>> {
    let page = handle.read_dir(READ_DIR_PAGE).await?;
    if page.is_empty() {
        return Ok(None);
    }
    Ok(Some((page, handle)))
}

impl DavFileSystem for RemoteFs {
    fn open<'a>(
        &'a self,
        path: &'a DavPath,
        options: OpenOptions,
    ) -> FsFuture<'a, Box<dyn DavFile>> {
        async move {
            let handle = self.open_file(&dav_name(path), open_flags(&options)).await?;
            Ok(Box::new(DavHandle {
                handle: Mutex::new(handle),
            }) as Box<dyn DavFile>)
        }
        .boxed()
    }

    fn read_dir<'a>(
        &'a self,
        path: &'a DavPath,
        _meta: ReadDirMeta,
    ) -> FsFuture<'a, FsStream<Box<dyn DavDirEntry>>> {
        async move {
            let handle = self.open_file(&dav_name(path), OpenFlags::READ).await?;
            let entries = stream::try_unfold(handle, next_page)
                .map_ok(|page| {
                    stream::iter(page.into_iter().map(|entry| {
                        Ok::<_, RemoteError>(Box::new(DavEntry::from(entry)) as Box<dyn DavDirEntry>)
                    }))
                })
                .try_flatten()
                .map_err(FsError::from);
            Ok(Box::pin(entries) as FsStream<Box<dyn DavDirEntry>>)
        }
        .boxed()
    }

    fn metadata<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, Box<dyn DavMetaData>> {
        async move {
            let meta = self.stat(&dav_name(path)).await?;
            Ok(Box::new(DavMeta(meta)) as Box<dyn DavMetaData>)
        }
        .boxed()
    }

    fn create_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move { Ok(self.make_dir(&dav_name(path)).await?) }.boxed()
    }

    fn remove_dir<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move { Ok(self.remove_all(&dav_name(path)).await?) }.boxed()
    }

    fn remove_file<'a>(&'a self, path: &'a DavPath) -> FsFuture<'a, ()> {
        async move { Ok(self.remove_all(&dav_name(path)).await?) }.boxed()
    }

    fn rename<'a>(&'a self, from: &'a DavPath, to: &'a DavPath) -> FsFuture<'a, ()> {
        async move { Ok(self.rename(&dav_name(from), &dav_name(to)).await?) }.boxed()
    }
}
