use tokio::fs::{
    File, OpenOptions, create_dir_all, metadata, read_dir, remove_dir, remove_file, rename,
    symlink_metadata,
};

use crate::error::{RemoteError, Result};
use crate::session::{DirEntry, Metadata, OpenFlags, RemoteFile, RemoteSession};

/// [`RemoteSession`] over the local filesystem, for `sftpdav local`.
#[derive(Clone, Debug, Default)]
pub struct LocalSession;

impl LocalSession {
    pub fn new() -> Self {
        LocalSession
    }
}

#[async_trait::async_trait]
impl RemoteSession for LocalSession {
    async fn create_dir_all(&self, path: &str) -> Result<()> {
        create_dir_all(path)
            .await
            .map_err(|e| RemoteError::from_io(e, path))
    }

    async fn open(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn RemoteFile>> {
        let mut options = OpenOptions::new();
        options
            .read(flags.contains(OpenFlags::READ))
            .write(flags.intersects(OpenFlags::WRITE | OpenFlags::APPEND))
            .append(flags.contains(OpenFlags::APPEND))
            .truncate(flags.contains(OpenFlags::TRUNCATE));
        if flags.contains(OpenFlags::CREATE) {
            if flags.contains(OpenFlags::EXCLUSIVE) {
                options.create_new(true);
            } else {
                options.create(true);
            }
        }
        let file = options
            .open(path)
            .await
            .map_err(|e| RemoteError::from_io(e, path))?;
        Ok(Box::new(file))
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let meta = metadata(path)
            .await
            .map_err(|e| RemoteError::from_io(e, path))?;
        Ok(to_metadata(&meta))
    }

    async fn symlink_metadata(&self, path: &str) -> Result<Metadata> {
        let meta = symlink_metadata(path)
            .await
            .map_err(|e| RemoteError::from_io(e, path))?;
        Ok(to_metadata(&meta))
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let mut entries = vec![];
        let mut dir = read_dir(path)
            .await
            .map_err(|e| RemoteError::from_io(e, path))?;
        while let Some(entry) = dir
            .next_entry()
            .await
            .map_err(|e| RemoteError::from_io(e, path))?
        {
            let meta = entry
                .metadata()
                .await
                .map_err(|e| RemoteError::from_io(e, path))?;
            entries.push(DirEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                metadata: to_metadata(&meta),
            });
        }
        Ok(entries)
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        remove_file(path)
            .await
            .map_err(|e| RemoteError::from_io(e, path))
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        remove_dir(path)
            .await
            .map_err(|e| RemoteError::from_io(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        rename(from, to)
            .await
            .map_err(|e| RemoteError::from_io(e, from))
    }
}

#[async_trait::async_trait]
impl RemoteFile for File {
    async fn metadata(&mut self) -> Result<Metadata> {
        let meta = File::metadata(self).await?;
        Ok(to_metadata(&meta))
    }
}

fn to_metadata(meta: &std::fs::Metadata) -> Metadata {
    #[cfg(unix)]
    let permissions = {
        use std::os::unix::fs::PermissionsExt;
        Some(meta.permissions().mode())
    };
    #[cfg(not(unix))]
    let permissions = None;

    Metadata {
        size: meta.len(),
        permissions,
        modified: meta.modified().ok(),
        is_dir: meta.is_dir(),
    }
}
