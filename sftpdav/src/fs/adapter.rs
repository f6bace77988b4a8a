use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use tracing::{debug, warn};

use crate::error::Result;
use crate::fs::handle::OpenFileHandle;
use crate::fs::paths::{PathResolver, join};
use crate::session::{Metadata, OpenFlags, RemoteSession};

/// Filesystem operations over a [`RemoteSession`], rooted at a fixed prefix.
///
/// Every name is root-relative and resolved before the first remote call.
/// Nothing is retried and nothing is cached here; errors come back exactly
/// as the session reported them. A request future that is dropped stops
/// waiting for its reply, but a request already sent is not cancelled on the
/// remote side.
#[derive(Clone)]
pub struct RemoteFs {
    session: Arc<dyn RemoteSession>,
    paths: PathResolver,
}

impl RemoteFs {
    pub fn new(session: Arc<dyn RemoteSession>, root: &str) -> Self {
        RemoteFs {
            session,
            paths: PathResolver::new(root),
        }
    }

    pub fn root(&self) -> &str {
        self.paths.root()
    }

    /// `mkdir -p`: creating a directory that already exists succeeds.
    pub async fn make_dir(&self, name: &str) -> Result<()> {
        let remote_path = self.paths.resolve(name);
        debug!("mkdir {name} -> {remote_path}");
        self.session.create_dir_all(&remote_path).await
    }

    pub async fn open_file(&self, name: &str, flags: OpenFlags) -> Result<OpenFileHandle> {
        let remote_path = self.paths.resolve(name);
        debug!("open {name} -> {remote_path} ({flags:?})");
        let file = self.session.open(&remote_path, flags).await?;
        Ok(OpenFileHandle::new(file, self.session.clone(), remote_path))
    }

    /// Removes a file, or a directory with everything below it.
    ///
    /// Children are removed depth first, in listing order, before their
    /// parent. Symlinks are removed as links and never followed. The first failure stops the walk and is returned as is;
    /// whatever was removed before it stays removed, so after an error the
    /// subtree is in an unknown state and must be re-stat'ed before retrying.
    pub fn remove_all<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        async move {
            let remote_path = self.paths.resolve(name);
            let meta = self.session.symlink_metadata(&remote_path).await?;
            if !meta.is_dir {
                debug!("remove {remote_path}");
                return self.session.remove_file(&remote_path).await;
            }

            let entries = self.session.read_dir(&remote_path).await?;
            for entry in entries {
                let child = join(name, &entry.name);
                if let Err(err) = self.remove_all(&child).await {
                    warn!("removal of {remote_path} aborted at {child}: {err}");
                    return Err(err);
                }
            }
            debug!("rmdir {remote_path}");
            self.session.remove_dir(&remote_path).await
        }
        .boxed()
    }

    pub async fn rename(&self, old_name: &str, new_name: &str) -> Result<()> {
        let old_path = self.paths.resolve(old_name);
        let new_path = self.paths.resolve(new_name);
        debug!("rename {old_path} -> {new_path}");
        self.session.rename(&old_path, &new_path).await
    }

    pub async fn stat(&self, name: &str) -> Result<Metadata> {
        self.session.stat(&self.paths.resolve(name)).await
    }
}
