use std::sync::Arc;

use sftpdav::fs::RemoteFs;
use sftpdav::session::local::LocalSession;
use tempfile::TempDir;

/// A `RemoteFs` rooted at a fresh temporary directory on this host.
pub fn local_fs() -> (TempDir, RemoteFs) {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().to_str().unwrap().to_string();
    let fs = RemoteFs::new(Arc::new(LocalSession::new()), &root);
    (dir, fs)
}
