//! In-memory [`RemoteSession`] for tests.
//!
//! Directory listings come back in creation order, every mutating call is
//! appended to an operation log, listings are counted, and removals can be
//! made to fail for chosen paths.
use std::collections::{HashMap, HashSet};
use std::io::{self, SeekFrom};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::SystemTime;

use tokio::io::{AsyncRead, AsyncSeek, AsyncWrite, ReadBuf};

use crate::error::{RemoteError, Result};
use crate::session::{DirEntry, Metadata, OpenFlags, RemoteFile, RemoteSession};

enum NodeKind {
    Dir { children: Vec<String> },
    File { data: Arc<Mutex<Vec<u8>>> },
}

struct Node {
    kind: NodeKind,
    modified: SystemTime,
}

impl Node {
    fn dir() -> Self {
        Node {
            kind: NodeKind::Dir { children: vec![] },
            modified: SystemTime::now(),
        }
    }

    fn file() -> Self {
        Node {
            kind: NodeKind::File {
                data: Arc::new(Mutex::new(vec![])),
            },
            modified: SystemTime::now(),
        }
    }

    fn metadata(&self) -> Metadata {
        match &self.kind {
            NodeKind::Dir { .. } => Metadata {
                size: 0,
                permissions: Some(0o040755),
                modified: Some(self.modified),
                is_dir: true,
            },
            NodeKind::File { data } => Metadata {
                size: data.lock().unwrap().len() as u64,
                permissions: Some(0o100644),
                modified: Some(self.modified),
                is_dir: false,
            },
        }
    }
}

#[derive(Default)]
struct Tree {
    nodes: HashMap<String, Node>,
    ops: Vec<String>,
    failing: HashSet<String>,
    listings: usize,
}

impl Tree {
    fn node(&self, path: &str) -> Result<&Node> {
        self.nodes
            .get(path)
            .ok_or_else(|| RemoteError::NotFound(path.to_string()))
    }

    fn check_failure(&self, path: &str) -> Result<()> {
        if self.failing.contains(path) {
            return Err(RemoteError::PermissionDenied(path.to_string()));
        }
        Ok(())
    }

    fn attach(&mut self, path: &str, node: Node) -> Result<()> {
        let (parent, name) = split_parent(path);
        match self.nodes.get_mut(&parent).map(|n| &mut n.kind) {
            Some(NodeKind::Dir { children }) => children.push(name),
            Some(NodeKind::File { .. }) => return Err(RemoteError::NotADirectory(parent)),
            None => return Err(RemoteError::NotFound(parent)),
        }
        self.nodes.insert(path.to_string(), node);
        Ok(())
    }

    // Drops `path` from its parent's listing only.
    fn unlink(&mut self, path: &str) {
        let (parent, name) = split_parent(path);
        if let Some(NodeKind::Dir { children }) = self.nodes.get_mut(&parent).map(|n| &mut n.kind) {
            children.retain(|c| *c != name);
        }
    }

    fn detach(&mut self, path: &str) {
        self.unlink(path);
        self.nodes.remove(path);
    }
}

/// Cheap to clone; clones share the same tree.
#[derive(Clone)]
pub struct MemorySession {
    tree: Arc<Mutex<Tree>>,
}

impl Default for MemorySession {
    fn default() -> Self {
        Self::new()
    }
}

impl MemorySession {
    /// Creates a session holding only the root directory `/`.
    pub fn new() -> Self {
        let mut tree = Tree::default();
        tree.nodes.insert("/".to_string(), Node::dir());
        MemorySession {
            tree: Arc::new(Mutex::new(tree)),
        }
    }

    /// Creates (or replaces) a file with `contents`, creating parents.
    pub fn put_file(&self, path: &str, contents: &[u8]) {
        let path = normalize(path);
        let (parent, _) = split_parent(&path);
        self.mkdir_all(&parent).unwrap();
        let mut tree = self.tree.lock().unwrap();
        if tree.nodes.contains_key(&path) {
            tree.detach(&path);
        }
        let node = Node::file();
        if let NodeKind::File { data } = &node.kind {
            data.lock().unwrap().extend_from_slice(contents);
        }
        tree.attach(&path, node).unwrap();
    }

    pub fn contents(&self, path: &str) -> Option<Vec<u8>> {
        let tree = self.tree.lock().unwrap();
        match &tree.nodes.get(&normalize(path))?.kind {
            NodeKind::File { data } => Some(data.lock().unwrap().clone()),
            NodeKind::Dir { .. } => None,
        }
    }

    pub fn exists(&self, path: &str) -> bool {
        self.tree.lock().unwrap().nodes.contains_key(&normalize(path))
    }

    /// Every removal of `path` fails with `PermissionDenied` from now on.
    pub fn fail_removal_of(&self, path: &str) {
        self.tree.lock().unwrap().failing.insert(normalize(path));
    }

    /// Mutating operations in the order they succeeded, e.g. `remove_file /a/x`.
    pub fn ops(&self) -> Vec<String> {
        self.tree.lock().unwrap().ops.clone()
    }

    /// Number of directory listings served so far.
    pub fn listings(&self) -> usize {
        self.tree.lock().unwrap().listings
    }

    fn mkdir_all(&self, path: &str) -> Result<()> {
        let mut tree = self.tree.lock().unwrap();
        let mut current = String::new();
        for component in path.split('/').filter(|c| !c.is_empty()) {
            current.push('/');
            current.push_str(component);
            match tree.nodes.get(&current).map(|n| &n.kind) {
                Some(NodeKind::Dir { .. }) => continue,
                Some(NodeKind::File { .. }) => return Err(RemoteError::NotADirectory(current)),
                None => {
                    tree.attach(&current, Node::dir())?;
                    tree.ops.push(format!("mkdir {current}"));
                }
            }
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl RemoteSession for MemorySession {
    async fn create_dir_all(&self, path: &str) -> Result<()> {
        self.mkdir_all(&normalize(path))
    }

    async fn open(&self, path: &str, flags: OpenFlags) -> Result<Box<dyn RemoteFile>> {
        let path = normalize(path);
        let mut tree = self.tree.lock().unwrap();
        let exists = tree.nodes.contains_key(&path);
        if exists && flags.contains(OpenFlags::CREATE | OpenFlags::EXCLUSIVE) {
            return Err(RemoteError::AlreadyExists(path));
        }
        if !exists {
            if !flags.contains(OpenFlags::CREATE) {
                return Err(RemoteError::NotFound(path));
            }
            tree.attach(&path, Node::file())?;
            tree.ops.push(format!("create {path}"));
        }
        let data = match &tree.node(&path)?.kind {
            NodeKind::File { data } => data.clone(),
            NodeKind::Dir { .. } => Arc::new(Mutex::new(vec![])),
        };
        if flags.contains(OpenFlags::TRUNCATE) {
            data.lock().unwrap().clear();
        }
        Ok(Box::new(MemoryFile {
            tree: self.tree.clone(),
            path,
            data,
            pos: 0,
            append: flags.contains(OpenFlags::APPEND),
        }))
    }

    async fn stat(&self, path: &str) -> Result<Metadata> {
        let tree = self.tree.lock().unwrap();
        Ok(tree.node(&normalize(path))?.metadata())
    }

    // The tree has no links.
    async fn symlink_metadata(&self, path: &str) -> Result<Metadata> {
        self.stat(path).await
    }

    async fn read_dir(&self, path: &str) -> Result<Vec<DirEntry>> {
        let path = normalize(path);
        let mut tree = self.tree.lock().unwrap();
        tree.listings += 1;
        let children = match &tree.node(&path)?.kind {
            NodeKind::Dir { children } => children.clone(),
            NodeKind::File { .. } => return Err(RemoteError::NotADirectory(path)),
        };
        children
            .into_iter()
            .map(|name| {
                let metadata = tree.node(&join(&path, &name))?.metadata();
                Ok(DirEntry { name, metadata })
            })
            .collect()
    }

    async fn remove_file(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock().unwrap();
        tree.check_failure(&path)?;
        if let NodeKind::Dir { .. } = tree.node(&path)?.kind {
            return Err(RemoteError::Remote {
                path,
                message: "is a directory".to_string(),
            });
        }
        tree.detach(&path);
        tree.ops.push(format!("remove_file {path}"));
        Ok(())
    }

    async fn remove_dir(&self, path: &str) -> Result<()> {
        let path = normalize(path);
        let mut tree = self.tree.lock().unwrap();
        tree.check_failure(&path)?;
        match &tree.node(&path)?.kind {
            NodeKind::Dir { children } if !children.is_empty() => {
                return Err(RemoteError::NotEmpty(path));
            }
            NodeKind::Dir { .. } => {}
            NodeKind::File { .. } => return Err(RemoteError::NotADirectory(path)),
        }
        tree.detach(&path);
        tree.ops.push(format!("remove_dir {path}"));
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let (from, to) = (normalize(from), normalize(to));
        let mut tree = self.tree.lock().unwrap();
        tree.node(&from)?;
        if tree.nodes.contains_key(&to) {
            return Err(RemoteError::AlreadyExists(to));
        }
        let (to_parent, _) = split_parent(&to);
        match tree.node(&to_parent)?.kind {
            NodeKind::Dir { .. } => {}
            NodeKind::File { .. } => return Err(RemoteError::NotADirectory(to_parent)),
        }
        let node = tree
            .nodes
            .remove(&from)
            .ok_or_else(|| RemoteError::NotFound(from.clone()))?;
        tree.unlink(&from);
        tree.attach(&to, node)?;

        // Re-key descendants of a moved directory.
        let prefix = format!("{from}/");
        let moved: Vec<String> = tree
            .nodes
            .keys()
            .filter(|k| k.starts_with(&prefix))
            .cloned()
            .collect();
        for old in moved {
            if let Some(node) = tree.nodes.remove(&old) {
                tree.nodes.insert(format!("{to}/{}", &old[prefix.len()..]), node);
            }
        }
        tree.ops.push(format!("rename {from} {to}"));
        Ok(())
    }
}

struct MemoryFile {
    tree: Arc<Mutex<Tree>>,
    path: String,
    data: Arc<Mutex<Vec<u8>>>,
    pos: u64,
    append: bool,
}

impl AsyncRead for MemoryFile {
    fn poll_read(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let n = {
            let data = self.data.lock().unwrap();
            let start = (self.pos as usize).min(data.len());
            let n = buf.remaining().min(data.len() - start);
            buf.put_slice(&data[start..start + n]);
            n
        };
        self.pos += n as u64;
        Poll::Ready(Ok(()))
    }
}

impl AsyncWrite for MemoryFile {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let end = {
            let mut data = self.data.lock().unwrap();
            let start = if self.append {
                data.len()
            } else {
                self.pos as usize
            };
            if data.len() < start + buf.len() {
                data.resize(start + buf.len(), 0);
            }
            data[start..start + buf.len()].copy_from_slice(buf);
            start + buf.len()
        };
        self.pos = end as u64;
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

impl AsyncSeek for MemoryFile {
    fn start_seek(mut self: Pin<&mut Self>, position: SeekFrom) -> io::Result<()> {
        let len = self.data.lock().unwrap().len() as i64;
        let target = match position {
            SeekFrom::Start(offset) => offset as i64,
            SeekFrom::End(delta) => len + delta,
            SeekFrom::Current(delta) => self.pos as i64 + delta,
        };
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of file",
            ));
        }
        self.pos = target as u64;
        Ok(())
    }

    fn poll_complete(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<u64>> {
        Poll::Ready(Ok(self.pos))
    }
}

#[async_trait::async_trait]
impl RemoteFile for MemoryFile {
    async fn metadata(&mut self) -> Result<Metadata> {
        let tree = self.tree.lock().unwrap();
        Ok(tree.node(&self.path)?.metadata())
    }
}

fn normalize(path: &str) -> String {
    let parts: Vec<&str> = path
        .split('/')
        .filter(|s| !s.is_empty() && *s != ".")
        .collect();
    format!("/{}", parts.join("/"))
}

fn split_parent(path: &str) -> (String, String) {
    let n = path.rfind('/').unwrap_or(0);
    if n == 0 {
        ("/".into(), path[1..].into())
    } else {
        (path[..n].into(), path[n + 1..].into())
    }
}

fn join(dir: &str, name: &str) -> String {
    if dir == "/" {
        format!("/{name}")
    } else {
        format!("{dir}/{name}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_listing_keeps_creation_order() {
        let session = MemorySession::new();
        session.put_file("/d/zeta", b"");
        session.put_file("/d/alpha", b"");
        session.create_dir_all("/d/mid").await.unwrap();

        let names: Vec<String> = session
            .read_dir("/d")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["zeta", "alpha", "mid"]);
        assert_eq!(session.listings(), 1);
    }

    #[tokio::test]
    async fn test_rename_moves_subtree() {
        let session = MemorySession::new();
        session.put_file("/src/inner/f", b"data");

        session.rename("/src", "/dst").await.unwrap();
        assert!(!session.exists("/src"));
        assert!(!session.exists("/src/inner/f"));
        assert_eq!(session.contents("/dst/inner/f").unwrap(), b"data");
        let names: Vec<String> = session
            .read_dir("/")
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.name)
            .collect();
        assert_eq!(names, vec!["dst"]);
    }

    #[tokio::test]
    async fn test_failing_removal_is_reported() {
        let session = MemorySession::new();
        session.put_file("/a/x", b"");
        session.fail_removal_of("/a/x");

        let err = session.remove_file("/a/x").await.unwrap_err();
        assert!(matches!(err, RemoteError::PermissionDenied(_)));
        assert!(session.exists("/a/x"));
        assert!(matches!(
            session.remove_dir("/a").await.unwrap_err(),
            RemoteError::NotEmpty(_)
        ));
    }
}
