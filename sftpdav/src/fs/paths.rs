// PathResolver maps root-relative names handed out by the serving layer to
// paths on the remote session.
//
// The name is cleaned as if it were absolute before it is joined, so `..`
// stops at the root:
//
//	root = /srv/share
//	/docs/a.txt      -> /srv/share/docs/a.txt
//	/                -> /srv/share
//	/../etc/passwd   -> /srv/share/etc/passwd
//
// A relative root such as `.` stays relative and is interpreted by the
// remote side (for SFTP: the login directory).

#[derive(Clone, Debug)]
pub struct PathResolver {
    root: String,
}

impl PathResolver {
    pub fn new(root: &str) -> Self {
        PathResolver {
            root: clean(root),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Returns the remote path for `name`, always inside the root.
    pub fn resolve(&self, name: &str) -> String {
        let rel = clean_rooted(name);
        if rel.is_empty() {
            return self.root.clone();
        }
        match self.root.as_str() {
            "." => rel,
            "/" => format!("/{rel}"),
            root => format!("{root}/{rel}"),
        }
    }
}

/// Joins a child entry name onto a root-relative name.
pub fn join(name: &str, child: &str) -> String {
    let base = name.trim_end_matches('/');
    format!("{base}/{child}")
}

// Components of `name` read as an absolute path, `..` clamped at the top.
fn clean_rooted(name: &str) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for part in name.split('/') {
        match part {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            part => parts.push(part),
        }
    }
    parts.join("/")
}

// Lexical clean of the configured root; leading `..` survive on relative roots.
fn clean(root: &str) -> String {
    let rooted = root.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in root.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&"..") | None if !rooted => parts.push(".."),
                None => {}
                Some(_) => {
                    parts.pop();
                }
            },
            part => parts.push(part),
        }
    }
    let joined = parts.join("/");
    match (rooted, joined.is_empty()) {
        (true, _) => format!("/{joined}"),
        (false, true) => ".".to_string(),
        (false, false) => joined,
    }
}
