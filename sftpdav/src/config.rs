use std::env;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, info};

pub const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read ssh config `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("invalid port `{value}` for host `{host}`")]
    InvalidPort { host: String, value: String },
    #[error("cannot determine home directory")]
    NoHome,
    #[error("cannot determine login user: USER is not set")]
    NoUser,
}

/// Where the WebDAV endpoint listens.
#[derive(Clone, Debug)]
pub struct ServeConfig {
    pub listen: String,
    pub port: u16,
}

impl ServeConfig {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.listen, self.port)
    }
}

/// Everything needed to reach one SSH host, after `~/.ssh/config` lookup.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SshTarget {
    pub alias: String,
    pub user: String,
    pub hostname: String,
    pub port: u16,
    pub identity_file: PathBuf,
    pub known_hosts: PathBuf,
}

impl SshTarget {
    /// Resolves `alias` through an ssh config file.
    ///
    /// `ssh_config` defaults to `~/.ssh/config` and `known_hosts` to
    /// `~/.ssh/known_hosts`. A missing config file is not an error; every
    /// setting then takes its default.
    pub fn resolve(
        alias: &str,
        ssh_config: Option<&Path>,
        known_hosts: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let config_path = match ssh_config {
            Some(path) => path.to_path_buf(),
            None => ssh_dir()?.join("config"),
        };
        let settings = match std::fs::read_to_string(&config_path) {
            Ok(contents) => HostSettings::parse(&contents, alias),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!("no ssh config at {}", config_path.display());
                HostSettings::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: config_path,
                    source,
                });
            }
        };

        let target = Self::from_settings(alias, settings, known_hosts)?;
        info!(
            "ssh target {}@{}:{} (identity {})",
            target.user,
            target.hostname,
            target.port,
            target.identity_file.display()
        );
        Ok(target)
    }

    fn from_settings(
        alias: &str,
        settings: HostSettings,
        known_hosts: Option<&Path>,
    ) -> Result<Self, ConfigError> {
        let user = match settings.user {
            Some(user) => user,
            None => env::var("USER")
                .ok()
                .filter(|u| !u.is_empty())
                .ok_or(ConfigError::NoUser)?,
        };
        let port = match settings.port {
            Some(value) => value.parse().map_err(|_| ConfigError::InvalidPort {
                host: alias.to_string(),
                value,
            })?,
            None => DEFAULT_SSH_PORT,
        };
        let identity_file = match settings.identity_file {
            Some(raw) => expand_path(&raw)?,
            None => ssh_dir()?.join("id_rsa"),
        };
        let known_hosts = match known_hosts {
            Some(path) => path.to_path_buf(),
            None => ssh_dir()?.join("known_hosts"),
        };

        Ok(SshTarget {
            alias: alias.to_string(),
            user,
            hostname: settings.hostname.unwrap_or_else(|| alias.to_string()),
            port,
            identity_file,
            known_hosts,
        })
    }
}

/// The subset of ssh_config(5) settings the bridge uses. The first value
/// obtained for each keyword wins, as ssh does it.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HostSettings {
    pub user: Option<String>,
    pub hostname: Option<String>,
    pub port: Option<String>,
    pub identity_file: Option<String>,
}

impl HostSettings {
    pub fn parse(contents: &str, alias: &str) -> Self {
        let mut settings = HostSettings::default();
        // Lines before the first `Host` apply to every host.
        let mut active = true;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((keyword, value)) = split_directive(line) else {
                continue;
            };
            match keyword.to_ascii_lowercase().as_str() {
                "host" => active = host_matches(value, alias),
                // Match blocks need runtime criteria we do not evaluate.
                "match" => active = false,
                _ if !active => {}
                "user" => set_once(&mut settings.user, value),
                "hostname" => set_once(&mut settings.hostname, value),
                "port" => set_once(&mut settings.port, value),
                "identityfile" => set_once(&mut settings.identity_file, value),
                _ => {}
            }
        }
        settings
    }
}

fn set_once(slot: &mut Option<String>, value: &str) {
    if slot.is_none() {
        slot.replace(unquote(value).to_string());
    }
}

fn unquote(value: &str) -> &str {
    value
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .unwrap_or(value)
}

// `Keyword value`, `Keyword=value` and `Keyword = value` are all valid.
fn split_directive(line: &str) -> Option<(&str, &str)> {
    let end = line.find(|c: char| c.is_whitespace() || c == '=')?;
    let (keyword, rest) = line.split_at(end);
    let rest = rest.trim_start();
    let rest = rest.strip_prefix('=').unwrap_or(rest).trim();
    if rest.is_empty() {
        return None;
    }
    Some((keyword, rest))
}

/// A `Host` line matches when any pattern matches and no negated one does.
fn host_matches(patterns: &str, alias: &str) -> bool {
    let mut matched = false;
    for pattern in patterns.split_whitespace() {
        match pattern.strip_prefix('!') {
            Some(negated) if glob_match(negated.as_bytes(), alias.as_bytes()) => return false,
            Some(_) => {}
            None => matched |= glob_match(pattern.as_bytes(), alias.as_bytes()),
        }
    }
    matched
}

fn glob_match(pattern: &[u8], text: &[u8]) -> bool {
    match (pattern.first(), text.first()) {
        (None, None) => true,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], text) || (!text.is_empty() && glob_match(pattern, &text[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &text[1..]),
        (Some(p), Some(t)) if p.eq_ignore_ascii_case(t) => glob_match(&pattern[1..], &text[1..]),
        _ => false,
    }
}

fn ssh_dir() -> Result<PathBuf, ConfigError> {
    Ok(dirs::home_dir().ok_or(ConfigError::NoHome)?.join(".ssh"))
}

/// Expands `$VAR`/`${VAR}` from the environment, then a leading `~`.
/// Unset variables expand to nothing.
pub fn expand_path(raw: &str) -> Result<PathBuf, ConfigError> {
    let expanded = expand_env(raw);
    if expanded == "~" {
        return dirs::home_dir().ok_or(ConfigError::NoHome);
    }
    if let Some(rest) = expanded.strip_prefix("~/") {
        return Ok(dirs::home_dir().ok_or(ConfigError::NoHome)?.join(rest));
    }
    Ok(PathBuf::from(expanded))
}

fn expand_env(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        let name: String = if chars.peek() == Some(&'{') {
            chars.next();
            chars.by_ref().take_while(|&c| c != '}').collect()
        } else {
            let mut name = String::new();
            while let Some(&c) = chars.peek() {
                if !(c.is_ascii_alphanumeric() || c == '_') {
                    break;
                }
                name.push(c);
                chars.next();
            }
            name
        };
        if name.is_empty() {
            out.push('$');
            continue;
        }
        out.push_str(&env::var(&name).unwrap_or_default());
    }
    out
}
