use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, bail};
use russh::client::{self, Handle};
use russh::keys::{PrivateKeyWithHashAlg, PublicKey, check_known_hosts_path, load_secret_key};
use russh::{Disconnect, Error as SshError};
use russh_sftp::client::SftpSession;
use tracing::{error, info, warn};

use crate::config::SshTarget;
use crate::session::sftp::SftpRemote;

const INACTIVITY_TIMEOUT: Duration = Duration::from_secs(300);

/// Accepts the server only if its key is listed in `known_hosts`.
pub struct KnownHostsVerifier {
    host: String,
    port: u16,
    known_hosts: PathBuf,
}

impl client::Handler for KnownHostsVerifier {
    type Error = SshError;

    async fn check_server_key(&mut self, key: &PublicKey) -> Result<bool, Self::Error> {
        match check_known_hosts_path(&self.host, self.port, key, &self.known_hosts) {
            Ok(true) => Ok(true),
            Ok(false) => {
                warn!(
                    "host key for {}:{} not found in {}",
                    self.host,
                    self.port,
                    self.known_hosts.display()
                );
                Ok(false)
            }
            Err(e) => {
                error!("host key check for {} failed: {e}", self.host);
                Err(e.into())
            }
        }
    }
}

/// An authenticated SSH connection with its SFTP subsystem.
pub struct SftpConnection {
    ssh: Handle<KnownHostsVerifier>,
    remote: Arc<SftpRemote>,
}

impl SftpConnection {
    pub fn remote(&self) -> Arc<SftpRemote> {
        self.remote.clone()
    }

    /// Ends the SFTP session, then the SSH connection.
    pub async fn close(self) -> anyhow::Result<()> {
        if let Err(e) = self.remote.close().await {
            warn!("failed to close sftp session: {e}");
        }
        self.ssh
            .disconnect(Disconnect::ByApplication, "", "English")
            .await
            .context("failed to disconnect ssh session")
    }
}

/// Dials `target`, verifies its host key, authenticates with the identity
/// file and opens the `sftp` subsystem.
pub async fn connect(target: &SshTarget) -> anyhow::Result<SftpConnection> {
    let key = load_secret_key(&target.identity_file, None).with_context(|| {
        format!(
            "failed to load identity file {}",
            target.identity_file.display()
        )
    })?;

    let config = Arc::new(client::Config {
        inactivity_timeout: Some(INACTIVITY_TIMEOUT),
        ..Default::default()
    });
    let verifier = KnownHostsVerifier {
        host: target.hostname.clone(),
        port: target.port,
        known_hosts: target.known_hosts.clone(),
    };
    let mut ssh = client::connect(
        config,
        (target.hostname.as_str(), target.port),
        verifier,
    )
    .await
    .with_context(|| format!("failed to connect to {}:{}", target.hostname, target.port))?;

    let hash = ssh
        .best_supported_rsa_hash()
        .await
        .context("failed to negotiate signature hash")?
        .flatten();
    let auth = ssh
        .authenticate_publickey(
            target.user.clone(),
            PrivateKeyWithHashAlg::new(Arc::new(key), hash),
        )
        .await
        .context("public key authentication failed")?;
    if !auth.success() {
        bail!(
            "public key authentication rejected for {}@{}",
            target.user,
            target.hostname
        );
    }

    let channel = ssh
        .channel_open_session()
        .await
        .context("failed to open session channel")?;
    channel
        .request_subsystem(true, "sftp")
        .await
        .context("failed to request sftp subsystem")?;
    let sftp = SftpSession::new(channel.into_stream())
        .await
        .context("failed to start sftp session")?;

    info!(
        "connected to {}@{}:{}",
        target.user, target.hostname, target.port
    );
    Ok(SftpConnection {
        ssh,
        remote: Arc::new(SftpRemote::new(sftp)),
    })
}
