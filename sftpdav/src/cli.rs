use std::path::PathBuf;

use clap::{Parser, Subcommand};
use sftpdav::config::ServeConfig;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub(crate) struct Args {
    #[command(subcommand)]
    pub(crate) command: Commands,
}

#[derive(Subcommand, Debug)]
pub(crate) enum Commands {
    /// Serve a directory of an SSH host over WebDAV
    Remote(RemoteArgs),
    /// Serve a local directory over WebDAV
    Local(LocalArgs),
}

#[derive(clap::Args, Debug)]
pub(crate) struct ServeArgs {
    /// WebDAV listening address
    #[arg(long, env = "SFTPDAV_LISTEN", default_value = "0.0.0.0")]
    pub(crate) listen: String,

    /// WebDAV listening port
    #[arg(short, long, env = "SFTPDAV_PORT", default_value_t = 8811)]
    pub(crate) port: u16,
}

impl ServeArgs {
    pub(crate) fn to_config(&self) -> ServeConfig {
        ServeConfig {
            listen: self.listen.clone(),
            port: self.port,
        }
    }
}

#[derive(clap::Args, Debug)]
pub(crate) struct RemoteArgs {
    /// Host alias, looked up in the ssh config
    #[arg(long, env = "SFTPDAV_HOST")]
    pub(crate) host: String,

    /// Directory on the remote host to serve
    #[arg(long, env = "SFTPDAV_REMOTE_DIR", default_value = ".")]
    pub(crate) remote_dir: String,

    /// ssh config file [default: ~/.ssh/config]
    #[arg(long)]
    pub(crate) ssh_config: Option<PathBuf>,

    /// known_hosts file [default: ~/.ssh/known_hosts]
    #[arg(long)]
    pub(crate) known_hosts: Option<PathBuf>,

    #[command(flatten)]
    pub(crate) serve: ServeArgs,
}

#[derive(clap::Args, Debug)]
pub(crate) struct LocalArgs {
    /// Local directory to serve
    #[arg(long, default_value = "./")]
    pub(crate) dir: String,

    #[command(flatten)]
    pub(crate) serve: ServeArgs,
}
