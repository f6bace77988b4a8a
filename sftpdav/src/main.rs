use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Parser;
use cli::{Args, Commands, LocalArgs, RemoteArgs};
use sftpdav::api;
use sftpdav::config::{ServeConfig, SshTarget};
use sftpdav::fs::RemoteFs;
use sftpdav::session::connect::connect;
use sftpdav::session::local::LocalSession;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    match args.command {
        Commands::Remote(remote) => serve_remote(remote).await,
        Commands::Local(local) => serve_local(local).await,
    }
}

async fn serve_remote(args: RemoteArgs) -> anyhow::Result<()> {
    let target = SshTarget::resolve(
        &args.host,
        args.ssh_config.as_deref(),
        args.known_hosts.as_deref(),
    )?;
    let conn = connect(&target).await?;
    let fs = RemoteFs::new(conn.remote(), &args.remote_dir);

    let served = serve(fs, &args.serve.to_config()).await;
    if let Err(e) = conn.close().await {
        warn!("{e:#}");
    }
    served
}

async fn serve_local(args: LocalArgs) -> anyhow::Result<()> {
    match tokio::fs::metadata(Path::new(&args.dir)).await {
        Ok(meta) if meta.is_dir() => {}
        Ok(_) => bail!("`{}` exists but is not a directory", args.dir),
        Err(e) => return Err(e).with_context(|| format!("cannot serve `{}`", args.dir)),
    }
    let fs = RemoteFs::new(Arc::new(LocalSession::new()), &args.dir);
    serve(fs, &args.serve.to_config()).await
}

async fn serve(fs: RemoteFs, config: &ServeConfig) -> anyhow::Result<()> {
    let root = fs.root().to_string();
    let app = api::create_router(fs);

    let listener = tokio::net::TcpListener::bind(config.addr())
        .await
        .with_context(|| format!("failed to bind {}", config.addr()))?;
    info!("serving {root} on http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutting down");
}
