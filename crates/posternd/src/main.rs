//! `posternd` — the Postern daemon.
//!
//! Out-of-band management gateway: operators register nodes, each bound to
//! a BMC driver; admins mint short-lived bearer tokens; token holders
//! stream the serial console and issue power/boot control operations.
//!
//! # Usage
//!
//! ```text
//! posternd                          # run with ./config.json
//! posternd -c /etc/postern.json    # run with an explicit config
//! posternd --gen-token             # print a fresh token and exit
//! ```

mod config;
mod telemetry;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use postern_core::{Daemon, State};
use postern_driver::Registry;
use postern_http::{ApiServer, ApiServerConfig};
use postern_store::NodeStore;
use postern_types::Token;
use tracing::{info, warn};

use config::Config;

#[derive(Parser)]
#[command(
    name = "posternd",
    version,
    about = "Out-of-band management gateway daemon"
)]
struct Cli {
    /// Path to the JSON config file.
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Print one freshly generated admin token to stdout and exit.
    #[arg(long)]
    gen_token: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.gen_token {
        println!("{}", Token::random().to_hex());
        return Ok(());
    }

    let config = Config::load(&cli.config).context("failed to load config")?;
    telemetry::init(&config.log_level);

    info!(
        db_path = %config.db_path,
        listen_addr = %config.listen_addr,
        insecure = config.insecure,
        "starting posternd"
    );

    let store = Arc::new(
        NodeStore::open(&config.db_path)
            .with_context(|| format!("failed to open node store at {}", config.db_path))?,
    );

    let registry = Arc::new(Registry::standard());
    let state = State::new(store, registry).context("failed to load node state")?;
    let daemon = Arc::new(Daemon::new(state));

    let server = ApiServer::new(ApiServerConfig {
        daemon: daemon.clone(),
        admin_token: config.admin_token,
    });

    if config.insecure {
        warn!("TLS disabled; serving plain HTTP");
        server
            .serve_with_shutdown(&config.listen_addr, shutdown_signal())
            .await
            .context("API server failed")?;
    } else {
        serve_tls(server, &config).await?;
    }

    // Cancel every node's coordinator and wait for them to drain, so any
    // running `sol activate` processes are cleaned up before exit.
    daemon.close().await;
    info!("shutdown complete");
    Ok(())
}

/// Serve the API over TLS, with the same graceful-shutdown behavior as the
/// plain listener.
async fn serve_tls(server: ApiServer, config: &Config) -> Result<()> {
    let (cert, key) = match (&config.tls_cert, &config.tls_key) {
        (Some(cert), Some(key)) => (cert, key),
        // Config validation enforces this; repeat it rather than panic.
        _ => anyhow::bail!("tls_cert and tls_key are required unless insecure is set"),
    };
    let tls = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
        .await
        .context("failed to load TLS certificate/key")?;

    let addr: std::net::SocketAddr = config
        .listen_addr
        .parse()
        .context("listen_addr must be host:port")?;

    let handle = axum_server::Handle::new();
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            shutdown_signal().await;
            handle.graceful_shutdown(Some(std::time::Duration::from_secs(10)));
        });
    }

    info!(%addr, "API listening (TLS)");
    axum_server::bind_rustls(addr, tls)
        .handle(handle)
        .serve(server.into_router().into_make_service())
        .await
        .context("API server failed")?;
    Ok(())
}

/// Wait for a SIGTERM or SIGINT (Ctrl-C) signal.
///
/// On the first signal, the returned future resolves and initiates
/// graceful shutdown. If a second signal arrives while shutdown is in
/// progress, the process exits immediately.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received SIGINT (Ctrl-C), initiating graceful shutdown"),
        () = terminate => info!("received SIGTERM, initiating graceful shutdown"),
    }

    tokio::spawn(async {
        let second = async {
            let ctrl_c = tokio::signal::ctrl_c();
            #[cfg(unix)]
            {
                let mut term =
                    tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                        .expect("failed to install second SIGTERM handler");
                tokio::select! {
                    _ = ctrl_c => {},
                    _ = term.recv() => {},
                }
            }
            #[cfg(not(unix))]
            {
                ctrl_c.await.ok();
            }
        };
        second.await;
        warn!("received second signal during shutdown, forcing exit");
        std::process::exit(1);
    });
}
