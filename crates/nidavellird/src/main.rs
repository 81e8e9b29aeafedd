//! nidavellird: the Nidavellir configuration store daemon.
//!
//! Opens the store, seeds defaults into an empty key-space and serves the
//! REST + SSE API.
//!
//! # Usage
//!
//! ```text
//! nidavellird serve --config nidavellir.toml --envs envs.toml --port 8080
//! nidavellird seed  --config nidavellir.toml --envs envs.toml
//! ```

mod context;
mod logging;
mod settings;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use context::AppContext;
use nidavellir_config::SeedOutcome;
use settings::Settings;

#[derive(Parser)]
#[command(name = "nidavellird", about = "Nidavellir configuration store daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Seed defaults and serve the API until interrupted.
    Serve {
        /// Settings file.
        #[arg(long, default_value = "nidavellir.toml")]
        config: PathBuf,

        /// Defaults seed file.
        #[arg(long, default_value = "envs.toml")]
        envs: PathBuf,

        /// Override the configured HTTP port.
        #[arg(long)]
        port: Option<u16>,
    },
    /// Seed defaults into an empty store and exit.
    Seed {
        /// Settings file.
        #[arg(long, default_value = "nidavellir.toml")]
        config: PathBuf,

        /// Defaults seed file.
        #[arg(long, default_value = "envs.toml")]
        envs: PathBuf,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve { config, envs, port } => {
            let mut settings = startup(&config)?;
            if let Some(port) = port {
                settings.http.port = port;
            }
            run_serve(settings, &envs).await
        }
        Command::Seed { config, envs } => {
            let settings = startup(&config)?;
            run_seed(settings, &envs).await
        }
    }
}

/// Load settings and install logging.
fn startup(config: &Path) -> anyhow::Result<Settings> {
    let settings = Settings::load(config)?;
    logging::init(&settings.log)?;
    if !config.exists() {
        warn!(path = %config.display(), "settings file not found, using defaults");
    }
    Ok(settings)
}

async fn run_seed(settings: Settings, envs: &Path) -> anyhow::Result<()> {
    let defaults = settings::load_defaults(envs)?;
    let ctx = AppContext::open(settings)?;
    match ctx.seed(&defaults).await {
        SeedOutcome::Aborted { error, .. } => Err(error).context("seeding failed"),
        outcome => {
            info!(?outcome, "seed finished");
            Ok(())
        }
    }
}

async fn run_serve(settings: Settings, envs: &Path) -> anyhow::Result<()> {
    info!("Nidavellir daemon starting");

    let ctx = AppContext::open(settings)?;

    // A broken seed file must not keep the daemon down.
    match settings::load_defaults(envs) {
        Ok(defaults) => {
            ctx.seed(&defaults).await;
        }
        Err(e) => warn!(error = %e, "skipping seed"),
    }

    if !ctx.settings.http.enable {
        info!("HTTP disabled, waiting for shutdown signal");
        shutdown_signal().await;
        ctx.store.close_watches();
        info!("Nidavellir daemon stopped");
        return Ok(());
    }

    let router = nidavellir_api::build_router(ctx.api.clone());
    let http = &ctx.settings.http;
    let addr: SocketAddr = format!("{}:{}", http.host, http.port)
        .parse()
        .with_context(|| format!("invalid listen address {}:{}", http.host, http.port))?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    info!(%addr, "API server starting");

    let store = ctx.store.clone();
    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            shutdown_signal().await;
            info!("shutdown signal received");
            // Ends open SSE streams so in-flight requests can drain.
            store.close_watches();
        })
        .await?;

    info!("Nidavellir daemon stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
