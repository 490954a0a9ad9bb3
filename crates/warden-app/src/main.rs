//! Warden - browser-resident protection agent.
//!
//! Runs the background coordinator and the localhost bridge the browser
//! extension forwards its hooks to:
//! - download interception with remote malware scanning
//! - navigation guarding (auto page scans, unsafe-URL blocking)
//! - the popup-facing control API

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use directories::ProjectDirs;
use tracing::info;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use warden_agent::{Warden, WardenConfig};
use warden_core::credentials::CredentialStore;
use warden_scan::ScanClient;
use warden_server::{Server, ServerConfig, DEFAULT_PORT};
use warden_storage::Database;

/// Warden - download and navigation protection agent
#[derive(Parser, Debug)]
#[command(name = "warden", version, about)]
struct Args {
    /// Bridge port the extension connects to
    #[arg(long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Base URL of the remote scan service
    #[arg(long, default_value = "https://scan.warden.example/api/")]
    scan_url: String,

    /// Override the data directory (database lives here)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Use an in-memory database (state is lost on exit)
    #[arg(long)]
    in_memory: bool,

    /// Disable automatic page scanning
    #[arg(long)]
    no_auto_scan: bool,

    /// Enable debug logging
    #[arg(long)]
    debug: bool,

    /// Set log level (error, warn, info, debug, trace)
    #[arg(long, default_value = "info")]
    log_level: String,
}

/// Get the logs directory path.
fn logs_dir() -> Option<PathBuf> {
    ProjectDirs::from("com", "warden", "warden").map(|dirs| dirs.data_dir().join("logs"))
}

/// Initialize logging with file rotation.
fn init_logging(args: &Args) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let log_level = if args.debug { "debug" } else { &args.log_level };

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("warden={log_level},warn")));

    if let Some(log_dir) = logs_dir() {
        if std::fs::create_dir_all(&log_dir).is_ok() {
            let file_appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .max_log_files(5)
                .filename_prefix("warden")
                .filename_suffix("log")
                .build(&log_dir)
                .ok();

            if let Some(appender) = file_appender {
                let (non_blocking, guard) = tracing_appender::non_blocking(appender);

                if args.debug {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(std::io::stdout))
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                } else {
                    tracing_subscriber::registry()
                        .with(env_filter)
                        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                        .init();
                }

                tracing::info!("Logging to {:?}", log_dir);
                return Some(guard);
            }
        }
    }

    tracing_subscriber::fmt().with_env_filter(env_filter).init();
    tracing::warn!("File logging unavailable, using console only");
    None
}

fn open_database(args: &Args) -> anyhow::Result<Database> {
    if args.in_memory {
        return Database::in_memory().context("failed to create in-memory database");
    }
    match &args.data_dir {
        Some(dir) => Database::with_path(dir.join("warden.db"))
            .with_context(|| format!("failed to open database in {dir:?}")),
        None => Database::new().context("failed to open database"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging(&args);

    info!("Warden {} starting", env!("CARGO_PKG_VERSION"));

    let db = open_database(&args)?;
    let credentials = CredentialStore::new();
    let client = ScanClient::new(&args.scan_url, credentials.clone())
        .context("invalid scan service URL")?;

    let config = WardenConfig {
        auto_scan_pages: !args.no_auto_scan,
        ..WardenConfig::default()
    };
    let agent = Warden::new(Arc::new(client), credentials, Some(db), config);

    let janitor = agent.spawn_janitor();
    info!(
        protection = %agent.status().protection,
        signed_in = agent.status().signed_in,
        "Agent ready"
    );

    let server = Server::new(ServerConfig::default().with_port(args.port), agent)?;
    info!("Bridge listening on {}", server.addr());

    tokio::select! {
        result = server.run() => result.context("bridge server failed")?,
        _ = tokio::signal::ctrl_c() => info!("Shutting down"),
    }

    janitor.abort();
    Ok(())
}
