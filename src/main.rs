// ABOUTME: Entry point for the readmark binary.
// ABOUTME: Parses CLI arguments, initializes tracing, runs the startup sequence, and serves HTTP until Ctrl-C.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use readmark_server::{
    AppState, DEFAULT_WEB_ROOT, ServerConfig, ServerOverrides, create_router, load_store,
    prepare_store, resolve_database_path,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt, reload};

/// Reading-progress sync server for KOReader and compatible readers.
#[derive(Parser, Debug)]
#[command(name = "readmark", version, about)]
struct Cli {
    /// Store file. Defaults to the first non-empty of /data/database.json and ./database.json.
    #[arg(long, env = "READMARK_DATABASE")]
    database: Option<PathBuf>,

    /// Restore this .bak file over the store before starting. The restored
    /// store is migrated afterwards like any other old store.
    #[arg(long, value_name = "FILE")]
    restore: Option<PathBuf>,

    /// Write a backup next to the store file after startup migrations.
    #[arg(long)]
    backup: bool,

    /// Serve the web UI even if enable_webui is off.
    #[arg(long)]
    webui: bool,

    /// Directory holding the built web UI.
    #[arg(long, env = "READMARK_WEB_ROOT", default_value = DEFAULT_WEB_ROOT)]
    web_root: PathBuf,

    /// Address to listen on, overriding listen_address (e.g. ":8080" or "127.0.0.1:8080").
    #[arg(long, env = "READMARK_LISTEN")]
    listen: Option<String>,
}

fn default_filter(debug: bool) -> EnvFilter {
    let level = if debug { "debug" } else { "info" };
    EnvFilter::new(format!("readmark={level},tower_http={level}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();

    let from_env = EnvFilter::try_from_default_env().ok();
    let env_filter_set = from_env.is_some();
    let (filter, filter_handle) =
        reload::Layer::new(from_env.unwrap_or_else(|| default_filter(false)));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "readmark starting up");

    let db_path = resolve_database_path(cli.database.clone());
    let store = load_store(&db_path, cli.restore.as_deref())
        .with_context(|| format!("could not open database {}", db_path.display()))?;

    if store.config().await.debug_log && !env_filter_set {
        filter_handle
            .modify(|filter| *filter = default_filter(true))
            .context("could not enable debug logging")?;
        tracing::debug!("debug logging enabled by the database config");
    }

    let stored = prepare_store(&store, cli.backup)
        .await
        .context("could not prepare database")?;

    let overrides = ServerOverrides {
        listen: cli.listen,
        force_web_ui: cli.webui,
        web_root: cli.web_root,
    };
    let server_config = ServerConfig::resolve(&stored, &overrides)?;

    let state = Arc::new(AppState::new(Arc::clone(&store)).with_web_root(server_config.web_root));
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(server_config.listen)
        .await
        .with_context(|| format!("could not bind {}", server_config.listen))?;
    tracing::info!(address = %server_config.listen, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("shutting down, writing database");
    store.persist().await.context("final database write failed")?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}
