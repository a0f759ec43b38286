//! olab-ui - Ontology Labeler web service
//!
//! Serves the labeling UI and its JSON API. Durable state lives either in a
//! local SQLite database inside the root folder or in a hosted REST backend,
//! as selected by `olab.toml`.

use anyhow::{Context, Result};
use clap::Parser;
use olab_common::config::{BackendConfig, RootFolderInitializer, RootFolderResolver, TomlConfig};
use olab_common::db::init_database;
use olab_core::auth::{AuthProvider, HostedAuth, LocalAuth};
use olab_core::store::{RestStore, SqliteStore};
use olab_ui::api::buildinfo::BuildInfo;
use olab_ui::{build_router, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for olab-ui
#[derive(Parser, Debug)]
#[command(name = "olab-ui")]
#[command(about = "Ontology sentence labeling service")]
#[command(version)]
struct Args {
    /// Root folder holding olab.toml and the local database
    #[arg(short, long)]
    root_folder: Option<PathBuf>,

    /// Port to listen on (overrides olab.toml)
    #[arg(short, long, env = "OLAB_PORT")]
    port: Option<u16>,

    /// Address to bind (overrides olab.toml)
    #[arg(short, long, env = "OLAB_BIND")]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "olab_ui=info,olab_core=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Build identification first, before any backend delays
    info!("Starting Ontology Labeler: {}", BuildInfo::current());

    let args = Args::parse();

    let root_folder = RootFolderResolver::new("olab-ui")
        .with_cli_arg(args.root_folder)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to create root folder")?;

    let config_path = initializer.config_path();
    let config = TomlConfig::load_or_default(&config_path);
    let timeout = config.session.request_timeout();
    let inactivity = config.session.inactivity_timeout();

    let state = match &config.backend {
        BackendConfig::Local => {
            let db_path = initializer.database_path();
            info!("Database path: {}", db_path.display());
            let pool = init_database(&db_path)
                .await
                .context("Failed to open database")?;
            let store = Arc::new(SqliteStore::new(pool.clone(), timeout));
            let auth: Arc<dyn AuthProvider> = Arc::new(LocalAuth::new(pool, inactivity));
            AppState::new(store, auth, config.clone(), Some(config_path))
        }
        BackendConfig::Hosted { url, api_key } => {
            let store = Arc::new(
                RestStore::new(url, api_key, timeout).context("Failed to create REST client")?,
            );
            let auth: Arc<dyn AuthProvider> = Arc::new(
                HostedAuth::new(url, api_key, timeout, inactivity)
                    .context("Failed to create auth client")?,
            );
            info!(url = %url, "Hosted backend URL");
            AppState::new(store, auth, config.clone(), Some(config_path))
        }
    };

    info!(backend = config.backend.kind(), "Backend ready");
    let _auth_listener = state.watch_auth_events();
    let app = build_router(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let bind = args.bind.unwrap_or_else(|| config.server.bind.clone());
    let port = args.port.unwrap_or(config.server.port);
    let addr = format!("{}:{}", bind, port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;
    info!("olab-ui listening on http://{}", addr);
    info!("Health check: http://{}/health", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
