//! DocVault -- secure office-document sharing server.
//!
//! Startup is idempotent: schema creation and the ops-account seed run
//! on every boot. SIGTERM/SIGINT handlers only stop accepting
//! connections and wait for in-flight requests before exiting.

use std::sync::Arc;

use clap::Parser;
use tracing::info;

/// Command-line arguments for the DocVault server.
#[derive(Parser, Debug)]
#[command(
    name = "docvault",
    version,
    about = "Secure office-document sharing server"
)]
struct Cli {
    /// Path to the YAML configuration file.
    #[arg(short, long, default_value = "docvault.example.yaml")]
    config: String,

    /// Override the bind address (host:port).
    #[arg(short, long)]
    bind: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config = docvault::config::load_config(&cli.config)?;

    // Initialize tracing / logging. RUST_LOG wins over the config level.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(config.logging.level.clone()));
    if config.logging.format == "json" {
        tracing_subscriber::fmt().json().with_env_filter(env_filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("Loaded configuration from {}", cli.config);

    // Fail fast on an unusable signing setup.
    docvault::auth::parse_algorithm(&config.auth.algorithm)?;
    if config.auth.secret_key.is_empty() {
        anyhow::bail!("auth.secret_key must not be empty");
    }

    let bind_addr = cli
        .bind
        .unwrap_or_else(|| format!("{}:{}", config.server.host, config.server.port));

    // Initialize Prometheus metrics recorder and register metric descriptions.
    if config.observability.metrics {
        docvault::metrics::init_metrics();
        docvault::metrics::describe_metrics();
        info!("Prometheus metrics initialized");
    }

    // Initialize the metadata store.
    let metadata: Arc<dyn docvault::metadata::store::MetadataStore> =
        match config.metadata.engine.as_str() {
            "memory" => {
                info!("In-memory metadata store initialized (no persistence)");
                Arc::new(docvault::metadata::memory::MemoryMetadataStore::new())
            }
            "sqlite" | _ => {
                let metadata_path = &config.metadata.sqlite.path;
                // Ensure parent directory exists for the SQLite file.
                if let Some(parent) = std::path::Path::new(metadata_path).parent() {
                    std::fs::create_dir_all(parent)?;
                }
                let store = docvault::metadata::sqlite::SqliteMetadataStore::new(metadata_path)?;
                info!("SQLite metadata store initialized at {}", metadata_path);
                Arc::new(store)
            }
        };

    // Seed the ops account from config (idempotent on every startup).
    if let Some(bootstrap) = &config.auth.bootstrap {
        docvault::bootstrap::ensure_ops_user(metadata.as_ref(), bootstrap).await?;
    } else {
        info!("No ops bootstrap configured; elevation requires an existing ops account");
    }

    // Initialize blob storage.
    let storage_root = &config.storage.local.root_dir;
    let storage: Arc<dyn docvault::storage::backend::BlobStore> =
        Arc::new(docvault::storage::local::LocalBlobStore::new(storage_root)?);
    info!("Local blob storage initialized at {}", storage_root);

    // Initialize the mailer.
    let mailer = docvault::email::Mailer::from_config(&config.smtp)?;
    if mailer.is_configured() {
        info!("SMTP mailer configured");
    } else {
        info!("SMTP not configured; verification emails will be logged");
    }

    // Build AppState.
    let state = Arc::new(docvault::AppState {
        config: config.clone(),
        metadata,
        storage,
        mailer,
    });

    let app = docvault::server::app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("DocVault listening on {}", bind_addr);

    // Graceful shutdown: on SIGTERM/SIGINT, stop accepting new connections,
    // wait for in-flight requests to complete, then exit.
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("DocVault shut down");

    Ok(())
}

/// Wait for SIGTERM or SIGINT (Ctrl+C), then return to trigger graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
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
        _ = ctrl_c => {
            tracing::info!("Received SIGINT, shutting down");
        },
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        },
    }
}
