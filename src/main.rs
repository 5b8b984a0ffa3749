//! StreamHub Engine
//!
//! Backend for a video platform with a social layer.
//!
//! # Architecture
//!
//! - **Feed**: filtered, ranked and paginated content queries
//! - **Content**: uploads to cloud media storage, edits, publishing, removal
//! - **Social**: interactions, follows, comments, notifications, watch history
//! - **API Server**: REST endpoints for frontend consumption
//!
//! # Graceful Shutdown
//!
//! The engine handles SIGTERM and SIGINT signals, ensuring:
//! - In-flight requests complete
//! - Database connections are closed cleanly

use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use streamhub::api::{self, AppState};
use streamhub::config::{Config, StoreBackend};
use streamhub::media::{CloudinaryStorage, MediaStorage};
use streamhub::store::{ContentRepository, MemoryStore, PgStore, SocialRepository};
use streamhub::views::{ViewSink, ViewTrigger};
use streamhub::{ContentService, Database, Result, SocialService};

/// Store handles behind their trait objects
struct Stores {
    contents: Arc<dyn ContentRepository>,
    social: Arc<dyn SocialRepository>,
    views: Arc<dyn ViewSink>,
    db: Option<Database>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 StreamHub Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    let config = Arc::new(Config::from_env()?);
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "prometheus")]
    install_metrics_exporter(config.metrics_port)?;

    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let stores = connect_stores(&config).await?;

    let media: Arc<dyn MediaStorage> = Arc::new(CloudinaryStorage::new(config.media.clone())?);

    let content = ContentService::new(
        stores.contents.clone(),
        stores.social.clone(),
        media,
        ViewTrigger::new(stores.views.clone()),
        config.feed.clone(),
    );
    let social = SocialService::new(
        stores.contents.clone(),
        stores.social.clone(),
        config.feed.clone(),
    );

    let state = Arc::new(AppState {
        api: config.api.clone(),
        content,
        social,
        store: stores.contents.clone(),
    });

    info!("🌐 Starting API server on port {}...", config.api.port);
    let mut server = spawn_api_server(state, shutdown_tx.subscribe());

    info!("═══════════════════════════════════════════════════════════════");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    tokio::select! {
        _ = shutdown_signal() => {
            info!("📴 Shutdown signal received");
        }
        _ = &mut server => {
            warn!("⚠️ API server stopped unexpectedly, initiating shutdown");
        }
    }

    info!("🛑 Initiating graceful shutdown...");
    let _ = shutdown_tx.send(());

    if !server.is_finished()
        && tokio::time::timeout(Duration::from_secs(30), server)
            .await
            .is_err()
    {
        warn!("⚠️ Shutdown timeout exceeded, forcing exit");
    }

    if let Some(db) = stores.db {
        db.close().await;
    }

    info!("👋 StreamHub Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("streamhub_engine=debug,streamhub=debug,tower_http=debug,sqlx=warn,info")
    });

    let json = std::env::var("LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_current_span(true))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_file(false)
                    .with_line_number(false)
                    .with_ansi(std::env::var("NO_COLOR").is_err()),
            )
            .init();
    }
}

/// Open the configured store backend
async fn connect_stores(config: &Config) -> Result<Stores> {
    match config.store {
        StoreBackend::Postgres => {
            let db = Database::connect(&config.database).await?;
            info!("✅ Database connection pool established");

            info!("📦 Running database migrations...");
            db.migrate().await?;
            info!("✅ Database migrations applied");

            let store = Arc::new(PgStore::new(db.clone()));
            Ok(Stores {
                contents: store.clone(),
                social: store.clone(),
                views: store,
                db: Some(db),
            })
        }
        StoreBackend::Memory => {
            warn!("⚠️ Using the in-memory store, data is lost on restart");
            let store = Arc::new(MemoryStore::new());
            Ok(Stores {
                contents: store.clone(),
                social: store.clone(),
                views: store,
                db: None,
            })
        }
    }
}

#[cfg(feature = "prometheus")]
fn install_metrics_exporter(port: u16) -> Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| streamhub::Error::Config {
            message: format!("Failed to install metrics exporter: {}", e).into(),
            source: Some(Box::new(e)),
        })?;
    info!("📈 Prometheus metrics on port {}", port);
    Ok(())
}

/// Spawn the API server
fn spawn_api_server(
    state: Arc<AppState>,
    shutdown_rx: broadcast::Receiver<()>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if let Err(e) = api::serve(state, shutdown_rx).await {
            error!("API server error: {:?}", e);
        }
    })
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
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
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
