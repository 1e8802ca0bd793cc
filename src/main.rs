//! Civic Feed Engine
//!
//! HTTP service that scores pulse posts, jobs and artist content against each
//! user's preferences and returns diversity-capped, paginated feeds.
//!
//! # Graceful Shutdown
//!
//! The service handles SIGTERM and SIGINT signals, ensuring:
//! - In-flight requests complete
//! - Database connections are closed cleanly

use std::sync::Arc;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use civic_feed::{api, database, AppState, Authenticator, Config, Database, FeedEngine, PgFeedStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing with structured logging
    init_tracing();

    info!("═══════════════════════════════════════════════════════════════");
    info!("  🚀 Civic Feed Engine v{}", env!("CARGO_PKG_VERSION"));
    info!("═══════════════════════════════════════════════════════════════");

    // Load configuration
    let config = Config::from_env()?;
    info!("✅ Configuration loaded and validated");

    #[cfg(feature = "prometheus")]
    start_metrics_exporter(config.api.metrics_port)?;

    // Initialize database connection pool
    let db = Database::new(&config.database).await?;
    info!("✅ Database connection pool established");

    if config.database.run_migrations {
        info!("📦 Running database migrations...");
        database::run_migrations(db.pool()).await?;
        info!("✅ Database migrations applied");
    } else {
        warn!("⚠️ Skipping migrations (RUN_MIGRATIONS=false)");
    }

    let auth = Authenticator::from_config(&config.auth)?;
    info!("✅ Authenticator ready");

    // Create shared state
    let store = Arc::new(PgFeedStore::new(db.clone()));
    let engine = FeedEngine::new(store, config.feed.clone());
    let state = Arc::new(AppState::new(engine, auth));

    info!("═══════════════════════════════════════════════════════════════");
    info!("  📡 API: http://{}:{}", config.api.host, config.api.port);
    info!(
        "  🔗 Health: http://{}:{}/health",
        config.api.host, config.api.port
    );
    info!("═══════════════════════════════════════════════════════════════");

    api::start_server(state, &config.api, shutdown_signal()).await?;

    // Cleanup resources
    db.close().await;

    info!("👋 Civic Feed Engine stopped gracefully");
    Ok(())
}

/// Initialize structured logging with tracing
///
/// `LOG_FORMAT=json` switches to one JSON object per line.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        // Default log levels
        EnvFilter::new("civic_feed=debug,tower_http=debug,sqlx=warn,info")
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

/// Install the Prometheus recorder and its scrape endpoint
#[cfg(feature = "prometheus")]
fn start_metrics_exporter(port: u16) -> anyhow::Result<()> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let addr: std::net::SocketAddr = ([0, 0, 0, 0], port).into();
    PrometheusBuilder::new().with_http_listener(addr).install()?;

    info!("📊 Metrics exporter ready at http://{}/metrics", addr);
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
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
                warn!("Failed to install SIGTERM handler: {}", e);
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

    info!("📴 Shutdown signal received");
}
