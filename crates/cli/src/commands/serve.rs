use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use slate_core::config::{DatabaseDriver, SlateConfig};
use slate_core::db::sqlite::SqliteRepository;
use slate_core::db::DatabasePool;
use slate_core::models::sync::SyncMode;
use slate_core::scheduler::SyncScheduler;
use slate_core::session::SessionRegistry;
use slate_core::source::client::DataApiClient;
use slate_core::sync::{SyncEngine, SyncOptions};
use tokio::net::TcpListener;
use tower_http::set_header::SetResponseHeaderLayer;
use tracing::{info, warn};

/// Run the `serve` command: start the dashboard web server and, when
/// enabled, the periodic background sync.
pub async fn run(config_path: &str, port: u16) -> anyhow::Result<()> {
    let config = SlateConfig::load(Path::new(config_path))?;
    config.validate()?;

    let pool = match config.slate.database.driver {
        DatabaseDriver::Sqlite => {
            let path = config
                .slate
                .database
                .path
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("SQLite path not configured"))?;
            let connect_str = format!("sqlite:{}?mode=rwc", path);
            DatabasePool::new_sqlite(&connect_str).await?
        }
        DatabaseDriver::Postgres => {
            anyhow::bail!("PostgreSQL is not yet supported");
        }
    };
    let repo = match pool {
        DatabasePool::Sqlite(p) => Arc::new(SqliteRepository::new(p)),
    };

    if !config.source.enabled {
        anyhow::bail!("source sync is disabled; set source.enabled = true to serve");
    }
    let source = Arc::new(DataApiClient::new(
        &config.source.base_url,
        &config.source.api_key,
        config.request_timeout(),
    )?);
    let registry = Arc::new(SessionRegistry::new());
    let sync_options = SyncOptions::from(&config.sync);

    let scheduler = if config.scheduler.enabled {
        let scheduler = Arc::new(SyncScheduler::new(Duration::from_secs(
            config.scheduler.interval_minutes * 60,
        )));
        let job_repo = Arc::clone(&repo);
        let job_source: Arc<DataApiClient> = Arc::clone(&source);
        let job_registry = Arc::clone(&registry);
        let job_options = sync_options.clone();
        scheduler.start(move || {
            let repo = Arc::clone(&job_repo);
            let source = Arc::clone(&job_source);
            let registry = Arc::clone(&job_registry);
            let options = job_options.clone();
            async move {
                // A tick that loses the race against a manual sync is
                // skipped, never queued.
                match registry.begin(SyncMode::Incremental) {
                    Ok(handle) => {
                        let engine = SyncEngine::new(repo, source, options);
                        engine.run(handle).await;
                    }
                    Err(e) => warn!(error = %e, "scheduled sync skipped"),
                }
            }
        });
        info!(
            interval_minutes = config.scheduler.interval_minutes,
            "background sync scheduled"
        );
        Some(scheduler)
    } else {
        None
    };

    let state = Arc::new(slate_console::AppState {
        repo,
        registry,
        source,
        sync_options,
        session_retention: Duration::from_secs(config.sync.session_retention_secs),
        scheduler,
    });
    let app = slate_console::router(state);

    // Add security headers
    let app = app
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_FRAME_OPTIONS,
            HeaderValue::from_static("DENY"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
        .layer(SetResponseHeaderLayer::overriding(
            axum::http::header::REFERRER_POLICY,
            HeaderValue::from_static("strict-origin-when-cross-origin"),
        ));

    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    println!("Slate dashboard listening on http://{}", addr);
    info!("Starting server on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down gracefully");
    Ok(())
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("failed to install CTRL+C handler");
    info!("Received shutdown signal");
}
