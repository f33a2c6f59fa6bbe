use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use slate_core::config::{DatabaseDriver, SlateConfig};
use slate_core::db::sqlite::SqliteRepository;
use slate_core::db::DatabasePool;
use slate_core::models::sync::SyncMode;
use slate_core::session::{SessionRegistry, SessionStatus};
use slate_core::source::client::DataApiClient;
use slate_core::sync::{SyncEngine, SyncOptions};
use tracing::{error, info};

/// Run the `sync` command: pull records from the configured source into
/// the local database and print per-type results.
pub async fn run(config_path: &str, mode: SyncMode, batch_size: Option<u32>) -> anyhow::Result<()> {
    let config = SlateConfig::load(Path::new(config_path))?;
    config.validate()?;

    info!("Loaded configuration from {}", config_path);

    if !config.source.enabled {
        println!("Source sync is disabled. Enable it in your config file first.");
        return Ok(());
    }

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
    info!("Connected to database");

    let repo = match pool {
        DatabasePool::Sqlite(p) => Arc::new(SqliteRepository::new(p)),
    };
    let source = Arc::new(DataApiClient::new(
        &config.source.base_url,
        &config.source.api_key,
        config.request_timeout(),
    )?);

    let mut options = SyncOptions::from(&config.sync);
    if let Some(batch_size) = batch_size {
        options.batch_size = batch_size;
    }

    let registry = Arc::new(SessionRegistry::new());
    let handle = registry.begin(mode)?;
    let session_id = handle.id();

    println!("Starting {mode:?} sync...");
    let start = Instant::now();

    let engine = SyncEngine::new(repo, source, options);
    let status = engine.run(handle).await;
    let duration = start.elapsed();

    let snapshot = registry
        .snapshot(session_id)
        .ok_or_else(|| anyhow::anyhow!("sync session vanished"))?;

    match status {
        SessionStatus::Completed => {
            println!("Sync completed in {:.1}s", duration.as_secs_f64());
        }
        SessionStatus::Cancelled => {
            println!("Sync cancelled after {:.1}s", duration.as_secs_f64());
        }
        _ => {
            error!("Sync failed: {:?}", snapshot.error);
            println!("Sync failed after {:.1}s", duration.as_secs_f64());
        }
    }

    for (entity_type, progress) in &snapshot.detailed_progress {
        println!(
            "  {:<22} {:<10} {} records",
            entity_type.to_string(),
            format!("{:?}", progress.status).to_lowercase(),
            progress.current
        );
    }
    if let Some(err) = &snapshot.error {
        println!("  Error: {err}");
    }

    if !matches!(status, SessionStatus::Completed) {
        anyhow::bail!("sync did not complete");
    }
    Ok(())
}
