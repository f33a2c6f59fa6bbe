use std::path::Path;
use std::sync::Arc;

use slate_core::config::{DatabaseDriver, SlateConfig};
use slate_core::db::repository::{
    AssignmentRepository, ConversationRepository, CourseRepository, MessageRepository,
    StarterRepository, SyncStateRepository, UserRepository,
};
use slate_core::db::sqlite::SqliteRepository;
use slate_core::db::DatabasePool;

/// Run the `status` command: print per-type sync cursors and row counts.
pub async fn run(config_path: &str) -> anyhow::Result<()> {
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

    println!("Instance: {}", config.slate.instance_name);
    println!();
    println!("Records:");
    println!("  Users:                 {}", repo.count_users().await?);
    println!("  Courses:               {}", repo.count_courses().await?);
    println!("  Assignments:           {}", repo.count_assignments().await?);
    println!("  Conversation starters: {}", repo.count_starters().await?);
    println!("  Conversations:         {}", repo.count_conversations().await?);
    println!("  Messages:              {}", repo.count_messages().await?);
    println!();

    let states = repo.list_sync_states().await?;
    if states.is_empty() {
        println!("No sync has run yet.");
        return Ok(());
    }

    println!("Sync status:");
    for state in states {
        let last_sync = state
            .last_synced_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S UTC").to_string())
            .unwrap_or_else(|| "never".to_string());
        println!(
            "  {:<22} {:<10} offset {:<8} last sync {}",
            state.entity_type.to_string(),
            state.status.as_str(),
            state.last_offset,
            last_sync
        );
        if let Some(err) = &state.last_error {
            println!("    last error: {err}");
        }
    }

    Ok(())
}
