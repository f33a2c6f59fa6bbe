use std::path::Path;

use slate_core::config::SlateConfig;
use tracing::info;

/// Run the `init` command: create the data directory and write a starter
/// configuration file.
pub async fn run(config_path: &str, data_dir: &str) -> anyhow::Result<()> {
    if Path::new(config_path).exists() {
        anyhow::bail!("configuration file {config_path} already exists");
    }

    std::fs::create_dir_all(data_dir)?;
    info!("Created data directory {}", data_dir);

    let mut config = SlateConfig::generate_default();
    config.slate.data_dir = data_dir.to_string();
    config.slate.database.path = Some(format!("{}/slate.db", data_dir.trim_end_matches('/')));

    let contents = toml::to_string_pretty(&config)?;
    std::fs::write(config_path, contents)?;

    println!("Wrote configuration to {config_path}");
    println!("Data directory: {data_dir}");
    println!("Next steps:");
    println!("  1. Set source.base_url and source.api_key in {config_path}");
    println!("  2. Set source.enabled = true");
    println!("  3. Run `slate sync --mode full`");

    Ok(())
}
