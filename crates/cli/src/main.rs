use clap::Parser;
use slate_core::models::sync::SyncMode;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "slate", about = "Learning analytics dashboard and sync service", version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "slate.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Initialize Slate data directory and configuration
    Init {
        /// Data directory path
        #[arg(long, default_value = "/var/lib/slate")]
        data_dir: String,
    },
    /// Run a sync from the configured source
    Sync {
        /// Sync mode
        #[arg(long, value_enum, default_value_t = ModeArg::Incremental)]
        mode: ModeArg,
        /// Records per fetch (1-500)
        #[arg(long)]
        batch_size: Option<u32>,
    },
    /// Show sync status and record counts
    Status,
    /// Start the dashboard web server
    Serve {
        /// Port to listen on
        #[arg(long, default_value = "8080")]
        port: u16,
    },
}

#[derive(clap::ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ModeArg {
    Full,
    Incremental,
}

impl From<ModeArg> for SyncMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Full => SyncMode::Full,
            ModeArg::Incremental => SyncMode::Incremental,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Init { data_dir } => {
            commands::init::run(&cli.config, &data_dir).await?;
        }
        Commands::Sync { mode, batch_size } => {
            commands::sync::run(&cli.config, mode.into(), batch_size).await?;
        }
        Commands::Status => {
            commands::status::run(&cli.config).await?;
        }
        Commands::Serve { port } => {
            commands::serve::run(&cli.config, port).await?;
        }
    }

    Ok(())
}
