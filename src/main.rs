use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use factorio_mod_sync::app::CatalogQuery;
use factorio_mod_sync::{App, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "factorio-mod-sync")]
#[command(
    author,
    version,
    about = "Sync Factorio mods from the mod portal"
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Mods directory override for this invocation
    #[arg(long)]
    mods_dir: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List one page of the portal catalog
    List {
        #[command(flatten)]
        query: QueryArgs,

        /// Only mods named in the local mod-list.json
        #[arg(long)]
        local: bool,
    },

    /// Fuzzy search the portal catalog by name and title
    Search {
        query: String,

        #[command(flatten)]
        catalog: QueryArgs,
    },

    /// Show details for one mod
    Info {
        name: String,

        /// Fetch the short record without changelog and release history
        #[arg(long)]
        summary: bool,
    },

    /// Flip a mod's enabled flag
    Toggle { name: String },

    /// Enable a mod
    Enable { name: String },

    /// Disable a mod
    Disable { name: String },

    /// Download every enabled mod into the mods directory
    Download,

    /// Delete a mod's archives from the mods directory
    Remove { name: String },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
}

#[derive(Args)]
struct QueryArgs {
    /// Page number, 0-based
    #[arg(long, default_value_t = 0)]
    page: u32,

    /// Results per page, or "max"
    #[arg(long)]
    page_size: Option<String>,

    /// Factorio version: 0.13, 0.14, 0.15, 0.16, 0.17, 0.18, 1.0, 1.1
    #[arg(long)]
    version: Option<String>,

    /// Sort order: downloads, name, score, updated, created
    #[arg(long)]
    sort: Option<String>,

    /// Include deprecated mods
    #[arg(long)]
    include_deprecated: bool,
}

impl From<QueryArgs> for CatalogQuery {
    fn from(args: QueryArgs) -> Self {
        CatalogQuery {
            page: args.page,
            page_size: args.page_size,
            version: args.version,
            sort: args.sort,
            include_deprecated: args.include_deprecated,
        }
    }
}

#[derive(Subcommand)]
enum ConfigCommands {
    /// Print the active configuration
    Show,
}

fn setup_logging(verbosity: u8) {
    let filter = match verbosity {
        0 => "factorio_mod_sync=info",
        1 => "factorio_mod_sync=debug",
        2 => "factorio_mod_sync=trace",
        _ => "trace",
    };

    let log_dir = std::env::var_os("HOME")
        .map(std::path::PathBuf::from)
        .unwrap_or_else(|| std::path::PathBuf::from("."))
        .join(".factorio-mod-sync");

    std::fs::create_dir_all(&log_dir).ok();
    let log_file = log_dir.join("factorio-mod-sync.log");

    let env_filter =
        tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into());

    match std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_file)
    {
        Ok(file) => {
            let file_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(std::sync::Arc::new(file));
            let stderr_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(stderr_layer)
                .init();
        }
        Err(e) => {
            let stderr_layer = tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr);
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
            tracing::warn!("Cannot open log file {}: {}", log_file.display(), e);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    // Load configuration
    let mut config = Config::load().await?;
    if let Some(mods_dir) = cli.mods_dir.as_deref() {
        let trimmed = mods_dir.trim();
        if trimmed.is_empty() {
            anyhow::bail!("--mods-dir cannot be empty");
        }
        config.mods_dir = Some(trimmed.to_string());
    }

    // Initialize app
    let app = App::new(config).await?;

    // Ctrl-C aborts in-flight requests; partial downloads are cleaned up.
    let cancel = app.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    match cli.command {
        Commands::List { query, local } => app.cmd_list(&query.into(), local).await?,
        Commands::Search { query, catalog } => app.cmd_search(&query, &catalog.into()).await?,
        Commands::Info { name, summary } => app.cmd_info(&name, summary).await?,
        Commands::Toggle { name } => app.cmd_toggle(&name).await?,
        Commands::Enable { name } => app.cmd_enable(&name).await?,
        Commands::Disable { name } => app.cmd_disable(&name).await?,
        Commands::Download => app.cmd_download().await?,
        Commands::Remove { name } => app.cmd_remove(&name).await?,
        Commands::Config { action } => match action {
            ConfigCommands::Show => app.cmd_config_show().await?,
        },
    }

    Ok(())
}
