//! LiveVote - Live Audience Voting Server
//!
//! Serves the voting WebSocket and HTTP API, and offers a few offline
//! maintenance commands against the vote database.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use livevote::api::{HttpServer, IdentityResolver, SessionGate};
use livevote::broadcast::Gateway;
use livevote::config::LiveVoteConfig;
use livevote::error::Result;
use livevote::model::DEFAULT_CONTESTANTS;
use livevote::round::VoteHub;
use livevote::store::{ExportFormat, ExportReport, VoteStore};

/// LiveVote - Live Audience Voting Server
#[derive(Parser)]
#[command(name = "livevote")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "livevote.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); defaults to [logging] level
    #[arg(short, long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the voting server
    Start,

    /// Initialize a new configuration file
    Init {
        /// Output path for configuration file
        #[arg(short, long, default_value = "livevote.toml")]
        output: PathBuf,

        /// Admin password written to the file
        #[arg(long, default_value = "changeme")]
        password: String,
    },

    /// Validate configuration file
    Validate,

    /// Add contestants to the database
    Seed {
        /// Contestant names; seeds the configured roster when omitted
        names: Vec<String>,
    },

    /// Export the vote summary and log
    Export {
        /// csv or json
        #[arg(short, long, default_value = "csv")]
        format: String,

        /// Write to a file instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let level = cli
        .log_level
        .clone()
        .or_else(|| LiveVoteConfig::from_file(&cli.config).ok().map(|c| c.logging.level))
        .unwrap_or_else(|| "info".to_string());
    init_logging(&level);

    match cli.command {
        Commands::Start => {
            run_start(cli.config).await
        }
        Commands::Init { output, password } => {
            run_init(output, password)
        }
        Commands::Validate => {
            run_validate(cli.config)
        }
        Commands::Seed { names } => {
            run_seed(cli.config, names).await
        }
        Commands::Export { format, output } => {
            run_export(cli.config, format, output).await
        }
    }
}

/// Initialize logging
fn init_logging(level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| level.into());

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_config(config_path: &Path) -> Result<LiveVoteConfig> {
    match LiveVoteConfig::from_file(config_path) {
        Ok(c) => Ok(c),
        Err(e) => {
            tracing::error!("Failed to load configuration from {:?}: {}", config_path, e);
            tracing::error!("Run `livevote init` to create one");
            Err(e)
        }
    }
}

/// Roster seeded into an empty database
fn roster(config: &LiveVoteConfig) -> Vec<String> {
    if config.voting.contestants.is_empty() {
        DEFAULT_CONTESTANTS.iter().map(|s| s.to_string()).collect()
    } else {
        config.voting.contestants.clone()
    }
}

/// Start the voting server
async fn run_start(config_path: PathBuf) -> Result<()> {
    tracing::info!("Starting LiveVote server...");

    let config = load_config(&config_path)?;

    let store = match VoteStore::open(&config.database.path) {
        Ok(s) => Arc::new(s),
        Err(e) => {
            tracing::error!("Failed to open vote database {:?}: {}", config.database.path, e);
            return Err(e);
        }
    };
    tracing::info!("Vote database: {}", store.path().display());
    let seeded = store.seed_contestants(&roster(&config)[..]).await?;
    if seeded > 0 {
        tracing::info!("Seeded {} contestants into empty database", seeded);
    }

    let gateway = Arc::new(Gateway::new());
    let hub = VoteHub::new(Arc::clone(&store), gateway, config.default_round()).await?;
    let sessions = Arc::new(SessionGate::new(config.admin.password.clone(), config.session_ttl()));
    let identity = IdentityResolver::new(config.voting.identity, config.server.trust_forwarded_for);

    tracing::info!(
        "Voter identity: {:?}, default round: {}s",
        config.voting.identity,
        config.voting.default_round_secs
    );

    let server = HttpServer::new(config.server.clone(), hub, sessions, identity);
    server.start(shutdown_signal()).await?;

    tracing::info!("LiveVote server stopped");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => tracing::info!("Shutdown signal received"),
        Err(e) => tracing::error!("Failed to listen for shutdown signal: {}", e),
    }
}

/// Initialize a new configuration file
fn run_init(output: PathBuf, password: String) -> Result<()> {
    let config = LiveVoteConfig::sample(&password);
    let body = toml::to_string_pretty(&config)
        .map_err(|e| livevote::Error::Internal(format!("failed to render config: {}", e)))?;

    let content = format!(
        "# LiveVote Configuration\n\
         # Generated configuration file\n\
         # The admin password may also be supplied via ADMIN_PASSWORD.\n\n{}",
        body
    );

    std::fs::write(&output, content)?;
    println!("Configuration written to {:?}", output);
    println!("Edit [admin] password before going live.");

    Ok(())
}

/// Validate configuration file
fn run_validate(config_path: PathBuf) -> Result<()> {
    match LiveVoteConfig::from_file(&config_path) {
        Ok(config) => {
            println!("✓ Configuration is valid");
            println!("  Bind Address: {}", config.server.bind_address);
            println!("  Database:     {}", config.database.path.display());
            println!("  Identity:     {:?}", config.voting.identity);
            println!("  Round Length: {}s", config.voting.default_round_secs);
            println!("  Contestants:  {}", roster(&config).len());
            Ok(())
        }
        Err(e) => {
            eprintln!("✗ Configuration error: {}", e);
            Err(e)
        }
    }
}

/// Add contestants to the database
async fn run_seed(config_path: PathBuf, names: Vec<String>) -> Result<()> {
    let config = load_config(&config_path)?;
    let store = VoteStore::open(&config.database.path)?;

    if names.is_empty() {
        let seeded = store.seed_contestants(&roster(&config)[..]).await?;
        println!("Seeded {} contestants", seeded);
    } else {
        for name in &names {
            let contestant = store.add_contestant(name).await?;
            println!("Added #{} {}", contestant.id, contestant.name);
        }
    }

    Ok(())
}

/// Export the vote summary and log
async fn run_export(config_path: PathBuf, format: String, output: Option<PathBuf>) -> Result<()> {
    let config = load_config(&config_path)?;
    let format: ExportFormat = format.parse()?;
    let store = VoteStore::open(&config.database.path)?;

    let report = ExportReport::from_store(&store).await?;
    let body = report.render(format)?;

    match output {
        Some(path) => {
            std::fs::write(&path, body)?;
            println!(
                "Exported {} votes for {} contestants to {:?}",
                report.votes.len(),
                report.summary.len(),
                path
            );
        }
        None => print!("{}", body),
    }

    Ok(())
}
