//! cdr-admin: operator tool for the CDR core.
//!
//! Runs the batch worker pool, inspects and controls batch jobs, maintains
//! filter sets and the external-map suppression list, and prints the
//! document and audio reports.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::EnvFilter;

use cdr::config::{default_config_path, load_config, Config};
use cdr::{Action, RequestContext, Session};

mod commands;

#[derive(Parser, Debug)]
#[command(name = "cdr-admin")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Path to the configuration file (defaults to ~/.cdr/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Log filter, e.g. `info` or `cdr=debug` (overrides RUST_LOG)
    #[arg(long)]
    log_level: Option<String>,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the batch worker pool until interrupted
    Worker(commands::worker::WorkerArgs),

    /// Fail jobs whose worker stopped sending heartbeats
    Sweep,

    /// Batch job control
    #[command(subcommand)]
    Jobs(commands::jobs::JobsCommand),

    /// Filter and filter set maintenance
    #[command(subcommand)]
    Filters(commands::filters::FiltersCommand),

    /// Document reports
    #[command(subcommand)]
    Docs(commands::docs::DocsCommand),

    /// Audio delivery checks
    #[command(subcommand)]
    Audio(commands::audio::AudioCommand),

    /// External-map suppression patterns
    #[command(subcommand)]
    Nomap(commands::nomap::NomapCommand),

    /// Bibliographic lookups
    #[command(subcommand)]
    Biblio(commands::biblio::BiblioCommand),
}

fn init_logging(level: Option<&str>) -> Result<()> {
    let filter = match level {
        Some(level) => EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info")),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // The library logs through `log`; route those records into tracing.
    tracing_log::LogTracer::init().context("Failed to install log bridge")?;
    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(false).with_writer(std::io::stderr));
    tracing::subscriber::set_global_default(subscriber).context("Failed to install subscriber")?;
    Ok(())
}

fn read_config(path: Option<&PathBuf>) -> Result<Config> {
    if let Some(path) = path {
        return load_config(path).with_context(|| format!("Failed to load {}", path.display()));
    }
    match default_config_path().filter(|p| p.exists()) {
        Some(path) => load_config(&path).with_context(|| format!("Failed to load {}", path.display())),
        None => {
            log::info!("No configuration file found, using defaults");
            Ok(Config::default())
        }
    }
}

/// The operator's session. The CLI runs with every right; the user name
/// is taken from the environment for audit columns.
fn operator_session() -> Session {
    let user = std::env::var("USER")
        .or_else(|_| std::env::var("USERNAME"))
        .unwrap_or_else(|_| "operator".to_string());
    Session::new("cdr-admin", user, Action::ALL)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.log_level.as_deref())?;

    let config = read_config(cli.config.as_ref())?;
    log::debug!("Tier {}", config.tier);

    // Audio checks and lookups do not touch the database.
    match &cli.command {
        Commands::Audio(cmd) => return commands::audio::run(cmd, &config, cli.json),
        Commands::Biblio(cmd) => return commands::biblio::run(cmd, &config, cli.json),
        _ => {}
    }

    let ctx = RequestContext::from_config(&config, operator_session())
        .context("Failed to open the CDR database")?;

    match cli.command {
        Commands::Worker(args) => commands::worker::run(&args, &ctx, &config),
        Commands::Sweep => commands::worker::sweep(&ctx, cli.json),
        Commands::Jobs(cmd) => commands::jobs::run(cmd, &ctx, cli.json),
        Commands::Filters(cmd) => commands::filters::run(cmd, &ctx, cli.json),
        Commands::Docs(cmd) => commands::docs::run(cmd, &ctx, cli.json),
        Commands::Nomap(cmd) => commands::nomap::run(cmd, &ctx, cli.json),
        Commands::Audio(_) | Commands::Biblio(_) => Ok(()),
    }
}
