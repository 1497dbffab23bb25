mod commands;
mod config;

use clap::{Parser, Subcommand};
use colored::Colorize;
use commands::Context;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;

#[derive(Parser)]
#[command(name = "keyflow")]
#[command(about = "Declarative FusionAuth signing key management", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (default: keyflow.kdl in the current directory)
    #[arg(short, long, global = true, env = "KEYFLOW_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Seconds to wait for a deleted key to disappear
    #[arg(
        long,
        global = true,
        env = "KEYFLOW_TIMEOUT",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    timeout: Option<u64>,

    /// Seconds between absence checks
    #[arg(
        long,
        global = true,
        env = "KEYFLOW_INTERVAL",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    interval: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check the configuration without contacting FusionAuth
    Validate,
    /// Show what apply would change
    Plan,
    /// Create, update, replace and delete keys to match the configuration
    Apply {
        /// Apply without stopping at the plan
        #[arg(short = 'y', long, visible_alias = "auto-approve")]
        yes: bool,
    },
    /// Bring an existing FusionAuth key under management
    Import {
        /// Key name in the configuration
        name: String,
        /// FusionAuth key id
        id: String,
    },
    /// Delete managed keys (all of them unless a name is given)
    Destroy {
        /// Key name in the configuration
        name: Option<String>,
        /// Skip the confirmation stop
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Show tracked keys
    Show,
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::WARN
    };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Ctrl-C stops in-flight convergence waits instead of killing the process
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("{}", "Interrupted, stopping...".yellow());
            on_signal.cancel();
        }
    });

    let ctx = Context::load(cli.config.as_deref(), cli.timeout, cli.interval, cancel)?;

    match cli.command {
        Commands::Validate => commands::validate::handle(&ctx)?,
        Commands::Plan => commands::plan::handle(&ctx).await?,
        Commands::Apply { yes } => commands::apply::handle(&ctx, yes).await?,
        Commands::Import { name, id } => commands::import::handle(&ctx, &name, &id).await?,
        Commands::Destroy { name, yes } => commands::destroy::handle(&ctx, name, yes).await?,
        Commands::Show => commands::show::handle(&ctx).await?,
    }

    Ok(())
}
