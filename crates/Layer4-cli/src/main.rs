//! AraNES CLI - Main entry point

mod commands;

use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// AraNES - plugin host for the school services platform
#[derive(Parser, Debug)]
#[command(name = "aranes")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Directory containing aranes.json
    #[arg(short, long, default_value = ".")]
    config: PathBuf,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP listener (default)
    Serve {
        /// Address to bind
        #[arg(short, long, default_value = "127.0.0.1:8000")]
        bind: SocketAddr,

        /// Seed user as name:password (repeatable)
        #[arg(short, long = "user")]
        users: Vec<String>,
    },
    /// Write a default aranes.json
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,
    },
    /// Show persisted plugin states
    Plugins,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    let log_level = if args.debug { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    match args.command {
        Some(Command::Init { force }) => commands::init(&args.config, force),
        Some(Command::Plugins) => commands::plugins(&args.config).await,
        Some(Command::Serve { bind, users }) => commands::serve(&args.config, bind, &users).await,
        None => {
            let bind = SocketAddr::from(([127, 0, 0, 1], 8000));
            commands::serve(&args.config, bind, &[]).await
        }
    }
}
