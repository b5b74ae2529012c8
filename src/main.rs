//! tunup - CLI for the tunnel agent supervisor
//!
//! Two commands:
//! - `start`: spawn the agent, print its internal web API URL, keep it
//!   supervised until Ctrl-C, then shut it down.
//! - `authtoken`: register a credential via a one-shot agent invocation.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use tunup::{on_host_shutdown, set_authtoken, Options, Supervisor};

/// tunup - Supervise a single ngrok tunnel agent
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Start the tunnel agent and keep it running until Ctrl-C
    Start {
        /// Tunnel region (e.g. us, eu, au)
        #[arg(short, long)]
        region: Option<String>,

        /// Agent configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding the agent binary (overrides the bundled bin/)
        #[arg(short, long)]
        bin_dir: Option<PathBuf>,

        /// JSON options file; explicit flags take precedence
        #[arg(short, long)]
        options_file: Option<PathBuf>,
    },

    /// Register an authtoken credential with the agent
    Authtoken {
        /// The credential to register
        token: String,

        /// Agent configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Directory holding the agent binary (overrides the bundled bin/)
        #[arg(short, long)]
        bin_dir: Option<PathBuf>,
    },
}

/// Merge an optional options file with command-line flags
fn build_options(
    options_file: Option<PathBuf>,
    region: Option<String>,
    config: Option<PathBuf>,
    bin_dir: Option<PathBuf>,
) -> Result<Options> {
    let mut options = match options_file {
        Some(path) => Options::from_file(&path)?,
        None => Options::default(),
    };

    if region.is_some() {
        options.region = region;
    }
    if config.is_some() {
        options.config_path = config;
    }
    if let Some(dir) = bin_dir {
        options.bin_path = Some(Arc::new(move |_default| dir.clone()));
    }

    Ok(options)
}

async fn run_start(options: Options) -> Result<()> {
    let supervisor = Supervisor::new();

    let url = supervisor
        .get_endpoint(&options)
        .await
        .context("Failed to start tunnel agent")?;

    info!("========================================");
    info!("Tunnel agent is running");
    info!("  Internal API: {}", url);
    info!("Press Ctrl+C to shut down...");
    info!("========================================");

    // Shuts the agent down when the host process is told to exit
    on_host_shutdown(&supervisor)
        .await
        .context("Shutdown hook failed")?;

    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Start {
            region,
            config,
            bin_dir,
            options_file,
        } => {
            let options = build_options(options_file, region, config, bin_dir)?;
            run_start(options).await
        }
        Command::Authtoken {
            token,
            config,
            bin_dir,
        } => {
            let options = Options {
                authtoken: Some(token),
                config_path: config,
                bin_path: bin_dir.map(|dir| {
                    let resolver: tunup::BinPathResolver = Arc::new(move |_default| dir.clone());
                    resolver
                }),
                ..Default::default()
            };
            set_authtoken(options)
                .await
                .context("Failed to set authtoken")?;
            Ok(())
        }
    }
}
