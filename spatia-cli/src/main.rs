//! Spatia CLI - inspect and replay spatial sessions against a simulated host

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;
mod config;

use commands::{capabilities, simulate};
use spatia_xr::SessionMode;

#[derive(Parser)]
#[command(name = "spatia")]
#[command(about = "Spatial session and interaction tools", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to configuration file
    #[arg(long, global = true, env = "SPATIA_CONFIG")]
    config: Option<PathBuf>,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Report which session modes a simulated environment supports
    Capabilities {
        /// Simulate an environment without any spatial API
        #[arg(long)]
        no_api: bool,

        /// Only support immersive AR
        #[arg(long)]
        ar: bool,

        /// Only support immersive VR
        #[arg(long)]
        vr: bool,
    },

    /// Replay a scripted session and print every event
    Simulate {
        /// Session mode to negotiate
        #[arg(long, value_enum, default_value = "ar")]
        mode: ModeArg,

        /// Number of frames to run
        #[arg(long, default_value = "8")]
        frames: u32,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum ModeArg {
    Ar,
    Vr,
}

impl From<ModeArg> for SessionMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Ar => SessionMode::ImmersiveAr,
            ModeArg::Vr => SessionMode::ImmersiveVr,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.debug { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    // Load configuration
    let config = config::load_config(cli.config)?;

    match cli.command {
        Commands::Capabilities { no_api, ar, vr } => {
            capabilities::report(capabilities::Environment::from_flags(no_api, ar, vr)).await?;
        }
        Commands::Simulate { mode, frames } => {
            simulate::run(config, mode.into(), frames).await?;
        }
    }

    Ok(())
}
