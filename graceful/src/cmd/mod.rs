//! CLI definitions and command implementations for the runner.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

pub mod init;
pub mod run;

/// Graceful shutdown demo runner: drains a simulated workload on SIGINT/SIGTERM.
#[derive(Debug, Parser)]
#[command(name = "graceful")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Generate a default TOML configuration file.
    Init {
        /// Output path for the configuration file.
        #[arg(short, long, default_value = "graceful.toml")]
        output: PathBuf,

        /// Overwrite the file if it already exists.
        #[arg(long, default_value_t = false)]
        force: bool,
    },

    /// Run the simulated workload until shutdown completes.
    Run {
        /// Path to the TOML configuration file.
        #[arg(short, long, env = "CONFIG", default_value = "graceful.toml")]
        config: PathBuf,
    },
}
