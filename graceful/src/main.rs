//! Graceful shutdown demo runner.
//!
//! Runs a simulated workload under a [`graceful::Coordinator`] and shows the
//! drain protocol end to end: admission closes on SIGINT/SIGTERM, in-flight
//! jobs finish, cleanup handlers run in order, then the process exits.
//!
//! ```sh
//! graceful init            # Generate default graceful.toml
//! graceful run             # Run until interrupted
//! ```

mod cmd;
mod config;
mod telemetry;

use clap::Parser;
use cmd::{Cli, Commands};

#[tokio::main]
#[allow(clippy::print_stderr)]
async fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Init { output, force } => cmd::init::run(&output, force).map_err(Into::into),
        Commands::Run { config } => cmd::run::run(&config).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}
