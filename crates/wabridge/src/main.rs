// SPDX-FileCopyrightText: 2026 Wabridge Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wabridge - a multi-tenant gateway fronting an upstream chat network.
//!
//! This is the binary entry point.

use clap::{Parser, Subcommand};

mod events;
mod loopback;
mod serve;
mod shutdown;

/// Wabridge - a multi-tenant gateway fronting an upstream chat network.
#[derive(Parser, Debug)]
#[command(name = "wabridge", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the gateway server.
    Serve,
    /// Load and validate the configuration, then exit.
    CheckConfig,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            if let Err(e) = serve::run_serve().await {
                eprintln!("error: {e}");
                std::process::exit(1);
            }
        }
        Commands::CheckConfig => {
            let config = match wabridge_config::load_config() {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("error: failed to load configuration: {e}");
                    std::process::exit(1);
                }
            };
            match wabridge_config::validate_config(&config) {
                Ok(()) => println!("configuration ok"),
                Err(errors) => {
                    for e in &errors {
                        eprintln!("error: {e}");
                    }
                    std::process::exit(1);
                }
            }
        }
    }
}
