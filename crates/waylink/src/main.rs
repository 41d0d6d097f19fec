// SPDX-FileCopyrightText: 2026 Waylink Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Waylink - tenant WhatsApp connectivity over a messaging gateway.
//!
//! This is the binary entry point for the Waylink server.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use clap::{Parser, Subcommand};

mod serve;

/// Waylink - tenant WhatsApp connectivity over a messaging gateway.
#[derive(Parser, Debug)]
#[command(name = "waylink", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the Waylink server.
    Serve,
    /// Print the resolved configuration with secrets redacted.
    Config,
}

#[tokio::main]
async fn main() {
    let config = match waylink_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            waylink_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match Cli::parse().command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("waylink serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => {
            serve::print_config(&config);
        }
        None => {
            println!("waylink: use --help for available commands");
        }
    }
}
