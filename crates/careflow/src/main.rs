// SPDX-FileCopyrightText: 2026 Careflow Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Careflow - webhook-driven appointment booking over Instagram DMs.
//!
//! This is the binary entry point for the Careflow service.

use clap::{Parser, Subcommand};

mod serve;

/// Careflow - webhook-driven appointment booking over Instagram DMs.
#[derive(Parser, Debug)]
#[command(name = "careflow", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the webhook gateway and queue workers.
    Serve,
    /// Load, validate, and summarize the configuration.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match careflow_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            careflow_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    match cli.command {
        Some(Commands::Serve) => {
            if let Err(e) = serve::run_serve(config).await {
                eprintln!("careflow serve failed: {e}");
                std::process::exit(1);
            }
        }
        Some(Commands::Config) => {
            println!("careflow: configuration OK");
            println!("  agent.name = {}", config.agent.name);
            println!("  server bind = {}:{}", config.server.host, config.server.port);
            println!("  storage.database_path = {}", config.storage.database_path);
            println!(
                "  queue = {} workers, {} attempts, {}s-{}s backoff",
                config.queue.workers,
                config.queue.max_attempts,
                config.queue.backoff_base_secs,
                config.queue.backoff_cap_secs
            );
            println!("  classifier.model = {}", config.classifier.model);
        }
        None => {
            println!("careflow: use --help for available commands");
        }
    }
}
