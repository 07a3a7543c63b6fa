// Copyright (c) 2024-2025 DeepGraph Inc.
// SPDX-License-Identifier: Apache-2.0
//
//! Isoscope CLI entry point

use clap::Parser;
use colored::Colorize;

mod cli;
use cli::{Cli, Commands};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Parse command line arguments first to get log level
    let cli = Cli::parse();

    let log_level = if cli.verbose {
        // -v/--verbose flag takes precedence
        log::LevelFilter::Debug
    } else if let Some(level) = cli.log_level {
        level.to_level_filter()
    } else {
        // Default to Warn (can still be overridden by RUST_LOG env var)
        log::LevelFilter::Warn
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    match cli.command.unwrap_or_default() {
        Commands::Version => {
            println!("{} {}", "Isoscope".bold().green(), isoscope::VERSION);
            println!("Concurrent transaction sessions side by side");
            Ok(())
        }

        Commands::Console => {
            let Some(database_url) = cli.database_url else {
                return Err("No database given. Pass --database-url or set DATABASE_URL.".into());
            };
            cli::handle_console(cli::ConsoleOptions {
                database_url,
                config: cli.config,
                setup: cli.setup,
                format: cli.format,
            })
        }
    }
}
