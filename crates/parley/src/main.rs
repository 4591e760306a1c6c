// SPDX-FileCopyrightText: 2026 Parley Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Parley - conversational bot backend.
//!
//! This is the binary entry point.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod admin;
mod app;
mod serve;
mod shell;

use clap::{Parser, Subcommand};
use parley_core::UserId;

/// Parley - conversational bot backend.
#[derive(Parser, Debug)]
#[command(name = "parley", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run background jobs (aged-entry sweep) until SIGINT/SIGTERM.
    Serve,
    /// Chat through the full turn pipeline in an interactive REPL.
    Shell {
        /// User id to act as.
        #[arg(long, default_value_t = 1)]
        user: i64,
        /// Model to use instead of the configured default.
        #[arg(long)]
        model: Option<String>,
    },
    /// Run one aged-entry sweep and print the report.
    Sweep,
    /// Add SP to a user's balance.
    Credit {
        #[arg(long)]
        user: i64,
        #[arg(long)]
        amount: f64,
    },
    /// Buy a subscription for a user from their balance.
    Subscribe {
        #[arg(long)]
        user: i64,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let config = match parley_config::load_and_validate() {
        Ok(config) => config,
        Err(errors) => {
            parley_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    let result = match cli.command {
        Some(Commands::Serve) => serve::run_serve(config).await,
        Some(Commands::Shell { user, model }) => shell::run_shell(config, UserId(user), model).await,
        Some(Commands::Sweep) => admin::run_sweep(&config).await,
        Some(Commands::Credit { user, amount }) => {
            admin::run_credit(&config, UserId(user), amount).await
        }
        Some(Commands::Subscribe { user }) => admin::run_subscribe(&config, UserId(user)).await,
        None => {
            println!("parley: use --help for available commands");
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("parley: {e}");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }

    #[test]
    fn binary_loads_config_defaults() {
        let config = parley_config::load_and_validate_str("").expect("default config should be valid");
        assert_eq!(config.bot.name, "parley");
    }

    #[test]
    fn cli_parses_admin_commands() {
        let cli = Cli::try_parse_from(["parley", "credit", "--user", "5", "--amount", "12.5"]).unwrap();
        match cli.command {
            Some(Commands::Credit { user, amount }) => {
                assert_eq!(user, 5);
                assert_eq!(amount, 12.5);
            }
            other => panic!("unexpected {other:?}"),
        }
        let cli = Cli::try_parse_from(["parley", "shell", "--model", "openai/gpt-4o"]).unwrap();
        assert!(matches!(cli.command, Some(Commands::Shell { user: 1, model: Some(_) })));
    }
}
