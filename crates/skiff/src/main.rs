// SPDX-FileCopyrightText: 2026 Skiff Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Skiff admin CLI.
//!
//! Manages cron jobs and sessions in the configured database and checks
//! configuration. Serving is done by embedding [`skiff::Runtime`] with a
//! provider and channels.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use skiff::commands::{self, CronCommand, SessionCommand};
use skiff_config::SkiffConfig;

/// Skiff - a lightweight, always-on personal AI agent.
#[derive(Parser, Debug)]
#[command(name = "skiff", version, about, long_about = None)]
struct Cli {
    /// Use this config file instead of the XDG hierarchy.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage scheduled jobs.
    #[command(subcommand)]
    Cron(CronCommand),
    /// Inspect conversation sessions.
    #[command(subcommand)]
    Session(SessionCommand),
    /// Configuration utilities.
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Load and validate the configuration, reporting every problem found.
    Check,
}

fn load_config(path: Option<&PathBuf>) -> Option<SkiffConfig> {
    let loaded = match path {
        Some(path) => skiff_config::load_and_validate_path(path),
        None => skiff_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => Some(config),
        Err(errors) => {
            skiff_config::render_errors(&errors);
            None
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let Some(config) = load_config(cli.config.as_ref()) else {
        return ExitCode::FAILURE;
    };
    skiff::init_tracing(&config.agent.log_level);

    let output = match cli.command {
        Commands::Config(ConfigCommand::Check) => Ok(format!(
            "config ok (agent.name={}, database={})\n",
            config.agent.name, config.storage.database_path
        )),
        Commands::Cron(cmd) => match commands::open_storage(&config).await {
            Ok(storage) => cmd.run(&config, storage).await,
            Err(e) => Err(e),
        },
        Commands::Session(cmd) => match commands::open_storage(&config).await {
            Ok(storage) => cmd.run(storage).await,
            Err(e) => Err(e),
        },
    };

    match output {
        Ok(text) => {
            print!("{text}");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn cron_add_needs_exactly_one_schedule() {
        const BASE: [&str; 7] = ["skiff", "cron", "add", "--name", "n", "-m", "hi"];
        fn with(extra: &[&'static str]) -> Vec<&'static str> {
            [&BASE[..], extra].concat()
        }
        assert!(Cli::try_parse_from(BASE).is_err());
        assert!(Cli::try_parse_from(with(&["--every", "5", "--at", "x"])).is_err());
        assert!(Cli::try_parse_from(with(&["--every", "5", "--tz", "UTC"])).is_err());
        assert!(Cli::try_parse_from(with(&["--cron", "0 9 * * *", "--tz", "UTC"])).is_ok());
    }

    #[test]
    #[cfg(not(target_env = "msvc"))]
    fn jemalloc_is_active() {
        use tikv_jemalloc_ctl::{epoch, stats};
        epoch::advance().unwrap();
        let allocated = stats::allocated::read().unwrap();
        assert!(allocated > 0, "jemalloc should report non-zero allocation");
    }
}
