//! # authsync
//!
//! Command-line driver for the session coordinator. Runs JSON scenario
//! scripts against the in-memory backend and prints one snapshot per step
//! as a JSON line on stdout; logs go to stderr.

#![deny(unsafe_code)]

mod scenario;

use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use authsync_core::logging::init_subscriber;
use authsync_settings::{load_settings_from_path, settings_path};
use clap::{Parser, Subcommand};
use tracing::info;

use crate::scenario::Scenario;

/// Session coordinator scenario runner.
#[derive(Parser, Debug)]
#[command(name = "authsync", about = "Session coordinator scenario runner", version)]
struct Cli {
    /// Settings file (defaults to `~/.authsync/settings.json`).
    #[arg(long, global = true)]
    settings: Option<PathBuf>,

    /// Log level, overriding the settings file (`RUST_LOG` still wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a scenario script and print a snapshot after each step.
    Run {
        /// Path to the scenario JSON.
        scenario: PathBuf,
    },
    /// Print the effective settings.
    Settings,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let path = cli.settings.clone().unwrap_or_else(settings_path);
    let settings = load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    init_subscriber(level);

    match cli.command {
        Command::Run { scenario } => {
            let script = Scenario::from_path(&scenario)?;
            info!(path = %scenario.display(), steps = script.steps.len(), "running scenario");
            let reports = scenario::run(&script, &settings).await?;

            let mut out = std::io::stdout().lock();
            for report in &reports {
                serde_json::to_writer(&mut out, report).context("Failed to write report")?;
                writeln!(out)?;
            }
        }
        Command::Settings => {
            let json = serde_json::to_string_pretty(&settings)?;
            println!("{json}");
        }
    }
    Ok(())
}
