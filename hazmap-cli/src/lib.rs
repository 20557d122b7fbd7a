//! Command-line interface for driving the hazmap sync engine.
#![forbid(unsafe_code)]

use std::io::Write;

use clap::{Parser, Subcommand};

mod commands;
mod config;
mod error;

pub use error::CliError;

use commands::{AddPointArgs, RefreshArgs, StatusArgs, SyncArgs};

const ARG_DATABASE: &str = "database";
const ARG_BASE_URL: &str = "base-url";
const ARG_TOKEN: &str = "token";
const ARG_REFRESH_INTERVAL_SECS: &str = "refresh-interval-secs";
const ARG_REFRESH_DISTANCE_M: &str = "refresh-distance-m";
const ENV_BASE_URL: &str = "HAZMAP_CMDS_ENGINE_BASE_URL";

/// Run the hazmap CLI with the current process arguments and environment.
pub fn run() -> Result<(), CliError> {
    let cli = Cli::try_parse().map_err(CliError::ArgumentParsing)?;
    let mut stdout = std::io::stdout().lock();
    dispatch(cli.command, &mut stdout)
}

#[cfg(feature = "store-sqlite")]
fn dispatch(command: Command, out: &mut dyn Write) -> Result<(), CliError> {
    let backend = commands::DefaultBackend;
    log::debug!("running {}", command.name());
    match command {
        Command::Refresh(args) => commands::run_refresh(args, &backend, out),
        Command::Sync(args) => commands::run_sync(args, &backend, out),
        Command::AddPoint(args) => commands::run_add_point(args, &backend, out),
        Command::Status(args) => commands::run_status(args, &backend, out),
    }
}

#[cfg(not(feature = "store-sqlite"))]
fn dispatch(command: Command, _out: &mut dyn Write) -> Result<(), CliError> {
    Err(CliError::MissingFeature {
        feature: "store-sqlite",
        action: command.name(),
    })
}

#[derive(Debug, Parser)]
#[command(
    name = "hazmap",
    about = "Keep a local cache of crowd-sourced accessibility hazards in step with the catalog service",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Refresh the cached catalog around a location.
    Refresh(RefreshArgs),
    /// Upload reports waiting in the outbox.
    Sync(SyncArgs),
    /// Report a hazard and try to upload it.
    AddPoint(AddPointArgs),
    /// Summarise the local cache.
    Status(StatusArgs),
}

impl Command {
    const fn name(&self) -> &'static str {
        match self {
            Self::Refresh(_) => "refresh",
            Self::Sync(_) => "sync",
            Self::AddPoint(_) => "add-point",
            Self::Status(_) => "status",
        }
    }
}

#[cfg(test)]
mod tests;
