//! Error types emitted by the hazmap CLI.
//!
//! Keep this error type reasonably small, as every command helper returns
//! `Result<_, CliError>`.

use std::sync::Arc;

use camino::Utf8PathBuf;
use hazmap_core::{ConfigurationError, EngineError, PointsError, StoreError};
use hazmap_data::RemoteBuildError;
use thiserror::Error;

/// Errors emitted by the hazmap CLI.
#[derive(Debug, Error)]
pub enum CliError {
    /// Provided arguments failed Clap validation.
    #[error(transparent)]
    ArgumentParsing(#[from] clap::Error),
    /// Configuration layering failed (files, env, CLI).
    #[error("failed to load configuration: {0}")]
    Configuration(#[from] Arc<ortho_config::OrthoError>),
    /// A required option is missing after configuration merging.
    #[error("missing {field} (set --{field} or {env})")]
    MissingArgument {
        field: &'static str,
        env: &'static str,
    },
    /// A merged setting is out of range.
    #[error(transparent)]
    InvalidSetting(#[from] ConfigurationError),
    /// A coordinate flag is outside the WGS84 range.
    #[error("--{field} value {value} is not a valid coordinate")]
    InvalidCoordinate { field: &'static str, value: f64 },
    /// The requested operation requires a missing compile-time feature.
    #[error("{action} requires the `{feature}` feature to be enabled")]
    MissingFeature {
        feature: &'static str,
        action: &'static str,
    },
    /// A read-only command was pointed at a database that does not exist.
    #[error("database {path:?} does not exist")]
    DatabaseMissing { path: Utf8PathBuf },
    /// The database path exists but is not a file.
    #[error("database path {path:?} exists but is not a file")]
    DatabaseNotFile { path: Utf8PathBuf },
    /// The database location could not be prepared.
    #[error("failed to prepare database location {path:?}: {source}")]
    PrepareDatabase {
        path: Utf8PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// Opening the local store failed.
    #[error("failed to open database {path:?}: {source}")]
    OpenStore {
        path: Utf8PathBuf,
        #[source]
        source: StoreError,
    },
    /// Constructing the remote catalog client failed.
    #[error("failed to set up catalog client for {base_url:?}: {source}")]
    BuildRemote {
        base_url: String,
        #[source]
        source: RemoteBuildError,
    },
    /// The sync engine failed.
    #[error(transparent)]
    Engine(#[from] EngineError),
    /// Reading the local store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The catalog refresh failed.
    #[error("refresh failed: {0}")]
    Refresh(#[source] PointsError),
    /// Writing command output failed.
    #[error("failed to write output: {0}")]
    WriteOutput(#[source] std::io::Error),
}
