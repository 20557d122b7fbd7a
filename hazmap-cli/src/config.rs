//! Layered engine configuration shared by every subcommand.

use std::time::Duration;

use camino::Utf8PathBuf;
use clap::Parser;
use hazmap_core::{
    DEFAULT_REFRESH_DISTANCE_M, DEFAULT_REFRESH_INTERVAL, GeoPoint, RefreshGate,
};
use ortho_config::{OrthoConfig, SubcmdConfigMerge};
use serde::{Deserialize, Serialize};

use crate::{
    ARG_BASE_URL, ARG_DATABASE, ARG_REFRESH_DISTANCE_M, ARG_REFRESH_INTERVAL_SECS, ARG_TOKEN,
    CliError, ENV_BASE_URL,
};

/// Database file used when none is configured.
pub(crate) const DEFAULT_DATABASE: &str = "hazmap.db";

/// Connection and refresh settings.
///
/// Values can come from CLI flags, configuration files or `HAZMAP_*`
/// environment variables; CLI flags win.
#[derive(Debug, Clone, Parser, Deserialize, Serialize, OrthoConfig, Default)]
#[command(name = "engine")]
#[ortho_config(prefix = "HAZMAP")]
pub(crate) struct EngineArgs {
    /// Path to the local SQLite cache.
    #[arg(long = ARG_DATABASE, value_name = "path")]
    #[serde(default)]
    pub(crate) database: Option<Utf8PathBuf>,
    /// Base URL of the catalog service (e.g. "https://hazmap.example.com/api").
    #[arg(long = ARG_BASE_URL, value_name = "url")]
    #[serde(default)]
    pub(crate) base_url: Option<String>,
    /// Access token used to upload reports.
    #[arg(long = ARG_TOKEN, value_name = "token")]
    #[serde(default)]
    pub(crate) token: Option<String>,
    /// Minimum number of seconds between automatic refreshes.
    #[arg(long = ARG_REFRESH_INTERVAL_SECS, value_name = "secs")]
    #[serde(default)]
    pub(crate) refresh_interval_secs: Option<u64>,
    /// Distance in metres that triggers a refresh before the interval ends.
    #[arg(long = ARG_REFRESH_DISTANCE_M, value_name = "metres")]
    #[serde(default)]
    pub(crate) refresh_distance_m: Option<f64>,
}

impl EngineArgs {
    pub(crate) fn into_config(self) -> Result<SyncConfig, CliError> {
        let merged = self.load_and_merge().map_err(CliError::Configuration)?;
        SyncConfig::try_from(merged)
    }
}

/// Resolved engine configuration.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct SyncConfig {
    pub(crate) database: Utf8PathBuf,
    pub(crate) base_url: Option<String>,
    pub(crate) token: Option<String>,
    pub(crate) gate: RefreshGate,
}

impl SyncConfig {
    /// The catalog URL, required by every command that talks to the remote.
    pub(crate) fn require_base_url(&self) -> Result<&str, CliError> {
        self.base_url.as_deref().ok_or(CliError::MissingArgument {
            field: ARG_BASE_URL,
            env: ENV_BASE_URL,
        })
    }
}

impl TryFrom<EngineArgs> for SyncConfig {
    type Error = CliError;

    fn try_from(args: EngineArgs) -> Result<Self, Self::Error> {
        let database = args
            .database
            .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_DATABASE));
        let interval = args
            .refresh_interval_secs
            .map_or(DEFAULT_REFRESH_INTERVAL, Duration::from_secs);
        let distance_m = args
            .refresh_distance_m
            .unwrap_or(DEFAULT_REFRESH_DISTANCE_M);
        let gate = RefreshGate::try_new(interval, distance_m)?;
        let base_url = args.base_url.filter(|url| !url.trim().is_empty());
        let token = args.token.filter(|token| !token.is_empty());
        Ok(Self {
            database,
            base_url,
            token,
            gate,
        })
    }
}

/// Check a WGS84 coordinate pair given on the command line.
pub(crate) fn location(lat: f64, lon: f64) -> Result<GeoPoint<f64>, CliError> {
    if !(lat.is_finite() && (-90.0..=90.0).contains(&lat)) {
        return Err(CliError::InvalidCoordinate {
            field: "lat",
            value: lat,
        });
    }
    if !(lon.is_finite() && (-180.0..=180.0).contains(&lon)) {
        return Err(CliError::InvalidCoordinate {
            field: "lon",
            value: lon,
        });
    }
    Ok(GeoPoint::new(lon, lat))
}

#[cfg(test)]
pub(crate) fn config_from_layers_for_test(
    layers: Vec<ortho_config::MergeLayer<'static>>,
) -> Result<SyncConfig, CliError> {
    let merged = EngineArgs::merge_from_layers(layers).map_err(CliError::from)?;
    SyncConfig::try_from(merged)
}
