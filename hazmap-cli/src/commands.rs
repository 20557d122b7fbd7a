//! Subcommand implementations for the hazmap CLI.

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use hazmap_core::{
    Credentials, EngineOptions, GeoPoint, Listener, LocalStore, Point, PointsError, RemoteSource,
    SyncEngine, SyncStatus,
};
use parking_lot::Mutex;

use crate::CliError;
use crate::config::{EngineArgs, SyncConfig, location};

/// Remote catalog handed to the engine.
pub(crate) type BoxedRemote = Box<dyn RemoteSource + Send + Sync>;

/// Opens the local store and builds the remote client for a command.
pub(crate) trait Backend {
    type Store: LocalStore + Send + 'static;

    fn open_store(&self, config: &SyncConfig) -> Result<Self::Store, CliError>;

    fn remote(
        &self,
        config: &SyncConfig,
        credentials: &Credentials,
    ) -> Result<BoxedRemote, CliError>;
}

/// SQLite cache plus the HTTP catalog client.
#[cfg(feature = "store-sqlite")]
pub(crate) struct DefaultBackend;

#[cfg(feature = "store-sqlite")]
impl Backend for DefaultBackend {
    type Store = hazmap_core::SqliteLocalStore;

    fn open_store(&self, config: &SyncConfig) -> Result<Self::Store, CliError> {
        prepare_database(&config.database)?;
        hazmap_core::SqliteLocalStore::open(config.database.as_std_path()).map_err(|source| {
            CliError::OpenStore {
                path: config.database.clone(),
                source,
            }
        })
    }

    fn remote(
        &self,
        config: &SyncConfig,
        credentials: &Credentials,
    ) -> Result<BoxedRemote, CliError> {
        use hazmap_data::{HttpRemoteSource, HttpRemoteSourceConfig};

        let base_url = config.require_base_url()?;
        let remote = HttpRemoteSource::with_config(
            HttpRemoteSourceConfig::new(base_url).with_credentials(credentials.clone()),
        )
        .map_err(|source| CliError::BuildRemote {
            base_url: base_url.to_owned(),
            source,
        })?;
        Ok(Box::new(remote))
    }
}

/// Refuse directories and create missing parent directories.
#[cfg(feature = "store-sqlite")]
fn prepare_database(path: &camino::Utf8Path) -> Result<(), CliError> {
    use hazmap_fs::PathState;

    let prepare = |source| CliError::PrepareDatabase {
        path: path.to_path_buf(),
        source,
    };
    match hazmap_fs::inspect_path(path).map_err(prepare)? {
        PathState::File => Ok(()),
        PathState::NotAFile => Err(CliError::DatabaseNotFile {
            path: path.to_path_buf(),
        }),
        PathState::Missing => {
            log::debug!("creating database at {path}");
            hazmap_fs::ensure_parent_dir(path).map_err(prepare)
        }
    }
}

/// CLI arguments for the `refresh` subcommand.
#[derive(Debug, Clone, Parser)]
#[command(
    about = "Refresh the cached catalog around a location",
    long_about = "Refresh the cached catalog around a location. Without \
                  --force the refresh only runs when the last one is older \
                  than the refresh interval or further away than the \
                  refresh distance."
)]
pub(crate) struct RefreshArgs {
    #[command(flatten)]
    pub(crate) engine: EngineArgs,
    /// Latitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lat: f64,
    /// Longitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lon: f64,
    /// Refresh even when the cached catalog is fresh.
    #[arg(long)]
    pub(crate) force: bool,
}

/// CLI arguments for the `sync` subcommand.
#[derive(Debug, Clone, Parser)]
#[command(about = "Upload reports waiting in the outbox")]
pub(crate) struct SyncArgs {
    #[command(flatten)]
    pub(crate) engine: EngineArgs,
}

/// CLI arguments for the `add-point` subcommand.
#[derive(Debug, Clone, Parser)]
#[command(about = "Report a hazard and try to upload it")]
pub(crate) struct AddPointArgs {
    #[command(flatten)]
    pub(crate) engine: EngineArgs,
    /// Category identifier.
    #[arg(long)]
    pub(crate) category: i64,
    /// Latitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lat: f64,
    /// Longitude in decimal degrees.
    #[arg(long, allow_negative_numbers = true)]
    pub(crate) lon: f64,
    /// Short title of the report.
    #[arg(long)]
    pub(crate) name: String,
    /// Free-form details.
    #[arg(long)]
    pub(crate) description: Option<String>,
}

/// CLI arguments for the `status` subcommand.
#[derive(Debug, Clone, Parser)]
#[command(about = "Summarise the local cache")]
pub(crate) struct StatusArgs {
    #[command(flatten)]
    pub(crate) engine: EngineArgs,
}

/// Captures what listeners hear during a refresh.
#[derive(Debug, Default)]
struct RefreshOutcome {
    updated: Mutex<bool>,
    failure: Mutex<Option<PointsError>>,
}

impl Listener for RefreshOutcome {
    fn on_data_updated(&self, is_remote_update: bool) {
        if is_remote_update {
            *self.updated.lock() = true;
        }
    }

    fn on_data_update_failed(&self, cause: &PointsError) {
        *self.failure.lock() = Some(cause.clone());
    }
}

fn start_engine<B: Backend>(
    backend: &B,
    config: &SyncConfig,
) -> Result<SyncEngine<B::Store, BoxedRemote>, CliError> {
    let credentials = Credentials::with_token(config.token.clone());
    let remote = backend.remote(config, &credentials)?;
    let store = backend.open_store(config)?;
    let options = EngineOptions::default()
        .with_gate(config.gate)
        .with_credentials(credentials)
        .with_sync_on_start(false);
    Ok(SyncEngine::start(store, remote, options)?)
}

fn emit(out: &mut dyn Write, line: &str) -> Result<(), CliError> {
    writeln!(out, "{line}").map_err(CliError::WriteOutput)
}

pub(crate) fn run_refresh<B: Backend>(
    args: RefreshArgs,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let here = location(args.lat, args.lon)?;
    let config = args.engine.into_config()?;
    refresh_with(&config, here, args.force, backend, out)
}

pub(crate) fn refresh_with<B: Backend>(
    config: &SyncConfig,
    here: GeoPoint<f64>,
    force: bool,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let engine = start_engine(backend, config)?;
    let outcome = Arc::new(RefreshOutcome::default());
    engine.add_listener(outcome.clone());
    let queued = if force {
        engine.refresh(here)?;
        true
    } else {
        engine.set_location(here)?
    };
    engine.flush()?;
    let report = engine.last_refresh_report();
    engine.shutdown()?;

    if !queued {
        return emit(
            out,
            "catalog is fresh; refresh skipped (use --force to refresh anyway)",
        );
    }
    if let Some(cause) = outcome.failure.lock().take() {
        return Err(CliError::Refresh(cause));
    }
    match report {
        Some(report) if *outcome.updated.lock() => {
            emit(
                out,
                &format!(
                    "refreshed {} point(s) in {} category(ies)",
                    report.points, report.categories
                ),
            )?;
            if !report.skipped_categories.is_empty() {
                emit(
                    out,
                    &format!("skipped categories: {:?}", report.skipped_categories),
                )?;
            }
            Ok(())
        }
        _ => emit(out, "refresh did not complete"),
    }
}

pub(crate) fn run_sync<B: Backend>(
    args: SyncArgs,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.engine.into_config()?;
    sync_with(&config, backend, out)
}

pub(crate) fn sync_with<B: Backend>(
    config: &SyncConfig,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let engine = start_engine(backend, config)?;
    let before = engine.pending_points()?.len();
    engine.synchronize()?;
    engine.flush()?;
    let after = engine.pending_points()?.len();
    engine.shutdown()?;
    emit(
        out,
        &format!(
            "uploaded {} point(s); {after} still pending",
            before.saturating_sub(after)
        ),
    )
}

pub(crate) fn run_add_point<B: Backend>(
    args: AddPointArgs,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let at = location(args.lat, args.lon)?;
    let mut draft = Point::private(args.category, at).with_name(args.name);
    if let Some(description) = args.description {
        draft = draft.with_description(description);
    }
    let config = args.engine.into_config()?;
    add_point_with(&config, draft, backend, out)
}

pub(crate) fn add_point_with<B: Backend>(
    config: &SyncConfig,
    draft: Point,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let engine = start_engine(backend, config)?;
    let stored = engine.add_point(draft)?;
    engine.flush()?;
    let current = engine
        .private_points()?
        .into_iter()
        .find(|point| point.local_id == stored.local_id);
    engine.shutdown()?;

    let id = stored.local_id.unwrap_or_default();
    match current {
        Some(Point {
            status: SyncStatus::Synchronized,
            remote_id: Some(remote_id),
            ..
        }) => emit(out, &format!("stored point {id}; uploaded as {remote_id}")),
        _ => emit(out, &format!("stored point {id}; upload pending")),
    }
}

pub(crate) fn run_status<B: Backend>(
    args: StatusArgs,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let config = args.engine.into_config()?;
    status_with(&config, backend, out)
}

pub(crate) fn status_with<B: Backend>(
    config: &SyncConfig,
    backend: &B,
    out: &mut dyn Write,
) -> Result<(), CliError> {
    let state = hazmap_fs::inspect_path(&config.database).map_err(|source| {
        CliError::PrepareDatabase {
            path: config.database.clone(),
            source,
        }
    })?;
    if state == hazmap_fs::PathState::Missing {
        return Err(CliError::DatabaseMissing {
            path: config.database.clone(),
        });
    }
    let mut store = backend.open_store(config)?;
    let categories = store.load_categories()?;
    let points = store.load_points()?;
    let pending = store.load_pending_points()?;
    let watermark = store.load_watermark()?;
    store.close()?;

    emit(out, &format!("database: {}", config.database))?;
    emit(out, &format!("categories: {}", categories.len()))?;
    emit(out, &format!("points: {}", points.len()))?;
    emit(out, &format!("pending: {}", pending.len()))?;
    let refreshed = watermark.map_or_else(
        || "never".to_owned(),
        |mark| {
            format!(
                "{} at {:.5},{:.5}",
                mark.timestamp,
                mark.location.y(),
                mark.location.x()
            )
        },
    );
    emit(out, &format!("last refresh: {refreshed}"))
}
