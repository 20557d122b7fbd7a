//! Test helpers: a backend pairing a temporary SQLite cache with the stub
//! remote catalog.

use camino::Utf8PathBuf;
use geo::Point as GeoPoint;
use hazmap_core::test_support::StubRemoteSource;
use hazmap_core::{Category, Credentials, Point, RefreshGate, SqliteLocalStore};
use tempfile::TempDir;

use crate::CliError;
use crate::commands::{Backend, BoxedRemote};
use crate::config::SyncConfig;

pub(super) const KERB: i64 = 1;
pub(super) const STAIRS: i64 = 2;

/// Stub remote plus the credentials the last engine was started with.
#[derive(Debug, Default)]
pub(super) struct StubBackend {
    pub(super) remote: StubRemoteSource,
    pub(super) credentials: parking_lot::Mutex<Option<Credentials>>,
}

impl StubBackend {
    pub(super) fn with_catalog() -> Self {
        let remote = StubRemoteSource::with_categories(vec![
            Category::new(KERB, "Kerb"),
            Category::new(STAIRS, "Stairs"),
        ]);
        remote.set_points(
            KERB,
            vec![
                Point::remote("k-1", KERB, GeoPoint::new(34.3470, 61.7850)),
                Point::remote("k-2", KERB, GeoPoint::new(34.3480, 61.7860)),
            ],
        );
        remote.set_points(
            STAIRS,
            vec![Point::remote("s-1", STAIRS, GeoPoint::new(34.3490, 61.7870))],
        );
        Self {
            remote,
            credentials: parking_lot::Mutex::new(None),
        }
    }
}

impl Backend for StubBackend {
    type Store = SqliteLocalStore;

    fn open_store(&self, config: &SyncConfig) -> Result<Self::Store, CliError> {
        SqliteLocalStore::open(config.database.as_std_path()).map_err(|source| {
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
        config.require_base_url()?;
        *self.credentials.lock() = Some(credentials.clone());
        Ok(Box::new(self.remote.clone()))
    }
}

/// A configuration whose database lives in a fresh temporary directory.
pub(super) fn temp_config() -> (TempDir, SyncConfig) {
    let dir = TempDir::new().expect("tempdir");
    let root = Utf8PathBuf::from_path_buf(dir.path().to_path_buf()).expect("utf-8 tempdir");
    let config = SyncConfig {
        database: root.join("hazmap.db"),
        base_url: Some("http://catalog.invalid/api".to_owned()),
        token: Some("token".to_owned()),
        gate: RefreshGate::default(),
    };
    (dir, config)
}

/// Open the cache behind `config` directly, bypassing the engine.
pub(super) fn open_cache(config: &SyncConfig) -> SqliteLocalStore {
    SqliteLocalStore::open(config.database.as_std_path()).expect("open cache")
}

pub(super) fn here() -> GeoPoint<f64> {
    GeoPoint::new(34.3469, 61.7849)
}

pub(super) fn lines(output: &[u8]) -> Vec<String> {
    String::from_utf8(output.to_vec())
        .expect("utf-8 output")
        .lines()
        .map(str::to_owned)
        .collect()
}
