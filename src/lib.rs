//! Facade crate for the hazmap sync engine.
//!
//! This crate re-exports the core domain types and the sync engine, and
//! exposes the SQLite store and HTTP catalog client behind feature flags.

#![forbid(unsafe_code)]

pub use hazmap_core::{
    Category, CategoryKind, Clock, ConfigurationError, Connectivity, Credentials, Disability,
    EngineError, EngineOptions, GeoPoint, Listener, LocalStore, Point, PointOrigin, PointsError,
    RefreshGate, RefreshReport, RemoteSource, StoreError, SyncEngine, SyncStatus, Watermark,
};

#[cfg(feature = "store-sqlite")]
pub use hazmap_core::SqliteLocalStore;

#[cfg(feature = "remote-http")]
pub use hazmap_data::{HttpRemoteSource, HttpRemoteSourceConfig, RemoteBuildError};
