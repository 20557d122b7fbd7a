//! Core of the hazmap engine: domain types for crowd-sourced accessibility
//! hazards and the machinery that keeps a local cache in step with a remote
//! catalog.
//!
//! The crate is organised around two seams. A [`LocalStore`] persists
//! categories, disabilities, points and the refresh [`Watermark`]; a
//! [`RemoteSource`] fetches the catalog and accepts uploads. The
//! [`SyncEngine`] sits between them: it decides when to refresh through a
//! [`RefreshGate`], drains the outbox of user-created points through an
//! [`UploadQueue`], and reports changes to [`Listener`]s on a dedicated
//! thread.
//!
//! # Examples
//!
//! ```rust
//! use geo::Point as GeoPoint;
//! use hazmap_core::test_support::{MemoryStore, StubRemoteSource};
//! use hazmap_core::{EngineOptions, Point, SyncEngine};
//!
//! let engine = SyncEngine::start(
//!     MemoryStore::default(),
//!     StubRemoteSource::default(),
//!     EngineOptions::default(),
//! )?;
//! engine.add_point(Point::private(4, GeoPoint::new(34.35, 61.78)).with_name("Broken ramp"))?;
//! engine.flush()?;
//! assert!(engine.pending_points()?.is_empty());
//! # Ok::<(), hazmap_core::EngineError>(())
//! ```

mod category;
mod disability;
mod engine;
mod error;
mod gate;
mod notify;
mod point;
mod remote;
mod store;
mod upload;
mod watermark;

#[doc(hidden)]
pub mod test_support;

pub use category::{Category, CategoryKind, DEFAULT_NAME_KEY, LocalizedName};
pub use disability::Disability;
pub use engine::{
    DEFAULT_QUEUE_CAPACITY, EngineOptions, RefreshReport, SyncEngine, WORKER_THREAD_NAME,
};
pub use error::{BackendError, ConfigurationError, EngineError, PointsError, StoreError};
pub use gate::{
    AssumeConnected, Connectivity, DEFAULT_REFRESH_DISTANCE_M, DEFAULT_REFRESH_INTERVAL,
    RefreshGate,
};
pub use notify::{Event, Listener, NOTIFY_THREAD_NAME, NotificationBus};
pub use point::{FIELD_DESCRIPTION, FIELD_NAME, FIELD_URL, Point, PointOrigin, SyncStatus};
pub use remote::{Credentials, RemoteSource};
pub use store::LocalStore;
#[cfg(feature = "store-sqlite")]
pub use store::{SCHEMA_VERSION, SqliteLocalStore};
pub use upload::UploadQueue;
pub use watermark::{Clock, SystemClock, Watermark};

/// WGS84 coordinate with `x = longitude` and `y = latitude`.
pub use geo::Point as GeoPoint;
