//! Remote data access for the hazmap engine.
//!
//! Responsibilities:
//! - Implement [`hazmap_core::RemoteSource`] against the catalog service.
//! - Encapsulate the JSON wire format and its mapping onto core types.
//!
//! Boundaries:
//! - Do not encode sync rules (live in `hazmap-core`).
//! - Present a blocking interface; async IO stays inside the adapter.
//!
//! Invariants:
//! - Credentials are read per request, never cached.
//! - No global mutable state.

pub mod remote;

pub use remote::{HttpRemoteSource, HttpRemoteSourceConfig, RemoteBuildError};
