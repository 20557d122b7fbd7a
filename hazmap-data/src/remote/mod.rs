//! HTTP access to the remote hazard catalog.
//!
//! This module provides [`HttpRemoteSource`], an implementation of
//! [`hazmap_core::RemoteSource`] speaking JSON over HTTP.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use hazmap_core::{Credentials, RemoteSource};
//! use hazmap_data::remote::{HttpRemoteSource, HttpRemoteSourceConfig};
//!
//! let credentials = Credentials::default();
//! let config = HttpRemoteSourceConfig::new("https://hazmap.example.com/api")
//!     .with_timeout(Duration::from_secs(10))
//!     .with_user_agent("my-app/1.0")
//!     .with_credentials(credentials.clone());
//! let remote = HttpRemoteSource::with_config(config)?;
//!
//! // Tokens can arrive after the source is built.
//! credentials.set_token(Some("secret".into()));
//! let disabilities = remote.load_disabilities()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

mod source;
mod wire;

pub use source::{
    DEFAULT_SEARCH_RADIUS_M, DEFAULT_USER_AGENT, HttpRemoteSource, HttpRemoteSourceConfig,
    RemoteBuildError,
};
