//! HTTP-based [`RemoteSource`] for the hazard catalog service.
//!
//! [`RemoteSource`] is synchronous so the sync engine's worker can stay a
//! plain thread. This module bridges to `reqwest` by blocking on a Tokio
//! runtime owned by the source.
//!
//! # Example
//!
//! ```no_run
//! use geo::Point as GeoPoint;
//! use hazmap_core::RemoteSource;
//! use hazmap_data::remote::HttpRemoteSource;
//!
//! let remote = HttpRemoteSource::new("https://hazmap.example.com/api")?;
//! for category in remote.load_categories()? {
//!     let points = remote.load_points(&category, GeoPoint::new(34.35, 61.78))?;
//!     println!("{}: {} point(s)", category.kind(), points.len());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::future::Future;
use std::time::Duration;

use geo::Point as GeoPoint;
use hazmap_core::{
    Category, ConfigurationError, Credentials, Disability, Point, PointsError, RemoteSource,
};
use log::debug;
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tokio::runtime::{Handle, Runtime, RuntimeFlavor};
use url::Url;

use super::wire::{CategoryRecord, DisabilityRecord, PointRecord, UploadRequest, UploadResponse};

/// Error type for [`HttpRemoteSource`] construction failures.
#[derive(Debug, Error)]
pub enum RemoteBuildError {
    /// The endpoint configuration is unusable.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// Failed to build the HTTP client.
    #[error("failed to build HTTP client: {0}")]
    HttpClient(#[source] reqwest::Error),
    /// Failed to build the Tokio runtime.
    #[error("failed to build Tokio runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Default user agent for catalog requests.
pub const DEFAULT_USER_AGENT: &str = "hazmap-engine/0.1";

/// Default radius, in metres, of point queries around a location.
pub const DEFAULT_SEARCH_RADIUS_M: f64 = 10_000.0;

const DEFAULT_TIMEOUT_SECS: u64 = 30;

// Error bodies are echoed into logs; keep them short.
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Configuration for [`HttpRemoteSource`].
#[derive(Debug, Clone)]
pub struct HttpRemoteSourceConfig {
    /// Base URL of the catalog service. Required.
    pub base_url: Option<String>,
    /// Request timeout duration.
    pub timeout: Duration,
    /// User agent string for requests.
    pub user_agent: String,
    /// Radius of point queries in metres.
    pub search_radius_m: f64,
    /// Access token shared with the engine.
    pub credentials: Credentials,
}

impl Default for HttpRemoteSourceConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            user_agent: DEFAULT_USER_AGENT.to_owned(),
            search_radius_m: DEFAULT_SEARCH_RADIUS_M,
            credentials: Credentials::default(),
        }
    }
}

impl HttpRemoteSourceConfig {
    /// Create a new configuration with the given base URL.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..Self::default()
        }
    }

    /// Set the request timeout.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the user agent string.
    #[must_use]
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// Set the radius of point queries.
    #[must_use]
    pub const fn with_search_radius(mut self, metres: f64) -> Self {
        self.search_radius_m = metres;
        self
    }

    /// Share `credentials` with the source. The token is read on every
    /// request, so it may be set after the source is built.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Parse and check the base URL.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::MissingBaseUrl`] when no URL is set or it is
    /// blank; [`ConfigurationError::InvalidBaseUrl`] when it does not parse
    /// as an absolute `http` or `https` URL.
    pub fn base(&self) -> Result<Url, ConfigurationError> {
        let raw = self
            .base_url
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .ok_or(ConfigurationError::MissingBaseUrl)?;
        let invalid = |message: String| ConfigurationError::InvalidBaseUrl {
            url: raw.to_owned(),
            message,
        };
        let url = Url::parse(raw).map_err(|err| invalid(err.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(invalid(format!("unsupported scheme {:?}", url.scheme())));
        }
        if url.cannot_be_a_base() {
            return Err(invalid("URL cannot be used as a base".to_owned()));
        }
        Ok(url)
    }
}

/// Catalog client implementing [`RemoteSource`] over HTTP and JSON.
///
/// # Runtime behaviour
///
/// Outside any Tokio runtime the source blocks on its own current-thread
/// runtime. Inside a multi-threaded runtime it uses that runtime's handle
/// with [`tokio::task::block_in_place`]. Inside a `current_thread` runtime it
/// falls back to its own runtime, which can deadlock if the caller's runtime
/// drives IO this request depends on.
pub struct HttpRemoteSource {
    client: Client,
    config: HttpRemoteSourceConfig,
    base: Url,
    runtime: Runtime,
}

impl std::fmt::Debug for HttpRemoteSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpRemoteSource")
            .field("base", &self.base.as_str())
            .field("config", &self.config)
            .field("runtime", &"<tokio::runtime::Runtime>")
            .finish_non_exhaustive()
    }
}

impl HttpRemoteSource {
    /// Create a source with default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is unusable or the HTTP client or Tokio
    /// runtime fails to build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, RemoteBuildError> {
        Self::with_config(HttpRemoteSourceConfig::new(base_url))
    }

    /// Create a source with explicit configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is unusable or the HTTP client or Tokio
    /// runtime fails to build.
    pub fn with_config(config: HttpRemoteSourceConfig) -> Result<Self, RemoteBuildError> {
        let base = config.base()?;
        let client = Client::builder()
            .user_agent(&config.user_agent)
            .connect_timeout(config.timeout)
            .timeout(config.timeout)
            .build()
            .map_err(RemoteBuildError::HttpClient)?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(RemoteBuildError::Runtime)?;
        Ok(Self {
            client,
            config,
            base,
            runtime,
        })
    }

    /// Credentials attached to requests.
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.config.credentials
    }

    /// Base URL requests are resolved against.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base.as_str().trim_end_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.config.credentials.token() {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn block_on<F: Future>(&self, future: F) -> F::Output {
        match Handle::try_current() {
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| handle.block_on(future))
            }
            _ => self.runtime.block_on(future),
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        url: &str,
        query: &[(&str, String)],
    ) -> Result<T, PointsError> {
        debug!("GET {url}");
        let response = self
            .authorize(self.client.get(url).query(query))
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        self.decode(response, url).await
    }

    async fn decode<T: DeserializeOwned>(
        &self,
        response: Response,
        url: &str,
    ) -> Result<T, PointsError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PointsError::Rejected {
                url: url.to_owned(),
                status: status.as_u16(),
                message: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }
        let body = response
            .bytes()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, url))?;
        serde_json::from_slice(&body).map_err(|err| PointsError::Protocol {
            message: format!("{url}: {err}"),
        })
    }

    fn convert_reqwest_error(&self, error: &reqwest::Error, url: &str) -> PointsError {
        if error.is_timeout() {
            return PointsError::Timeout {
                url: url.to_owned(),
                timeout_secs: self.config.timeout.as_secs(),
            };
        }

        if let Some(status) = error.status() {
            return PointsError::Rejected {
                url: url.to_owned(),
                status: status.as_u16(),
                message: error.to_string(),
            };
        }

        PointsError::Transport {
            url: url.to_owned(),
            message: error.to_string(),
        }
    }

    async fn fetch_points(
        &self,
        category: &Category,
        location: GeoPoint<f64>,
    ) -> Result<Vec<Point>, PointsError> {
        let url = self.endpoint(&format!("categories/{}/points", category.id));
        let query = [
            ("lat", location.y().to_string()),
            ("lon", location.x().to_string()),
            ("radius", self.config.search_radius_m.to_string()),
        ];
        let records: Vec<PointRecord> = self.get_json(&url, &query).await?;
        records
            .into_iter()
            .map(|record| record.into_point(category.id))
            .collect()
    }

    async fn send_point(&self, point: &Point) -> Result<String, PointsError> {
        let url = self.endpoint("points");
        debug!("POST {url}");
        let response = self
            .authorize(self.client.post(&url).json(&UploadRequest::from(point)))
            .send()
            .await
            .map_err(|err| self.convert_reqwest_error(&err, &url))?;
        let created: UploadResponse = self.decode(response, &url).await?;
        if created.id.is_empty() {
            return Err(PointsError::Protocol {
                message: format!("{url}: upload acknowledged without an identifier"),
            });
        }
        Ok(created.id)
    }
}

impl RemoteSource for HttpRemoteSource {
    fn load_disabilities(&self) -> Result<Vec<Disability>, PointsError> {
        let url = self.endpoint("disabilities");
        let records: Vec<DisabilityRecord> = self.block_on(self.get_json(&url, &[]))?;
        Ok(records.into_iter().map(Disability::from).collect())
    }

    fn load_categories(&self) -> Result<Vec<Category>, PointsError> {
        let url = self.endpoint("categories");
        let records: Vec<CategoryRecord> = self.block_on(self.get_json(&url, &[]))?;
        records.into_iter().map(Category::try_from).collect()
    }

    fn load_points(
        &self,
        category: &Category,
        location: GeoPoint<f64>,
    ) -> Result<Vec<Point>, PointsError> {
        self.block_on(self.fetch_points(category, location))
    }

    fn upload_point(&self, point: &Point) -> Result<String, PointsError> {
        self.block_on(self.send_point(point))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn missing_base_url_is_a_configuration_error() {
        let err = HttpRemoteSource::with_config(HttpRemoteSourceConfig::default())
            .expect_err("missing URL should fail");

        assert!(matches!(
            err,
            RemoteBuildError::Configuration(ConfigurationError::MissingBaseUrl)
        ));
    }

    #[rstest]
    #[case("   ")]
    #[case("")]
    fn blank_base_url_counts_as_missing(#[case] raw: &str) {
        let err = HttpRemoteSourceConfig::new(raw)
            .base()
            .expect_err("blank URL should fail");

        assert_eq!(err, ConfigurationError::MissingBaseUrl);
    }

    #[rstest]
    #[case("not a url")]
    #[case("ftp://catalog.example.com")]
    #[case("mailto:someone@example.com")]
    fn unusable_base_urls_are_rejected(#[case] raw: &str) {
        let err = HttpRemoteSourceConfig::new(raw)
            .base()
            .expect_err("URL should be rejected");

        assert!(
            matches!(&err, ConfigurationError::InvalidBaseUrl { url, .. } if url == raw),
            "unexpected error {err:?}"
        );
    }

    #[rstest]
    #[case("http://catalog.example.com/api")]
    #[case("http://catalog.example.com/api/")]
    fn endpoints_join_without_double_slashes(#[case] base: &str) {
        let remote = HttpRemoteSource::new(base).expect("source should build");

        assert_eq!(
            remote.endpoint("categories/4/points"),
            "http://catalog.example.com/api/categories/4/points"
        );
    }

    #[rstest]
    fn credentials_are_shared_with_the_caller() {
        let credentials = Credentials::default();
        let remote = HttpRemoteSource::with_config(
            HttpRemoteSourceConfig::new("http://catalog.example.com")
                .with_credentials(credentials.clone()),
        )
        .expect("source should build");

        credentials.set_token(Some("late".into()));

        assert_eq!(remote.credentials().token().as_deref(), Some("late"));
    }

    #[rstest]
    fn config_builder_pattern() {
        let config = HttpRemoteSourceConfig::new("http://example.com")
            .with_timeout(Duration::from_secs(60))
            .with_user_agent("test-agent/1.0")
            .with_search_radius(2_500.0);

        assert_eq!(config.base_url.as_deref(), Some("http://example.com"));
        assert_eq!(config.timeout, Duration::from_secs(60));
        assert_eq!(config.user_agent, "test-agent/1.0");
        assert_eq!(config.search_radius_m, 2_500.0);
    }

    #[rstest]
    fn unreachable_hosts_are_transport_failures() {
        // Port 9 (discard) on localhost is closed on test machines.
        let remote = HttpRemoteSource::with_config(
            HttpRemoteSourceConfig::new("http://127.0.0.1:9")
                .with_timeout(Duration::from_secs(2)),
        )
        .expect("source should build");

        let err = remote
            .load_categories()
            .expect_err("closed port should fail");

        assert!(err.is_retriable(), "expected retriable error, got {err:?}");
    }
}
