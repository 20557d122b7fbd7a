//! Remote catalog seam.
//!
//! [`RemoteSource`] is synchronous to keep the engine's worker a plain
//! thread; HTTP implementations bridge to async clients internally.

use std::sync::Arc;

use geo::Point as GeoPoint;
use parking_lot::RwLock;

use crate::{Category, Disability, Point, PointsError};

/// Access to the remote accessibility catalog.
///
/// # Examples
///
/// ```rust
/// use geo::Point as GeoPoint;
/// use hazmap_core::{Category, Disability, Point, PointsError, RemoteSource};
///
/// struct Offline;
///
/// impl RemoteSource for Offline {
///     fn load_disabilities(&self) -> Result<Vec<Disability>, PointsError> {
///         Ok(Vec::new())
///     }
///     fn load_categories(&self) -> Result<Vec<Category>, PointsError> {
///         Ok(vec![Category::new(1, "Kerb")])
///     }
///     fn load_points(
///         &self,
///         _category: &Category,
///         _location: GeoPoint<f64>,
///     ) -> Result<Vec<Point>, PointsError> {
///         Ok(Vec::new())
///     }
///     fn upload_point(&self, _point: &Point) -> Result<String, PointsError> {
///         Err(PointsError::Transport {
///             url: "offline".into(),
///             message: "no network".into(),
///         })
///     }
/// }
///
/// let categories = Offline.load_categories()?;
/// assert_eq!(categories.len(), 1);
/// # Ok::<(), PointsError>(())
/// ```
pub trait RemoteSource {
    /// Fetch the disability filters.
    fn load_disabilities(&self) -> Result<Vec<Disability>, PointsError>;

    /// Fetch the published categories.
    fn load_categories(&self) -> Result<Vec<Category>, PointsError>;

    /// Fetch the points of `category` near `location`.
    fn load_points(
        &self,
        category: &Category,
        location: GeoPoint<f64>,
    ) -> Result<Vec<Point>, PointsError>;

    /// Upload a user-created point and return the identifier the remote
    /// assigned to it.
    fn upload_point(&self, point: &Point) -> Result<String, PointsError>;
}

macro_rules! forward_remote_source {
    ($($wrapper:ident),+) => {$(
        impl<T: RemoteSource + ?Sized> RemoteSource for $wrapper<T> {
            fn load_disabilities(&self) -> Result<Vec<Disability>, PointsError> {
                (**self).load_disabilities()
            }

            fn load_categories(&self) -> Result<Vec<Category>, PointsError> {
                (**self).load_categories()
            }

            fn load_points(
                &self,
                category: &Category,
                location: GeoPoint<f64>,
            ) -> Result<Vec<Point>, PointsError> {
                (**self).load_points(category, location)
            }

            fn upload_point(&self, point: &Point) -> Result<String, PointsError> {
                (**self).upload_point(point)
            }
        }
    )+};
}

forward_remote_source!(Box, Arc);

/// Shared, late-binding access token.
///
/// Clones share the same slot, so a token set after the remote source was
/// built is picked up by its next request.
///
/// # Examples
/// ```
/// use hazmap_core::Credentials;
///
/// let credentials = Credentials::default();
/// let seen_by_remote = credentials.clone();
/// assert_eq!(seen_by_remote.token(), None);
///
/// credentials.set_token(Some("secret".into()));
/// assert_eq!(seen_by_remote.token().as_deref(), Some("secret"));
/// ```
#[derive(Clone, Default)]
pub struct Credentials {
    token: Arc<RwLock<Option<String>>>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = if self.token.read().is_some() {
            "<set>"
        } else {
            "<unset>"
        };
        f.debug_struct("Credentials").field("token", &state).finish()
    }
}

impl Credentials {
    /// Credentials holding `token`.
    #[must_use]
    pub fn with_token(token: Option<String>) -> Self {
        Self {
            token: Arc::new(RwLock::new(token.filter(|value| !value.is_empty()))),
        }
    }

    /// Current token.
    #[must_use]
    pub fn token(&self) -> Option<String> {
        self.token.read().clone()
    }

    /// Replace the token. Empty strings clear it.
    pub fn set_token(&self, token: Option<String>) {
        *self.token.write() = token.filter(|value| !value.is_empty());
    }
}
