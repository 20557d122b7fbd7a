use std::collections::BTreeMap;

use geo::Point as GeoPoint;

/// Field key for a point's title.
pub const FIELD_NAME: &str = "name";
/// Field key for a point's description.
pub const FIELD_DESCRIPTION: &str = "description";
/// Field key for a point's informational link.
pub const FIELD_URL: &str = "url";

/// Upload state of a point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum SyncStatus {
    /// Created locally and not yet acknowledged by the remote.
    Pending,
    /// Acknowledged by the remote, or received from it.
    Synchronized,
}

/// Where a point came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum PointOrigin {
    /// Downloaded as part of the remote catalog.
    Remote,
    /// Created by the local user.
    Private,
}

/// A hazard report at a location.
///
/// Coordinates are WGS84 with `x = longitude` and `y = latitude`.
///
/// # Examples
/// ```
/// use geo::Point as GeoPoint;
/// use hazmap_core::{Point, SyncStatus};
///
/// let report = Point::private(3, GeoPoint::new(34.35, 61.78)).with_name("Broken ramp");
/// assert_eq!(report.status, SyncStatus::Pending);
/// assert_eq!(report.name(), Some("Broken ramp"));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Point {
    /// Identifier assigned by the local store; `None` until inserted.
    pub local_id: Option<i64>,
    /// Identifier assigned by the remote service.
    pub remote_id: Option<String>,
    /// Owning category.
    pub category_id: i64,
    /// Position of the hazard.
    pub location: GeoPoint<f64>,
    /// Free-form metadata such as name and description.
    pub fields: BTreeMap<String, String>,
    /// Provenance of the point.
    pub origin: PointOrigin,
    /// Upload state.
    pub status: SyncStatus,
}

impl Point {
    /// A catalog point received from the remote service.
    pub fn remote(
        remote_id: impl Into<String>,
        category_id: i64,
        location: GeoPoint<f64>,
    ) -> Self {
        Self {
            local_id: None,
            remote_id: Some(remote_id.into()),
            category_id,
            location,
            fields: BTreeMap::new(),
            origin: PointOrigin::Remote,
            status: SyncStatus::Synchronized,
        }
    }

    /// A user-created point awaiting upload.
    #[must_use]
    pub const fn private(category_id: i64, location: GeoPoint<f64>) -> Self {
        Self {
            local_id: None,
            remote_id: None,
            category_id,
            location,
            fields: BTreeMap::new(),
            origin: PointOrigin::Private,
            status: SyncStatus::Pending,
        }
    }

    /// Set an arbitrary metadata field.
    #[must_use]
    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    /// Set the title.
    #[must_use]
    pub fn with_name(self, name: impl Into<String>) -> Self {
        self.with_field(FIELD_NAME, name)
    }

    /// Set the description.
    #[must_use]
    pub fn with_description(self, description: impl Into<String>) -> Self {
        self.with_field(FIELD_DESCRIPTION, description)
    }

    /// Title, if present.
    #[must_use]
    pub fn name(&self) -> Option<&str> {
        self.fields.get(FIELD_NAME).map(String::as_str)
    }

    /// Description, if present.
    #[must_use]
    pub fn description(&self) -> Option<&str> {
        self.fields.get(FIELD_DESCRIPTION).map(String::as_str)
    }

    /// Whether the point was created by the local user.
    #[must_use]
    pub fn is_private(&self) -> bool {
        self.origin == PointOrigin::Private
    }

    /// Whether the point is waiting in the outbox.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == SyncStatus::Pending
    }
}
