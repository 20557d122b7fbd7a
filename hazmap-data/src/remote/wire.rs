//! JSON payloads exchanged with the catalog service.
//!
//! Endpoints, relative to the configured base URL:
//!
//! - `GET disabilities` returns `[{"id": 1, "label": "Wheelchair"}]`
//! - `GET categories` returns `[{"id": 4, "name": "Kerb", ...}]`, where
//!   `name` is either a plain string or an object of per-locale variants
//! - `GET categories/{id}/points?lat=..&lon=..&radius=..` returns
//!   `[{"id": "a1", "lat": 61.78, "lon": 34.35, "fields": {...}}]`
//! - `POST points` accepts an [`UploadRequest`] and answers with
//!   `{"id": "..."}`

use std::collections::BTreeMap;

use geo::Point as GeoPoint;
use hazmap_core::{Category, Disability, Point, PointsError};
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Deserialize)]
pub(crate) struct DisabilityRecord {
    pub(crate) id: i64,
    #[serde(alias = "name")]
    pub(crate) label: String,
}

impl From<DisabilityRecord> for Disability {
    fn from(record: DisabilityRecord) -> Self {
        Self::new(record.id, record.label)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct CategoryRecord {
    pub(crate) id: i64,
    pub(crate) name: Value,
    #[serde(default)]
    pub(crate) description: Option<String>,
    #[serde(default)]
    pub(crate) url: Option<String>,
    #[serde(default, alias = "icon")]
    pub(crate) icon_url: Option<String>,
}

impl TryFrom<CategoryRecord> for Category {
    type Error = PointsError;

    fn try_from(record: CategoryRecord) -> Result<Self, Self::Error> {
        // Localized names are kept as their JSON text and resolved by `Category`.
        let raw_name = match record.name {
            Value::String(name) => name,
            Value::Object(variants) => Value::Object(variants).to_string(),
            other => {
                return Err(PointsError::Protocol {
                    message: format!("category {} has a {other} name", record.id),
                });
            }
        };
        Ok(Self::new(record.id, raw_name)
            .with_description(record.description.unwrap_or_default())
            .with_url(record.url.unwrap_or_default())
            .with_icon_url(record.icon_url.unwrap_or_default()))
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct PointRecord {
    #[serde(alias = "uuid")]
    pub(crate) id: String,
    pub(crate) lat: f64,
    pub(crate) lon: f64,
    #[serde(default)]
    pub(crate) fields: BTreeMap<String, Value>,
}

impl PointRecord {
    pub(crate) fn into_point(self, category_id: i64) -> Result<Point, PointsError> {
        if self.id.is_empty() {
            return Err(PointsError::Protocol {
                message: format!("point in category {category_id} has no identifier"),
            });
        }
        if !(self.lat.is_finite() && self.lon.is_finite()) {
            return Err(PointsError::Protocol {
                message: format!("point {} has no usable coordinates", self.id),
            });
        }
        let mut point = Point::remote(self.id, category_id, GeoPoint::new(self.lon, self.lat));
        point.fields = self
            .fields
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(text) => Some((key, text)),
                Value::Number(number) => Some((key, number.to_string())),
                Value::Bool(flag) => Some((key, flag.to_string())),
                Value::Null | Value::Array(_) | Value::Object(_) => {
                    debug!("ignoring non-scalar field {key:?}");
                    None
                }
            })
            .collect();
        Ok(point)
    }
}

/// Body of a point upload.
#[derive(Debug, Serialize)]
pub(crate) struct UploadRequest<'a> {
    pub(crate) category_id: i64,
    pub(crate) lat: f64,
    pub(crate) lon: f64,
    pub(crate) fields: &'a BTreeMap<String, String>,
}

impl<'a> From<&'a Point> for UploadRequest<'a> {
    fn from(point: &'a Point) -> Self {
        Self {
            category_id: point.category_id,
            lat: point.location.y(),
            lon: point.location.x(),
            fields: &point.fields,
        }
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct UploadResponse {
    #[serde(alias = "uuid")]
    pub(crate) id: String,
}
