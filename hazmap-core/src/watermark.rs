//! Refresh watermark and the clock that stamps it.

use std::time::{SystemTime, UNIX_EPOCH};

use geo::Point as GeoPoint;

/// Time and place of the most recent refresh attempt.
///
/// Stored as a single persisted row. A store that has never recorded a
/// refresh reports `None` rather than a watermark at `(0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Watermark {
    /// Seconds since the Unix epoch.
    pub timestamp: i64,
    /// Location the refresh was requested for.
    pub location: GeoPoint<f64>,
}

impl Watermark {
    /// Construct a watermark.
    #[must_use]
    pub const fn new(timestamp: i64, location: GeoPoint<f64>) -> Self {
        Self {
            timestamp,
            location,
        }
    }
}

/// Source of wall-clock time in whole epoch seconds.
pub trait Clock: Send + Sync {
    /// Current time in seconds since the Unix epoch.
    fn now(&self) -> i64;
}

/// [`Clock`] backed by [`SystemTime`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> i64 {
        // A clock set before 1970 reads as the epoch itself.
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .ok()
            .and_then(|elapsed| i64::try_from(elapsed.as_secs()).ok())
            .unwrap_or_default()
    }
}
