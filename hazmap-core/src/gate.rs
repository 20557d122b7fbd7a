//! Decide whether the remote catalog should be pulled again.
//!
//! [`RefreshGate`] is a pure function over the last [`Watermark`], the
//! current time and location, and connectivity. Three independent triggers
//! open the gate: no watermark at all, an elapsed interval, or a location
//! change beyond a distance threshold. None of them matter while offline.

use std::time::Duration;

use geo::{Distance, Haversine, Point as GeoPoint};

use crate::{ConfigurationError, Watermark};

/// Default interval between refreshes: one hour, in whole seconds.
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(3_600);

/// Default distance, in metres, the device may move before a refresh.
pub const DEFAULT_REFRESH_DISTANCE_M: f64 = 1_000.0;

/// Reports whether the network is currently reachable.
pub trait Connectivity: Send + Sync {
    /// `true` when remote calls have a chance of succeeding.
    fn is_connected(&self) -> bool;
}

/// [`Connectivity`] for hosts without a network probe.
#[derive(Debug, Default, Clone, Copy)]
pub struct AssumeConnected;

impl Connectivity for AssumeConnected {
    fn is_connected(&self) -> bool {
        true
    }
}

/// Refresh decision policy.
///
/// # Examples
/// ```
/// use geo::Point as GeoPoint;
/// use hazmap_core::{RefreshGate, Watermark};
///
/// let gate = RefreshGate::default();
/// let here = GeoPoint::new(34.35, 61.78);
/// let last = Watermark::new(1_000, here);
///
/// assert!(gate.should_refresh(None, 1_000, here, true));
/// assert!(!gate.should_refresh(Some(last), 1_060, here, true));
/// assert!(!gate.should_refresh(None, 1_000, here, false));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshGate {
    interval: Duration,
    distance_m: f64,
}

impl Default for RefreshGate {
    fn default() -> Self {
        Self {
            interval: DEFAULT_REFRESH_INTERVAL,
            distance_m: DEFAULT_REFRESH_DISTANCE_M,
        }
    }
}

impl RefreshGate {
    /// Create a gate with explicit thresholds.
    #[must_use]
    pub const fn new(interval: Duration, distance_m: f64) -> Self {
        Self {
            interval,
            distance_m,
        }
    }

    /// Create a gate from user-supplied thresholds, rejecting a negative or
    /// non-finite distance.
    pub fn try_new(interval: Duration, distance_m: f64) -> Result<Self, ConfigurationError> {
        if !distance_m.is_finite() || distance_m < 0.0 {
            return Err(ConfigurationError::InvalidRefreshDistance);
        }
        Ok(Self::new(interval, distance_m))
    }

    /// Set the refresh interval.
    #[must_use]
    pub const fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the distance threshold in metres.
    #[must_use]
    pub const fn with_distance_m(mut self, distance_m: f64) -> Self {
        self.distance_m = distance_m;
        self
    }

    /// Configured refresh interval.
    #[must_use]
    pub const fn interval(&self) -> Duration {
        self.interval
    }

    /// Configured distance threshold in metres.
    #[must_use]
    pub const fn distance_m(&self) -> f64 {
        self.distance_m
    }

    /// Return `true` when a refresh is warranted.
    ///
    /// `now` is in epoch seconds. A `now` earlier than the watermark counts
    /// as no elapsed time.
    #[must_use]
    pub fn should_refresh(
        &self,
        last: Option<Watermark>,
        now: i64,
        current: GeoPoint<f64>,
        has_connectivity: bool,
    ) -> bool {
        if !has_connectivity {
            return false;
        }
        let Some(last) = last else {
            return true;
        };
        self.interval_elapsed(last.timestamp, now) || self.moved_too_far(last.location, current)
    }

    fn interval_elapsed(&self, last: i64, now: i64) -> bool {
        let elapsed = u64::try_from(now.saturating_sub(last)).unwrap_or(0);
        elapsed > self.interval.as_secs()
    }

    fn moved_too_far(&self, last: GeoPoint<f64>, current: GeoPoint<f64>) -> bool {
        Haversine.distance(last, current) > self.distance_m
    }
}
