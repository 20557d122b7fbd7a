//! Local persistence seam for the cached catalog and the outbox.
//!
//! The [`LocalStore`] trait is synchronous. The engine calls it from its
//! single worker thread for background writes and from the caller's thread
//! for foreground reads, always through one mutex, so implementations never
//! see concurrent calls on the same handle.

use crate::{Category, Disability, Point, StoreError, Watermark};

#[cfg(feature = "store-sqlite")]
mod schema;
#[cfg(feature = "store-sqlite")]
mod sqlite;

#[cfg(feature = "store-sqlite")]
pub use schema::SCHEMA_VERSION;
#[cfg(feature = "store-sqlite")]
pub use sqlite::SqliteLocalStore;

/// Durable cache of categories, disabilities, points and the refresh
/// watermark.
///
/// Query methods return value snapshots. Ordering of
/// [`LocalStore::load_pending_points`] is insertion order, which is the order
/// the outbox is drained in.
///
/// # Examples
///
/// ```rust
/// use geo::Point as GeoPoint;
/// use hazmap_core::test_support::MemoryStore;
/// use hazmap_core::{LocalStore, Point};
///
/// # fn main() -> Result<(), hazmap_core::StoreError> {
/// let mut store = MemoryStore::default();
/// let stored = store.insert_point(&Point::private(1, GeoPoint::new(0.0, 0.0)))?;
///
/// let pending = store.load_pending_points()?;
/// assert_eq!(pending, vec![stored.clone()]);
///
/// store.mark_synchronized(&stored, "remote-1")?;
/// assert!(store.load_pending_points()?.is_empty());
/// # Ok(())
/// # }
/// ```
pub trait LocalStore {
    /// All categories, ordered by identifier.
    fn load_categories(&self) -> Result<Vec<Category>, StoreError>;

    /// All disabilities, ordered by identifier.
    fn load_disabilities(&self) -> Result<Vec<Disability>, StoreError>;

    /// Every point, remote and private, in insertion order.
    fn load_points(&self) -> Result<Vec<Point>, StoreError>;

    /// Points created by the local user, in insertion order.
    fn load_private_points(&self) -> Result<Vec<Point>, StoreError>;

    /// Private points still waiting for upload, in insertion order.
    fn load_pending_points(&self) -> Result<Vec<Point>, StoreError>;

    /// Insert or update a category keyed by its identifier.
    ///
    /// Updating keeps the stored `active` flag: the user's filter choice
    /// survives catalog refreshes.
    fn insert_category(&mut self, category: &Category) -> Result<(), StoreError>;

    /// Insert a single point and return it with its local identifier.
    fn insert_point(&mut self, point: &Point) -> Result<Point, StoreError>;

    /// Insert several points, updating those whose remote identifier is
    /// already known.
    fn insert_points(&mut self, points: &[Point]) -> Result<(), StoreError>;

    /// Replace the remote points of one category with `points`.
    ///
    /// Private points are never removed. Incoming points whose remote
    /// identifier matches an uploaded private point are skipped so the
    /// local copy stays authoritative.
    fn replace_remote_points(
        &mut self,
        category_id: i64,
        points: &[Point],
    ) -> Result<(), StoreError>;

    /// Replace the disability set, keeping the `active` flag of identifiers
    /// that survive.
    fn set_disabilities(&mut self, disabilities: &[Disability]) -> Result<(), StoreError>;

    /// Flip a pending point to synchronized and record its remote identifier.
    ///
    /// Marking an already synchronized point is a no-op; the status never
    /// reverts.
    fn mark_synchronized(&mut self, point: &Point, remote_id: &str) -> Result<(), StoreError>;

    /// Set a category's filter state.
    fn set_category_state(&mut self, category_id: i64, active: bool) -> Result<(), StoreError>;

    /// Set a disability's filter state.
    fn set_disability_state(&mut self, disability_id: i64, active: bool)
    -> Result<(), StoreError>;

    /// Last recorded refresh, if any.
    fn load_watermark(&self) -> Result<Option<Watermark>, StoreError>;

    /// Record a refresh attempt.
    fn commit_watermark(&mut self, watermark: Watermark) -> Result<(), StoreError>;

    /// Release the underlying resources. Later calls fail with
    /// [`StoreError::Closed`].
    fn close(&mut self) -> Result<(), StoreError>;
}
