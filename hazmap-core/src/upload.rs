//! Outbox draining.

use log::{debug, info};
use parking_lot::Mutex;

use crate::{LocalStore, PointsError, RemoteSource};

/// Uploads pending private points one at a time.
///
/// Each acknowledged point is marked synchronized before the next upload
/// starts, so every transition is durable on its own. The first failure
/// stops the drain; points not yet attempted stay pending for the next
/// call. The store lock is released while a request is in flight.
///
/// # Examples
///
/// ```rust
/// use geo::Point as GeoPoint;
/// use parking_lot::Mutex;
/// use hazmap_core::test_support::{MemoryStore, StubRemoteSource};
/// use hazmap_core::{LocalStore, Point, UploadQueue};
///
/// let store = Mutex::new(MemoryStore::default());
/// store.lock().insert_point(&Point::private(1, GeoPoint::new(0.0, 0.0)))?;
/// let remote = StubRemoteSource::default();
///
/// let uploaded = UploadQueue::new(&store, &remote).drain()?;
/// assert_eq!(uploaded, 1);
/// assert!(store.lock().load_pending_points()?.is_empty());
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
#[derive(Debug)]
pub struct UploadQueue<'a, S, R: ?Sized> {
    store: &'a Mutex<S>,
    remote: &'a R,
}

impl<'a, S, R> UploadQueue<'a, S, R>
where
    S: LocalStore,
    R: RemoteSource + ?Sized,
{
    /// Borrow the store and remote for a drain.
    pub const fn new(store: &'a Mutex<S>, remote: &'a R) -> Self {
        Self { store, remote }
    }

    /// Upload every pending point, including points added while the drain
    /// runs, and return how many were acknowledged.
    pub fn drain(&self) -> Result<usize, PointsError> {
        self.drain_while(|| true)
    }

    /// Like [`UploadQueue::drain`], but checks `keep_going` before each
    /// upload and stops early once it returns `false`.
    pub fn drain_while<F>(&self, keep_going: F) -> Result<usize, PointsError>
    where
        F: Fn() -> bool,
    {
        let mut uploaded = 0;
        // Points added while a batch is in flight are picked up by the next
        // pass.
        'passes: loop {
            let pending = self.store.lock().load_pending_points()?;
            if pending.is_empty() {
                break;
            }
            for point in &pending {
                if !keep_going() {
                    debug!("outbox drain interrupted after {uploaded} upload(s)");
                    break 'passes;
                }
                let remote_id = self.remote.upload_point(point)?;
                self.store.lock().mark_synchronized(point, &remote_id)?;
                debug!("point {:?} acknowledged as {remote_id}", point.local_id);
                uploaded += 1;
            }
        }
        if uploaded == 0 {
            debug!("outbox empty");
        } else {
            info!("uploaded {uploaded} pending point(s)");
        }
        Ok(uploaded)
    }
}
