//! In-memory doubles for the store, remote and listener seams, shared by unit
//! tests, behaviour tests and doctests.
//!
//! Every double is cheap to clone and clones share state, so a test can hand
//! one copy to the engine and keep another for assertions.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use geo::Point as GeoPoint;
use parking_lot::{Condvar, Mutex};

use crate::{
    Category, Clock, Connectivity, Disability, Listener, LocalStore, Point, PointsError,
    RemoteSource, StoreError, SyncStatus, Watermark,
};

#[derive(Debug, Default)]
struct MemoryState {
    categories: Vec<Category>,
    disabilities: Vec<Disability>,
    points: Vec<Point>,
    watermark: Option<Watermark>,
    next_local_id: i64,
    closed: bool,
}

impl MemoryState {
    const fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed {
            Err(StoreError::Closed)
        } else {
            Ok(())
        }
    }

    fn push_point(&mut self, point: &Point) -> Point {
        self.next_local_id += 1;
        let stored = Point {
            local_id: Some(self.next_local_id),
            ..point.clone()
        };
        self.points.push(stored.clone());
        stored
    }
}

/// [`LocalStore`] backed by vectors.
///
/// Behaves like the SQLite store: categories and disabilities are ordered by
/// identifier, points by insertion.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryStore {
    /// Whether [`LocalStore::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }
}

impl LocalStore for MemoryStore {
    fn load_categories(&self) -> Result<Vec<Category>, StoreError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.categories.clone())
    }

    fn load_disabilities(&self) -> Result<Vec<Disability>, StoreError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.disabilities.clone())
    }

    fn load_points(&self) -> Result<Vec<Point>, StoreError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.points.clone())
    }

    fn load_private_points(&self) -> Result<Vec<Point>, StoreError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state
            .points
            .iter()
            .filter(|point| point.is_private())
            .cloned()
            .collect())
    }

    fn load_pending_points(&self) -> Result<Vec<Point>, StoreError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state
            .points
            .iter()
            .filter(|point| point.is_private() && point.is_pending())
            .cloned()
            .collect())
    }

    fn insert_category(&mut self, category: &Category) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        match state.categories.iter().position(|known| known.id == category.id) {
            Some(index) => {
                let active = state.categories[index].active;
                state.categories[index] = category.clone().with_active(active);
            }
            None => {
                state.categories.push(category.clone());
                state.categories.sort_by_key(|known| known.id);
            }
        }
        Ok(())
    }

    fn insert_point(&mut self, point: &Point) -> Result<Point, StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        Ok(state.push_point(point))
    }

    fn insert_points(&mut self, points: &[Point]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        for point in points {
            let known = point.remote_id.as_ref().and_then(|remote_id| {
                state
                    .points
                    .iter()
                    .position(|known| known.remote_id.as_ref() == Some(remote_id))
            });
            match known {
                Some(index) => {
                    let local_id = state.points[index].local_id;
                    state.points[index] = Point {
                        local_id,
                        ..point.clone()
                    };
                }
                None => {
                    state.push_point(point);
                }
            }
        }
        Ok(())
    }

    fn replace_remote_points(
        &mut self,
        category_id: i64,
        points: &[Point],
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state
            .points
            .retain(|point| point.is_private() || point.category_id != category_id);
        for point in points {
            let known = point.remote_id.as_ref().and_then(|remote_id| {
                state
                    .points
                    .iter()
                    .position(|known| known.remote_id.as_ref() == Some(remote_id))
            });
            match known {
                Some(index) if state.points[index].is_private() => {}
                Some(index) => {
                    let local_id = state.points[index].local_id;
                    state.points[index] = Point {
                        local_id,
                        ..point.clone()
                    };
                }
                None => {
                    state.push_point(point);
                }
            }
        }
        Ok(())
    }

    fn set_disabilities(&mut self, disabilities: &[Disability]) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let mut replaced: Vec<Disability> = disabilities
            .iter()
            .map(|incoming| {
                let active = state
                    .disabilities
                    .iter()
                    .find(|known| known.id == incoming.id)
                    .map_or(incoming.active, |known| known.active);
                Disability {
                    active,
                    ..incoming.clone()
                }
            })
            .collect();
        replaced.sort_by_key(|disability| disability.id);
        state.disabilities = replaced;
        Ok(())
    }

    fn mark_synchronized(&mut self, point: &Point, remote_id: &str) -> Result<(), StoreError> {
        let local_id = point.local_id.ok_or(StoreError::UnsavedPoint)?;
        let mut state = self.state.lock();
        state.ensure_open()?;
        let pending = state
            .points
            .iter()
            .find(|known| known.local_id == Some(local_id))
            .ok_or(StoreError::UnknownPoint { local_id })?
            .is_pending();
        if !pending {
            return Ok(());
        }
        state
            .points
            .retain(|known| known.is_private() || known.remote_id.as_deref() != Some(remote_id));
        if let Some(stored) = state
            .points
            .iter_mut()
            .find(|known| known.local_id == Some(local_id))
        {
            stored.status = SyncStatus::Synchronized;
            stored.remote_id = Some(remote_id.to_owned());
        }
        Ok(())
    }

    fn set_category_state(&mut self, category_id: i64, active: bool) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let category = state
            .categories
            .iter_mut()
            .find(|known| known.id == category_id)
            .ok_or(StoreError::UnknownCategory { id: category_id })?;
        category.active = active;
        Ok(())
    }

    fn set_disability_state(
        &mut self,
        disability_id: i64,
        active: bool,
    ) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        let disability = state
            .disabilities
            .iter_mut()
            .find(|known| known.id == disability_id)
            .ok_or(StoreError::UnknownDisability { id: disability_id })?;
        disability.active = active;
        Ok(())
    }

    fn load_watermark(&self) -> Result<Option<Watermark>, StoreError> {
        let state = self.state.lock();
        state.ensure_open()?;
        Ok(state.watermark)
    }

    fn commit_watermark(&mut self, watermark: Watermark) -> Result<(), StoreError> {
        let mut state = self.state.lock();
        state.ensure_open()?;
        state.watermark = Some(watermark);
        Ok(())
    }

    fn close(&mut self) -> Result<(), StoreError> {
        self.state.lock().closed = true;
        Ok(())
    }
}

/// Remote call a [`StubRemoteSource`] can be told to block in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HoldSite {
    /// `load_points` for the given category.
    Points(i64),
    /// Any `upload_point` call.
    Upload,
}

#[derive(Debug, Default)]
struct HoldState {
    site: Option<HoldSite>,
    blocked: bool,
}

#[derive(Debug, Default)]
struct Hold {
    state: Mutex<HoldState>,
    changed: Condvar,
}

impl Hold {
    fn pass(&self, site: HoldSite) {
        let mut state = self.state.lock();
        if state.site != Some(site) {
            return;
        }
        state.blocked = true;
        self.changed.notify_all();
        while state.site == Some(site) {
            self.changed.wait(&mut state);
        }
        state.blocked = false;
    }
}

#[derive(Debug)]
struct StubState {
    disabilities: Result<Vec<Disability>, PointsError>,
    categories: Result<Vec<Category>, PointsError>,
    points: HashMap<i64, Result<Vec<Point>, PointsError>>,
    upload_failures: HashMap<usize, PointsError>,
    upload_calls: usize,
    uploaded: usize,
    upload_attempts: Vec<Option<i64>>,
    point_requests: Vec<(i64, GeoPoint<f64>)>,
    category_requests: usize,
}

impl Default for StubState {
    fn default() -> Self {
        Self {
            disabilities: Ok(Vec::new()),
            categories: Ok(Vec::new()),
            points: HashMap::new(),
            upload_failures: HashMap::new(),
            upload_calls: 0,
            uploaded: 0,
            upload_attempts: Vec::new(),
            point_requests: Vec::new(),
            category_requests: 0,
        }
    }
}

/// Scripted [`RemoteSource`].
///
/// Uploads succeed with identifiers `uploaded-1`, `uploaded-2`, … unless a
/// failure was scheduled with [`StubRemoteSource::fail_upload_at`].
/// Categories without scripted points return an empty list.
#[derive(Debug, Clone, Default)]
pub struct StubRemoteSource {
    state: Arc<Mutex<StubState>>,
    hold: Arc<Hold>,
}

impl StubRemoteSource {
    /// Serve `categories` from `load_categories`.
    #[must_use]
    pub fn with_categories(categories: Vec<Category>) -> Self {
        let stub = Self::default();
        stub.set_categories(categories);
        stub
    }

    /// Serve `disabilities` from `load_disabilities`.
    pub fn set_disabilities(&self, disabilities: Vec<Disability>) {
        self.state.lock().disabilities = Ok(disabilities);
    }

    /// Fail `load_disabilities` with `error`.
    pub fn fail_disabilities(&self, error: PointsError) {
        self.state.lock().disabilities = Err(error);
    }

    /// Serve `categories` from `load_categories`.
    pub fn set_categories(&self, categories: Vec<Category>) {
        self.state.lock().categories = Ok(categories);
    }

    /// Fail `load_categories` with `error`.
    pub fn fail_categories(&self, error: PointsError) {
        self.state.lock().categories = Err(error);
    }

    /// Serve `points` for `category_id`.
    pub fn set_points(&self, category_id: i64, points: Vec<Point>) {
        self.state.lock().points.insert(category_id, Ok(points));
    }

    /// Fail `load_points` for `category_id` with `error`.
    pub fn fail_points(&self, category_id: i64, error: PointsError) {
        self.state.lock().points.insert(category_id, Err(error));
    }

    /// Fail the `attempt`-th upload call (1-based, counted from creation).
    pub fn fail_upload_at(&self, attempt: usize, error: PointsError) {
        self.state.lock().upload_failures.insert(attempt, error);
    }

    /// Local identifiers of the points passed to `upload_point`, in call
    /// order.
    #[must_use]
    pub fn upload_attempts(&self) -> Vec<Option<i64>> {
        self.state.lock().upload_attempts.clone()
    }

    /// Forget recorded upload attempts. Scheduled failures and the call
    /// counter are kept.
    pub fn clear_upload_attempts(&self) {
        self.state.lock().upload_attempts.clear();
    }

    /// Categories and locations passed to `load_points`, in call order.
    #[must_use]
    pub fn point_requests(&self) -> Vec<(i64, GeoPoint<f64>)> {
        self.state.lock().point_requests.clone()
    }

    /// Number of `load_categories` calls.
    #[must_use]
    pub fn category_requests(&self) -> usize {
        self.state.lock().category_requests
    }

    /// Make calls at `site` block until [`StubRemoteSource::release`].
    ///
    /// A blocked `load_points` call has already captured its scripted
    /// response, so rescripting while it waits affects only later calls.
    pub fn hold(&self, site: HoldSite) {
        self.hold.state.lock().site = Some(site);
    }

    /// Wait up to `timeout` for a call to block at the current hold site.
    #[must_use]
    pub fn wait_until_held(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.hold.state.lock();
        while !state.blocked {
            if self.hold.changed.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        state.blocked
    }

    /// Let blocked calls proceed and stop holding new ones.
    pub fn release(&self) {
        self.hold.state.lock().site = None;
        self.hold.changed.notify_all();
    }
}

impl RemoteSource for StubRemoteSource {
    fn load_disabilities(&self) -> Result<Vec<Disability>, PointsError> {
        self.state.lock().disabilities.clone()
    }

    fn load_categories(&self) -> Result<Vec<Category>, PointsError> {
        let mut state = self.state.lock();
        state.category_requests += 1;
        state.categories.clone()
    }

    fn load_points(
        &self,
        category: &Category,
        location: GeoPoint<f64>,
    ) -> Result<Vec<Point>, PointsError> {
        let response = {
            let mut state = self.state.lock();
            state.point_requests.push((category.id, location));
            state
                .points
                .get(&category.id)
                .cloned()
                .unwrap_or_else(|| Ok(Vec::new()))
        };
        self.hold.pass(HoldSite::Points(category.id));
        response
    }

    fn upload_point(&self, point: &Point) -> Result<String, PointsError> {
        self.hold.pass(HoldSite::Upload);
        let mut state = self.state.lock();
        state.upload_calls += 1;
        state.upload_attempts.push(point.local_id);
        let attempt = state.upload_calls;
        if let Some(error) = state.upload_failures.remove(&attempt) {
            return Err(error);
        }
        state.uploaded += 1;
        Ok(format!("uploaded-{}", state.uploaded))
    }
}

/// What a [`RecordingListener`] saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// `on_data_updated`.
    Updated {
        /// Whether the update came from the remote catalog.
        remote: bool,
    },
    /// `on_data_update_failed`, with the rendered error.
    Failed(String),
}

type TagLog = Arc<Mutex<Vec<&'static str>>>;

/// [`Listener`] that records every callback and the thread it ran on.
#[derive(Debug, Default)]
pub struct RecordingListener {
    seen: Mutex<Vec<(Notification, String)>>,
    tag: Option<(&'static str, TagLog)>,
}

impl RecordingListener {
    /// Listener that also appends `tag` to `log` on every callback.
    #[must_use]
    pub fn tagged(tag: &'static str, log: TagLog) -> Self {
        Self {
            seen: Mutex::default(),
            tag: Some((tag, log)),
        }
    }

    /// Notifications received so far.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().iter().map(|(seen, _)| seen.clone()).collect()
    }

    /// Names of the threads the callbacks ran on.
    #[must_use]
    pub fn thread_names(&self) -> Vec<String> {
        self.seen.lock().iter().map(|(_, name)| name.clone()).collect()
    }

    fn record(&self, notification: Notification) {
        let name = thread::current().name().unwrap_or_default().to_owned();
        self.seen.lock().push((notification, name));
        if let Some((tag, log)) = &self.tag {
            log.lock().push(tag);
        }
    }
}

impl Listener for RecordingListener {
    fn on_data_updated(&self, is_remote_update: bool) {
        self.record(Notification::Updated {
            remote: is_remote_update,
        });
    }

    fn on_data_update_failed(&self, cause: &PointsError) {
        self.record(Notification::Failed(cause.to_string()));
    }
}

/// [`Clock`] that only moves when told to.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Clock reading `now` seconds since the epoch.
    #[must_use]
    pub fn at(now: i64) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(now)),
        }
    }

    /// Move the clock to `now`.
    pub fn set(&self, now: i64) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move the clock forward by `seconds`.
    pub fn advance(&self, seconds: i64) {
        self.now.fetch_add(seconds, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> i64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// [`Connectivity`] that can be switched off and on.
#[derive(Debug, Clone)]
pub struct ToggleConnectivity {
    connected: Arc<AtomicBool>,
}

impl Default for ToggleConnectivity {
    fn default() -> Self {
        Self {
            connected: Arc::new(AtomicBool::new(true)),
        }
    }
}

impl ToggleConnectivity {
    /// Switch connectivity on or off.
    pub fn set(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }
}

impl Connectivity for ToggleConnectivity {
    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }
}

/// A private point as the engine would store it, for seeding stores.
#[must_use]
pub fn private_point(category_id: i64, name: &str) -> Point {
    Point::private(category_id, GeoPoint::new(34.35, 61.78)).with_name(name)
}
