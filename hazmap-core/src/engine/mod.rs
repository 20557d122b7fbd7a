//! The sync engine.
//!
//! [`SyncEngine`] owns one background worker thread and one notification
//! thread. Mutating calls enqueue work and return at once; reads run on the
//! caller's thread against the store and block for as long as the store
//! call takes.
//!
//! Work is ordered as submitted, with one exception: issuing a refresh
//! supersedes every earlier refresh. A superseded refresh that has not
//! started is dropped, and one that is running stops before its next store
//! write. Synchronization is at-most-one: while a drain is queued or
//! running, further calls are no-ops.

mod worker;

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Sender, TrySendError, bounded};
use geo::Point as GeoPoint;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::{
    AssumeConnected, Category, Clock, Connectivity, Credentials, Disability, EngineError,
    Listener, LocalStore, NotificationBus, Point, PointOrigin, RefreshGate, RemoteSource,
    StoreError, SyncStatus, SystemClock, Watermark,
};

pub use worker::RefreshReport;
use worker::{Shared, Task};

/// Name of the background worker thread.
pub const WORKER_THREAD_NAME: &str = "hazmap-sync";

/// Default number of tasks that may wait for the worker.
pub const DEFAULT_QUEUE_CAPACITY: usize = 64;

/// Collaborators and policy for a [`SyncEngine`].
///
/// The [`Credentials`] handed to the engine must be the same handle the
/// remote source reads its token from; clones share state.
#[derive(Clone)]
pub struct EngineOptions {
    gate: RefreshGate,
    clock: Arc<dyn Clock>,
    connectivity: Arc<dyn Connectivity>,
    credentials: Credentials,
    queue_capacity: usize,
    sync_on_start: bool,
}

impl fmt::Debug for EngineOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EngineOptions")
            .field("gate", &self.gate)
            .field("credentials", &self.credentials)
            .field("queue_capacity", &self.queue_capacity)
            .field("sync_on_start", &self.sync_on_start)
            .finish_non_exhaustive()
    }
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            gate: RefreshGate::default(),
            clock: Arc::new(SystemClock),
            connectivity: Arc::new(AssumeConnected),
            credentials: Credentials::default(),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sync_on_start: true,
        }
    }
}

impl EngineOptions {
    /// Use `gate` to decide when to refresh.
    #[must_use]
    pub const fn with_gate(mut self, gate: RefreshGate) -> Self {
        self.gate = gate;
        self
    }

    /// Read the time from `clock`.
    #[must_use]
    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Probe the network with `connectivity`.
    #[must_use]
    pub fn with_connectivity(mut self, connectivity: impl Connectivity + 'static) -> Self {
        self.connectivity = Arc::new(connectivity);
        self
    }

    /// Share `credentials` with the remote source.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Bound the task queue. Zero is treated as one.
    #[must_use]
    pub const fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Whether to drain the outbox as soon as the engine starts.
    #[must_use]
    pub const fn with_sync_on_start(mut self, sync_on_start: bool) -> Self {
        self.sync_on_start = sync_on_start;
        self
    }

    /// Credentials the engine will update on [`SyncEngine::set_token`].
    #[must_use]
    pub const fn credentials(&self) -> &Credentials {
        &self.credentials
    }
}

/// Coordinates refreshes, outbox drains and change notifications.
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
///
/// use geo::Point as GeoPoint;
/// use hazmap_core::test_support::{MemoryStore, Notification, RecordingListener, StubRemoteSource};
/// use hazmap_core::{Category, EngineOptions, Point, SyncEngine};
///
/// let remote = StubRemoteSource::with_categories(vec![Category::new(1, "Kerb")]);
/// remote.set_points(1, vec![Point::remote("k-1", 1, GeoPoint::new(34.35, 61.78))]);
///
/// let engine = SyncEngine::start(MemoryStore::default(), remote, EngineOptions::default())?;
/// let listener = Arc::new(RecordingListener::default());
/// engine.add_listener(listener.clone());
///
/// engine.refresh(GeoPoint::new(34.35, 61.78))?;
/// engine.flush()?;
///
/// assert_eq!(engine.points()?.len(), 1);
/// assert_eq!(listener.notifications(), vec![Notification::Updated { remote: true }]);
/// engine.shutdown()?;
/// # Ok::<(), hazmap_core::EngineError>(())
/// ```
pub struct SyncEngine<S, R>
where
    S: LocalStore + Send + 'static,
    R: RemoteSource + Send + Sync + 'static,
{
    shared: Arc<Shared<S, R>>,
    tasks: Option<Sender<Task>>,
    worker: Option<JoinHandle<()>>,
    gate: RefreshGate,
    connectivity: Arc<dyn Connectivity>,
    credentials: Credentials,
    queue_capacity: usize,
    last_location: Mutex<Option<GeoPoint<f64>>>,
    refresh_issue: Mutex<()>,
}

impl<S, R> fmt::Debug for SyncEngine<S, R>
where
    S: LocalStore + Send + 'static,
    R: RemoteSource + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncEngine")
            .field("running", &self.tasks.is_some())
            .field("gate", &self.gate)
            .field("last_location", &*self.last_location.lock())
            .finish_non_exhaustive()
    }
}

impl<S, R> SyncEngine<S, R>
where
    S: LocalStore + Send + 'static,
    R: RemoteSource + Send + Sync + 'static,
{
    /// Start the worker and notification threads.
    ///
    /// Unless disabled in `options`, a synchronization is queued straight
    /// away so points left pending by an earlier session are uploaded.
    pub fn start(store: S, remote: R, options: EngineOptions) -> Result<Self, EngineError> {
        let bus = NotificationBus::start()?;
        let shared = Arc::new(Shared::new(store, remote, bus, options.clock));
        let queue_capacity = options.queue_capacity.max(1);
        let (tasks, queue) = bounded(queue_capacity);
        let worker = thread::Builder::new()
            .name(WORKER_THREAD_NAME.to_owned())
            .spawn({
                let shared = Arc::clone(&shared);
                move || worker::run(&shared, &queue)
            })
            .map_err(|err| EngineError::Spawn {
                thread: WORKER_THREAD_NAME,
                message: err.to_string(),
            })?;

        let engine = Self {
            shared,
            tasks: Some(tasks),
            worker: Some(worker),
            gate: options.gate,
            connectivity: options.connectivity,
            credentials: options.credentials,
            queue_capacity,
            last_location: Mutex::new(None),
            refresh_issue: Mutex::new(()),
        };
        info!("sync engine started");
        if options.sync_on_start {
            engine.synchronize()?;
        }
        Ok(engine)
    }

    /// Register a listener. Returns `false` if it was already registered.
    pub fn add_listener(&self, listener: Arc<dyn Listener>) -> bool {
        self.shared.bus.add_listener(listener)
    }

    /// Unregister a listener. Returns `false` if it was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn Listener>) -> bool {
        self.shared.bus.remove_listener(listener)
    }

    /// Pull the remote catalog around `location`, superseding any earlier
    /// refresh.
    ///
    /// Listeners receive `on_data_updated(true)` on success, including
    /// partial success, and `on_data_update_failed` otherwise.
    ///
    /// A refresh rejected with [`EngineError::QueueFull`] supersedes nothing.
    pub fn refresh(&self, location: GeoPoint<f64>) -> Result<(), EngineError> {
        *self.last_location.lock() = Some(location);
        let _issuing = self.refresh_issue.lock();
        let generation = self.shared.refresh_generation.load(Ordering::SeqCst) + 1;
        debug!("queueing refresh #{generation}");
        self.submit(Task::Refresh {
            generation,
            location,
        })?;
        // Published only once queued; the worker treats a generation at or
        // above the counter as current.
        self.shared
            .refresh_generation
            .store(generation, Ordering::SeqCst);
        Ok(())
    }

    /// Refresh around the last known location. Returns `false` when no
    /// location is known yet.
    pub fn refresh_last_location(&self) -> Result<bool, EngineError> {
        let Some(location) = self.last_location() else {
            debug!("no known location; refresh skipped");
            return Ok(false);
        };
        self.refresh(location)?;
        Ok(true)
    }

    /// Record the device location and refresh if the gate opens. Returns
    /// whether a refresh was queued.
    pub fn set_location(&self, location: GeoPoint<f64>) -> Result<bool, EngineError> {
        *self.last_location.lock() = Some(location);
        self.refresh_if_needed()
    }

    /// Queue a refresh around the last known location when the gate opens.
    /// Returns whether a refresh was queued.
    ///
    /// Blocks while the watermark is read from the store.
    pub fn refresh_if_needed(&self) -> Result<bool, EngineError> {
        let Some(location) = self.last_location() else {
            return Ok(false);
        };
        let last = self.shared.store.lock().load_watermark()?;
        let now = self.shared.clock.now();
        if !self
            .gate
            .should_refresh(last, now, location, self.connectivity.is_connected())
        {
            debug!("refresh gate closed");
            return Ok(false);
        }
        self.refresh(location)?;
        Ok(true)
    }

    /// Upload pending points unless a drain is already queued or running.
    /// Returns whether a drain was queued.
    pub fn synchronize(&self) -> Result<bool, EngineError> {
        if self.shared.sync_in_flight.swap(true, Ordering::SeqCst) {
            debug!("synchronization already in flight");
            return Ok(false);
        }
        if let Err(err) = self.submit(Task::Synchronize) {
            self.shared.sync_in_flight.store(false, Ordering::SeqCst);
            return Err(err);
        }
        Ok(true)
    }

    /// Store a user-created point as private and pending, then queue a
    /// synchronization.
    ///
    /// Any identifiers or status on `point` are discarded. Blocks for the
    /// store insert. Only a failed insert is an error; a synchronization
    /// that cannot be queued is logged and the point stays in the outbox.
    pub fn add_point(&self, point: Point) -> Result<Point, EngineError> {
        let draft = Point {
            local_id: None,
            remote_id: None,
            origin: PointOrigin::Private,
            status: SyncStatus::Pending,
            ..point
        };
        let stored = self.shared.store.lock().insert_point(&draft)?;
        info!(
            "stored point {:?} in category {}",
            stored.local_id, stored.category_id
        );
        self.shared.bus.notify_updated(false);
        if let Err(err) = self.synchronize() {
            warn!("point {:?} stays pending: {err}", stored.local_id);
        }
        Ok(stored)
    }

    /// Insert or update a category.
    pub fn add_category(&self, category: &Category) -> Result<(), EngineError> {
        self.shared.store.lock().insert_category(category)?;
        self.shared.bus.notify_updated(false);
        Ok(())
    }

    /// Show or hide a category.
    pub fn set_category_state(&self, category_id: i64, active: bool) -> Result<(), EngineError> {
        self.shared
            .store
            .lock()
            .set_category_state(category_id, active)?;
        self.shared.bus.notify_updated(false);
        Ok(())
    }

    /// Turn a disability filter on or off.
    pub fn set_disability_state(
        &self,
        disability_id: i64,
        active: bool,
    ) -> Result<(), EngineError> {
        self.shared
            .store
            .lock()
            .set_disability_state(disability_id, active)?;
        self.shared.bus.notify_updated(false);
        Ok(())
    }

    /// Tell listeners once more that disability filters changed, after a
    /// batch of [`SyncEngine::set_disability_state`] calls.
    pub fn commit_disability_states(&self) {
        self.shared.bus.notify_updated(false);
    }

    /// Replace the access token. A new token triggers a synchronization and
    /// a refresh around the last known location; either one that cannot be
    /// queued is logged and left to the next trigger.
    pub fn set_token(&self, token: Option<String>) {
        self.credentials.set_token(token);
        if self.credentials.token().is_none() {
            info!("access token cleared");
            return;
        }
        info!("access token updated");
        if let Err(err) = self.synchronize() {
            warn!("synchronization after token change not queued: {err}");
        }
        if let Err(err) = self.refresh_last_location() {
            warn!("refresh after token change not queued: {err}");
        }
    }

    /// Block until every task submitted so far has finished and its
    /// notifications have been delivered.
    ///
    /// Must not be called from a listener callback.
    pub fn flush(&self) -> Result<(), EngineError> {
        let tasks = self.tasks.as_ref().ok_or(EngineError::WorkerUnavailable)?;
        let (ack, done) = bounded(1);
        tasks
            .send(Task::Flush(ack))
            .map_err(|_| EngineError::WorkerUnavailable)?;
        done.recv().map_err(|_| EngineError::WorkerUnavailable)?;
        self.shared.bus.flush();
        Ok(())
    }

    /// Cached categories, ordered by identifier.
    pub fn categories(&self) -> Result<Vec<Category>, StoreError> {
        self.shared.store.lock().load_categories()
    }

    /// Cached disabilities, ordered by identifier.
    pub fn disabilities(&self) -> Result<Vec<Disability>, StoreError> {
        self.shared.store.lock().load_disabilities()
    }

    /// Every cached point.
    pub fn points(&self) -> Result<Vec<Point>, StoreError> {
        self.shared.store.lock().load_points()
    }

    /// Points created on this device.
    pub fn private_points(&self) -> Result<Vec<Point>, StoreError> {
        self.shared.store.lock().load_private_points()
    }

    /// Points waiting for upload.
    pub fn pending_points(&self) -> Result<Vec<Point>, StoreError> {
        self.shared.store.lock().load_pending_points()
    }

    /// Last recorded refresh attempt.
    pub fn watermark(&self) -> Result<Option<Watermark>, StoreError> {
        self.shared.store.lock().load_watermark()
    }

    /// Last location passed to the engine.
    #[must_use]
    pub fn last_location(&self) -> Option<GeoPoint<f64>> {
        *self.last_location.lock()
    }

    /// Report of the most recent refresh that ran to completion or was
    /// superseded mid-way.
    #[must_use]
    pub fn last_refresh_report(&self) -> Option<RefreshReport> {
        self.shared.last_report.lock().clone()
    }

    /// Stop background work and close the store.
    ///
    /// A running refresh stops before its next store write and queued tasks
    /// are discarded. Notifications already emitted are still delivered.
    pub fn shutdown(mut self) -> Result<(), EngineError> {
        self.stop().map_err(EngineError::from)
    }

    fn submit(&self, task: Task) -> Result<(), EngineError> {
        let tasks = self.tasks.as_ref().ok_or(EngineError::WorkerUnavailable)?;
        tasks.try_send(task).map_err(|err| match err {
            TrySendError::Full(_) => EngineError::QueueFull {
                capacity: self.queue_capacity,
            },
            TrySendError::Disconnected(_) => EngineError::WorkerUnavailable,
        })
    }

    fn stop(&mut self) -> Result<(), StoreError> {
        let Some(tasks) = self.tasks.take() else {
            return Ok(());
        };
        self.shared.stopping.store(true, Ordering::SeqCst);
        self.shared.refresh_generation.fetch_add(1, Ordering::SeqCst);
        drop(tasks);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("sync worker panicked");
            }
        }
        let closed = self.shared.store.lock().close();
        self.shared.bus.shutdown();
        info!("sync engine stopped");
        closed
    }
}

impl<S, R> Drop for SyncEngine<S, R>
where
    S: LocalStore + Send + 'static,
    R: RemoteSource + Send + Sync + 'static,
{
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            error!("failed to close store: {err}");
        }
    }
}

#[cfg(test)]
mod tests;
