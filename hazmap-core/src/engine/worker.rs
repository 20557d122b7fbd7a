//! Background task loop.
//!
//! One thread consumes [`Task`]s in submission order. Refresh tasks carry the
//! generation they were issued under; a task whose generation is no longer
//! current skips its remaining store writes.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender};
use geo::Point as GeoPoint;
use log::{debug, error, info, warn};
use parking_lot::Mutex;

use crate::{
    Clock, LocalStore, NotificationBus, Point, PointOrigin, PointsError, RemoteSource,
    SyncStatus, UploadQueue, Watermark,
};

/// Outcome of one catalog refresh.
#[derive(Debug, Clone, PartialEq)]
pub struct RefreshReport {
    /// Generation the refresh ran under.
    pub generation: u64,
    /// Location the points were requested around.
    pub location: GeoPoint<f64>,
    /// Disabilities received.
    pub disabilities: usize,
    /// Categories written to the store.
    pub categories: usize,
    /// Remote points written to the store.
    pub points: usize,
    /// Categories whose points could not be fetched.
    pub skipped_categories: Vec<i64>,
    /// Whether a newer refresh cut this one short.
    pub superseded: bool,
    /// Wall time spent.
    pub elapsed: Duration,
}

impl RefreshReport {
    const fn new(generation: u64, location: GeoPoint<f64>) -> Self {
        Self {
            generation,
            location,
            disabilities: 0,
            categories: 0,
            points: 0,
            skipped_categories: Vec::new(),
            superseded: false,
            elapsed: Duration::ZERO,
        }
    }
}

pub(super) enum Task {
    Refresh {
        generation: u64,
        location: GeoPoint<f64>,
    },
    Synchronize,
    Flush(Sender<()>),
}

/// State shared between the engine handle and its worker.
pub(super) struct Shared<S, R> {
    pub(super) store: Mutex<S>,
    pub(super) remote: R,
    pub(super) bus: NotificationBus,
    pub(super) clock: Arc<dyn Clock>,
    pub(super) refresh_generation: AtomicU64,
    pub(super) sync_in_flight: AtomicBool,
    pub(super) stopping: AtomicBool,
    pub(super) last_report: Mutex<Option<RefreshReport>>,
}

impl<S, R> Shared<S, R> {
    pub(super) fn new(store: S, remote: R, bus: NotificationBus, clock: Arc<dyn Clock>) -> Self {
        Self {
            store: Mutex::new(store),
            remote,
            bus,
            clock,
            refresh_generation: AtomicU64::new(0),
            sync_in_flight: AtomicBool::new(false),
            stopping: AtomicBool::new(false),
            last_report: Mutex::new(None),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        generation >= self.refresh_generation.load(Ordering::SeqCst)
    }

    fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }
}

pub(super) fn run<S, R>(shared: &Shared<S, R>, tasks: &Receiver<Task>)
where
    S: LocalStore,
    R: RemoteSource,
{
    debug!("sync worker started");
    for task in tasks {
        match task {
            Task::Refresh {
                generation,
                location,
            } => refresh(shared, generation, location),
            Task::Synchronize => synchronize(shared),
            Task::Flush(ack) => {
                if ack.send(()).is_err() {
                    debug!("flush requester went away");
                }
            }
        }
    }
    debug!("sync worker exiting");
}

fn synchronize<S, R>(shared: &Shared<S, R>)
where
    S: LocalStore,
    R: RemoteSource,
{
    if shared.is_stopping() {
        shared.sync_in_flight.store(false, Ordering::SeqCst);
        debug!("engine stopping; synchronization skipped");
        return;
    }
    let queue = UploadQueue::new(&shared.store, &shared.remote);
    let mut result = queue.drain_while(|| !shared.is_stopping());
    loop {
        shared.sync_in_flight.store(false, Ordering::SeqCst);
        // A point stored before the flag dropped found the drain in flight
        // and queued nothing, so look once more before going idle.
        let Ok(uploaded) = result else { break };
        let waiting = match shared.store.lock().load_pending_points() {
            Ok(pending) => !pending.is_empty(),
            Err(err) => {
                warn!("could not recheck the outbox: {err}");
                false
            }
        };
        if !waiting
            || shared.is_stopping()
            || shared.sync_in_flight.swap(true, Ordering::SeqCst)
        {
            break;
        }
        result = queue
            .drain_while(|| !shared.is_stopping())
            .map(|more| uploaded + more);
    }
    match result {
        Ok(0) => debug!("nothing to synchronize"),
        Ok(uploaded) => info!("synchronized {uploaded} point(s)"),
        Err(err) if err.is_retriable() => {
            warn!("synchronization interrupted, will retry on next trigger: {err}");
        }
        Err(err) => error!("synchronization failed: {err}"),
    }
}

fn refresh<S, R>(shared: &Shared<S, R>, generation: u64, location: GeoPoint<f64>)
where
    S: LocalStore,
    R: RemoteSource,
{
    if !shared.is_current(generation) {
        debug!("refresh #{generation} superseded before it started");
        return;
    }
    let started = Instant::now();
    let outcome = pull_catalog(shared, generation, location);
    if shared.is_stopping() {
        debug!("engine stopping; refresh #{generation} outcome discarded");
        return;
    }
    match outcome {
        Ok(mut report) => {
            report.elapsed = started.elapsed();
            info!(
                "refresh #{generation} stored {} point(s) across {} category(ies) in {:.2?}",
                report.points, report.categories, report.elapsed
            );
            if report.superseded {
                info!("refresh #{generation} was superseded and stopped early");
            }
            if !report.skipped_categories.is_empty() {
                warn!(
                    "refresh #{generation} skipped categories {:?}",
                    report.skipped_categories
                );
            }
            *shared.last_report.lock() = Some(report);
            shared.bus.notify_updated(true);
        }
        Err(err) => {
            error!("refresh #{generation} failed: {err}");
            shared.bus.notify_failed(err);
        }
    }
}

fn pull_catalog<S, R>(
    shared: &Shared<S, R>,
    generation: u64,
    location: GeoPoint<f64>,
) -> Result<RefreshReport, PointsError>
where
    S: LocalStore,
    R: RemoteSource,
{
    let mut report = RefreshReport::new(generation, location);
    // Recorded up front so a failing remote is not retried on every trigger.
    shared
        .store
        .lock()
        .commit_watermark(Watermark::new(shared.clock.now(), location))?;

    let disabilities = shared.remote.load_disabilities()?;
    if !shared.is_current(generation) {
        report.superseded = true;
        return Ok(report);
    }
    if !disabilities.is_empty() {
        shared.store.lock().set_disabilities(&disabilities)?;
    }
    report.disabilities = disabilities.len();

    let categories = shared.remote.load_categories()?;
    for category in &categories {
        if !shared.is_current(generation) {
            report.superseded = true;
            break;
        }
        shared.store.lock().insert_category(category)?;
        report.categories += 1;

        let points = match shared.remote.load_points(category, location) {
            Ok(points) => points,
            Err(err) => {
                let kind = if err.is_retriable() {
                    "transport"
                } else {
                    "protocol"
                };
                warn!(
                    "skipping category {} ({}): {kind} failure: {err}",
                    category.id,
                    category.kind()
                );
                report.skipped_categories.push(category.id);
                continue;
            }
        };
        if !shared.is_current(generation) {
            report.superseded = true;
            break;
        }
        let points: Vec<Point> = points
            .into_iter()
            .map(|point| Point {
                local_id: None,
                category_id: category.id,
                origin: PointOrigin::Remote,
                status: SyncStatus::Synchronized,
                ..point
            })
            .collect();
        shared
            .store
            .lock()
            .replace_remote_points(category.id, &points)?;
        report.points += points.len();
    }
    Ok(report)
}
