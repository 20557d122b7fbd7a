//! Unit tests for the sync engine.

use std::time::Duration;

use rstest::{fixture, rstest};

use super::*;
use crate::test_support::{
    HoldSite, ManualClock, MemoryStore, Notification, RecordingListener, StubRemoteSource,
    ToggleConnectivity, private_point,
};
use crate::{NOTIFY_THREAD_NAME, PointsError};

const HOLD_TIMEOUT: Duration = Duration::from_secs(5);

type TestEngine = SyncEngine<MemoryStore, StubRemoteSource>;

fn here() -> GeoPoint<f64> {
    GeoPoint::new(34.3469, 61.7849)
}

fn transport_error() -> PointsError {
    PointsError::Transport {
        url: "http://example.com/points".into(),
        message: "connection reset".into(),
    }
}

fn remote_ids(points: &[Point]) -> Vec<String> {
    let mut ids: Vec<String> = points.iter().filter_map(|p| p.remote_id.clone()).collect();
    ids.sort();
    ids
}

struct Harness {
    engine: TestEngine,
    store: MemoryStore,
    remote: StubRemoteSource,
    listener: Arc<RecordingListener>,
}

fn harness_with(store: MemoryStore, remote: StubRemoteSource, options: EngineOptions) -> Harness {
    let engine =
        SyncEngine::start(store.clone(), remote.clone(), options).expect("start engine");
    let listener = Arc::new(RecordingListener::default());
    engine.add_listener(listener.clone());
    Harness {
        engine,
        store,
        remote,
        listener,
    }
}

#[fixture]
fn catalog() -> StubRemoteSource {
    let remote = StubRemoteSource::with_categories(vec![
        Category::new(1, "Kerb"),
        Category::new(2, "Stairs"),
    ]);
    remote.set_disabilities(vec![Disability::new(1, "Wheelchair")]);
    remote.set_points(1, vec![Point::remote("k-1", 1, here())]);
    remote.set_points(2, vec![Point::remote("s-1", 2, here())]);
    remote
}

#[fixture]
fn quiet_options() -> EngineOptions {
    EngineOptions::default().with_sync_on_start(false)
}

#[rstest]
fn refresh_skips_failing_categories(catalog: StubRemoteSource, quiet_options: EngineOptions) {
    catalog.set_points(
        1,
        ["k-1", "k-2", "k-3"]
            .into_iter()
            .map(|id| Point::remote(id, 1, here()))
            .collect(),
    );
    catalog.fail_points(2, transport_error());
    let h = harness_with(MemoryStore::default(), catalog, quiet_options);

    h.engine.refresh(here()).expect("queue refresh");
    h.engine.flush().expect("flush");

    assert_eq!(
        remote_ids(&h.engine.points().expect("points")),
        vec!["k-1", "k-2", "k-3"]
    );
    assert_eq!(h.engine.categories().expect("categories").len(), 2);
    assert_eq!(h.engine.disabilities().expect("disabilities").len(), 1);
    assert_eq!(
        h.listener.notifications(),
        vec![Notification::Updated { remote: true }]
    );
    assert_eq!(h.listener.thread_names(), vec![NOTIFY_THREAD_NAME.to_owned()]);

    let report = h.engine.last_refresh_report().expect("report");
    assert_eq!(report.skipped_categories, vec![2]);
    assert_eq!(report.points, 3);
    assert!(!report.superseded);
}

#[rstest]
fn category_failure_is_reported_to_listeners(
    catalog: StubRemoteSource,
    quiet_options: EngineOptions,
) {
    catalog.fail_categories(PointsError::Protocol {
        message: "expected a list".into(),
    });
    let h = harness_with(MemoryStore::default(), catalog, quiet_options);

    h.engine.refresh(here()).expect("queue refresh");
    h.engine.flush().expect("flush");

    assert_eq!(
        h.listener.notifications(),
        vec![Notification::Failed("unusable response: expected a list".into())]
    );
    assert!(h.engine.points().expect("points").is_empty());
    assert!(
        h.engine.watermark().expect("watermark").is_some(),
        "watermark is recorded before the remote is contacted"
    );
}

#[rstest]
fn newer_refresh_wins_for_shared_categories(
    catalog: StubRemoteSource,
    quiet_options: EngineOptions,
) {
    let h = harness_with(MemoryStore::default(), catalog, quiet_options);
    h.remote.hold(HoldSite::Points(2));

    h.engine.refresh(here()).expect("first refresh");
    assert!(h.remote.wait_until_held(HOLD_TIMEOUT));

    h.remote.set_points(1, vec![Point::remote("k-2", 1, here())]);
    h.remote.set_points(2, vec![Point::remote("s-2", 2, here())]);
    h.engine.refresh(here()).expect("second refresh");
    h.remote.release();
    h.engine.flush().expect("flush");

    assert_eq!(
        remote_ids(&h.engine.points().expect("points")),
        vec!["k-2", "s-2"]
    );
    assert_eq!(
        h.listener.notifications(),
        vec![
            Notification::Updated { remote: true },
            Notification::Updated { remote: true },
        ]
    );
    let report = h.engine.last_refresh_report().expect("report");
    assert_eq!(report.generation, 2);
    assert!(!report.superseded);
}

#[rstest]
fn queued_refreshes_collapse_to_the_latest(
    catalog: StubRemoteSource,
    quiet_options: EngineOptions,
) {
    let h = harness_with(MemoryStore::default(), catalog, quiet_options);
    h.remote.hold(HoldSite::Points(1));

    h.engine.refresh(here()).expect("first refresh");
    assert!(h.remote.wait_until_held(HOLD_TIMEOUT));
    h.engine.refresh(here()).expect("second refresh");
    h.engine.refresh(here()).expect("third refresh");
    h.remote.release();
    h.engine.flush().expect("flush");

    assert_eq!(h.remote.category_requests(), 2, "the second refresh never ran");
    assert_eq!(
        h.engine.last_refresh_report().map(|report| report.generation),
        Some(3)
    );
}

#[rstest]
fn synchronize_runs_at_most_once(quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), quiet_options);
    h.remote.hold(HoldSite::Upload);

    h.engine
        .add_point(private_point(1, "Broken ramp"))
        .expect("add point");
    assert!(h.remote.wait_until_held(HOLD_TIMEOUT));
    assert!(!h.engine.synchronize().expect("second synchronize"));

    h.remote.release();
    h.engine.flush().expect("flush");

    assert_eq!(h.remote.upload_attempts().len(), 1);
    assert!(h.engine.pending_points().expect("pending").is_empty());
    assert!(h.engine.synchronize().expect("idle synchronize"));
}

#[rstest]
fn added_points_are_private_and_uploaded(quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), quiet_options);
    let draft = Point {
        remote_id: Some("spoofed".into()),
        ..Point::remote("ignored", 3, here()).with_name("Steep slope")
    };

    let stored = h.engine.add_point(draft).expect("add point");
    assert_eq!(stored.origin, PointOrigin::Private);
    assert_eq!(stored.status, SyncStatus::Pending);
    assert_eq!(stored.remote_id, None);

    h.engine.flush().expect("flush");
    let private = h.engine.private_points().expect("private points");
    let [point] = private.as_slice() else {
        panic!("expected one private point, found {private:?}");
    };
    assert_eq!(point.remote_id.as_deref(), Some("uploaded-1"));
    assert_eq!(point.status, SyncStatus::Synchronized);
    assert_eq!(
        h.listener.notifications(),
        vec![Notification::Updated { remote: false }]
    );
}

#[rstest]
fn failed_upload_keeps_point_pending(quiet_options: EngineOptions) {
    let remote = StubRemoteSource::default();
    remote.fail_upload_at(1, transport_error());
    let h = harness_with(MemoryStore::default(), remote, quiet_options);

    h.engine
        .add_point(private_point(1, "Gate"))
        .expect("add point");
    h.engine.flush().expect("flush");
    assert_eq!(h.engine.pending_points().expect("pending").len(), 1);

    assert!(h.engine.synchronize().expect("retry"));
    h.engine.flush().expect("flush");
    assert!(h.engine.pending_points().expect("pending").is_empty());
}

#[rstest]
fn startup_drains_points_left_pending() {
    let mut store = MemoryStore::default();
    store
        .insert_point(&private_point(1, "left over"))
        .expect("seed pending point");

    let h = harness_with(store, StubRemoteSource::default(), EngineOptions::default());
    h.engine.flush().expect("flush");

    assert!(h.store.load_pending_points().expect("pending").is_empty());
    assert_eq!(h.remote.upload_attempts(), vec![Some(1)]);
}

#[rstest]
fn location_updates_follow_the_gate(catalog: StubRemoteSource) {
    let clock = ManualClock::at(10_000);
    let connectivity = ToggleConnectivity::default();
    let options = EngineOptions::default()
        .with_sync_on_start(false)
        .with_clock(clock.clone())
        .with_connectivity(connectivity.clone());
    let h = harness_with(MemoryStore::default(), catalog, options);

    assert!(h.engine.set_location(here()).expect("first fix"));
    h.engine.flush().expect("flush");
    assert_eq!(
        h.engine.watermark().expect("watermark"),
        Some(Watermark::new(10_000, here()))
    );

    assert!(!h.engine.set_location(here()).expect("same place"));
    clock.advance(3_601);
    connectivity.set(false);
    assert!(!h.engine.set_location(here()).expect("offline"));
    connectivity.set(true);
    assert!(h.engine.set_location(here()).expect("interval elapsed"));
    h.engine.flush().expect("flush");
    assert_eq!(h.remote.category_requests(), 2);
}

#[rstest]
fn without_a_location_nothing_refreshes(quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), quiet_options);
    assert!(!h.engine.refresh_if_needed().expect("gate check"));
    assert!(!h.engine.refresh_last_location().expect("refresh"));
    h.engine.flush().expect("flush");
    assert_eq!(h.remote.category_requests(), 0);
}

#[rstest]
fn new_token_synchronizes_and_refreshes(catalog: StubRemoteSource) {
    let credentials = Credentials::default();
    let options = EngineOptions::default()
        .with_sync_on_start(false)
        .with_credentials(credentials.clone());
    let h = harness_with(MemoryStore::default(), catalog, options);
    h.engine.refresh(here()).expect("initial refresh");
    h.engine.flush().expect("flush");

    h.engine.set_token(None);
    h.engine.flush().expect("flush");
    assert_eq!(h.remote.category_requests(), 1);

    h.engine.set_token(Some("secret".into()));
    h.engine.flush().expect("flush");
    assert_eq!(credentials.token().as_deref(), Some("secret"));
    assert_eq!(h.remote.category_requests(), 2);
}

#[rstest]
fn filter_changes_notify_locally(quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), quiet_options);
    h.engine
        .add_category(&Category::new(5, "Gate"))
        .expect("add category");
    h.engine.set_category_state(5, false).expect("hide category");
    h.store
        .clone()
        .set_disabilities(&[Disability::new(1, "Blind")])
        .expect("seed disabilities");
    h.engine
        .set_disability_state(1, false)
        .expect("toggle disability");
    h.engine.flush().expect("flush");
    assert_eq!(
        h.listener.notifications(),
        vec![Notification::Updated { remote: false }; 3]
    );
    assert!(!h.engine.disabilities().expect("disabilities")[0].active);

    h.engine.commit_disability_states();
    h.engine.flush().expect("flush");
    assert_eq!(h.listener.notifications().len(), 4);
    assert!(!h.engine.categories().expect("categories")[0].active);
    assert!(matches!(
        h.engine.set_category_state(99, true),
        Err(EngineError::Store(StoreError::UnknownCategory { id: 99 }))
    ));
}

#[rstest]
fn full_queue_is_reported(quiet_options: EngineOptions) {
    let options = quiet_options.with_queue_capacity(1);
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), options);
    h.remote.hold(HoldSite::Upload);
    h.engine
        .add_point(private_point(1, "Stairs"))
        .expect("add point");
    assert!(h.remote.wait_until_held(HOLD_TIMEOUT));

    h.engine.refresh(here()).expect("fills the queue");
    assert!(matches!(
        h.engine.refresh(here()),
        Err(EngineError::QueueFull { capacity: 1 })
    ));
    h.remote.release();
    h.engine.flush().expect("flush");
}

#[rstest]
fn rejected_refresh_leaves_the_queued_one_in_charge(
    catalog: StubRemoteSource,
    quiet_options: EngineOptions,
) {
    let h = harness_with(MemoryStore::default(), catalog, quiet_options.with_queue_capacity(1));
    h.remote.hold(HoldSite::Points(1));
    h.engine.refresh(here()).expect("first refresh");
    assert!(h.remote.wait_until_held(HOLD_TIMEOUT));

    h.engine.refresh(here()).expect("second refresh is queued");
    assert!(matches!(
        h.engine.refresh(here()),
        Err(EngineError::QueueFull { capacity: 1 })
    ));
    h.remote.release();
    h.engine.flush().expect("flush");

    assert_eq!(h.remote.category_requests(), 2, "the queued refresh ran");
    let report = h.engine.last_refresh_report().expect("report");
    assert_eq!(report.generation, 2);
    assert!(!report.superseded);
    assert_eq!(
        remote_ids(&h.engine.points().expect("points")),
        vec!["k-1", "s-1"]
    );
    assert_eq!(
        h.listener.notifications(),
        vec![Notification::Updated { remote: true }; 2]
    );
}

#[rstest]
fn stored_point_survives_a_full_queue(catalog: StubRemoteSource, quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), catalog, quiet_options.with_queue_capacity(1));
    h.remote.hold(HoldSite::Points(1));
    h.engine.refresh(here()).expect("first refresh");
    assert!(h.remote.wait_until_held(HOLD_TIMEOUT));
    h.engine.refresh(here()).expect("fills the queue");

    let stored = h
        .engine
        .add_point(private_point(1, "Broken kerb"))
        .expect("a stored point is not an error");
    assert_eq!(stored.status, SyncStatus::Pending);
    assert_eq!(h.engine.private_points().expect("private").len(), 1);

    h.remote.release();
    h.engine.flush().expect("flush");
    assert!(h.remote.upload_attempts().is_empty());
    assert!(h.engine.synchronize().expect("retry"));
    h.engine.flush().expect("flush");
    assert!(h.engine.pending_points().expect("pending").is_empty());
    assert_eq!(h.engine.private_points().expect("private").len(), 1);
}

#[rstest]
fn points_added_during_a_drain_are_uploaded_by_it(quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), quiet_options);
    h.remote.hold(HoldSite::Upload);
    h.engine
        .add_point(private_point(1, "first"))
        .expect("add first point");
    assert!(h.remote.wait_until_held(HOLD_TIMEOUT));

    h.engine
        .add_point(private_point(2, "second"))
        .expect("add second point");
    h.remote.release();
    h.engine.flush().expect("flush");

    assert_eq!(h.remote.upload_attempts(), vec![Some(1), Some(2)]);
    assert!(h.engine.pending_points().expect("pending").is_empty());
}

#[rstest]
fn shutdown_closes_the_store(quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), quiet_options);
    h.engine.shutdown().expect("shutdown");
    assert!(h.store.is_closed());
}

#[rstest]
fn dropping_the_engine_closes_the_store(quiet_options: EngineOptions) {
    let store = MemoryStore::default();
    drop(
        SyncEngine::start(store.clone(), StubRemoteSource::default(), quiet_options)
            .expect("start engine"),
    );
    assert!(store.is_closed());
}

#[rstest]
fn removed_listeners_hear_nothing(quiet_options: EngineOptions) {
    let h = harness_with(MemoryStore::default(), StubRemoteSource::default(), quiet_options);
    let handle: Arc<dyn Listener> = h.listener.clone();
    assert!(h.engine.remove_listener(&handle));
    h.engine
        .add_category(&Category::new(1, "Kerb"))
        .expect("add category");
    h.engine.flush().expect("flush");
    assert!(h.listener.notifications().is_empty());
}
