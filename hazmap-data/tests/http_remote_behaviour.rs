//! Behavioural tests for [`HttpRemoteSource`] against a local catalog service.

mod support;

use std::cell::RefCell;
use std::time::Duration;

use hazmap_core::{Category, CategoryKind, PointsError, RemoteSource};
use hazmap_data::{HttpRemoteSource, HttpRemoteSourceConfig};
use rstest::fixture;
use rstest_bdd_macros::{given, scenario, then, when};
use serde_json::json;
use support::CatalogServer;

const TIMEOUT: Duration = Duration::from_secs(1);

/// Fixture service and the outcome of the last request.
struct RemoteWorld {
    server: CatalogServer,
    result: RefCell<Option<Result<Vec<Category>, PointsError>>>,
}

impl RemoteWorld {
    fn outcome(&self) -> std::cell::Ref<'_, Result<Vec<Category>, PointsError>> {
        std::cell::Ref::map(self.result.borrow(), |result| {
            result.as_ref().expect("categories must have been requested")
        })
    }
}

#[fixture]
fn world() -> RemoteWorld {
    RemoteWorld {
        server: CatalogServer::start(),
        result: RefCell::new(None),
    }
}

// --- Given steps ---

#[given("a catalog service publishing kerb and stairs categories")]
fn publishing(#[from(world)] world: &RemoteWorld) {
    world.server.respond_json(
        "categories",
        &json!([
            {"id": 1, "name": "Kerb", "description": "Raised edge"},
            {"id": 2, "name": {"name": "Stairs", "name_ru": "Лестница"}}
        ]),
    );
}

#[given("a catalog service that is overloaded")]
fn overloaded(#[from(world)] world: &RemoteWorld) {
    world.server.respond("categories", 503, "try later");
}

#[given("a catalog service answering with malformed categories")]
fn malformed(#[from(world)] world: &RemoteWorld) {
    world
        .server
        .respond("categories", 200, r#"{"categories": "soon"}"#);
}

#[given("a catalog service that answers slowly")]
fn slow(#[from(world)] world: &RemoteWorld) {
    world
        .server
        .respond_after("categories", 200, "[]", TIMEOUT * 3);
}

// --- When steps ---

#[when("the categories are requested")]
fn request_categories(#[from(world)] world: &RemoteWorld) {
    let remote = HttpRemoteSource::with_config(
        HttpRemoteSourceConfig::new(world.server.base_url()).with_timeout(TIMEOUT),
    )
    .expect("source should build");
    *world.result.borrow_mut() = Some(remote.load_categories());
}

// --- Then steps ---

#[then("both categories arrive with their kinds")]
fn categories_arrive(#[from(world)] world: &RemoteWorld) {
    let outcome = world.outcome();
    let categories = outcome.as_ref().expect("expected categories");
    let kinds: Vec<_> = categories.iter().map(Category::kind).collect();
    assert_eq!(kinds, [CategoryKind::Curb, CategoryKind::Stairs]);
    assert_eq!(categories[0].description, "Raised edge");
    assert_eq!(categories[1].display_name("ru"), "Лестница");
}

#[then("a retriable rejection is reported")]
fn retriable_rejection(#[from(world)] world: &RemoteWorld) {
    let outcome = world.outcome();
    let err = outcome.as_ref().expect_err("expected a rejection");
    assert!(
        matches!(err, PointsError::Rejected { status: 503, .. }),
        "expected HTTP 503, got {err:?}"
    );
    assert!(err.is_retriable());
}

#[then("a protocol error is reported")]
fn protocol_error(#[from(world)] world: &RemoteWorld) {
    let outcome = world.outcome();
    let err = outcome.as_ref().expect_err("expected a protocol error");
    assert!(
        matches!(err, PointsError::Protocol { .. }),
        "expected Protocol, got {err:?}"
    );
    assert!(!err.is_retriable());
}

#[then("a timeout is reported")]
fn timeout(#[from(world)] world: &RemoteWorld) {
    let outcome = world.outcome();
    let err = outcome.as_ref().expect_err("expected a timeout");
    assert!(
        matches!(err, PointsError::Timeout { timeout_secs: 1, .. }),
        "expected Timeout, got {err:?}"
    );
}

// --- Scenario registrations ---

macro_rules! register_scenario {
    ($fn_name:ident, $title:literal) => {
        #[scenario(path = "tests/features/http_remote.feature", name = $title)]
        fn $fn_name(world: RemoteWorld) {
            let _ = world;
        }
    };
}

register_scenario!(loading_a_localized_catalog, "loading a localized catalog");
register_scenario!(reporting_an_overloaded_service, "reporting an overloaded service");
register_scenario!(reporting_a_malformed_catalog, "reporting a malformed catalog");
register_scenario!(giving_up_on_a_slow_service, "giving up on a slow service");
