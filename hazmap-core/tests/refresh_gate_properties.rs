//! Property-based tests for [`RefreshGate`].
//!
//! # Invariants tested
//!
//! - **Offline:** the gate never opens without connectivity.
//! - **First run:** with no watermark and a connection, the gate opens.
//! - **Quiet period:** staying put within the interval keeps it closed.
//! - **Monotonic time:** once open, waiting longer keeps it open.

use std::time::Duration;

use geo::Point as GeoPoint;
use hazmap_core::{RefreshGate, Watermark};
use proptest::prelude::*;

fn location_strategy() -> impl Strategy<Value = GeoPoint<f64>> {
    (-179.0_f64..179.0, -85.0_f64..85.0).prop_map(|(lon, lat)| GeoPoint::new(lon, lat))
}

fn gate_strategy() -> impl Strategy<Value = RefreshGate> {
    (1_u64..86_400, 1.0_f64..50_000.0)
        .prop_map(|(secs, metres)| RefreshGate::new(Duration::from_secs(secs), metres))
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn offline_never_refreshes(
        gate in gate_strategy(),
        last in proptest::option::of((0_i64..2_000_000_000, location_strategy())),
        now in 0_i64..4_000_000_000,
        current in location_strategy(),
    ) {
        let last = last.map(|(timestamp, location)| Watermark::new(timestamp, location));
        prop_assert!(!gate.should_refresh(last, now, current, false));
    }

    #[test]
    fn first_run_always_refreshes(
        gate in gate_strategy(),
        now in any::<i64>(),
        current in location_strategy(),
    ) {
        prop_assert!(gate.should_refresh(None, now, current, true));
    }

    #[test]
    fn staying_put_within_interval_does_not_refresh(
        gate in gate_strategy(),
        timestamp in 0_i64..2_000_000_000,
        permille in 0_i64..=1_000,
        location in location_strategy(),
    ) {
        let interval = i64::try_from(gate.interval().as_secs()).expect("interval fits in i64");
        let waited = interval * permille / 1_000;
        let last = Watermark::new(timestamp, location);
        prop_assert!(!gate.should_refresh(Some(last), timestamp + waited, location, true));
    }

    #[test]
    fn waiting_longer_never_closes_the_gate(
        gate in gate_strategy(),
        timestamp in 0_i64..2_000_000_000,
        first_wait in 0_i64..200_000,
        extra_wait in 0_i64..200_000,
        last_location in location_strategy(),
        current in location_strategy(),
    ) {
        let last = Some(Watermark::new(timestamp, last_location));
        let early = timestamp + first_wait;
        if gate.should_refresh(last, early, current, true) {
            prop_assert!(gate.should_refresh(last, early + extra_wait, current, true));
        }
    }
}
