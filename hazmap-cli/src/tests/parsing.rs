//! Command-line parsing for each subcommand.

use super::*;
use camino::Utf8PathBuf;
use rstest::rstest;

fn parse(args: &[&str]) -> Command {
    let invocation = std::iter::once("hazmap").chain(args.iter().copied());
    Cli::try_parse_from(invocation)
        .expect("arguments should parse")
        .command
}

#[rstest]
fn refresh_accepts_negative_coordinates() {
    let command = parse(&[
        "refresh",
        "--lat",
        "-33.8688",
        "--lon",
        "151.2093",
        "--force",
        "--base-url",
        "https://catalog.example/api",
    ]);

    match command {
        Command::Refresh(args) => {
            assert!((args.lat + 33.8688).abs() < f64::EPSILON);
            assert!((args.lon - 151.2093).abs() < f64::EPSILON);
            assert!(args.force);
            assert_eq!(
                args.engine.base_url.as_deref(),
                Some("https://catalog.example/api")
            );
        }
        other => panic!("expected refresh, found {other:?}"),
    }
}

#[rstest]
fn refresh_defaults_to_gated() {
    match parse(&["refresh", "--lat", "61.78", "--lon", "34.35"]) {
        Command::Refresh(args) => {
            assert!(!args.force);
            assert_eq!(args.engine.base_url, None);
        }
        other => panic!("expected refresh, found {other:?}"),
    }
}

#[rstest]
fn add_point_collects_the_report() {
    let command = parse(&[
        "add-point",
        "--category",
        "7",
        "--lat",
        "61.78",
        "--lon",
        "34.35",
        "--name",
        "Missing ramp",
        "--description",
        "Entrance has three steps",
        "--database",
        "/var/lib/hazmap/cache.db",
    ]);

    match command {
        Command::AddPoint(args) => {
            assert_eq!(args.category, 7);
            assert_eq!(args.name, "Missing ramp");
            assert_eq!(
                args.description.as_deref(),
                Some("Entrance has three steps")
            );
            assert_eq!(
                args.engine.database,
                Some(Utf8PathBuf::from("/var/lib/hazmap/cache.db"))
            );
        }
        other => panic!("expected add-point, found {other:?}"),
    }
}

#[rstest]
fn engine_settings_are_shared_by_every_subcommand() {
    match parse(&[
        "sync",
        "--token",
        "abc",
        "--refresh-interval-secs",
        "60",
        "--refresh-distance-m",
        "250.5",
    ]) {
        Command::Sync(args) => {
            assert_eq!(args.engine.token.as_deref(), Some("abc"));
            assert_eq!(args.engine.refresh_interval_secs, Some(60));
            assert_eq!(args.engine.refresh_distance_m, Some(250.5));
        }
        other => panic!("expected sync, found {other:?}"),
    }
    assert!(matches!(parse(&["status"]), Command::Status(_)));
}

#[rstest]
#[case::missing_coordinates(&["refresh", "--lat", "61.78"])]
#[case::missing_name(&["add-point", "--category", "1", "--lat", "1", "--lon", "1"])]
#[case::non_numeric_category(&[
    "add-point", "--category", "kerb", "--lat", "1", "--lon", "1", "--name", "x",
])]
#[case::unknown_subcommand(&["solve"])]
fn malformed_invocations_are_rejected(#[case] args: &[&str]) {
    let invocation = std::iter::once("hazmap").chain(args.iter().copied());
    let err = Cli::try_parse_from(invocation).expect_err("arguments should be rejected");
    assert!(
        matches!(CliError::from(err), CliError::ArgumentParsing(_)),
        "clap errors map to ArgumentParsing"
    );
}

#[rstest]
fn command_names_match_the_subcommands() {
    assert_eq!(parse(&["status"]).name(), "status");
    assert_eq!(
        parse(&["add-point", "--category", "1", "--lat", "1", "--lon", "1", "--name", "x"]).name(),
        "add-point"
    );
}
