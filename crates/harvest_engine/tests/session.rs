mod common;

use std::fs;
use std::sync::Arc;

use common::{init_logging, maps_fixture, place, FlakyNavigation, ScriptedDriver};
use harvest_core::{EscalationPolicy, FieldKey, FieldValue, Record, StopReason};
use harvest_engine::{
    DriverFailure, HarvestConfig, HarvestError, HarvestSession, HtmlSnapshotDriver,
    JsonProgressWriter, SessionConfig, SessionHooks, SessionOutcome, SiteProfile,
};
use pretty_assertions::assert_eq;
use serde_json::Value;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const QUERY: &str = "coffee shops";

#[tokio::test(start_paused = true)]
async fn end_to_end_keeps_only_useful_records() {
    init_logging();
    let driver = Arc::new(maps_fixture(QUERY));
    let session = HarvestSession::new(SessionConfig::default());

    let report = session
        .run(Arc::clone(&driver), QUERY, 5, CancellationToken::new())
        .await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert!(driver.is_closed());

    let discovery = report.discovery.unwrap();
    assert_eq!(discovery.stop_reason, StopReason::TargetReached);
    assert_eq!(discovery.added, 5);
    assert_eq!(discovery.iterations, 2);

    assert_eq!(report.counters.attempted, 5);
    assert_eq!(report.counters.succeeded, 3);
    assert_eq!(report.counters.failed, 2);
    assert_eq!(report.counters.contacts_found, 3);

    let names: Vec<&str> = report.records.iter().filter_map(Record::name).collect();
    assert_eq!(names, vec!["Cafe 1", "Cafe 3", "Cafe 5"]);

    let first = &report.records[0];
    assert_eq!(first.get(FieldKey::SourceReference), &FieldValue::text(place(1)));
    assert_eq!(first.get(FieldKey::QueryContext), &FieldValue::text(QUERY));
    assert_eq!(first.get(FieldKey::Address), &FieldValue::text("1 Main Street, Pune"));
    assert_eq!(first.get(FieldKey::Rating), &FieldValue::Float(4.1));
    assert_eq!(first.get(FieldKey::ReviewCount), &FieldValue::Integer(123));
    assert_eq!(first.get(FieldKey::Category), &FieldValue::text("Coffee shop"));
    assert_eq!(
        first.get(FieldKey::Website),
        &FieldValue::text("https://cafe-1.example/")
    );
    assert_eq!(first.get(FieldKey::Phone), &FieldValue::text("+919876543201"));
    assert!(first.get(FieldKey::Email).is_absent());
    assert!(first.get(FieldKey::Hours).is_absent());
}

#[tokio::test(start_paused = true)]
async fn progress_writer_persists_records_as_json() {
    init_logging();
    let temp = TempDir::new().unwrap();
    let driver = Arc::new(maps_fixture(QUERY));
    let writer = Arc::new(JsonProgressWriter::new(temp.path().to_path_buf(), "records.json"));
    let session = HarvestSession::new(SessionConfig::default()).with_hooks(writer);

    let report = session.run(driver, QUERY, 5, CancellationToken::new()).await;
    assert_eq!(report.records.len(), 3);

    let text = fs::read_to_string(temp.path().join("records.json")).unwrap();
    let saved: Vec<Value> = serde_json::from_str(&text).unwrap();
    assert_eq!(saved.len(), 3);
    assert_eq!(saved[2]["name"], Value::from("Cafe 5"));
    assert_eq!(saved[2]["phone"], Value::from("+919876543205"));
    assert_eq!(saved[2]["email"], Value::Null);
}

struct CancelAfterFirstRecord {
    cancel: CancellationToken,
}

impl SessionHooks for CancelAfterFirstRecord {
    fn after_record(&self, _record: &Record, _all: &[Record]) -> Result<(), HarvestError> {
        self.cancel.cancel();
        Ok(())
    }
}

#[tokio::test(start_paused = true)]
async fn cancellation_returns_partial_results_and_closes_driver() {
    init_logging();
    let cancel = CancellationToken::new();
    let driver = Arc::new(maps_fixture(QUERY));
    let session = HarvestSession::new(SessionConfig::default()).with_hooks(Arc::new(
        CancelAfterFirstRecord {
            cancel: cancel.clone(),
        },
    ));

    let report = session.run(Arc::clone(&driver), QUERY, 5, cancel).await;

    assert_eq!(report.outcome, SessionOutcome::Cancelled);
    assert_eq!(report.records.len(), 1);
    assert_eq!(report.counters.attempted, 1);
    assert!(driver.is_closed());
}

#[tokio::test(start_paused = true)]
async fn failed_search_navigation_aborts_with_empty_report() {
    init_logging();
    let driver = Arc::new(HtmlSnapshotDriver::new());
    let session = HarvestSession::new(SessionConfig::default());

    let report = session
        .run(Arc::clone(&driver), QUERY, 5, CancellationToken::new())
        .await;

    assert!(matches!(report.outcome, SessionOutcome::Aborted(_)));
    assert!(report.records.is_empty());
    assert!(report.discovery.is_none());
    assert_eq!(report.counters.attempted, 0);
    assert!(driver.is_closed());
}

#[tokio::test(start_paused = true)]
async fn panicking_driver_is_contained_and_closed() {
    init_logging();
    let driver = ScriptedDriver::panicking();
    let session = HarvestSession::new(SessionConfig::default());

    let report = session
        .run(driver.clone(), QUERY, 5, CancellationToken::new())
        .await;

    match report.outcome {
        SessionOutcome::Aborted(reason) => assert!(reason.contains("scripted driver exploded")),
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(driver.is_closed());
}

#[tokio::test(start_paused = true)]
async fn query_variations_run_while_below_min_results() {
    init_logging();
    let driver = ScriptedDriver::new(vec![vec![place(1), place(2)]]);
    let config = SessionConfig {
        min_results: 4,
        harvest: HarvestConfig {
            escalation: EscalationPolicy {
                patience: 2,
                ..EscalationPolicy::default()
            },
            ..HarvestConfig::default()
        },
        ..SessionConfig::default()
    };
    let session = HarvestSession::new(config);

    let report = session
        .run(driver.clone(), "coffee", 5, CancellationToken::new())
        .await;

    let profile = SiteProfile::maps();
    let searches: Vec<String> = ["coffee", "coffee near me", "best coffee", "top rated coffee"]
        .into_iter()
        .map(|query| profile.search_url(query))
        .collect();
    let navigations = driver.navigations();
    assert_eq!(navigations[..4].to_vec(), searches);
    assert_eq!(navigations[4..].to_vec(), vec![place(1), place(2)]);

    // The scripted detail views carry no names.
    assert_eq!(report.counters.attempted, 2);
    assert_eq!(report.counters.failed, 2);
    assert!(report.records.is_empty());
    assert_eq!(report.outcome, SessionOutcome::Completed);
}

#[tokio::test(start_paused = true)]
async fn zero_target_does_nothing() {
    init_logging();
    let driver = ScriptedDriver::growing(3);
    let session = HarvestSession::new(SessionConfig::default());

    let report = session
        .run(driver.clone(), QUERY, 0, CancellationToken::new())
        .await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert!(driver.navigations().is_empty());
    assert!(driver.is_closed());
}

#[tokio::test(start_paused = true)]
async fn transient_detail_navigation_is_retried() {
    init_logging();
    let driver = Arc::new(
        FlakyNavigation::new(maps_fixture(QUERY)).fail(&place(1), DriverFailure::Timeout, 2),
    );
    let session = HarvestSession::new(SessionConfig::default());

    let report = session
        .run(Arc::clone(&driver), QUERY, 5, CancellationToken::new())
        .await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(driver.attempts_for(&place(1)), 3);
    let names: Vec<&str> = report.records.iter().filter_map(Record::name).collect();
    assert_eq!(names, vec!["Cafe 1", "Cafe 3", "Cafe 5"]);
    assert_eq!(report.counters.failed, 2);
}

#[tokio::test(start_paused = true)]
async fn detail_navigation_gives_up_after_retries() {
    init_logging();
    let driver = Arc::new(
        FlakyNavigation::new(maps_fixture(QUERY)).fail(&place(1), DriverFailure::Timeout, 3),
    );
    let session = HarvestSession::new(SessionConfig::default());

    let report = session
        .run(Arc::clone(&driver), QUERY, 5, CancellationToken::new())
        .await;

    assert_eq!(report.outcome, SessionOutcome::Completed);
    assert_eq!(driver.attempts_for(&place(1)), 3);
    let names: Vec<&str> = report.records.iter().filter_map(Record::name).collect();
    assert_eq!(names, vec!["Cafe 3", "Cafe 5"]);
    assert_eq!(report.counters.attempted, 5);
    assert_eq!(report.counters.failed, 3);
}

#[tokio::test(start_paused = true)]
async fn fatal_error_during_extraction_keeps_collected_records() {
    init_logging();
    let driver = Arc::new(
        FlakyNavigation::new(maps_fixture(QUERY)).fail(&place(3), DriverFailure::SessionClosed, 1),
    );
    let session = HarvestSession::new(SessionConfig::default());

    let report = session
        .run(Arc::clone(&driver), QUERY, 5, CancellationToken::new())
        .await;

    assert!(matches!(report.outcome, SessionOutcome::Aborted(_)));
    let names: Vec<&str> = report.records.iter().filter_map(Record::name).collect();
    assert_eq!(names, vec!["Cafe 1"]);
    assert_eq!(report.counters.attempted, 3);
    assert_eq!(report.counters.succeeded, 1);
    assert_eq!(report.counters.failed, 2);
    assert_eq!(driver.attempts_for(&place(3)), 1);
    assert_eq!(driver.attempts_for(&place(4)), 0);
    assert!(driver.inner().is_closed());
}
