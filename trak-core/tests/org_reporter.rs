//! Delivery and retry behavior of the organization reporter against a local HTTP stub.

mod common;

use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use trak_core::config::OrgConfig;
use trak_core::report::OrgReporter;
use trak_core::{ChangeEntry, ChangeType, Session, SessionStatus};

fn reporter(url: &str, initial_backoff_ms: u64) -> OrgReporter {
    let config = OrgConfig {
        enabled: true,
        endpoint: Some(url.to_string()),
        token: Some("test-token".to_string()),
        developer_id: Some("dev@example.com".to_string()),
        developer_name: Some("Dev".to_string()),
        timeout_secs: 5,
        max_attempts: 3,
        initial_backoff_ms,
    };
    OrgReporter::new(&config).unwrap().expect("reporter is ready")
}

fn stopped_session() -> Session {
    let start = chrono::Utc::now() - chrono::Duration::minutes(12);
    let mut session = Session::new("1700000000000", PathBuf::from("/nonexistent/project"), start);
    session.status = SessionStatus::Stopped;
    session.end_time = Some(chrono::Utc::now());
    session.summary = Some("Refactored the parser.".to_string());
    session.changes.push(ChangeEntry {
        path: "src/parser.rs".to_string(),
        change_type: ChangeType::Modified,
        timestamp: chrono::Utc::now(),
        change_count: 2,
    });
    session
}

#[tokio::test]
async fn persistent_failure_makes_three_attempts_with_backoff() {
    let (url, hits) = common::status_server(vec![500]);
    let reporter = reporter(&url, 1000);
    let report = reporter.build_report(&stopped_session());

    let started = Instant::now();
    let outcome = reporter.send_with_outcome(&report).await;

    assert!(!outcome.delivered);
    assert_eq!(outcome.attempts, 3);
    assert_eq!(hits.load(Ordering::SeqCst), 3);
    // 1s before the second attempt, 2s before the third
    assert!(started.elapsed() >= Duration::from_secs(3));
}

#[tokio::test]
async fn recovers_after_one_failure() {
    let (url, hits) = common::status_server(vec![503, 201]);
    let reporter = reporter(&url, 10);
    let report = reporter.build_report(&stopped_session());

    let outcome = reporter.send_with_outcome(&report).await;
    assert!(outcome.delivered);
    assert_eq!(outcome.attempts, 2);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn success_needs_a_single_attempt() {
    let (url, hits) = common::status_server(vec![200]);
    let reporter = reporter(&url, 10);
    let report = reporter.build_report(&stopped_session());

    assert!(reporter.send(&report).await);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn send_reports_failure_as_false() {
    let (url, _hits) = common::status_server(vec![401]);
    let reporter = reporter(&url, 1);
    let report = reporter.build_report(&stopped_session());

    assert!(!reporter.send(&report).await);
}

#[test]
fn blocking_send_outside_a_runtime() {
    let (url, hits) = common::status_server(vec![200]);
    let reporter = reporter(&url, 10);
    let report = reporter.build_report(&stopped_session());

    assert!(reporter.send_blocking(&report));
    assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[test]
fn report_serializes_with_camel_case_fields() {
    let reporter = reporter("http://127.0.0.1:9", 10);
    let report = reporter.build_report(&stopped_session());
    let json = serde_json::to_value(&report).unwrap();

    assert_eq!(json["developerId"], "dev@example.com");
    assert_eq!(json["developerName"], "Dev");
    assert_eq!(json["sessionId"], "1700000000000");
    assert_eq!(json["duration"], "12m");
    assert_eq!(json["files"], 1);
    assert_eq!(json["qualityScore"], 0);
    assert_eq!(json["changes"][0]["type"], "modified");
    assert_eq!(json["changes"][0]["changeCount"], 2);
    assert!(json.get("repo").is_none());
}
