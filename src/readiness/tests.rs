use super::*;
use std::time::Duration;
use tokio::time::Instant;

fn coordinator(names: &[&str]) -> ReadinessCoordinator {
    ReadinessCoordinator::new(
        names.iter().map(|n| ExpectedDevice::new(*n)).collect(),
        Duration::from_secs(10),
    )
}

#[test]
fn test_begin_resets_and_emits_one_query_per_device() {
    let mut readiness = coordinator(&["t1", "t2", "t3"]);
    let now = Instant::now();

    let commands = readiness.begin(1, "ipsc", now);
    assert_eq!(commands.len(), 3);
    assert_eq!(commands[0].content["isFirst"], true);
    assert_eq!(commands[2].content["isLast"], true);
    assert!(readiness.is_outstanding());

    readiness.mark_ready("t1");
    readiness.begin(2, "ipsc", now);
    assert_eq!(readiness.state_of("t1"), Some(ReadinessState::Unknown));
    assert_eq!(readiness.progress().ready, 0);
}

#[test]
fn test_all_ready_completes_without_timeout() {
    let mut readiness = coordinator(&["t1", "t2"]);
    let now = Instant::now();
    readiness.begin(1, "ipsc", now);

    let first = readiness.mark_ready("t1").unwrap();
    assert_eq!(first, ReadinessProgress { ready: 1, total: 2 });
    assert!(!first.is_complete());

    let second = readiness.mark_ready("t2").unwrap();
    assert!(second.is_complete());
    assert!(!readiness.is_outstanding());

    assert_eq!(readiness.poll_timeout(now + Duration::from_secs(11)), None);
}

#[test]
fn test_timeout_reports_exactly_the_missing_device() {
    let mut readiness = coordinator(&["t1", "t2"]);
    let now = Instant::now();
    readiness.begin(1, "ipsc", now);
    readiness.mark_ready("t1");

    assert_eq!(readiness.poll_timeout(now + Duration::from_secs(9)), None);
    assert_eq!(
        readiness.poll_timeout(now + Duration::from_secs(10)),
        Some(vec!["t2".to_string()])
    );
    // The check is over, no second report
    assert_eq!(readiness.poll_timeout(now + Duration::from_secs(20)), None);
}

#[test]
fn test_restart_replaces_previous_deadline() {
    let mut readiness = coordinator(&["t1"]);
    let start = Instant::now();
    readiness.begin(1, "ipsc", start);

    let restart = start + Duration::from_secs(8);
    readiness.begin(1, "ipsc", restart);

    assert_eq!(readiness.poll_timeout(start + Duration::from_secs(10)), None);
    assert!(readiness
        .poll_timeout(restart + Duration::from_secs(10))
        .is_some());
}

#[test]
fn test_ignores_unknown_and_repeated_acks() {
    let mut readiness = coordinator(&["t1", "t2"]);
    assert_eq!(readiness.mark_ready("t1"), None);

    readiness.begin(1, "ipsc", Instant::now());
    assert!(readiness.mark_ready("t1").is_some());
    assert_eq!(readiness.mark_ready("t1"), None);
    assert_eq!(readiness.mark_ready("stranger"), None);
    assert_eq!(readiness.missing_devices(), vec!["t2".to_string()]);
}

#[test]
fn test_no_devices_passes_immediately() {
    let mut readiness = coordinator(&[]);
    let commands = readiness.begin(1, "ipsc", Instant::now());
    assert!(commands.is_empty());
    assert!(!readiness.is_outstanding());
    assert!(readiness.all_ready());
}
