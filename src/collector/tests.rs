use super::*;
use chrono::Utc;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::Instant;

fn shot(hit_area: &str, time_offset: f64) -> Value {
    json!({ "content": { "cmd": "shot", "ha": hit_area, "hp": { "x": 10.0, "y": 20.0 }, "tt": "ipsc", "td": time_offset } })
}

fn open_collector(repeat: u32) -> (ShotCollector, Instant) {
    let mut collector = ShotCollector::new();
    let beep_at = Instant::now();
    collector.begin_window(repeat, beep_at, Utc::now());
    (collector, beep_at)
}

#[test]
fn test_shot_decoding_accepts_all_key_spellings() {
    let long = json!({ "hit_area": "azone", "hit_position": { "x": 1.0, "y": 2.0 }, "target_type": "ipsc", "time_diff": 0.4, "repeat": 1 });
    let camel = json!({ "hitArea": "azone", "targetType": "ipsc", "timeDiff": 0.4 });
    let short = json!({ "ha": "azone", "hp": { "x": 1.0, "y": 2.0 }, "tt": "ipsc", "td": 0.4, "rep": 1 });

    let (a, repeat_a) = ShotEvent::decode(Some("t1"), &long, 0.5).unwrap();
    let (b, repeat_b) = ShotEvent::decode(Some("t1"), &camel, 0.5).unwrap();
    let (c, _) = ShotEvent::decode(Some("t1"), &short, 0.5).unwrap();

    assert_eq!(a.hit_area, "azone");
    assert_eq!(a.hit_position, HitPosition { x: 1.0, y: 2.0 });
    assert_eq!(repeat_a, Some(1));
    assert_eq!(repeat_b, None);
    assert_eq!(b.time_offset, 0.4);
    assert_eq!(c.target_type, "ipsc");
}

#[test]
fn test_shot_decoding_falls_back_to_payload_device() {
    let raw = json!({ "target": "t9", "content": { "ha": "czone", "td": 1.0 } });
    let (event, _) = ShotEvent::decode(None, &raw, 1.1).unwrap();
    assert_eq!(event.device, "t9");

    let orphan = json!({ "content": { "ha": "czone", "td": 1.0 } });
    assert!(ShotEvent::decode(None, &orphan, 1.1).is_err());
}

#[test]
fn test_accepts_shots_in_open_window() {
    let (mut collector, beep_at) = open_collector(1);

    let outcome = collector.ingest(Some("t1"), &shot("azone", 0.30), beep_at + Duration::from_millis(350));
    match outcome {
        IngestOutcome::Accepted(event) => {
            assert_eq!(event.device, "t1");
            assert!((event.arrival_offset - 0.35).abs() < 1e-9);
        }
        other => panic!("Unexpected outcome: {:?}", other),
    }
    assert_eq!(collector.shot_count(), 1);
    assert_eq!(collector.stats().accepted, 1);
}

#[test]
fn test_rejects_without_open_window() {
    let mut collector = ShotCollector::new();
    let outcome = collector.ingest(Some("t1"), &shot("azone", 0.3), Instant::now());
    assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::NoOpenWindow));
}

#[test]
fn test_false_start_is_discarded() {
    let (mut collector, beep_at) = open_collector(1);

    let outcome = collector.ingest(Some("t1"), &shot("azone", -0.12), beep_at);
    assert_eq!(outcome, IngestOutcome::Rejected(RejectReason::FalseStart));
    assert_eq!(collector.shot_count(), 0);
    assert_eq!(collector.stats().false_starts, 1);
}

#[test]
fn test_duplicate_shot_is_ignored() {
    let (mut collector, beep_at) = open_collector(1);
    let now = beep_at + Duration::from_secs(1);

    collector.ingest(Some("t1"), &shot("azone", 0.812), now);
    let again = collector.ingest(Some("t1"), &shot("AZone", 0.812), now);
    let other_device = collector.ingest(Some("t2"), &shot("azone", 0.812), now);

    assert_eq!(again, IngestOutcome::Rejected(RejectReason::Duplicate));
    assert!(matches!(other_device, IngestOutcome::Accepted(_)));
    assert_eq!(collector.shot_count(), 2);
}

#[test]
fn test_malformed_payload_is_dropped() {
    let (mut collector, beep_at) = open_collector(1);

    let outcome = collector.ingest(Some("t1"), &json!({ "content": { "ha": "azone" } }), beep_at);
    assert!(matches!(
        outcome,
        IngestOutcome::Rejected(RejectReason::Malformed { .. })
    ));
    assert_eq!(collector.stats().malformed, 1);
    assert!(collector.is_open());
}

#[test]
fn test_shot_tagged_for_other_repeat_is_ignored() {
    let (mut collector, beep_at) = open_collector(2);

    let stale = json!({ "content": { "ha": "azone", "td": 0.5, "rep": 1 } });
    let outcome = collector.ingest(Some("t1"), &stale, beep_at);
    assert_eq!(
        outcome,
        IngestOutcome::Rejected(RejectReason::OtherRepeat { repeat: 1 })
    );
}

#[test]
fn test_grace_period_admits_in_flight_shots_only() {
    let (mut collector, beep_at) = open_collector(1);
    let stop_at = beep_at + Duration::from_secs(5);

    assert!(collector.end_window(stop_at, Duration::from_secs(3)));
    assert!(!collector.end_window(stop_at + Duration::from_millis(10), Duration::from_secs(3)));
    assert!(collector.in_grace());

    let in_flight = collector.ingest(Some("t1"), &shot("czone", 5.05), stop_at + Duration::from_millis(200));
    assert!(matches!(in_flight, IngestOutcome::Accepted(_)));

    let late = collector.ingest(Some("t1"), &shot("czone", 5.10), stop_at + Duration::from_millis(3100));
    assert_eq!(late, IngestOutcome::Rejected(RejectReason::AfterGrace));

    let session = collector.close().unwrap();
    assert!(session.is_finalized());
    assert_eq!(session.shots().len(), 1);
    assert_eq!(session.stop_offset(), Some(5.0));
}

#[test]
fn test_close_sorts_by_time_offset() {
    let (mut collector, beep_at) = open_collector(1);

    collector.ingest(Some("t2"), &shot("miss", 0.90), beep_at + Duration::from_millis(950));
    collector.ingest(Some("t1"), &shot("azone", 0.30), beep_at + Duration::from_millis(1200));

    let session = collector.close().unwrap();
    assert_eq!(session.shots()[0].device, "t2");
    let sorted = session.sorted_shots();
    assert_eq!(sorted[0].device, "t1");
    assert_eq!(sorted[1].device, "t2");

    assert!(collector.close().is_none());
}
