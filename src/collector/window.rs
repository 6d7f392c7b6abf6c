use super::{RepeatSession, ShotEvent};
use crate::error::DrillError;
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashSet;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Window {
    Closed,
    Open,
    Grace { closes_at: Instant },
}

/// Why a shot notification did not make it into the open repeat
#[derive(Debug, Clone, PartialEq)]
pub enum RejectReason {
    NoOpenWindow,
    AfterGrace,
    FalseStart,
    OtherRepeat { repeat: u32 },
    Duplicate,
    Malformed { details: String },
}

impl std::fmt::Display for RejectReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RejectReason::NoOpenWindow => write!(f, "no repeat is open"),
            RejectReason::AfterGrace => write!(f, "arrived after the grace period"),
            RejectReason::FalseStart => write!(f, "fired before the start signal"),
            RejectReason::OtherRepeat { repeat } => write!(f, "tagged for repeat {}", repeat),
            RejectReason::Duplicate => write!(f, "duplicate"),
            RejectReason::Malformed { details } => write!(f, "malformed: {}", details),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    Accepted(ShotEvent),
    Rejected(RejectReason),
}

/// Shot collector statistics for the current repeat
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorStats {
    pub accepted: u64,
    pub false_starts: u64,
    pub duplicates: u64,
    pub malformed: u64,
    pub late: u64,
    pub other_repeat: u64,
}

/// Identity used to drop retransmitted shots
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ShotKey {
    device: String,
    micros: i64,
    zone: String,
}

impl ShotKey {
    fn of(shot: &ShotEvent) -> Self {
        Self {
            device: shot.device.clone(),
            micros: (shot.time_offset * 1_000_000.0).round() as i64,
            zone: shot.zone(),
        }
    }
}

/// Attributes incoming shot notifications to the open repeat
pub struct ShotCollector {
    window: Window,
    current: Option<RepeatSession>,
    seen: HashSet<ShotKey>,
    stats: CollectorStats,
}

impl Default for ShotCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl ShotCollector {
    pub fn new() -> Self {
        Self {
            window: Window::Closed,
            current: None,
            seen: HashSet::new(),
            stats: CollectorStats::default(),
        }
    }

    /// Open the acceptance window for `repeat_index`, timed from the beep
    pub fn begin_window(&mut self, repeat_index: u32, beep_at: Instant, beep_time: DateTime<Utc>) {
        if let Some(previous) = self.current.take() {
            warn!(
                "Discarding unfinalized repeat {} with {} shots",
                previous.repeat_index,
                previous.shots().len()
            );
        }

        self.current = Some(RepeatSession::new(repeat_index, beep_at, beep_time));
        self.window = Window::Open;
        self.seen.clear();
        self.stats = CollectorStats::default();
        info!("Shot window opened for repeat {}", repeat_index);
    }

    /// Move the time zero of the open repeat, e.g. when the host reports
    /// when the beep was actually played
    pub fn set_beep_time(&mut self, beep_at: Instant, beep_time: DateTime<Utc>) {
        if let Some(session) = self.current.as_mut() {
            session.beep_at = beep_at;
            session.beep_time = beep_time;
        }
    }

    /// Decode a shot notification and add it to the open repeat
    pub fn ingest(&mut self, device_hint: Option<&str>, raw: &Value, now: Instant) -> IngestOutcome {
        let session = match (self.window, self.current.as_mut()) {
            (Window::Closed, _) | (_, None) => {
                debug!("Shot received with no open window, ignoring");
                return IngestOutcome::Rejected(RejectReason::NoOpenWindow);
            }
            (Window::Grace { closes_at }, Some(_)) if now > closes_at => {
                debug!("Shot arrived after the grace period closed, ignoring");
                self.stats.late += 1;
                return IngestOutcome::Rejected(RejectReason::AfterGrace);
            }
            (_, Some(session)) => session,
        };

        let arrival_offset = now.saturating_duration_since(session.beep_at).as_secs_f64();
        let (shot, tagged_repeat) = match ShotEvent::decode(device_hint, raw, arrival_offset) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!("Dropping shot notification: {}", e);
                self.stats.malformed += 1;
                return IngestOutcome::Rejected(RejectReason::Malformed {
                    details: e.to_string(),
                });
            }
        };

        if let Some(repeat) = tagged_repeat.filter(|r| *r != session.repeat_index) {
            debug!(
                "Ignoring shot tagged for repeat {} while repeat {} is open",
                repeat, session.repeat_index
            );
            self.stats.other_repeat += 1;
            return IngestOutcome::Rejected(RejectReason::OtherRepeat { repeat });
        }

        if shot.time_offset < 0.0 {
            debug!(
                "False start from {} at {:.3}s, ignoring",
                shot.device, shot.time_offset
            );
            self.stats.false_starts += 1;
            return IngestOutcome::Rejected(RejectReason::FalseStart);
        }

        if !self.seen.insert(ShotKey::of(&shot)) {
            let duplicate = DrillError::DuplicateShot {
                device: shot.device.clone(),
                time_offset: shot.time_offset,
            };
            debug!("{} ({}), ignoring", duplicate, shot.hit_area);
            self.stats.duplicates += 1;
            return IngestOutcome::Rejected(RejectReason::Duplicate);
        }

        session.push(shot.clone());
        self.stats.accepted += 1;
        debug!(
            "Shot accepted for repeat {}: {} {} at {:.3}s ({} total)",
            session.repeat_index,
            shot.device,
            shot.hit_area,
            shot.time_offset,
            session.shots().len()
        );
        IngestOutcome::Accepted(shot)
    }

    /// Stop the repeat but keep admitting in-flight shots for `grace`.
    /// Returns false if the window was not open.
    pub fn end_window(&mut self, now: Instant, grace: Duration) -> bool {
        if self.window != Window::Open {
            return false;
        }

        if let Some(session) = self.current.as_mut() {
            session.stopped_at = Some(now);
        }
        self.window = Window::Grace {
            closes_at: now + grace,
        };
        info!("Shot window entering grace period of {:?}", grace);
        true
    }

    /// Record the drill duration reported by a target; the longest report wins
    pub fn record_reported_duration(&mut self, drill_duration: f64) {
        if let Some(session) = self.current.as_mut() {
            session.reported_duration = Some(
                session
                    .reported_duration
                    .map_or(drill_duration, |previous| previous.max(drill_duration)),
            );
        }
    }

    /// Close the window and hand over the finalized repeat
    pub fn close(&mut self) -> Option<RepeatSession> {
        self.window = Window::Closed;
        self.seen.clear();
        let session = self.current.take()?;
        info!(
            "Shot window closed for repeat {} with {} shots",
            session.repeat_index,
            session.shots().len()
        );
        Some(session.finalize())
    }

    /// Drop any open repeat without finalizing it
    pub fn reset(&mut self) {
        self.window = Window::Closed;
        self.current = None;
        self.seen.clear();
    }

    pub fn is_open(&self) -> bool {
        self.window == Window::Open
    }

    pub fn in_grace(&self) -> bool {
        matches!(self.window, Window::Grace { .. })
    }

    pub fn current_repeat(&self) -> Option<u32> {
        self.current.as_ref().map(|s| s.repeat_index)
    }

    pub fn shot_count(&self) -> usize {
        self.current.as_ref().map_or(0, |s| s.shots().len())
    }

    pub fn stats(&self) -> &CollectorStats {
        &self.stats
    }
}
