use super::ShotEvent;
use chrono::{DateTime, Utc};
use tokio::time::Instant;

/// Shots gathered for one repeat.
///
/// Only the collector appends to it, and only until it is finalized; after
/// that it is handed to the scoring aggregator as read-only input.
#[derive(Debug, Clone)]
pub struct RepeatSession {
    pub repeat_index: u32,
    pub beep_at: Instant,
    pub beep_time: DateTime<Utc>,
    pub stopped_at: Option<Instant>,
    /// Drill duration reported by the last target's end acknowledgement
    pub reported_duration: Option<f64>,
    shots: Vec<ShotEvent>,
    finalized: bool,
}

impl RepeatSession {
    pub fn new(repeat_index: u32, beep_at: Instant, beep_time: DateTime<Utc>) -> Self {
        Self {
            repeat_index,
            beep_at,
            beep_time,
            stopped_at: None,
            reported_duration: None,
            shots: Vec::new(),
            finalized: false,
        }
    }

    pub(crate) fn push(&mut self, shot: ShotEvent) -> bool {
        if self.finalized {
            return false;
        }
        self.shots.push(shot);
        true
    }

    pub(crate) fn finalize(mut self) -> Self {
        self.finalized = true;
        self
    }

    pub fn is_finalized(&self) -> bool {
        self.finalized
    }

    /// Shots in arrival order
    pub fn shots(&self) -> &[ShotEvent] {
        &self.shots
    }

    /// Shots ordered by target-reported time offset, arrival order breaking ties
    pub fn sorted_shots(&self) -> Vec<ShotEvent> {
        let mut shots = self.shots.clone();
        shots.sort_by(|a, b| {
            a.time_offset
                .total_cmp(&b.time_offset)
                .then(a.arrival_offset.total_cmp(&b.arrival_offset))
        });
        shots
    }

    /// Seconds between the beep and the stop signal
    pub fn stop_offset(&self) -> Option<f64> {
        self.stopped_at
            .map(|stopped| stopped.saturating_duration_since(self.beep_at).as_secs_f64())
    }
}
