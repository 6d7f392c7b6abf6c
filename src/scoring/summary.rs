use crate::collector::ShotEvent;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Hit-zone buckets a referee can correct after the fact
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum HitZone {
    #[serde(rename = "A")]
    A,
    #[serde(rename = "C")]
    C,
    #[serde(rename = "D")]
    D,
    #[serde(rename = "M")]
    Miss,
    #[serde(rename = "N")]
    NoShoot,
    #[serde(rename = "PE")]
    Penalty,
}

pub type ZoneCounts = BTreeMap<HitZone, u32>;

impl HitZone {
    pub const ALL: [HitZone; 6] = [
        HitZone::A,
        HitZone::C,
        HitZone::D,
        HitZone::Miss,
        HitZone::NoShoot,
        HitZone::Penalty,
    ];

    /// Bucket for a reported hit area. Steel hits count as A.
    pub fn of_hit_area(hit_area: &str) -> Option<Self> {
        match hit_area.trim().to_lowercase().as_str() {
            "azone" | "circlearea" | "popperzone" => Some(HitZone::A),
            "czone" => Some(HitZone::C),
            "dzone" => Some(HitZone::D),
            "miss" => Some(HitZone::Miss),
            "whitezone" | "blackzone" => Some(HitZone::NoShoot),
            _ => None,
        }
    }

    /// Hit area handed to the scoring function for one count of this zone.
    /// Procedural penalties are not a hit area.
    pub fn scored_hit_area(&self) -> Option<&'static str> {
        match self {
            HitZone::A => Some("azone"),
            HitZone::C => Some("czone"),
            HitZone::D => Some("dzone"),
            HitZone::Miss => Some("miss"),
            HitZone::NoShoot => Some("blackzone"),
            HitZone::Penalty => None,
        }
    }
}

/// Finalized, scored result of one repeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrillRepeatSummary {
    pub id: Uuid,
    pub repeat_index: u32,
    pub total_time: f64,
    pub num_shots: usize,
    pub first_shot: f64,
    pub fastest: f64,
    pub score: i32,
    /// Shots ordered by time offset
    pub shots: Vec<ShotEvent>,
    /// Referee override; the shot list is never rewritten
    #[serde(default)]
    pub adjusted_zone_counts: Option<ZoneCounts>,
    #[serde(default)]
    pub beep_time: Option<DateTime<Utc>>,
}

impl DrillRepeatSummary {
    /// Time of each shot relative to the previous one; the first split is
    /// measured from the beep
    pub fn splits(&self) -> Vec<f64> {
        split_times(&self.shots)
    }

    /// Zone counts derived from the recorded shots
    pub fn shot_zone_counts(&self) -> ZoneCounts {
        let mut counts = ZoneCounts::new();
        for shot in &self.shots {
            if let Some(zone) = HitZone::of_hit_area(&shot.hit_area) {
                *counts.entry(zone).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Referee counts if present, otherwise the counts from the shots
    pub fn effective_zone_counts(&self) -> ZoneCounts {
        self.adjusted_zone_counts
            .clone()
            .unwrap_or_else(|| self.shot_zone_counts())
    }

    pub fn hit_factor(&self) -> f64 {
        if self.total_time > 0.0 {
            self.score as f64 / self.total_time
        } else {
            0.0
        }
    }
}

pub(crate) fn split_times(sorted: &[ShotEvent]) -> Vec<f64> {
    sorted
        .iter()
        .enumerate()
        .map(|(index, shot)| match index {
            0 => shot.time_offset,
            _ => shot.time_offset - sorted[index - 1].time_offset,
        })
        .collect()
}
