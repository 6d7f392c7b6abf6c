use super::summary::split_times;
use super::{DrillRepeatSummary, HitZone, IpscScoring, ScoringFunction, ZoneCounts};
use crate::collector::{RepeatSession, ShotEvent};
use crate::config::{ScoringConfig, ScoringRuleKind};
use crate::error::{DrillError, Result};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

/// How per-shot points are combined into a repeat score
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoringRule {
    /// Every accepted shot counts
    Sum,
    /// Only the best `best_n` hits on each target count. No-shoot hits always
    /// count, steel counts every hit, and each expected target without a hit
    /// costs `missed_target_penalty`. Never negative.
    BestPerTarget {
        best_n: usize,
        missed_target_penalty: i32,
    },
}

impl ScoringRule {
    pub fn from_config(config: &ScoringConfig) -> Self {
        match config.rule {
            ScoringRuleKind::Sum => ScoringRule::Sum,
            ScoringRuleKind::BestPerTarget => ScoringRule::BestPerTarget {
                best_n: config.best_n,
                missed_target_penalty: config.missed_target_penalty,
            },
        }
    }
}

/// Turns finalized repeats into summaries and applies referee corrections.
///
/// Clones share the ledger of original scores so a correction made through
/// one handle can be restored through another.
#[derive(Clone)]
pub struct ScoringAggregator {
    scoring: Arc<dyn ScoringFunction>,
    rule: ScoringRule,
    expected_targets: Vec<String>,
    penalty_points: i32,
    original_scores: Arc<Mutex<HashMap<Uuid, i32>>>,
}

impl std::fmt::Debug for ScoringAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScoringAggregator")
            .field("rule", &self.rule)
            .field("expected_targets", &self.expected_targets)
            .field("penalty_points", &self.penalty_points)
            .finish()
    }
}

impl Default for ScoringAggregator {
    fn default() -> Self {
        Self::new(Arc::new(IpscScoring), ScoringRule::Sum)
    }
}

impl ScoringAggregator {
    pub fn new(scoring: Arc<dyn ScoringFunction>, rule: ScoringRule) -> Self {
        Self {
            scoring,
            rule,
            expected_targets: Vec::new(),
            penalty_points: 10,
            original_scores: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    pub fn from_config(scoring: Arc<dyn ScoringFunction>, config: &ScoringConfig) -> Self {
        Self::new(scoring, ScoringRule::from_config(config)).with_penalty_points(config.penalty_points)
    }

    pub fn with_expected_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.expected_targets = targets.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_penalty_points(mut self, points: i32) -> Self {
        self.penalty_points = points;
        self
    }

    pub fn rule(&self) -> ScoringRule {
        self.rule
    }

    pub fn penalty_points(&self) -> i32 {
        self.penalty_points
    }

    /// Build the summary for a finalized repeat
    pub fn finalize(&self, session: &RepeatSession) -> Result<DrillRepeatSummary> {
        if !session.is_finalized() {
            return Err(DrillError::invalid_state(format!(
                "repeat {} has not been finalized",
                session.repeat_index
            )));
        }

        let shots = session.sorted_shots();
        let splits = split_times(&shots);

        let first_shot = shots.first().map(|s| s.time_offset).unwrap_or(0.0);
        let fastest = splits
            .iter()
            .copied()
            .reduce(f64::min)
            .map(|split| split.max(0.0))
            .unwrap_or(0.0);
        let total_time = session
            .reported_duration
            .or_else(|| shots.last().map(|s| s.time_offset))
            .unwrap_or(0.0);
        let score = self.score_shots(&shots);

        let summary = DrillRepeatSummary {
            id: Uuid::new_v4(),
            repeat_index: session.repeat_index,
            total_time,
            num_shots: shots.len(),
            first_shot,
            fastest,
            score,
            shots,
            adjusted_zone_counts: None,
            beep_time: Some(session.beep_time),
        };

        info!(
            "Repeat {} scored: {} shots, score {}, time {:.2}s",
            summary.repeat_index, summary.num_shots, summary.score, summary.total_time
        );
        Ok(summary)
    }

    /// Score a set of shots under the configured rule
    pub fn score_shots(&self, shots: &[ShotEvent]) -> i32 {
        match self.rule {
            ScoringRule::Sum => shots
                .iter()
                .map(|shot| self.scoring.score_for_hit_area(&shot.hit_area))
                .sum(),
            ScoringRule::BestPerTarget {
                best_n,
                missed_target_penalty,
            } => self.best_per_target(shots, best_n, missed_target_penalty),
        }
    }

    fn best_per_target(&self, shots: &[ShotEvent], best_n: usize, missed_penalty: i32) -> i32 {
        let mut by_target: HashMap<&str, Vec<&ShotEvent>> = HashMap::new();
        for shot in shots {
            by_target.entry(shot.device.as_str()).or_default().push(shot);
        }

        let mut total = 0;
        for (target, target_shots) in &by_target {
            let steel = target_shots.iter().any(|s| is_steel(&s.target_type));
            let mut counted: Vec<i32> = Vec::new();
            let mut no_shoot = 0;

            for shot in target_shots {
                let points = self.scoring.score_for_hit_area(&shot.hit_area);
                if is_no_shoot(&shot.zone()) {
                    no_shoot += points;
                } else {
                    counted.push(points);
                }
            }

            if !steel {
                counted.sort_unstable_by(|a, b| b.cmp(a));
                counted.truncate(best_n);
            }
            let target_score: i32 = counted.iter().sum::<i32>() + no_shoot;
            debug!("Target {} contributes {}", target, target_score);
            total += target_score;
        }

        let missed = self
            .expected_targets
            .iter()
            .filter(|name| !by_target.contains_key(name.as_str()))
            .count() as i32;
        total -= missed * missed_penalty;

        total.max(0)
    }

    /// Score implied by a set of zone counts
    pub fn score_for_counts(&self, counts: &ZoneCounts) -> i32 {
        let total: i32 = counts
            .iter()
            .map(|(zone, &count)| {
                let per_hit = match zone.scored_hit_area() {
                    Some(area) => self.scoring.score_for_hit_area(area),
                    None => -self.penalty_points,
                };
                per_hit * count as i32
            })
            .sum();

        match self.rule {
            ScoringRule::Sum => total,
            ScoringRule::BestPerTarget { .. } => total.max(0),
        }
    }

    /// Replace the scored zone counts with a referee's counts. The shot list
    /// is left untouched.
    pub fn apply_adjustment(
        &self,
        summary: &DrillRepeatSummary,
        counts: ZoneCounts,
    ) -> DrillRepeatSummary {
        self.remember_original(summary);
        let mut adjusted = summary.clone();
        adjusted.score = self.score_for_counts(&counts);
        adjusted.adjusted_zone_counts = Some(counts);
        info!(
            "Repeat {} adjusted by referee: score {} -> {}",
            summary.repeat_index, summary.score, adjusted.score
        );
        adjusted
    }

    /// Take one procedural penalty off the score
    pub fn deduct(&self, summary: &DrillRepeatSummary) -> DrillRepeatSummary {
        self.remember_original(summary);
        let mut adjusted = summary.clone();
        adjusted.score -= self.penalty_points;
        let counts = adjusted
            .adjusted_zone_counts
            .get_or_insert_with(|| summary.shot_zone_counts());
        *counts.entry(HitZone::Penalty).or_insert(0) += 1;
        adjusted
    }

    /// Undo every correction made to this summary
    pub fn restore(&self, summary: &DrillRepeatSummary) -> DrillRepeatSummary {
        let mut restored = summary.clone();
        if let Some(original) = self.original_scores.lock().remove(&summary.id) {
            restored.score = original;
            restored.adjusted_zone_counts = None;
        }
        restored
    }

    pub fn original_score(&self, id: &Uuid) -> Option<i32> {
        self.original_scores.lock().get(id).copied()
    }

    fn remember_original(&self, summary: &DrillRepeatSummary) {
        self.original_scores
            .lock()
            .entry(summary.id)
            .or_insert(summary.score);
    }
}

fn is_no_shoot(zone: &str) -> bool {
    matches!(zone, "whitezone" | "blackzone")
}

fn is_steel(target_type: &str) -> bool {
    let target_type = target_type.to_lowercase();
    target_type.contains("paddle") || target_type.contains("popper")
}
