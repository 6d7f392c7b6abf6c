mod aggregator;
mod summary;
mod table;

pub use aggregator::{ScoringAggregator, ScoringRule};
pub use summary::{DrillRepeatSummary, HitZone, ZoneCounts};
pub use table::{IpscScoring, ScoringFunction};
