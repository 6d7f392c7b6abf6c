mod window;
mod repeat;
mod shot;
#[cfg(test)]
mod tests;

pub use window::{CollectorStats, IngestOutcome, RejectReason, ShotCollector};
pub use repeat::RepeatSession;
pub use shot::{HitPosition, ShotEvent};
