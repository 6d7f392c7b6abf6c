use crate::error::{DrillError, Result};
use crate::scoring::DrillRepeatSummary;
use async_trait::async_trait;

/// Notifications delivered to the session host.
///
/// Called from the session task, so implementations should hand work off
/// rather than block. Every method defaults to doing nothing.
pub trait SessionCallbacks: Send + Sync {
    fn on_readiness_update(&self, _ready: usize, _total: usize) {}

    /// Devices that did not acknowledge before the readiness timeout
    fn on_readiness_timeout(&self, _devices: &[String]) {}

    fn on_repeat_finalized(&self, _summary: &DrillRepeatSummary) {}

    /// Fires once, with one summary per repeat that ran
    fn on_complete(&self, _summaries: &[DrillRepeatSummary]) {}

    /// The session was aborted and no further callbacks follow
    fn on_failure(&self, _error: &DrillError) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopCallbacks;

impl SessionCallbacks for NoopCallbacks {}

/// Persistence collaborator. Receives the summaries once when the session
/// completes; the engine stores nothing itself.
#[async_trait]
pub trait SummarySink: Send + Sync {
    async fn store(&self, summaries: &[DrillRepeatSummary]) -> Result<()>;
}
