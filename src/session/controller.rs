use super::command::{ControlCommand, Reply};
use super::{DrillSessionBuilder, SessionSnapshot};
use crate::error::{DrillError, Result};
use crate::events::{DrillEvent, EventBus};
use crate::scoring::ScoringAggregator;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Handle to a running drill session.
///
/// Cloning is cheap; every clone talks to the same session task. Calls return
/// once the task has applied them, and fail with
/// [`DrillError::SessionClosed`] after the session was stopped.
#[derive(Clone)]
pub struct DrillSessionController {
    commands: mpsc::Sender<ControlCommand>,
    cancel: CancellationToken,
    event_bus: EventBus,
    scoring: ScoringAggregator,
}

impl DrillSessionController {
    pub fn builder() -> DrillSessionBuilder {
        DrillSessionBuilder::new()
    }

    pub(crate) fn new(
        commands: mpsc::Sender<ControlCommand>,
        cancel: CancellationToken,
        event_bus: EventBus,
        scoring: ScoringAggregator,
    ) -> Self {
        Self {
            commands,
            cancel,
            event_bus,
            scoring,
        }
    }

    async fn query<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> ControlCommand) -> Result<T> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(make(reply))
            .await
            .map_err(|_| DrillError::SessionClosed)?;
        response.await.map_err(|_| DrillError::SessionClosed)
    }

    async fn request<T>(&self, make: impl FnOnce(Reply<T>) -> ControlCommand) -> Result<T> {
        self.query(make).await?
    }

    /// Choose which repeat the next readiness check and start apply to
    pub async fn set_current_repeat(&self, repeat: u32) -> Result<()> {
        self.request(|reply| ControlCommand::SetCurrentRepeat { repeat, reply })
            .await
    }

    /// Fix the start delay of the next armed repeat instead of drawing one
    pub async fn set_random_delay(&self, seconds: f64) -> Result<()> {
        self.request(|reply| ControlCommand::SetRandomDelay { seconds, reply })
            .await
    }

    /// Report when the beep was actually played for the running repeat
    pub async fn set_beep_time(&self, at: Instant) -> Result<()> {
        self.request(|reply| ControlCommand::SetBeepTime { at, reply })
            .await
    }

    /// Send ready queries for the current repeat. Progress and timeout are
    /// reported through the callbacks.
    pub async fn perform_readiness_check(&self) -> Result<()> {
        self.request(|reply| ControlCommand::PerformReadinessCheck { reply })
            .await
    }

    /// Arm the current repeat. Returns the start delay in seconds.
    pub async fn start_execution(&self) -> Result<f64> {
        self.request(|reply| ControlCommand::StartExecution { reply })
            .await
    }

    /// Stop the active repeat. Returns false if no repeat was active.
    pub async fn manual_stop_repeat(&self) -> Result<bool> {
        self.request(|reply| ControlCommand::ManualStopRepeat { reply })
            .await
    }

    pub async fn is_current_repeat_finalized(&self) -> Result<bool> {
        self.query(|reply| ControlCommand::IsCurrentRepeatFinalized { reply })
            .await
    }

    /// Finish the session. Does nothing once the session has closed.
    pub async fn complete_drill(&self) {
        if self
            .query(|reply| ControlCommand::CompleteDrill { reply })
            .await
            .is_err()
        {
            debug!("Session already stopped, complete request ignored");
        }
    }

    /// Abort the session without finalizing or calling back
    pub fn stop_execution(&self) {
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub async fn snapshot(&self) -> Result<SessionSnapshot> {
        self.query(|reply| ControlCommand::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DrillEvent> {
        self.event_bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// Aggregator used for this session, for referee adjustments
    pub fn scoring(&self) -> &ScoringAggregator {
        &self.scoring
    }
}
