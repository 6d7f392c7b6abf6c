use super::SessionSnapshot;
use crate::error::Result;
use tokio::sync::oneshot;
use tokio::time::Instant;

pub(crate) type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests from controller handles to the session task
pub(crate) enum ControlCommand {
    SetCurrentRepeat { repeat: u32, reply: Reply<()> },
    SetRandomDelay { seconds: f64, reply: Reply<()> },
    SetBeepTime { at: Instant, reply: Reply<()> },
    PerformReadinessCheck { reply: Reply<()> },
    StartExecution { reply: Reply<f64> },
    ManualStopRepeat { reply: Reply<bool> },
    IsCurrentRepeatFinalized { reply: oneshot::Sender<bool> },
    CompleteDrill { reply: oneshot::Sender<()> },
    Snapshot { reply: oneshot::Sender<SessionSnapshot> },
}

impl ControlCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ControlCommand::SetCurrentRepeat { .. } => "set_current_repeat",
            ControlCommand::SetRandomDelay { .. } => "set_random_delay",
            ControlCommand::SetBeepTime { .. } => "set_beep_time",
            ControlCommand::PerformReadinessCheck { .. } => "perform_readiness_check",
            ControlCommand::StartExecution { .. } => "start_execution",
            ControlCommand::ManualStopRepeat { .. } => "manual_stop_repeat",
            ControlCommand::IsCurrentRepeatFinalized { .. } => "is_current_repeat_finalized",
            ControlCommand::CompleteDrill { .. } => "complete_drill",
            ControlCommand::Snapshot { .. } => "snapshot",
        }
    }
}
