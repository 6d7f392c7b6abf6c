use std::time::Duration;
use tokio::time::Instant;

/// Phase of the current repeat
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    /// Nothing scheduled; readiness checks happen here
    Idle,
    /// Waiting out the random start delay
    Armed {
        repeat: u32,
        delay: Duration,
        fires_at: Instant,
    },
    /// Beep fired, shooter is running the drill
    Active { repeat: u32, beep_at: Instant },
    /// Stopped, still admitting in-flight shots
    Grace {
        repeat: u32,
        beep_at: Instant,
        stopped_at: Instant,
        closes_at: Instant,
    },
    /// Grace elapsed, waiting for the repeat summary
    Finalizing { repeat: u32, deadline: Instant },
    /// Between repeats
    Paused { next_repeat: u32, resumes_at: Instant },
    /// Session finished; terminal
    Complete,
}

impl Phase {
    pub fn name(&self) -> &'static str {
        match self {
            Phase::Idle => "idle",
            Phase::Armed { .. } => "armed",
            Phase::Active { .. } => "active",
            Phase::Grace { .. } => "grace",
            Phase::Finalizing { .. } => "finalizing",
            Phase::Paused { .. } => "paused",
            Phase::Complete => "complete",
        }
    }

    /// Repeat the phase belongs to, if any
    pub fn repeat(&self) -> Option<u32> {
        match self {
            Phase::Armed { repeat, .. }
            | Phase::Active { repeat, .. }
            | Phase::Grace { repeat, .. }
            | Phase::Finalizing { repeat, .. } => Some(*repeat),
            Phase::Paused { next_repeat, .. } => Some(*next_repeat),
            Phase::Idle | Phase::Complete => None,
        }
    }

    /// True while a repeat is running or waiting for its summary
    pub fn holds_open_repeat(&self) -> bool {
        matches!(
            self,
            Phase::Active { .. } | Phase::Grace { .. } | Phase::Finalizing { .. }
        )
    }
}

/// Transitions reported by [`super::SessionClock::tick`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockSignal {
    /// Start delay elapsed; `beep_at` is time zero for the repeat
    Beep { repeat: u32, beep_at: Instant },
    /// Active time reached the drill-duration limit
    WatchdogStop { repeat: u32 },
    /// Grace period over; the repeat should be finalized now
    GraceElapsed { repeat: u32 },
    /// Finalize did not report back within the allowed wait
    FinalizeOverdue { repeat: u32 },
    /// Pause over; the next repeat needs its readiness check
    PauseElapsed { next_repeat: u32 },
}
