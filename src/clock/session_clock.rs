use super::{ClockSignal, Phase};
use crate::error::{DrillError, Result};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Owns the phase of the current repeat and evaluates its deadlines on every tick
pub struct SessionClock {
    phase: Phase,
    tick_interval: Duration,
    grace: Duration,
    finalize_max_wait: Duration,
    max_active: Duration,
}

impl SessionClock {
    pub fn new(
        tick_interval: Duration,
        grace: Duration,
        finalize_max_wait: Duration,
        max_active: Duration,
    ) -> Self {
        Self {
            phase: Phase::Idle,
            tick_interval,
            grace,
            finalize_max_wait,
            max_active,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tick_interval(&self) -> Duration {
        self.tick_interval
    }

    pub fn grace(&self) -> Duration {
        self.grace
    }

    /// Schedule the beep for `repeat` after `delay`
    pub fn arm(&mut self, repeat: u32, delay: Duration, now: Instant) -> Result<()> {
        if self.phase != Phase::Idle {
            return Err(DrillError::invalid_state(format!(
                "cannot arm repeat {} while {}",
                repeat,
                self.phase.name()
            )));
        }

        let fires_at = now.checked_add(delay).ok_or_else(|| {
            DrillError::invalid_state(format!(
                "start delay of {:?} for repeat {} is out of range",
                delay, repeat
            ))
        })?;

        self.phase = Phase::Armed {
            repeat,
            delay,
            fires_at,
        };
        info!("Repeat {} armed, beep in {:.2}s", repeat, delay.as_secs_f64());
        Ok(())
    }

    /// Stop the active repeat and open the grace period.
    /// Returns false, changing nothing, if no repeat is active.
    pub fn stop_repeat(&mut self, now: Instant) -> bool {
        match self.phase {
            Phase::Active { repeat, beep_at } => {
                self.phase = Phase::Grace {
                    repeat,
                    beep_at,
                    stopped_at: now,
                    closes_at: now + self.grace,
                };
                info!(
                    "Repeat {} stopped after {:.2}s",
                    repeat,
                    now.saturating_duration_since(beep_at).as_secs_f64()
                );
                true
            }
            other => {
                debug!("Stop requested while {}, ignoring", other.name());
                false
            }
        }
    }

    /// Replace time zero of the running repeat
    pub fn set_beep_time(&mut self, at: Instant) -> bool {
        match &mut self.phase {
            Phase::Active { beep_at, .. } | Phase::Grace { beep_at, .. } => {
                *beep_at = at;
                true
            }
            _ => false,
        }
    }

    /// Seconds since the beep for an active or stopped repeat
    pub fn elapsed(&self, now: Instant) -> Option<Duration> {
        match self.phase {
            Phase::Active { beep_at, .. } => Some(now.saturating_duration_since(beep_at)),
            Phase::Grace {
                beep_at,
                stopped_at,
                ..
            } => Some(stopped_at.saturating_duration_since(beep_at)),
            _ => None,
        }
    }

    /// Advance the phase machine to `now`
    pub fn tick(&mut self, now: Instant) -> Option<ClockSignal> {
        match self.phase {
            Phase::Armed {
                repeat, fires_at, ..
            } if now >= fires_at => {
                self.phase = Phase::Active {
                    repeat,
                    beep_at: now,
                };
                info!("Beep for repeat {}", repeat);
                Some(ClockSignal::Beep {
                    repeat,
                    beep_at: now,
                })
            }
            Phase::Active { repeat, beep_at }
                if now.saturating_duration_since(beep_at) >= self.max_active =>
            {
                warn!(
                    "Repeat {} reached the {:?} drill limit",
                    repeat, self.max_active
                );
                self.stop_repeat(now);
                Some(ClockSignal::WatchdogStop { repeat })
            }
            Phase::Grace {
                repeat, closes_at, ..
            } if now >= closes_at => {
                self.phase = Phase::Finalizing {
                    repeat,
                    deadline: now + self.finalize_max_wait,
                };
                debug!("Grace period over for repeat {}", repeat);
                Some(ClockSignal::GraceElapsed { repeat })
            }
            Phase::Finalizing { repeat, deadline } if now >= deadline => {
                Some(ClockSignal::FinalizeOverdue { repeat })
            }
            Phase::Paused {
                next_repeat,
                resumes_at,
            } if now >= resumes_at => {
                self.phase = Phase::Idle;
                info!("Pause over, preparing repeat {}", next_repeat);
                Some(ClockSignal::PauseElapsed { next_repeat })
            }
            _ => None,
        }
    }

    /// The summary for the finalizing repeat is in. Pause before
    /// `next_repeat`, or finish the session when there is none.
    pub fn finalized(&mut self, next_repeat: Option<u32>, pause: Duration, now: Instant) -> bool {
        let Phase::Finalizing { repeat, .. } = self.phase else {
            return false;
        };

        self.phase = match next_repeat {
            Some(next_repeat) => {
                info!(
                    "Repeat {} finalized, pausing {:.2}s before repeat {}",
                    repeat,
                    pause.as_secs_f64(),
                    next_repeat
                );
                Phase::Paused {
                    next_repeat,
                    resumes_at: now + pause,
                }
            }
            None => {
                info!("Repeat {} finalized, session complete", repeat);
                Phase::Complete
            }
        };
        true
    }

    /// Enter the terminal phase
    pub fn complete(&mut self) {
        self.phase = Phase::Complete;
    }

    /// Drop every pending deadline
    pub fn halt(&mut self) {
        if self.phase != Phase::Idle {
            debug!("Clock halted while {}", self.phase.name());
        }
        self.phase = Phase::Idle;
    }
}
