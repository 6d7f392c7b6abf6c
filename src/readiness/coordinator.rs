use super::{ExpectedDevice, ReadinessState};
use crate::transport::TransportCommand;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Progress reported after a device acknowledges
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessProgress {
    pub ready: usize,
    pub total: usize,
}

impl ReadinessProgress {
    pub fn is_complete(&self) -> bool {
        self.ready >= self.total
    }
}

/// Tracks the pre-repeat handshake with the expected devices.
///
/// The coordinator is driven by the session task: `begin` resets the state and
/// starts the timeout, `mark_ready` feeds acknowledgements in, and
/// `poll_timeout` is called on every tick. At most one check is outstanding;
/// beginning a new one replaces the old deadline.
pub struct ReadinessCoordinator {
    devices: Vec<ExpectedDevice>,
    states: HashMap<String, ReadinessState>,
    timeout: Duration,
    deadline: Option<Instant>,
}

impl ReadinessCoordinator {
    pub fn new(devices: Vec<ExpectedDevice>, timeout: Duration) -> Self {
        let states = devices
            .iter()
            .map(|d| (d.name.clone(), ReadinessState::Unknown))
            .collect();
        Self {
            devices,
            states,
            timeout,
            deadline: None,
        }
    }

    /// Start a readiness check for `repeat`.
    ///
    /// Returns the queries to put on the transport, one per device in session
    /// order. With no expected devices the check passes immediately and no
    /// deadline is armed.
    pub fn begin(&mut self, repeat: u32, mode: &str, now: Instant) -> Vec<TransportCommand> {
        if self.deadline.is_some() {
            debug!("Restarting outstanding readiness check");
        }

        for state in self.states.values_mut() {
            *state = ReadinessState::Unknown;
        }

        self.deadline = if self.devices.is_empty() {
            None
        } else {
            Some(now + self.timeout)
        };

        info!(
            "Readiness check for repeat {} across {} devices",
            repeat,
            self.devices.len()
        );

        let last = self.devices.len().saturating_sub(1);
        self.devices
            .iter()
            .enumerate()
            .map(|(index, device)| {
                TransportCommand::ready(
                    &device.name,
                    repeat,
                    index == 0,
                    index == last,
                    mode,
                    device.target_type.as_deref(),
                )
            })
            .collect()
    }

    /// Record an acknowledgement. Returns progress if it changed anything.
    pub fn mark_ready(&mut self, device: &str) -> Option<ReadinessProgress> {
        if self.deadline.is_none() {
            debug!("Ready ack from {} with no check outstanding, ignoring", device);
            return None;
        }

        match self.states.get_mut(device) {
            Some(state) if *state == ReadinessState::Unknown => {
                *state = ReadinessState::Ready;
            }
            Some(_) => {
                debug!("Repeated ready ack from {}", device);
                return None;
            }
            None => {
                debug!("Ready ack from unexpected device {}, ignoring", device);
                return None;
            }
        }

        let progress = self.progress();
        info!(
            "Device {} ready ({}/{})",
            device, progress.ready, progress.total
        );

        if progress.is_complete() {
            self.deadline = None;
        }
        Some(progress)
    }

    /// Check the deadline. Returns the non-responsive devices if it elapsed
    /// with some devices still unknown; the check is then over.
    pub fn poll_timeout(&mut self, now: Instant) -> Option<Vec<String>> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }

        self.deadline = None;
        let missing = self.missing_devices();
        if missing.is_empty() {
            return None;
        }

        warn!("Readiness check timed out, missing: {}", missing.join(", "));
        Some(missing)
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_outstanding(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn all_ready(&self) -> bool {
        self.progress().is_complete()
    }

    pub fn progress(&self) -> ReadinessProgress {
        ReadinessProgress {
            ready: self
                .states
                .values()
                .filter(|s| **s == ReadinessState::Ready)
                .count(),
            total: self.devices.len(),
        }
    }

    /// Devices that have not acknowledged, in session order
    pub fn missing_devices(&self) -> Vec<String> {
        self.devices
            .iter()
            .filter(|d| self.states.get(&d.name) != Some(&ReadinessState::Ready))
            .map(|d| d.name.clone())
            .collect()
    }

    pub fn state_of(&self, device: &str) -> Option<ReadinessState> {
        self.states.get(device).copied()
    }

    pub fn devices(&self) -> &[ExpectedDevice] {
        &self.devices
    }
}
