use crate::error::EventBusError;
use crate::scoring::DrillRepeatSummary;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Events published while a drill session runs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DrillEvent {
    /// Ready commands were sent for a repeat
    ReadinessCheckStarted { repeat: u32, devices: usize },
    /// A target acknowledged the ready command
    ReadinessUpdate { ready: usize, total: usize },
    /// Some targets never acknowledged
    ReadinessTimeout { devices: Vec<String> },
    /// Random start delay chosen and counting down
    RepeatArmed { repeat: u32, delay_seconds: f64 },
    /// Start signal sent to the targets
    BeepFired { repeat: u32 },
    /// A shot was attributed to the open repeat
    ShotAccepted {
        repeat: u32,
        device: String,
        hit_area: String,
        time_offset: f64,
    },
    /// A shot notification was dropped
    ShotRejected { repeat: Option<u32>, reason: String },
    /// End signal sent; the grace window is running
    RepeatStopped { repeat: u32 },
    /// Repeat scored
    RepeatFinalized { summary: DrillRepeatSummary },
    /// Every repeat finished
    SessionCompleted { summaries: Vec<DrillRepeatSummary> },
    /// Session aborted by an error
    SessionFailed { reason: String },
    /// Session stopped by the caller
    SessionStopped,
}

impl DrillEvent {
    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            DrillEvent::ReadinessCheckStarted { repeat, devices } => {
                format!("Readiness check for repeat {} ({} targets)", repeat, devices)
            }
            DrillEvent::ReadinessUpdate { ready, total } => {
                format!("{}/{} targets ready", ready, total)
            }
            DrillEvent::ReadinessTimeout { devices } => {
                format!("Targets not ready: {}", devices.join(", "))
            }
            DrillEvent::RepeatArmed {
                repeat,
                delay_seconds,
            } => format!("Repeat {} armed, beep in {:.2}s", repeat, delay_seconds),
            DrillEvent::BeepFired { repeat } => format!("Beep for repeat {}", repeat),
            DrillEvent::ShotAccepted {
                device,
                hit_area,
                time_offset,
                ..
            } => format!("Shot on {} ({}) at {:.3}s", device, hit_area, time_offset),
            DrillEvent::ShotRejected { reason, .. } => format!("Shot rejected: {}", reason),
            DrillEvent::RepeatStopped { repeat } => format!("Repeat {} stopped", repeat),
            DrillEvent::RepeatFinalized { summary } => format!(
                "Repeat {} finalized: {} shots, score {}",
                summary.repeat_index, summary.num_shots, summary.score
            ),
            DrillEvent::SessionCompleted { summaries } => {
                format!("Session completed with {} repeats", summaries.len())
            }
            DrillEvent::SessionFailed { reason } => format!("Session failed: {}", reason),
            DrillEvent::SessionStopped => "Session stopped".to_string(),
        }
    }

    /// Get the event type as a string for filtering
    pub fn event_type(&self) -> &'static str {
        match self {
            DrillEvent::ReadinessCheckStarted { .. } => "readiness_check_started",
            DrillEvent::ReadinessUpdate { .. } => "readiness_update",
            DrillEvent::ReadinessTimeout { .. } => "readiness_timeout",
            DrillEvent::RepeatArmed { .. } => "repeat_armed",
            DrillEvent::BeepFired { .. } => "beep_fired",
            DrillEvent::ShotAccepted { .. } => "shot_accepted",
            DrillEvent::ShotRejected { .. } => "shot_rejected",
            DrillEvent::RepeatStopped { .. } => "repeat_stopped",
            DrillEvent::RepeatFinalized { .. } => "repeat_finalized",
            DrillEvent::SessionCompleted { .. } => "session_completed",
            DrillEvent::SessionFailed { .. } => "session_failed",
            DrillEvent::SessionStopped => "session_stopped",
        }
    }

    /// Whether no further events follow this one
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DrillEvent::SessionCompleted { .. }
                | DrillEvent::SessionFailed { .. }
                | DrillEvent::SessionStopped
        )
    }
}

/// Async event bus for observers of a session using broadcast channels
pub struct EventBus {
    sender: broadcast::Sender<DrillEvent>,
    debug_logging: bool,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: false,
        }
    }

    /// Create a new event bus with debug logging enabled
    pub fn with_debug_logging(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            debug_logging: true,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DrillEvent> {
        self.sender.subscribe()
    }

    /// Subscribe with a filter applied on receive
    pub fn subscribe_filtered(&self, filter: EventFilter, name: &str) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe(), filter, name.to_string())
    }

    /// Publish an event to all subscribers.
    ///
    /// Fails when nobody is listening; the session ignores that case.
    pub async fn publish(&self, event: DrillEvent) -> Result<usize, EventBusError> {
        if self.debug_logging {
            debug!("Publishing event: {}", event.description());
        }

        match &event {
            DrillEvent::ReadinessTimeout { devices } => {
                warn!("Readiness timed out waiting for: {}", devices.join(", "));
            }
            DrillEvent::SessionFailed { reason } => {
                error!("Drill session failed: {}", reason);
            }
            DrillEvent::SessionCompleted { summaries } => {
                info!("Drill session completed with {} repeats", summaries.len());
            }
            _ => {}
        }

        self.sender
            .send(event)
            .map_err(|e| EventBusError::PublishFailed {
                details: e.to_string(),
            })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            debug_logging: self.debug_logging,
        }
    }
}

/// Event filter for selective event handling
#[derive(Debug, Clone)]
pub enum EventFilter {
    All,
    EventTypes(Vec<&'static str>),
    /// Events that concern one repeat
    Repeat(u32),
    Custom(fn(&DrillEvent) -> bool),
}

impl EventFilter {
    pub fn matches(&self, event: &DrillEvent) -> bool {
        match self {
            EventFilter::All => true,
            EventFilter::EventTypes(types) => types.contains(&event.event_type()),
            EventFilter::Repeat(wanted) => match event {
                DrillEvent::ReadinessCheckStarted { repeat, .. }
                | DrillEvent::RepeatArmed { repeat, .. }
                | DrillEvent::BeepFired { repeat }
                | DrillEvent::ShotAccepted { repeat, .. }
                | DrillEvent::RepeatStopped { repeat } => repeat == wanted,
                DrillEvent::RepeatFinalized { summary } => summary.repeat_index == *wanted,
                _ => false,
            },
            EventFilter::Custom(filter_fn) => filter_fn(event),
        }
    }
}

/// Event receiver with filtering
pub struct EventReceiver {
    receiver: broadcast::Receiver<DrillEvent>,
    filter: EventFilter,
    name: String,
}

impl EventReceiver {
    pub fn new(receiver: broadcast::Receiver<DrillEvent>, filter: EventFilter, name: String) -> Self {
        Self {
            receiver,
            filter,
            name,
        }
    }

    /// Receive the next filtered event
    pub async fn recv(&mut self) -> Result<DrillEvent, EventBusError> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        debug!(
                            "Receiver '{}' received event: {}",
                            self.name,
                            event.description()
                        );
                        return Ok(event);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("Event bus closed for receiver '{}'", self.name);
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Result<Option<DrillEvent>, EventBusError> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.filter.matches(&event) {
                        return Ok(Some(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return Ok(None),
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    warn!("Receiver '{}' lagged behind by {} events", self.name, n);
                    return Err(EventBusError::PublishFailed {
                        details: format!("Receiver lagged behind by {} events", n),
                    });
                }
                Err(broadcast::error::TryRecvError::Closed) => {
                    return Err(EventBusError::ChannelClosed);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{timeout, Duration};

    #[tokio::test]
    async fn test_event_bus_basic_operations() {
        let event_bus = EventBus::new(10);
        let mut receiver = event_bus.subscribe();

        let subscriber_count = event_bus
            .publish(DrillEvent::BeepFired { repeat: 2 })
            .await
            .unwrap();
        assert_eq!(subscriber_count, 1);

        match receiver.recv().await.unwrap() {
            DrillEvent::BeepFired { repeat } => assert_eq!(repeat, 2),
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_fails() {
        let event_bus = EventBus::new(10);
        assert!(!event_bus.has_subscribers());
        assert!(event_bus
            .publish(DrillEvent::SessionStopped)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let event_bus = EventBus::new(10);
        let mut receiver1 = event_bus.subscribe();
        let mut receiver2 = event_bus.subscribe();
        assert_eq!(event_bus.subscriber_count(), 2);

        event_bus
            .publish(DrillEvent::RepeatStopped { repeat: 1 })
            .await
            .unwrap();

        let _ = timeout(Duration::from_millis(100), receiver1.recv())
            .await
            .unwrap()
            .unwrap();
        let _ = timeout(Duration::from_millis(100), receiver2.recv())
            .await
            .unwrap()
            .unwrap();
    }

    #[test]
    fn test_repeat_filter() {
        let filter = EventFilter::Repeat(2);
        assert!(filter.matches(&DrillEvent::BeepFired { repeat: 2 }));
        assert!(!filter.matches(&DrillEvent::BeepFired { repeat: 1 }));
        assert!(!filter.matches(&DrillEvent::ReadinessUpdate { ready: 1, total: 2 }));
    }

    #[tokio::test]
    async fn test_filtered_receiver() {
        let event_bus = EventBus::new(10);
        let mut filtered = event_bus.subscribe_filtered(
            EventFilter::EventTypes(vec!["shot_accepted"]),
            "test",
        );

        event_bus
            .publish(DrillEvent::BeepFired { repeat: 1 })
            .await
            .unwrap();
        event_bus
            .publish(DrillEvent::ShotAccepted {
                repeat: 1,
                device: "target-1".to_string(),
                hit_area: "azone".to_string(),
                time_offset: 0.42,
            })
            .await
            .unwrap();

        let received = timeout(Duration::from_millis(100), filtered.recv())
            .await
            .unwrap()
            .unwrap();
        match received {
            DrillEvent::ShotAccepted { device, .. } => assert_eq!(device, "target-1"),
            other => panic!("Unexpected event: {:?}", other),
        }
        assert!(filtered.try_recv().unwrap().is_none());
    }

    #[test]
    fn test_event_properties() {
        let event = DrillEvent::RepeatArmed {
            repeat: 3,
            delay_seconds: 2.5,
        };
        assert_eq!(event.event_type(), "repeat_armed");
        assert!(event.description().contains("2.50"));
        assert!(!event.is_terminal());
        assert!(DrillEvent::SessionStopped.is_terminal());
    }
}
