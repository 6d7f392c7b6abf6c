use super::{Transport, TransportCommand, TransportEvent};
use crate::error::TransportError;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

/// In-memory transport for tests and for running without target hardware.
///
/// Outbound commands are recorded; inbound notifications are injected through
/// the helper methods and delivered on the receiver returned by [`MockTransport::new`].
pub struct MockTransport {
    sent: Mutex<Vec<TransportCommand>>,
    failing: AtomicBool,
    inbound: mpsc::UnboundedSender<TransportEvent>,
}

impl MockTransport {
    /// Create a mock transport and the inbound receiver to hand to the session
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<TransportEvent>) {
        let (inbound, receiver) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            sent: Mutex::new(Vec::new()),
            failing: AtomicBool::new(false),
            inbound,
        });
        (transport, receiver)
    }

    /// Make every following `send` fail as if the link dropped
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// All commands written so far
    pub fn sent_commands(&self) -> Vec<TransportCommand> {
        self.sent.lock().clone()
    }

    /// Commands whose content `command` field equals `name`
    pub fn commands_named(&self, name: &str) -> Vec<TransportCommand> {
        self.sent
            .lock()
            .iter()
            .filter(|c| c.command_name() == Some(name))
            .cloned()
            .collect()
    }

    pub fn inject(&self, event: TransportEvent) {
        debug!("Mock transport injecting {}", event.event_type());
        let _ = self.inbound.send(event);
    }

    pub fn device_ready(&self, device: &str) {
        self.inject(TransportEvent::DeviceReady {
            device: device.to_string(),
        });
    }

    /// Inject a shot in the compact field format targets use on the wire
    pub fn shot(&self, device: &str, hit_area: &str, time_offset: f64) {
        self.shot_raw(
            device,
            json!({
                "cmd": "shot",
                "ha": hit_area,
                "hp": { "x": 200.0, "y": 320.0 },
                "tt": "ipsc",
                "td": time_offset,
            }),
        );
    }

    /// Inject a shot with an arbitrary content body
    pub fn shot_raw(&self, device: &str, content: Value) {
        self.inject(TransportEvent::ShotReceived {
            device: Some(device.to_string()),
            raw: json!({ "type": "netlink", "action": "forward", "device": device, "content": content }),
        });
    }

    pub fn repeat_ended(&self, device: &str, drill_duration: Option<f64>) {
        self.inject(TransportEvent::RepeatEnded {
            device: device.to_string(),
            drill_duration,
        });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, command: &TransportCommand) -> Result<(), TransportError> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(TransportError::WriteFailed {
                dest: command.dest.clone(),
                details: "mock link down".to_string(),
            });
        }
        self.sent.lock().push(command.clone());
        Ok(())
    }
}
