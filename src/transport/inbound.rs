use crate::error::DrillError;
use serde_json::Value;

/// Notifications delivered by the transport
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// A device acknowledged the readiness query
    DeviceReady { device: String },
    /// A shot notification; `raw` is decoded by the shot collector
    ShotReceived { device: Option<String>, raw: Value },
    /// A device reports the end of its repeat
    RepeatEnded {
        device: String,
        drill_duration: Option<f64>,
    },
}

impl TransportEvent {
    /// Decode a notification received as JSON text
    pub fn decode(text: &str) -> Result<Self, DrillError> {
        let value: Value =
            serde_json::from_str(text).map_err(|e| DrillError::MalformedShotPayload {
                details: format!("invalid JSON: {}", e),
            })?;
        Self::from_json(value)
    }

    /// Classify a decoded notification.
    ///
    /// Forwarded acks look like `{"type":"netlink","action":"forward",
    /// "device":"t1","content":{"ack":"ready"}}`; anything else carrying a
    /// `content` object (or a bare shot body) is treated as a shot.
    pub fn from_json(value: Value) -> Result<Self, DrillError> {
        let device = value
            .get("device")
            .and_then(Value::as_str)
            .map(str::to_string);
        let content = value.get("content").filter(|c| c.is_object());

        if let Some(ack) = content.and_then(|c| c.get("ack")).and_then(Value::as_str) {
            let device = device.ok_or_else(|| DrillError::MalformedShotPayload {
                details: format!("'{}' ack without a device", ack),
            })?;
            return match ack {
                "ready" => Ok(TransportEvent::DeviceReady { device }),
                "end" => Ok(TransportEvent::RepeatEnded {
                    device,
                    drill_duration: content
                        .and_then(|c| c.get("drill_duration"))
                        .and_then(Value::as_f64),
                }),
                other => Err(DrillError::MalformedShotPayload {
                    details: format!("unknown ack '{}'", other),
                }),
            };
        }

        if content.is_some() || value.get("ha").is_some() || value.get("hit_area").is_some() {
            let device = device.or_else(|| {
                content
                    .and_then(|c| c.get("device"))
                    .and_then(Value::as_str)
                    .map(str::to_string)
            });
            return Ok(TransportEvent::ShotReceived { device, raw: value });
        }

        Err(DrillError::MalformedShotPayload {
            details: "notification has neither an ack nor a shot body".to_string(),
        })
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            TransportEvent::DeviceReady { .. } => "device_ready",
            TransportEvent::ShotReceived { .. } => "shot_received",
            TransportEvent::RepeatEnded { .. } => "repeat_ended",
        }
    }
}
