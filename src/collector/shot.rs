use crate::error::{DrillError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Where the hit landed on the target face
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct HitPosition {
    pub x: f64,
    pub y: f64,
}

/// A decoded shot attributed to a repeat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShotEvent {
    pub device: String,
    pub hit_area: String,
    pub hit_position: HitPosition,
    pub target_type: String,
    /// Seconds between the start signal and the shot, as timed by the target
    pub time_offset: f64,
    pub rotation_angle: Option<f64>,
    /// Seconds between the start signal and the notification reaching the engine
    pub arrival_offset: f64,
    pub raw: Value,
}

/// Shot body as sent by the targets. Firmware revisions disagree on key
/// names, so every field accepts the long, short and camel-case spelling.
#[derive(Debug, Deserialize)]
struct ShotPayload {
    #[serde(alias = "ha", alias = "hitArea")]
    hit_area: String,
    #[serde(default, alias = "hp", alias = "hitPosition")]
    hit_position: Option<HitPosition>,
    #[serde(default, alias = "tt", alias = "targetType")]
    target_type: Option<String>,
    #[serde(alias = "td", alias = "timeDiff")]
    time_diff: f64,
    #[serde(default, alias = "rep")]
    repeat: Option<u32>,
    #[serde(default, alias = "rot")]
    rotation_angle: Option<f64>,
    #[serde(default)]
    device: Option<String>,
}

impl ShotEvent {
    /// Decode a raw shot notification.
    ///
    /// Returns the event together with the repeat number the target tagged it
    /// with, if any.
    pub(crate) fn decode(
        device_hint: Option<&str>,
        raw: &Value,
        arrival_offset: f64,
    ) -> Result<(ShotEvent, Option<u32>)> {
        let body = raw.get("content").filter(|c| c.is_object()).unwrap_or(raw);

        let payload: ShotPayload =
            serde_json::from_value(body.clone()).map_err(|e| DrillError::MalformedShotPayload {
                details: e.to_string(),
            })?;

        let hit_area = payload.hit_area.trim().to_string();
        if hit_area.is_empty() {
            return Err(DrillError::MalformedShotPayload {
                details: "empty hit area".to_string(),
            });
        }

        if !payload.time_diff.is_finite() {
            return Err(DrillError::MalformedShotPayload {
                details: format!("time offset {} is not finite", payload.time_diff),
            });
        }

        let device = device_hint
            .map(str::to_string)
            .or(payload.device)
            .or_else(|| {
                ["device", "target"]
                    .iter()
                    .find_map(|key| raw.get(*key).and_then(Value::as_str))
                    .map(str::to_string)
            })
            .ok_or_else(|| DrillError::MalformedShotPayload {
                details: "shot without a device".to_string(),
            })?;

        let event = ShotEvent {
            device,
            hit_area,
            hit_position: payload.hit_position.unwrap_or_default(),
            target_type: payload.target_type.unwrap_or_default(),
            time_offset: payload.time_diff,
            rotation_angle: payload.rotation_angle,
            arrival_offset,
            raw: raw.clone(),
        };

        Ok((event, payload.repeat))
    }

    /// Hit area normalised for comparisons
    pub fn zone(&self) -> String {
        self.hit_area.trim().to_lowercase()
    }
}
