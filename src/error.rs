use thiserror::Error;

#[derive(Error, Debug)]
pub enum DrillError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("Readiness check timed out; no response from: {}", devices.join(", "))]
    ReadinessTimeout { devices: Vec<String> },

    #[error("Transport send failed: {0}")]
    TransportSendFailure(#[from] TransportError),

    #[error("Malformed shot payload: {details}")]
    MalformedShotPayload { details: String },

    #[error("Duplicate shot from {device} at {time_offset:.3}s")]
    DuplicateShot { device: String, time_offset: f64 },

    #[error("Repeat {repeat} was not finalized in time")]
    FinalizeTimeout { repeat: u32 },

    #[error("Drill session is no longer running")]
    SessionClosed,

    #[error("Invalid state: {message}")]
    InvalidState { message: String },

    #[error("Component error in {component}: {message}")]
    Component { component: String, message: String },
}

impl DrillError {
    pub fn component<S: Into<String>>(component: S, message: S) -> Self {
        Self::Component {
            component: component.into(),
            message: message.into(),
        }
    }

    pub fn invalid_state<S: Into<String>>(message: S) -> Self {
        Self::InvalidState {
            message: message.into(),
        }
    }

    /// Whether the caller can carry on with the session after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            DrillError::ReadinessTimeout { .. }
                | DrillError::MalformedShotPayload { .. }
                | DrillError::DuplicateShot { .. }
                | DrillError::InvalidState { .. }
        )
    }

    /// Message suitable for showing to the shooter
    pub fn user_message(&self) -> String {
        match self {
            DrillError::ReadinessTimeout { devices } => {
                format!("Targets not ready: {}", devices.join(", "))
            }
            DrillError::TransportSendFailure(_) | DrillError::FinalizeTimeout { .. } => {
                "The drill could not be completed. Check the target connection and try again."
                    .to_string()
            }
            other => other.to_string(),
        }
    }
}

/// Errors raised by the transport collaborator
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    #[error("Transport not connected")]
    NotConnected,

    #[error("Write to {dest} failed: {details}")]
    WriteFailed { dest: String, details: String },

    #[error("Failed to encode command: {details}")]
    Encode { details: String },
}

/// Errors raised by the event bus
#[derive(Error, Debug)]
pub enum EventBusError {
    #[error("Failed to publish event: {details}")]
    PublishFailed { details: String },

    #[error("Event channel closed")]
    ChannelClosed,
}

pub type Result<T> = std::result::Result<T, DrillError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_readiness_timeout_is_recoverable() {
        let err = DrillError::ReadinessTimeout {
            devices: vec!["target-2".to_string()],
        };
        assert!(err.is_recoverable());
        assert_eq!(err.user_message(), "Targets not ready: target-2");
    }

    #[test]
    fn test_transport_failure_is_fatal() {
        let err: DrillError = TransportError::NotConnected.into();
        assert!(!err.is_recoverable());
        assert!(err.to_string().contains("not connected"));
    }
}
