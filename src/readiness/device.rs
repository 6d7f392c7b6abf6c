use serde::{Deserialize, Serialize};

/// A target the session expects to take part in every repeat
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExpectedDevice {
    pub name: String,
    /// Target face forwarded in the readiness query (ipsc, paddle, popper, ...)
    #[serde(default)]
    pub target_type: Option<String>,
}

impl ExpectedDevice {
    pub fn new<S: Into<String>>(name: S) -> Self {
        Self {
            name: name.into(),
            target_type: None,
        }
    }

    pub fn with_target_type<S: Into<String>>(mut self, target_type: S) -> Self {
        self.target_type = Some(target_type.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReadinessState {
    Unknown,
    Ready,
}
