use crate::scoring::DrillRepeatSummary;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Running,
    Completed,
    Failed,
}

/// Read-only view of a drill session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    /// Name of the current clock phase
    pub phase: String,
    pub current_repeat: u32,
    pub total_repeats: u32,
    /// Start delay used for each armed repeat, in seconds
    pub delays_used: Vec<f64>,
    /// Shots buffered for the repeat that is still open
    pub open_shots: usize,
    pub summaries: Vec<DrillRepeatSummary>,
}

impl SessionSnapshot {
    pub fn is_running(&self) -> bool {
        self.status == SessionStatus::Running
    }
}
