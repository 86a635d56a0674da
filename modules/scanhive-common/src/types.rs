use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Role of a Module Job within its pipeline. Exactly one producer per
/// `(scan_id, asset_id)` (invariant I3); everything else is a consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobRole {
    Producer,
    Consumer,
}

impl std::fmt::Display for JobRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobRole::Producer => write!(f, "producer"),
            JobRole::Consumer => write!(f, "consumer"),
        }
    }
}

/// Module Job Record status (§3). Transitions are `pending -> running ->
/// {completed | failed | timeout}`; the last three are terminal and
/// write-once from the pipeline's point of view (only the worker writes
/// them; see I5).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Timeout,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed | JobStatus::Timeout)
    }

    pub fn is_success(self) -> bool {
        matches!(self, JobStatus::Completed)
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Timeout => "timeout",
        };
        write!(f, "{s}")
    }
}

/// Scan Record status (§3). `pending -> running -> terminal` once each;
/// terminal is write-once (I1, §4.6 ordering guarantees).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    PartialFailure,
    Failed,
    Cancelled,
}

impl ScanStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ScanStatus::Pending | ScanStatus::Running)
    }
}

impl std::fmt::Display for ScanStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::PartialFailure => "partial_failure",
            ScanStatus::Failed => "failed",
            ScanStatus::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_status_terminality() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Timeout.is_terminal());
    }

    #[test]
    fn scan_status_terminality() {
        assert!(!ScanStatus::Pending.is_terminal());
        assert!(!ScanStatus::Running.is_terminal());
        assert!(ScanStatus::Completed.is_terminal());
        assert!(ScanStatus::PartialFailure.is_terminal());
        assert!(ScanStatus::Failed.is_terminal());
        assert!(ScanStatus::Cancelled.is_terminal());
    }
}
