use chrono::{DateTime, Utc};
use scanhive_common::{JobId, JobRole, JobStatus, ModuleName, ScanStatus};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ScanRecord {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub status: String,
    pub execution_mode: String,
    pub assets_requested: i32,
    pub assets_completed: i32,
    pub assets_failed: i32,
    pub correlation_id: String,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl ScanRecord {
    pub fn status(&self) -> ScanStatus {
        parse_scan_status(&self.status)
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ModuleJobRecord {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub asset_id: Uuid,
    pub module: String,
    pub role: String,
    pub status: String,
    pub task_handle: Option<String>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_count: Option<i64>,
    pub error_message: Option<String>,
}

impl ModuleJobRecord {
    pub fn module(&self) -> ModuleName {
        ModuleName::from(self.module.clone())
    }

    pub fn role(&self) -> JobRole {
        match self.role.as_str() {
            "producer" => JobRole::Producer,
            _ => JobRole::Consumer,
        }
    }

    pub fn status(&self) -> JobStatus {
        parse_job_status(&self.status)
    }
}

/// Minimal shape returned by the hot `get_job_statuses` poll (§4.2): no row
/// beyond what the pipeline's monitoring loop needs to decide whether to
/// keep waiting.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct JobStatusRow {
    pub id: Uuid,
    pub module: String,
    pub status: String,
    pub completed_at: Option<DateTime<Utc>>,
}

impl JobStatusRow {
    pub fn job_id(&self) -> JobId {
        self.id
    }

    pub fn module(&self) -> ModuleName {
        ModuleName::from(self.module.clone())
    }

    pub fn status(&self) -> JobStatus {
        parse_job_status(&self.status)
    }
}

/// Aggregate counters written back onto the Scan Record at finalization
/// (§4.6): `assets_completed`/`assets_failed` plus the scan's own terminal
/// status, computed by the orchestrator from per-pipeline outcomes.
#[derive(Debug, Clone, Copy)]
pub struct ScanAggregate {
    pub status: ScanStatus,
    pub assets_completed: i32,
    pub assets_failed: i32,
}

pub(crate) fn job_status_str(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "pending",
        JobStatus::Running => "running",
        JobStatus::Completed => "completed",
        JobStatus::Failed => "failed",
        JobStatus::Timeout => "timeout",
    }
}

pub(crate) fn scan_status_str(status: ScanStatus) -> &'static str {
    match status {
        ScanStatus::Pending => "pending",
        ScanStatus::Running => "running",
        ScanStatus::Completed => "completed",
        ScanStatus::PartialFailure => "partial_failure",
        ScanStatus::Failed => "failed",
        ScanStatus::Cancelled => "cancelled",
    }
}

pub(crate) fn role_str(role: JobRole) -> &'static str {
    match role {
        JobRole::Producer => "producer",
        JobRole::Consumer => "consumer",
    }
}

fn parse_job_status(s: &str) -> JobStatus {
    match s {
        "pending" => JobStatus::Pending,
        "running" => JobStatus::Running,
        "completed" => JobStatus::Completed,
        "failed" => JobStatus::Failed,
        _ => JobStatus::Timeout,
    }
}

fn parse_scan_status(s: &str) -> ScanStatus {
    match s {
        "pending" => ScanStatus::Pending,
        "running" => ScanStatus::Running,
        "completed" => ScanStatus::Completed,
        "partial_failure" => ScanStatus::PartialFailure,
        "failed" => ScanStatus::Failed,
        _ => ScanStatus::Cancelled,
    }
}
