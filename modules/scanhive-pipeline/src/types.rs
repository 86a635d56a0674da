use std::collections::HashMap;
use std::time::Duration;

use scanhive_common::{AssetId, JobStatus, ModuleName, ScanId};
use serde::{Deserialize, Serialize};

/// One asset's requested module set and per-run options, as handed to the
/// orchestrator (§4.6) and fanned out one-per-asset to this crate.
#[derive(Debug, Clone)]
pub struct AssetRequest {
    pub asset_id: AssetId,
    pub modules: Vec<ModuleName>,
    /// Unit count driving the launcher's resource tier selection (§4.4),
    /// e.g. the number of targets the producer will enumerate.
    pub batch_size: i64,
}

/// Per-run timing knobs (§4.5.3's recommended values, loaded from
/// `scanhive_common::Config` by the caller rather than hard-coded here).
#[derive(Debug, Clone, Copy)]
pub struct PipelineTiming {
    pub poll_interval: Duration,
    pub health_check_interval: Duration,
    pub startup_grace_period: Duration,
    pub timeout: Duration,
}

/// Completion classification per §4.5.3's aggregation rule. A per-job
/// `Timeout` status still counts toward `F` here — it is surfaced
/// separately via `PipelineOutcome::timed_out` for diagnostics, not as a
/// fourth aggregate bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Completed,
    PartialFailure,
    Failed,
}

/// What one `StreamingPipeline::run` call returns once every job has reached
/// a terminal status, or the overall timeout budget elapsed.
#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub asset_id: AssetId,
    pub status: PipelineStatus,
    /// True iff the monitoring loop broke on the timeout branch rather than
    /// because every job reached a terminal status on its own.
    pub timed_out: bool,
    pub producer: ModuleName,
    pub job_statuses: HashMap<ModuleName, JobStatus>,
    pub elapsed: Duration,
    pub polls: u32,
}

impl PipelineOutcome {
    pub fn successes(&self) -> usize {
        self.job_statuses
            .values()
            .filter(|s| s.is_success())
            .count()
    }

    pub fn total(&self) -> usize {
        self.job_statuses.len()
    }
}

/// One progress tick emitted by the monitoring loop (§4.5.3). Advisory only —
/// `stream_pending` / `stream_eos_seen` are never used to infer completion.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub scan_id: ScanId,
    pub asset_id: AssetId,
    pub poll: u32,
    pub terminal_jobs: usize,
    pub total_jobs: usize,
    pub stream_pending: Option<i64>,
    pub stream_eos_seen: Option<bool>,
}
