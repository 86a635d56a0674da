use std::collections::HashMap;

use scanhive_common::{AssetId, JobId, JobRole, ScanId};
use scanhive_registry::ResourceTier;
use serde::{Deserialize, Serialize};

/// Network placement taken from configuration, never hard-coded (§9).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Placement {
    pub security_group_ids: Vec<String>,
    pub subnet_ids: Vec<String>,
}

/// Everything the launcher needs to start one worker container (§4.4,
/// §6.2's downbound environment contract).
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub scan_id: ScanId,
    pub asset_id: AssetId,
    pub job_id: JobId,
    pub image_ref: String,
    pub container_name: String,
    pub role: JobRole,
    pub batch_size: i64,
    pub resource_tiers: Vec<ResourceTier>,
    pub env: HashMap<String, String>,
    pub placement: Placement,
}

/// Opaque handle to a launched worker, round-tripped through the Job
/// Store's `task_handle` column.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskHandle(pub String);

impl std::fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Pending,
    Running,
    Stopped,
}

/// Coarse liveness snapshot (§4.4): never authoritative for business
/// completion, used only for health/retry decisions.
#[derive(Debug, Clone)]
pub struct TaskDisposition {
    pub lifecycle: Lifecycle,
    pub exit_code: Option<i32>,
    pub stopped_reason: Option<String>,
}

/// Standard environment variable names every worker receives (§6.2).
pub mod env_keys {
    pub const SCAN_ID: &str = "SCAN_ID";
    pub const ASSET_ID: &str = "ASSET_ID";
    pub const JOB_ID: &str = "JOB_ID";
    pub const MODULE_ROLE: &str = "MODULE_ROLE";
    pub const STREAM_KEY: &str = "STREAM_KEY";
    pub const CONSUMER_GROUP: &str = "CONSUMER_GROUP";
    pub const OUTPUT_STREAM_KEY: &str = "OUTPUT_STREAM_KEY";
}
