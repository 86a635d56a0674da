use std::collections::HashMap;

use chrono::{DateTime, Utc};
use scanhive_common::{AssetId, JobRole, JobStatus, ModuleName, ScanId, ScanStatus};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One asset's requested module set within a multi-asset `execute_scan`
/// call (§6.1's request shape).
#[derive(Debug, Clone, Deserialize)]
pub struct AssetSpec {
    pub modules: Vec<ModuleName>,
    /// Unit count driving the launcher's resource tier selection (§4.4).
    /// Defaults to 1 when the caller has no better estimate.
    #[serde(default = "default_batch_size")]
    pub batch_size: i64,
}

fn default_batch_size() -> i64 {
    1
}

/// The `execute_scan` request body (§6.1).
#[derive(Debug, Clone, Deserialize)]
pub struct ScanRequest {
    pub owner_id: Uuid,
    pub assets: HashMap<AssetId, AssetSpec>,
}

/// What `execute_scan` returns once the Scan Record exists and background
/// execution has been launched (§6.1): a fire-and-acknowledge response, not
/// the final outcome.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub scan_id: ScanId,
    pub status: ScanStatus,
    pub execution_mode: String,
    pub assets_count: usize,
    pub estimated_seconds: Option<i64>,
    pub correlation_id: String,
}

/// One module's row within the `get_scan` per-asset breakdown (§6.1).
#[derive(Debug, Clone, Serialize)]
pub struct ModuleJobView {
    pub module: ModuleName,
    pub role: JobRole,
    pub status: JobStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result_count: Option<i64>,
}

/// One asset's module breakdown within the `get_scan` read path.
#[derive(Debug, Clone, Serialize)]
pub struct AssetView {
    pub asset_id: AssetId,
    pub per_module: Vec<ModuleJobView>,
}

/// The full `get_scan(scan_id)` result: the Scan Record plus an aggregate of
/// its child Module Job Records joined by scan id (§4.6 step 4).
#[derive(Debug, Clone, Serialize)]
pub struct ScanView {
    pub scan_id: ScanId,
    pub owner_id: Uuid,
    pub status: ScanStatus,
    pub execution_mode: String,
    pub assets_requested: i32,
    pub assets_completed: i32,
    pub assets_failed: i32,
    pub correlation_id: String,
    pub requested_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub per_asset: Vec<AssetView>,
}
