//! Scan Orchestrator (§4.6): validates a multi-asset request, creates the
//! Scan Record, and runs one Streaming Pipeline per asset in the
//! background, bounded by a per-scan concurrency limit. The orchestrator
//! never decides job-level completion itself — it only aggregates the
//! per-asset `PipelineStatus` values the pipeline already computed from
//! the Job Store.

pub mod error;
pub mod types;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use scanhive_common::cancel::CancelToken;
use scanhive_common::{AssetId, ScanId, ScanStatus};
use scanhive_jobstore::JobStore;
use scanhive_pipeline::{AssetRequest, PipelineStatus, StreamingPipeline};
use scanhive_registry::ModuleRegistry;
use tokio::sync::Semaphore;
use tracing::{info, warn};

pub use error::OrchestratorError;
pub use types::{AssetSpec, AssetView, ModuleJobView, ScanRequest, ScanSummary, ScanView};

pub struct ScanOrchestrator {
    registry: Arc<ModuleRegistry>,
    jobs: JobStore,
    pipeline: Arc<StreamingPipeline>,
    max_parallel_assets_per_scan: usize,
    /// Cancel tokens for scans with background execution still in flight,
    /// so `cancel_scan` can reach a running pipeline fan-out. Entries are
    /// removed once the scan reaches a terminal status.
    active: Arc<Mutex<HashMap<ScanId, CancelToken>>>,
}

impl ScanOrchestrator {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        jobs: JobStore,
        pipeline: Arc<StreamingPipeline>,
        max_parallel_assets_per_scan: usize,
    ) -> Self {
        Self {
            registry,
            jobs,
            pipeline,
            max_parallel_assets_per_scan,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// §4.6 step 1. Ownership of each asset is delegated to the external
    /// auth layer (§4.6, §6.3) — this only checks shape and module
    /// validity against the Module Registry snapshot.
    fn validate(&self, request: &ScanRequest) -> Result<(), OrchestratorError> {
        if request.assets.is_empty() {
            return Err(OrchestratorError::EmptyRequest);
        }
        for (asset_id, spec) in &request.assets {
            if spec.modules.is_empty() {
                return Err(OrchestratorError::EmptyModuleSet(*asset_id));
            }
            for module in &spec.modules {
                if !self.registry.is_enabled(module) {
                    return Err(OrchestratorError::UnknownModule {
                        asset_id: *asset_id,
                        module: module.clone(),
                    });
                }
            }
        }
        Ok(())
    }

    /// §4.6, §6.1: validates, inserts the Scan Record `pending`, launches
    /// background execution, and returns within tens of milliseconds —
    /// none of the per-asset pipeline work happens before this returns.
    pub async fn execute_scan(&self, request: ScanRequest) -> Result<ScanSummary, OrchestratorError> {
        self.validate(&request)?;

        let scan = self
            .jobs
            .create_scan(request.owner_id, request.assets.len() as i32)
            .await?;

        let cancel = CancelToken::new();
        self.active.lock().unwrap().insert(scan.id, cancel.clone());

        let jobs = self.jobs.clone();
        let pipeline = self.pipeline.clone();
        let max_parallel = self.max_parallel_assets_per_scan;
        let scan_id = scan.id;
        let assets = request.assets;
        let active = self.active.clone();

        tokio::spawn(async move {
            run_scan(jobs, pipeline, scan_id, assets, max_parallel, cancel).await;
            active.lock().unwrap().remove(&scan_id);
        });

        Ok(ScanSummary {
            scan_id: scan.id,
            status: scan.status(),
            execution_mode: scan.execution_mode.clone(),
            assets_count: scan.assets_requested.max(0) as usize,
            estimated_seconds: None,
            correlation_id: scan.correlation_id.clone(),
        })
    }

    /// §6.1 read path: the Scan Record plus every child Module Job Record,
    /// grouped per asset. Read-only; safe under §4.5's concurrent writers
    /// because it is a plain `SELECT` against Postgres's own MVCC snapshot.
    pub async fn get_scan(&self, scan_id: ScanId) -> Result<ScanView, OrchestratorError> {
        let scan = self.jobs.get_scan(scan_id).await?;
        let records = self.jobs.list_jobs(scan_id).await?;

        let mut by_asset: HashMap<AssetId, Vec<ModuleJobView>> = HashMap::new();
        for record in records {
            by_asset.entry(record.asset_id).or_default().push(ModuleJobView {
                module: record.module(),
                role: record.role(),
                status: record.status(),
                started_at: record.started_at,
                completed_at: record.completed_at,
                result_count: record.result_count,
            });
        }

        let per_asset = by_asset
            .into_iter()
            .map(|(asset_id, per_module)| AssetView { asset_id, per_module })
            .collect();

        Ok(ScanView {
            scan_id: scan.id,
            owner_id: scan.owner_id,
            status: scan.status(),
            execution_mode: scan.execution_mode,
            assets_requested: scan.assets_requested,
            assets_completed: scan.assets_completed,
            assets_failed: scan.assets_failed,
            correlation_id: scan.correlation_id,
            requested_at: scan.requested_at,
            started_at: scan.started_at,
            completed_at: scan.completed_at,
            per_asset,
        })
    }

    /// Propagates a scan-level cancel to every still-running per-asset
    /// pipeline (§5 "the orchestrator may propagate a scan-level
    /// cancellation to all pipelines"). A no-op if the scan has already
    /// finished or never started.
    pub fn cancel_scan(&self, scan_id: ScanId) {
        if let Some(cancel) = self.active.lock().unwrap().get(&scan_id) {
            cancel.cancel();
        }
    }
}

/// The background execution task spawned by `execute_scan` (§4.6 step 3).
async fn run_scan(
    jobs: JobStore,
    pipeline: Arc<StreamingPipeline>,
    scan_id: ScanId,
    assets: HashMap<AssetId, AssetSpec>,
    max_parallel: usize,
    cancel: CancelToken,
) {
    if let Err(err) = jobs.mark_scan_running(scan_id).await {
        warn!(scan_id = %scan_id, error = %err, "failed to transition scan to running");
    }

    let semaphore = Arc::new(Semaphore::new(max_parallel.max(1)));

    let outcomes = futures::future::join_all(assets.into_iter().map(|(asset_id, spec)| {
        let jobs = jobs.clone();
        let pipeline = pipeline.clone();
        let semaphore = semaphore.clone();
        let cancel = cancel.clone();
        async move {
            let _permit = semaphore.acquire_owned().await.expect("semaphore is never closed");
            let request = AssetRequest {
                asset_id,
                modules: spec.modules,
                batch_size: spec.batch_size,
            };
            let result = pipeline.run(scan_id, request, cancel).await;

            match &result {
                Ok(outcome) => {
                    let (completed_delta, failed_delta) = match outcome.status {
                        PipelineStatus::Completed => (1, 0),
                        PipelineStatus::Failed => (0, 1),
                        // §4.6 scenario 3: a partial-failure asset bumps
                        // neither counter — no `assets_partial` column
                        // exists in this schema (DESIGN.md open-question
                        // decision).
                        PipelineStatus::PartialFailure => (0, 0),
                    };
                    if completed_delta != 0 || failed_delta != 0 {
                        if let Err(err) = jobs.bump_asset_counters(scan_id, completed_delta, failed_delta).await {
                            warn!(scan_id = %scan_id, asset_id = %asset_id, error = %err, "failed to bump asset counters");
                        }
                    }
                }
                Err(err) => {
                    warn!(scan_id = %scan_id, asset_id = %asset_id, error = %err, "asset pipeline returned an error before producing an outcome");
                }
            }

            result.ok().map(|outcome| outcome.status)
        }
    }))
    .await;

    let aggregate_status = aggregate_scan_status(&outcomes);
    let assets_completed = outcomes.iter().filter(|s| *s == &Some(PipelineStatus::Completed)).count() as i32;
    let assets_failed = outcomes
        .iter()
        .filter(|s| matches!(s, Some(PipelineStatus::Failed) | None))
        .count() as i32;

    if let Err(err) = jobs
        .finalize_scan(
            scan_id,
            scanhive_jobstore::ScanAggregate {
                status: aggregate_status,
                assets_completed,
                assets_failed,
            },
        )
        .await
    {
        warn!(scan_id = %scan_id, error = %err, "failed to finalize scan");
    } else {
        info!(scan_id = %scan_id, status = %aggregate_status, "scan finalized");
    }
}

/// §4.6's top-level rule: `completed` iff every pipeline returned
/// `completed`, `failed` iff every pipeline returned `failed`,
/// `partial_failure` otherwise. A pipeline that errored out before
/// producing an outcome (infrastructure failure, ambiguous producer) is
/// treated as a failed asset for this purpose.
fn aggregate_scan_status(outcomes: &[Option<PipelineStatus>]) -> ScanStatus {
    let total = outcomes.len();
    let completed = outcomes.iter().filter(|s| *s == &Some(PipelineStatus::Completed)).count();
    let failed = outcomes
        .iter()
        .filter(|s| matches!(s, Some(PipelineStatus::Failed) | None))
        .count();

    if completed == total {
        ScanStatus::Completed
    } else if failed == total {
        ScanStatus::Failed
    } else {
        ScanStatus::PartialFailure
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_scan_status_all_completed() {
        let outcomes = vec![Some(PipelineStatus::Completed), Some(PipelineStatus::Completed)];
        assert_eq!(aggregate_scan_status(&outcomes), ScanStatus::Completed);
    }

    #[test]
    fn aggregate_scan_status_all_failed() {
        let outcomes = vec![Some(PipelineStatus::Failed), None];
        assert_eq!(aggregate_scan_status(&outcomes), ScanStatus::Failed);
    }

    #[test]
    fn aggregate_scan_status_mixed_is_partial_failure() {
        let outcomes = vec![
            Some(PipelineStatus::Completed),
            Some(PipelineStatus::PartialFailure),
            Some(PipelineStatus::Failed),
        ];
        assert_eq!(aggregate_scan_status(&outcomes), ScanStatus::PartialFailure);
    }
}
