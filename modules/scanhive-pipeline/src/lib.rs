//! Streaming Pipeline (§4.5): for one asset and a requested module set,
//! resolve dependencies, launch the producer and consumer workers, monitor
//! them to a terminal aggregate using Job Store status as the sole
//! authority, and return a structured outcome. This is the largest
//! component of the scan-execution core — everything upstream (Module
//! Registry, Job Store, Stream Bus, Worker Launcher) exists to serve this
//! one sequence correctly.

pub mod error;
pub mod types;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use scanhive_common::cancel::CancelToken;
use scanhive_common::depgraph;
use scanhive_common::{AssetId, JobId, JobRole, JobStatus, ModuleName, ScanId};
use scanhive_jobstore::{JobStore, ModuleJobRecord};
use scanhive_launcher::{env_keys, LaunchRequest, Lifecycle, Placement, TaskHandle, WorkerLauncher};
use scanhive_registry::ModuleRegistry;
use scanhive_streambus::StreamBus;
use tracing::{info, warn};

pub use error::{LaunchFailureDetail, PipelineError};
pub use types::{AssetRequest, PipelineOutcome, PipelineStatus, PipelineTiming, ProgressEvent};

pub struct StreamingPipeline {
    registry: Arc<ModuleRegistry>,
    jobs: JobStore,
    bus: StreamBus,
    launcher: Arc<dyn WorkerLauncher>,
    placement: Placement,
    timing: PipelineTiming,
}

impl StreamingPipeline {
    pub fn new(
        registry: Arc<ModuleRegistry>,
        jobs: JobStore,
        bus: StreamBus,
        launcher: Arc<dyn WorkerLauncher>,
        placement: Placement,
        timing: PipelineTiming,
    ) -> Self {
        Self {
            registry,
            jobs,
            bus,
            launcher,
            placement,
            timing,
        }
    }

    /// Runs one asset's pipeline to completion, cancellation, or timeout.
    pub async fn run(
        &self,
        scan_id: ScanId,
        request: AssetRequest,
        cancel: CancelToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        // §4.5.1 — dependency resolution and auto-inclusion.
        let dependency_map = self.registry.dependency_map();
        let resolution = depgraph::resolve(&request.modules, &dependency_map)?;

        // §4.5.2 step 1 — stream key for the producer's output.
        let stream_key = StreamBus::stream_key(scan_id, request.asset_id, &resolution.producer);
        self.bus.create_stream(&stream_key).await?;

        // §4.5.2 step 2 — one write transaction for every job row.
        let entries: Vec<(ModuleName, JobRole)> = resolution
            .modules
            .iter()
            .map(|module| {
                let role = if *module == resolution.producer {
                    JobRole::Producer
                } else {
                    JobRole::Consumer
                };
                (module.clone(), role)
            })
            .collect();
        let records = self
            .jobs
            .create_jobs(scan_id, request.asset_id, entries)
            .await?;
        let job_by_module: HashMap<ModuleName, ModuleJobRecord> =
            records.into_iter().map(|r| (r.module(), r)).collect();

        // §4.5.2 steps 3-5 — launch producer, then consumers, rolling back on failure.
        match self
            .launch_all(scan_id, &request, &resolution.producer, &stream_key, &job_by_module)
            .await
        {
            Ok(launched) => {
                self.monitor(scan_id, request.asset_id, resolution.producer, &stream_key, job_by_module, launched, cancel)
                    .await
            }
            Err(failures) => {
                self.bus.delete_stream(&stream_key).await;
                Err(PipelineError::LaunchFailure(failures))
            }
        }
    }

    /// Launches the producer, then every consumer in parallel. On any
    /// failure, marks that module's job failed, cancels every handle already
    /// launched, and returns the full set of per-module failures.
    async fn launch_all(
        &self,
        scan_id: ScanId,
        request: &AssetRequest,
        producer: &ModuleName,
        stream_key: &str,
        job_by_module: &HashMap<ModuleName, ModuleJobRecord>,
    ) -> Result<Vec<(ModuleName, TaskHandle)>, Vec<LaunchFailureDetail>> {
        let mut launched: Vec<(ModuleName, TaskHandle)> = Vec::new();
        let mut failures: Vec<LaunchFailureDetail> = Vec::new();

        let producer_record = &job_by_module[producer];
        match self
            .launch_one(scan_id, request, producer, JobRole::Producer, stream_key, producer_record.id)
            .await
        {
            Ok(handle) => {
                let _ = self.jobs.attach_task_handle(producer_record.id, &handle.0).await;
                launched.push((producer.clone(), handle));
            }
            Err(err) => failures.push(LaunchFailureDetail {
                module: producer.clone(),
                error: err.to_string(),
            }),
        }

        if failures.is_empty() {
            let consumers: Vec<&ModuleName> = job_by_module
                .keys()
                .filter(|m| *m != producer)
                .collect();

            let consumer_results = futures::future::join_all(consumers.into_iter().map(|module| {
                let record = &job_by_module[module];
                async move {
                    let outcome = self
                        .launch_one(scan_id, request, module, JobRole::Consumer, stream_key, record.id)
                        .await;
                    (module.clone(), record.id, outcome)
                }
            }))
            .await;

            for (module, job_id, outcome) in consumer_results {
                match outcome {
                    Ok(handle) => {
                        let _ = self.jobs.attach_task_handle(job_id, &handle.0).await;
                        launched.push((module, handle));
                    }
                    Err(err) => failures.push(LaunchFailureDetail {
                        module,
                        error: err.to_string(),
                    }),
                }
            }
        }

        if !failures.is_empty() {
            for (module, handle) in &launched {
                let _ = self.launcher.stop(handle).await;
                let record = &job_by_module[module];
                let _ = self
                    .jobs
                    .mark_job_launch_failed(record.id, "cancelled: sibling launch failed")
                    .await;
            }
            for failure in &failures {
                if let Some(record) = job_by_module.get(&failure.module) {
                    let _ = self.jobs.mark_job_launch_failed(record.id, &failure.error).await;
                }
            }
            return Err(failures);
        }

        Ok(launched)
    }

    async fn launch_one(
        &self,
        scan_id: ScanId,
        request: &AssetRequest,
        module: &ModuleName,
        role: JobRole,
        stream_key: &str,
        job_id: JobId,
    ) -> Result<TaskHandle, scanhive_launcher::LauncherError> {
        let profile = self
            .registry
            .profile(module)
            .map_err(|e| scanhive_launcher::LauncherError::LaunchRejected(e.to_string()))?;

        let mut env = HashMap::new();
        env.insert(env_keys::SCAN_ID.to_string(), scan_id.to_string());
        env.insert(env_keys::ASSET_ID.to_string(), request.asset_id.to_string());
        env.insert(env_keys::JOB_ID.to_string(), job_id.to_string());
        match role {
            JobRole::Producer => {
                env.insert(env_keys::MODULE_ROLE.to_string(), "producer".to_string());
                env.insert(env_keys::OUTPUT_STREAM_KEY.to_string(), stream_key.to_string());
            }
            JobRole::Consumer => {
                env.insert(env_keys::MODULE_ROLE.to_string(), "consumer".to_string());
                env.insert(env_keys::STREAM_KEY.to_string(), stream_key.to_string());
                let group = StreamBus::consumer_group_name(module, stream_key);
                self.bus.ensure_group(stream_key, &group).await.map_err(|e| {
                    scanhive_launcher::LauncherError::LaunchInfrastructureError(e.to_string())
                })?;
                env.insert(env_keys::CONSUMER_GROUP.to_string(), group);
            }
        }

        let req = LaunchRequest {
            scan_id,
            asset_id: request.asset_id,
            job_id,
            image_ref: profile.image_ref.clone(),
            container_name: profile.container_name.clone(),
            role,
            batch_size: request.batch_size,
            resource_tiers: profile.resource_tiers.clone(),
            env,
            placement: self.placement.clone(),
        };
        self.launcher.launch(req).await
    }

    /// §4.5.3 — sequential, job-status driven monitoring, plus the
    /// background health task and §4.5.4 cancellation.
    #[allow(clippy::too_many_arguments)]
    async fn monitor(
        &self,
        scan_id: ScanId,
        asset_id: AssetId,
        producer: ModuleName,
        stream_key: &str,
        job_by_module: HashMap<ModuleName, ModuleJobRecord>,
        launched: Vec<(ModuleName, TaskHandle)>,
        cancel: CancelToken,
    ) -> Result<PipelineOutcome, PipelineError> {
        let job_ids: Vec<JobId> = job_by_module.values().map(|r| r.id).collect();
        let launch_instant = Instant::now();

        let health_handle = tokio::spawn(health_task(
            self.launcher.clone(),
            self.jobs.clone(),
            launched.clone(),
            job_by_module
                .iter()
                .map(|(m, r)| (m.clone(), r.id))
                .collect(),
            self.timing.health_check_interval,
        ));

        let mut polls: u32 = 0;
        let mut timed_out = false;
        let mut last_statuses = self.jobs.get_job_statuses(&job_ids).await?;

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.timing.poll_interval) => {}
                _ = cancel.cancelled() => {
                    health_handle.abort();
                    return self
                        .cancel_run(asset_id, producer, stream_key, job_by_module, launched, launch_instant, polls)
                        .await;
                }
            }

            polls += 1;
            last_statuses = self.jobs.get_job_statuses(&job_ids).await?;

            self.fail_stalled_launches(&job_by_module, &last_statuses, launch_instant).await;

            let all_terminal = job_ids
                .iter()
                .all(|id| last_statuses.get(id).map(|r| r.status().is_terminal()).unwrap_or(false));

            let pending = self.consumer_stream_pending(&job_by_module, stream_key).await;
            let eos = self.bus.completion_marker_present(stream_key).await.ok();
            let terminal_count = job_ids
                .iter()
                .filter(|id| last_statuses.get(*id).map(|r| r.status().is_terminal()).unwrap_or(false))
                .count();
            let progress = ProgressEvent {
                scan_id,
                asset_id,
                poll: polls,
                terminal_jobs: terminal_count,
                total_jobs: job_ids.len(),
                stream_pending: pending,
                stream_eos_seen: eos,
            };
            info!(target: "scanhive_pipeline::progress", ?progress, "pipeline progress");

            if all_terminal {
                break;
            }

            if launch_instant.elapsed() > self.timing.timeout {
                timed_out = true;
                for record in job_by_module.values() {
                    let terminal = last_statuses
                        .get(&record.id)
                        .map(|r| r.status().is_terminal())
                        .unwrap_or(false);
                    if !terminal {
                        let _ = self.jobs.mark_job_timeout(record.id).await;
                    }
                }
                break;
            }
        }

        health_handle.abort();
        let final_statuses = if timed_out {
            self.jobs.get_job_statuses(&job_ids).await.unwrap_or(last_statuses)
        } else {
            last_statuses
        };

        let job_statuses: HashMap<ModuleName, JobStatus> = job_by_module
            .iter()
            .map(|(module, record)| {
                let status = final_statuses
                    .get(&record.id)
                    .map(|r| r.status())
                    .unwrap_or(JobStatus::Pending);
                (module.clone(), status)
            })
            .collect();

        self.bus.delete_stream(stream_key).await;

        Ok(PipelineOutcome {
            asset_id,
            status: aggregate_status(&job_statuses),
            timed_out,
            producer,
            job_statuses,
            elapsed: launch_instant.elapsed(),
            polls,
        })
    }

    /// Sums `XPENDING` across every consumer job's own group (§4.3) rather
    /// than the bootstrap group `create_stream` sets up at `$` — that group
    /// has no reader, so its pending count is always ~0 and tells you
    /// nothing about the real backlog. `None` if there are no consumers yet
    /// or every group lookup errors.
    async fn consumer_stream_pending(
        &self,
        job_by_module: &HashMap<ModuleName, ModuleJobRecord>,
        stream_key: &str,
    ) -> Option<i64> {
        let mut total: Option<i64> = None;
        for (module, record) in job_by_module {
            if record.role() != JobRole::Consumer {
                continue;
            }
            let group = StreamBus::consumer_group_name(module, stream_key);
            if let Ok(count) = self.bus.pending_count(stream_key, &group).await {
                total = Some(total.unwrap_or(0) + count);
            }
        }
        total
    }

    /// §4.5.3's `T_startup` rule: a job still `pending` `T_startup` after
    /// launch is recorded as a launch failure rather than left to run out
    /// the full timeout budget.
    async fn fail_stalled_launches(
        &self,
        job_by_module: &HashMap<ModuleName, ModuleJobRecord>,
        statuses: &HashMap<JobId, scanhive_jobstore::JobStatusRow>,
        launch_instant: Instant,
    ) {
        if launch_instant.elapsed() < self.startup_grace() {
            return;
        }
        for record in job_by_module.values() {
            let status = statuses.get(&record.id).map(|r| r.status());
            if status == Some(JobStatus::Pending) {
                warn!(job_id = %record.id, module = %record.module(), "job stalled in pending beyond startup grace period");
                let _ = self
                    .jobs
                    .mark_job_launch_failed(record.id, "worker did not start within the startup grace period")
                    .await;
            }
        }
    }

    fn startup_grace(&self) -> Duration {
        self.timing.startup_grace_period
    }

    /// §4.5.4 — stop every running handle, mark non-terminal jobs cancelled,
    /// delete the stream.
    async fn cancel_run(
        &self,
        asset_id: AssetId,
        producer: ModuleName,
        stream_key: &str,
        job_by_module: HashMap<ModuleName, ModuleJobRecord>,
        launched: Vec<(ModuleName, TaskHandle)>,
        launch_instant: Instant,
        polls: u32,
    ) -> Result<PipelineOutcome, PipelineError> {
        for (_, handle) in &launched {
            let _ = self.launcher.stop(handle).await;
        }

        let job_ids: Vec<JobId> = job_by_module.values().map(|r| r.id).collect();
        let statuses = self.jobs.get_job_statuses(&job_ids).await.unwrap_or_default();
        for record in job_by_module.values() {
            let terminal = statuses.get(&record.id).map(|r| r.status().is_terminal()).unwrap_or(false);
            if !terminal {
                let _ = self.jobs.mark_job_cancelled(record.id).await;
            }
        }

        self.bus.delete_stream(stream_key).await;

        let final_statuses = self.jobs.get_job_statuses(&job_ids).await.unwrap_or_default();
        let job_statuses: HashMap<ModuleName, JobStatus> = job_by_module
            .iter()
            .map(|(module, record)| {
                let status = final_statuses
                    .get(&record.id)
                    .map(|r| r.status())
                    .unwrap_or(JobStatus::Failed);
                (module.clone(), status)
            })
            .collect();

        Ok(PipelineOutcome {
            asset_id,
            status: aggregate_status(&job_statuses),
            timed_out: false,
            producer,
            job_statuses,
            elapsed: launch_instant.elapsed(),
            polls,
        })
    }
}

/// §4.5.3's completion aggregation: `completed` iff every job succeeded,
/// `failed` iff none did, `partial_failure` otherwise.
fn aggregate_status(job_statuses: &HashMap<ModuleName, JobStatus>) -> PipelineStatus {
    let total = job_statuses.len();
    let successes = job_statuses.values().filter(|s| s.is_success()).count();
    if successes == total {
        PipelineStatus::Completed
    } else if successes == 0 {
        PipelineStatus::Failed
    } else {
        PipelineStatus::PartialFailure
    }
}

/// Background liveness check (§4.5.3): never declares completion, only logs
/// a `WorkerExitedWithoutTerminalStatus` note when a handle reports stopped
/// while its job record is still non-terminal.
async fn health_task(
    launcher: Arc<dyn WorkerLauncher>,
    jobs: JobStore,
    launched: Vec<(ModuleName, TaskHandle)>,
    job_ids: HashMap<ModuleName, JobId>,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;
        for (module, handle) in &launched {
            let disposition = match launcher.describe(handle).await {
                Ok(d) => d,
                Err(err) => {
                    warn!(module = %module, error = %err, "health check describe failed");
                    continue;
                }
            };
            if disposition.lifecycle != Lifecycle::Stopped {
                continue;
            }
            let Some(&job_id) = job_ids.get(module) else {
                continue;
            };
            let Ok(statuses) = jobs.get_job_statuses(&[job_id]).await else {
                continue;
            };
            let Some(row) = statuses.get(&job_id) else {
                continue;
            };
            if !row.status().is_terminal() {
                warn!(
                    target: "scanhive_pipeline::WorkerExitedWithoutTerminalStatus",
                    module = %module,
                    job_id = %job_id,
                    exit_code = ?disposition.exit_code,
                    "worker exited without writing a terminal job status"
                );
            }
        }
    }
}
