//! Job Store access layer (§4.2): transactional writes for Scan Records and
//! Module Job Records, plus the hot polling read path the Streaming
//! Pipeline uses as its sole source of truth for completion (I5).

pub mod error;
pub mod types;

use std::collections::HashMap;
use std::time::Duration;

use chrono::Utc;
use scanhive_common::{retry, AssetId, JobId, JobRole, JobStatus, ModuleName, ScanId, ScanStatus};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::warn;
use uuid::Uuid;

pub use error::JobStoreError;
pub use types::{JobStatusRow, ModuleJobRecord, ScanAggregate, ScanRecord};

use types::{job_status_str, role_str, scan_status_str};

const RETRY_ATTEMPTS: u32 = 3;
const RETRY_BASE: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct JobStore {
    pool: PgPool,
}

impl JobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Inserts a `pending` Scan Record. `correlation_id` is the first 8 hex
    /// characters of the generated scan id (§3.1).
    pub async fn create_scan(
        &self,
        owner_id: Uuid,
        assets_requested: i32,
    ) -> Result<ScanRecord, JobStoreError> {
        with_retry(|| async {
            let record: ScanRecord = sqlx::query_as(
                r#"
                INSERT INTO scans (owner_id, status, execution_mode, assets_requested,
                                    assets_completed, assets_failed, correlation_id, requested_at)
                VALUES ($1, 'pending', 'streaming', $2, 0, 0,
                        substr(replace(gen_random_uuid()::text, '-', ''), 1, 8), now())
                RETURNING id, owner_id, status, execution_mode, assets_requested,
                          assets_completed, assets_failed, correlation_id,
                          requested_at, started_at, completed_at
                "#,
            )
            .bind(owner_id)
            .bind(assets_requested)
            .fetch_one(&self.pool)
            .await?;
            Ok(record)
        })
        .await
    }

    pub async fn mark_scan_running(&self, scan_id: ScanId) -> Result<(), JobStoreError> {
        with_retry(|| async {
            sqlx::query(
                "UPDATE scans SET status = 'running', started_at = now() WHERE id = $1 AND status = 'pending'",
            )
            .bind(scan_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Single-writer terminal transition for the Scan Record. Write-once:
    /// the `WHERE status NOT IN (...)` guard means a second call is a no-op
    /// rather than a double-terminal write.
    pub async fn finalize_scan(
        &self,
        scan_id: ScanId,
        aggregate: ScanAggregate,
    ) -> Result<(), JobStoreError> {
        with_retry(|| async {
            sqlx::query(
                r#"
                UPDATE scans
                SET status = $2, assets_completed = $3, assets_failed = $4, completed_at = now()
                WHERE id = $1
                  AND status NOT IN ('completed', 'partial_failure', 'failed', 'cancelled')
                "#,
            )
            .bind(scan_id)
            .bind(scan_status_str(aggregate.status))
            .bind(aggregate.assets_completed)
            .bind(aggregate.assets_failed)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Incremental counter bump used as pipelines complete, ahead of the
    /// final `finalize_scan` write (§4.6 step 3).
    pub async fn bump_asset_counters(
        &self,
        scan_id: ScanId,
        completed_delta: i32,
        failed_delta: i32,
    ) -> Result<(), JobStoreError> {
        with_retry(|| async {
            sqlx::query(
                "UPDATE scans SET assets_completed = assets_completed + $2, assets_failed = assets_failed + $3 WHERE id = $1",
            )
            .bind(scan_id)
            .bind(completed_delta)
            .bind(failed_delta)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Inserts a `pending` Module Job Record. Enforces I4: fails with
    /// `DuplicateJob` if a non-terminal row already exists for
    /// `(scan_id, asset_id, module)`. The partial unique index
    /// `module_jobs_active_uniq` (§3.1) makes the existence check and the
    /// insert atomic under concurrent callers.
    pub async fn create_job(
        &self,
        scan_id: ScanId,
        asset_id: AssetId,
        module: ModuleName,
        role: JobRole,
    ) -> Result<ModuleJobRecord, JobStoreError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;

        let existing = sqlx::query_scalar::<_, i64>(
            r#"
            SELECT count(*) FROM module_jobs
            WHERE scan_id = $1 AND asset_id = $2 AND module = $3
              AND status IN ('pending', 'running')
            "#,
        )
        .bind(scan_id)
        .bind(asset_id)
        .bind(module.as_str())
        .fetch_one(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        if existing > 0 {
            return Err(JobStoreError::DuplicateJob {
                scan_id,
                asset_id,
                module,
            });
        }

        let record: ModuleJobRecord = sqlx::query_as(
            r#"
            INSERT INTO module_jobs (scan_id, asset_id, module, role, status, created_at)
            VALUES ($1, $2, $3, $4, 'pending', now())
            RETURNING id, scan_id, asset_id, module, role, status, task_handle,
                      created_at, started_at, completed_at, result_count, error_message
            "#,
        )
        .bind(scan_id)
        .bind(asset_id)
        .bind(module.as_str())
        .bind(role_str(role))
        .fetch_one(&mut *tx)
        .await
        .map_err(anyhow::Error::from)?;

        commit(tx).await?;
        Ok(record)
    }

    /// Inserts `pending` rows for every `(module, role)` pair in one
    /// transaction, per §4.5.2 step 2 ("one write transaction"). Rolls
    /// back entirely if any single module already has a non-terminal job
    /// for this `(scan_id, asset_id)`.
    pub async fn create_jobs(
        &self,
        scan_id: ScanId,
        asset_id: AssetId,
        entries: Vec<(ModuleName, JobRole)>,
    ) -> Result<Vec<ModuleJobRecord>, JobStoreError> {
        let mut tx = self.pool.begin().await.map_err(anyhow::Error::from)?;
        let mut records = Vec::with_capacity(entries.len());

        for (module, role) in entries {
            let existing = sqlx::query_scalar::<_, i64>(
                r#"
                SELECT count(*) FROM module_jobs
                WHERE scan_id = $1 AND asset_id = $2 AND module = $3
                  AND status IN ('pending', 'running')
                "#,
            )
            .bind(scan_id)
            .bind(asset_id)
            .bind(module.as_str())
            .fetch_one(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;

            if existing > 0 {
                return Err(JobStoreError::DuplicateJob {
                    scan_id,
                    asset_id,
                    module,
                });
            }

            let record: ModuleJobRecord = sqlx::query_as(
                r#"
                INSERT INTO module_jobs (scan_id, asset_id, module, role, status, created_at)
                VALUES ($1, $2, $3, $4, 'pending', now())
                RETURNING id, scan_id, asset_id, module, role, status, task_handle,
                          created_at, started_at, completed_at, result_count, error_message
                "#,
            )
            .bind(scan_id)
            .bind(asset_id)
            .bind(module.as_str())
            .bind(role_str(role))
            .fetch_one(&mut *tx)
            .await
            .map_err(anyhow::Error::from)?;

            records.push(record);
        }

        commit(tx).await?;
        Ok(records)
    }

    pub async fn attach_task_handle(
        &self,
        job_id: JobId,
        handle: &str,
    ) -> Result<(), JobStoreError> {
        with_retry(|| async {
            sqlx::query("UPDATE module_jobs SET task_handle = $2 WHERE id = $1")
                .bind(job_id)
                .bind(handle)
                .execute(&self.pool)
                .await?;
            Ok(())
        })
        .await
    }

    /// Pipeline-side write for a job whose worker never started because
    /// the launcher rejected it or a launch RPC failed (§4.5.2 step 5).
    /// Distinct from a worker-reported failure: no worker ever ran, so I5
    /// ("every successful worker writes its own terminal status") doesn't
    /// apply here — this is the pipeline recording its own launch outcome.
    pub async fn mark_job_launch_failed(
        &self,
        job_id: JobId,
        error_message: &str,
    ) -> Result<(), JobStoreError> {
        with_retry(|| async {
            sqlx::query(
                r#"
                UPDATE module_jobs
                SET status = 'failed', error_message = $2, completed_at = now()
                WHERE id = $1 AND status IN ('pending', 'running')
                "#,
            )
            .bind(job_id)
            .bind(error_message)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Orchestrator/pipeline-side cancellation write: the only terminal
    /// transition the core itself performs, and only for jobs that are
    /// still non-terminal at cancel time (§4.5.4).
    pub async fn mark_job_cancelled(&self, job_id: JobId) -> Result<(), JobStoreError> {
        with_retry(|| async {
            sqlx::query(
                r#"
                UPDATE module_jobs
                SET status = 'failed', error_message = 'cancelled', completed_at = now()
                WHERE id = $1 AND status IN ('pending', 'running')
                "#,
            )
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    /// Pipeline-side timeout write: the one terminal transition the pipeline
    /// itself performs, for jobs whose worker never wrote a terminal status
    /// within the budget (§4.5.3, I5's "pipeline as fallback writer").
    pub async fn mark_job_timeout(&self, job_id: JobId) -> Result<(), JobStoreError> {
        with_retry(|| async {
            sqlx::query(
                r#"
                UPDATE module_jobs
                SET status = 'timeout', completed_at = now()
                WHERE id = $1 AND status IN ('pending', 'running')
                "#,
            )
            .bind(job_id)
            .execute(&self.pool)
            .await?;
            Ok(())
        })
        .await
    }

    pub async fn list_jobs(&self, scan_id: ScanId) -> Result<Vec<ModuleJobRecord>, JobStoreError> {
        with_retry(|| async {
            let rows: Vec<ModuleJobRecord> = sqlx::query_as(
                r#"
                SELECT id, scan_id, asset_id, module, role, status, task_handle,
                       created_at, started_at, completed_at, result_count, error_message
                FROM module_jobs WHERE scan_id = $1
                "#,
            )
            .bind(scan_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    pub async fn list_jobs_for_asset(
        &self,
        scan_id: ScanId,
        asset_id: AssetId,
    ) -> Result<Vec<ModuleJobRecord>, JobStoreError> {
        with_retry(|| async {
            let rows: Vec<ModuleJobRecord> = sqlx::query_as(
                r#"
                SELECT id, scan_id, asset_id, module, role, status, task_handle,
                       created_at, started_at, completed_at, result_count, error_message
                FROM module_jobs WHERE scan_id = $1 AND asset_id = $2
                "#,
            )
            .bind(scan_id)
            .bind(asset_id)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows)
        })
        .await
    }

    /// The hot path polled by the pipeline's monitoring loop every `T_poll`
    /// seconds (§4.5.3). Must tolerate workers updating rows concurrently —
    /// it is a plain read, so no locking is needed beyond Postgres's own
    /// MVCC snapshot isolation.
    pub async fn get_job_statuses(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, JobStatusRow>, JobStoreError> {
        if job_ids.is_empty() {
            return Ok(HashMap::new());
        }
        with_retry(|| async {
            let rows: Vec<JobStatusRow> = sqlx::query_as(
                "SELECT id, module, status, completed_at FROM module_jobs WHERE id = ANY($1)",
            )
            .bind(job_ids)
            .fetch_all(&self.pool)
            .await?;
            Ok(rows.into_iter().map(|r| (r.job_id(), r)).collect())
        })
        .await
    }

    pub async fn get_scan(&self, scan_id: ScanId) -> Result<ScanRecord, JobStoreError> {
        with_retry(|| async {
            let record: Option<ScanRecord> = sqlx::query_as(
                r#"
                SELECT id, owner_id, status, execution_mode, assets_requested,
                       assets_completed, assets_failed, correlation_id,
                       requested_at, started_at, completed_at
                FROM scans WHERE id = $1
                "#,
            )
            .bind(scan_id)
            .fetch_optional(&self.pool)
            .await?;
            record.ok_or(JobStoreError::ScanNotFound(scan_id))
        })
        .await
    }
}

async fn commit(tx: Transaction<'_, Postgres>) -> Result<(), JobStoreError> {
    tx.commit().await.map_err(|e| anyhow::Error::from(e).into())
}

fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed
    )
}

async fn with_retry<T, F, Fut>(op: F) -> Result<T, JobStoreError>
where
    F: Fn() -> Fut,
    Fut: std::future::Future<Output = Result<T, sqlx::Error>>,
{
    retry::with_backoff(RETRY_ATTEMPTS, RETRY_BASE, is_transient, op)
        .await
        .map_err(|e| {
            warn!(error = %e, "job store operation failed after retries");
            anyhow::Error::from(e).into()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Obtains a pool for integration tests, or skips when no test
    /// database is configured.
    async fn test_pool() -> Option<PgPool> {
        let url = std::env::var("DATABASE_TEST_URL").ok()?;
        let pool = PgPool::connect(&url).await.ok()?;
        Some(pool)
    }

    #[tokio::test]
    async fn create_scan_sets_pending_status() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = JobStore::new(pool);
        let owner_id = Uuid::new_v4();
        let record = store.create_scan(owner_id, 2).await.unwrap();
        assert_eq!(record.status(), ScanStatus::Pending);
        assert_eq!(record.correlation_id.len(), 8);
    }

    #[tokio::test]
    async fn create_job_rejects_duplicate_non_terminal() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = JobStore::new(pool);
        let owner_id = Uuid::new_v4();
        let scan = store.create_scan(owner_id, 1).await.unwrap();
        let asset_id = Uuid::new_v4();
        let module = ModuleName::from("enumerator");

        store
            .create_job(scan.id, asset_id, module.clone(), JobRole::Producer)
            .await
            .unwrap();

        let err = store
            .create_job(scan.id, asset_id, module, JobRole::Producer)
            .await
            .unwrap_err();
        assert!(matches!(err, JobStoreError::DuplicateJob { .. }));
    }

    #[tokio::test]
    async fn finalize_scan_is_write_once() {
        let Some(pool) = test_pool().await else {
            return;
        };
        let store = JobStore::new(pool);
        let owner_id = Uuid::new_v4();
        let scan = store.create_scan(owner_id, 1).await.unwrap();
        store.mark_scan_running(scan.id).await.unwrap();

        store
            .finalize_scan(
                scan.id,
                ScanAggregate {
                    status: ScanStatus::Completed,
                    assets_completed: 1,
                    assets_failed: 0,
                },
            )
            .await
            .unwrap();

        // Second finalize must not overwrite the terminal status.
        store
            .finalize_scan(
                scan.id,
                ScanAggregate {
                    status: ScanStatus::Failed,
                    assets_completed: 0,
                    assets_failed: 1,
                },
            )
            .await
            .unwrap();

        let reloaded = store.get_scan(scan.id).await.unwrap();
        assert_eq!(reloaded.status(), ScanStatus::Completed);
    }

    #[test]
    fn job_status_round_trips_through_str() {
        for status in [
            JobStatus::Pending,
            JobStatus::Running,
            JobStatus::Completed,
            JobStatus::Failed,
            JobStatus::Timeout,
        ] {
            assert_eq!(job_status_str(status).is_empty(), false);
        }
    }
}
