//! End-to-end orchestrator tests against real Postgres and Redis test
//! instances, skipped when `DATABASE_TEST_URL`/`REDIS_TEST_URL` are unset —
//! Skips when neither test dependency is configured. Worker
//! launches are faked via `InMemoryLauncher`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use scanhive_jobstore::JobStore;
use scanhive_launcher::{InMemoryLauncher, Placement};
use scanhive_orchestrator::{AssetSpec, ScanOrchestrator, ScanRequest};
use scanhive_pipeline::{PipelineTiming, StreamingPipeline};
use scanhive_registry::ModuleRegistry;
use scanhive_streambus::StreamBus;
use sqlx::PgPool;
use uuid::Uuid;

struct Env {
    pool: PgPool,
    bus: StreamBus,
}

async fn test_env() -> Option<Env> {
    let db_url = std::env::var("DATABASE_TEST_URL").ok()?;
    let redis_url = std::env::var("REDIS_TEST_URL").ok()?;
    let pool = PgPool::connect(&db_url).await.ok()?;
    let bus = StreamBus::connect(&redis_url).await.ok()?;
    Some(Env { pool, bus })
}

async fn seed_profiles(pool: &PgPool) {
    let tier = serde_json::json!([{ "threshold": 1000, "cpu_units": 1, "memory_mib": 512 }]);
    sqlx::query(
        r#"
        INSERT INTO module_profiles
            (name, image_ref, container_name, dependencies, resource_tiers,
             estimated_seconds_per_unit, max_batch_size, optimization_hints, enabled)
        VALUES
            ('enumerator', 'scanhive/enumerator:latest', 'enumerator', '{}', $1, 1, 1000, '{}', true),
            ('resolver', 'scanhive/resolver:latest', 'resolver', '{enumerator}', $1, 1, 1000, '{}', true)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(&tier)
    .execute(pool)
    .await
    .unwrap();
}

fn timing() -> PipelineTiming {
    PipelineTiming {
        poll_interval: Duration::from_millis(50),
        health_check_interval: Duration::from_millis(100),
        startup_grace_period: Duration::from_secs(120),
        timeout: Duration::from_secs(5),
    }
}

/// Scenario 1 (§8): single asset, one producer, one consumer, both complete.
#[tokio::test]
async fn single_asset_scan_completes_once_every_job_completes() {
    let Some(env) = test_env().await else {
        return;
    };
    seed_profiles(&env.pool).await;

    let registry = ModuleRegistry::load_all(env.pool.clone()).await.unwrap();
    let jobs = JobStore::new(env.pool.clone());
    let launcher: Arc<InMemoryLauncher> = Arc::new(InMemoryLauncher::new());
    let pipeline = Arc::new(StreamingPipeline::new(
        registry.clone(),
        jobs.clone(),
        env.bus.clone(),
        launcher.clone() as Arc<dyn scanhive_launcher::WorkerLauncher>,
        Placement::default(),
        timing(),
    ));
    let orchestrator = ScanOrchestrator::new(registry, jobs.clone(), pipeline, 4);

    let asset_id = Uuid::new_v4();
    let mut assets = HashMap::new();
    assets.insert(
        asset_id,
        AssetSpec {
            modules: vec!["resolver".into()],
            batch_size: 1,
        },
    );
    let summary = orchestrator
        .execute_scan(ScanRequest {
            owner_id: Uuid::new_v4(),
            assets,
        })
        .await
        .unwrap();

    // Give the background fan-out time to create and launch both jobs.
    tokio::time::sleep(Duration::from_millis(150)).await;
    let records = jobs.list_jobs(summary.scan_id).await.unwrap();
    assert_eq!(records.len(), 2);

    for record in &records {
        sqlx::query("UPDATE module_jobs SET status = 'completed', completed_at = now() WHERE id = $1")
            .bind(record.id)
            .execute(&env.pool)
            .await
            .unwrap();
    }

    // Poll get_scan until the background task finalizes the scan.
    let mut view = orchestrator.get_scan(summary.scan_id).await.unwrap();
    for _ in 0..50 {
        if view.status.is_terminal() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
        view = orchestrator.get_scan(summary.scan_id).await.unwrap();
    }

    assert_eq!(view.status, scanhive_common::ScanStatus::Completed);
    assert_eq!(view.assets_completed, 1);
    assert_eq!(view.assets_failed, 0);
    assert_eq!(view.per_asset.len(), 1);
    assert_eq!(view.per_asset[0].per_module.len(), 2);
}

#[tokio::test]
async fn empty_asset_set_is_rejected_before_a_scan_record_exists() {
    let Some(env) = test_env().await else {
        return;
    };
    seed_profiles(&env.pool).await;

    let registry = ModuleRegistry::load_all(env.pool.clone()).await.unwrap();
    let jobs = JobStore::new(env.pool.clone());
    let launcher: Arc<InMemoryLauncher> = Arc::new(InMemoryLauncher::new());
    let pipeline = Arc::new(StreamingPipeline::new(
        registry.clone(),
        jobs.clone(),
        env.bus.clone(),
        launcher as Arc<dyn scanhive_launcher::WorkerLauncher>,
        Placement::default(),
        timing(),
    ));
    let orchestrator = ScanOrchestrator::new(registry, jobs, pipeline, 4);

    let err = orchestrator
        .execute_scan(ScanRequest {
            owner_id: Uuid::new_v4(),
            assets: HashMap::new(),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, scanhive_orchestrator::OrchestratorError::EmptyRequest));
}

#[tokio::test]
async fn unknown_module_is_rejected_before_a_scan_record_exists() {
    let Some(env) = test_env().await else {
        return;
    };
    seed_profiles(&env.pool).await;

    let registry = ModuleRegistry::load_all(env.pool.clone()).await.unwrap();
    let jobs = JobStore::new(env.pool.clone());
    let launcher: Arc<InMemoryLauncher> = Arc::new(InMemoryLauncher::new());
    let pipeline = Arc::new(StreamingPipeline::new(
        registry.clone(),
        jobs.clone(),
        env.bus.clone(),
        launcher as Arc<dyn scanhive_launcher::WorkerLauncher>,
        Placement::default(),
        timing(),
    ));
    let orchestrator = ScanOrchestrator::new(registry, jobs, pipeline, 4);

    let mut assets = HashMap::new();
    assets.insert(
        Uuid::new_v4(),
        AssetSpec {
            modules: vec!["does_not_exist".into()],
            batch_size: 1,
        },
    );
    let err = orchestrator
        .execute_scan(ScanRequest {
            owner_id: Uuid::new_v4(),
            assets,
        })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        scanhive_orchestrator::OrchestratorError::UnknownModule { .. }
    ));
}
