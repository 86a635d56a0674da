use std::sync::Arc;

use anyhow::{Context, Result};
use scanhive_common::Config;
use scanhive_jobstore::JobStore;
use scanhive_launcher::{HttpWorkerLauncher, Placement, WorkerLauncher};
use scanhive_orchestrator::ScanOrchestrator;
use scanhive_pipeline::{PipelineTiming, StreamingPipeline};
use scanhive_registry::ModuleRegistry;
use scanhive_streambus::StreamBus;

#[tokio::main]
async fn main() -> Result<()> {
    scanhive_common::telemetry::init()?;
    tracing::info!("starting scanhive-server");

    let config = Config::from_env();
    config.log_redacted();

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(20)
        .connect(&config.database_url)
        .await
        .context("connecting to job store")?;

    // §4.1: a stale or empty Module Registry must abort startup, not serve
    // traffic against a snapshot that doesn't match the catalog.
    let registry = ModuleRegistry::load_all(pool.clone())
        .await
        .context("loading module registry")?;

    let jobs = JobStore::new(pool.clone());

    let bus = StreamBus::connect(&config.redis_url)
        .await
        .context("connecting to stream bus")?;

    let launcher: Arc<dyn WorkerLauncher> = Arc::new(HttpWorkerLauncher::new(
        config.launcher_base_url.clone(),
        config.launcher_token.clone(),
    ));

    let placement = Placement {
        security_group_ids: config.default_security_group_ids.clone(),
        subnet_ids: config.default_subnet_ids.clone(),
    };

    let timing = PipelineTiming {
        poll_interval: config.poll_interval,
        health_check_interval: config.health_check_interval,
        startup_grace_period: config.startup_grace_period,
        timeout: config.default_job_timeout,
    };

    let pipeline = Arc::new(StreamingPipeline::new(
        registry.clone(),
        jobs.clone(),
        bus,
        launcher,
        placement,
        timing,
    ));

    let orchestrator = Arc::new(ScanOrchestrator::new(
        registry,
        jobs,
        pipeline,
        config.max_parallel_assets_per_scan,
    ));

    let app = scanhive_server::routes::build_router(orchestrator);

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!(%addr, "listening");

    axum::serve(listener, app).await.context("server exited")?;
    Ok(())
}
