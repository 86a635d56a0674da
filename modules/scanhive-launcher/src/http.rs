use std::time::Duration;

use async_trait::async_trait;
use scanhive_common::retry;
use scanhive_registry::select_resource_tier;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::LauncherError;
use crate::types::{LaunchRequest, Lifecycle, TaskDisposition, TaskHandle};
use crate::WorkerLauncher;

/// Per DESIGN.md's launcher retry policy: bounded retry on
/// `LaunchInfrastructureError`, sharing the Job Store's backoff helper.
const RETRY_ATTEMPTS: u32 = 2;
const RETRY_BASE: Duration = Duration::from_millis(100);

/// Thin `reqwest`-based client against a generic task-scheduler HTTP API
/// (create task / describe task / stop task). Holds no knowledge of any
/// specific cloud scheduler — it only speaks this crate's own request and
/// response shapes, which a real scheduler adapter would translate.
pub struct HttpWorkerLauncher {
    client: reqwest::Client,
    base_url: String,
    token: String,
}

impl HttpWorkerLauncher {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            token: token.into(),
        }
    }
}

#[derive(Serialize)]
struct CreateTaskRequest<'a> {
    image_ref: &'a str,
    container_name: &'a str,
    cpu_units: i64,
    memory_mib: i64,
    env: &'a std::collections::HashMap<String, String>,
    security_group_ids: &'a [String],
    subnet_ids: &'a [String],
}

#[derive(Deserialize)]
struct CreateTaskResponse {
    task_handle: String,
}

#[derive(Deserialize)]
struct DescribeTaskResponse {
    lifecycle: String,
    exit_code: Option<i32>,
    stopped_reason: Option<String>,
}

#[async_trait]
impl WorkerLauncher for HttpWorkerLauncher {
    async fn launch(&self, req: LaunchRequest) -> Result<TaskHandle, LauncherError> {
        let tier = select_resource_tier(&req.resource_tiers, req.batch_size).ok_or_else(|| {
            LauncherError::LaunchRejected(format!(
                "module {} has no resource tiers configured",
                req.container_name
            ))
        })?;

        let body = CreateTaskRequest {
            image_ref: &req.image_ref,
            container_name: &req.container_name,
            cpu_units: tier.cpu_units,
            memory_mib: tier.memory_mib,
            env: &req.env,
            security_group_ids: &req.placement.security_group_ids,
            subnet_ids: &req.placement.subnet_ids,
        };

        retry::with_backoff(RETRY_ATTEMPTS, RETRY_BASE, LauncherError::is_transient, || async {
            let response = self
                .client
                .post(format!("{}/tasks", self.base_url))
                .bearer_auth(&self.token)
                .json(&body)
                .send()
                .await
                .map_err(|e| LauncherError::LaunchInfrastructureError(e.to_string()))?;

            let status = response.status();
            if status == reqwest::StatusCode::NOT_FOUND {
                return Err(LauncherError::ImageUnavailable(req.image_ref.clone()));
            }
            if status == reqwest::StatusCode::TOO_MANY_REQUESTS
                || status == reqwest::StatusCode::BAD_REQUEST
            {
                let text = response.text().await.unwrap_or_default();
                return Err(LauncherError::LaunchRejected(text));
            }
            if !status.is_success() {
                let text = response.text().await.unwrap_or_default();
                return Err(LauncherError::LaunchInfrastructureError(format!(
                    "scheduler returned {status}: {text}"
                )));
            }

            let parsed: CreateTaskResponse = response
                .json()
                .await
                .map_err(|e| LauncherError::LaunchInfrastructureError(e.to_string()))?;

            debug!(task_handle = %parsed.task_handle, job_id = %req.job_id, "worker launched");
            Ok(TaskHandle(parsed.task_handle))
        })
        .await
    }

    async fn describe(&self, handle: &TaskHandle) -> Result<TaskDisposition, LauncherError> {
        retry::with_backoff(RETRY_ATTEMPTS, RETRY_BASE, LauncherError::is_transient, || async {
            let response = self
                .client
                .get(format!("{}/tasks/{}", self.base_url, handle.0))
                .bearer_auth(&self.token)
                .send()
                .await
                .map_err(|e| LauncherError::LaunchInfrastructureError(e.to_string()))?;

            if response.status() == reqwest::StatusCode::NOT_FOUND {
                return Err(LauncherError::UnknownHandle(handle.0.clone()));
            }

            let parsed: DescribeTaskResponse = response
                .json()
                .await
                .map_err(|e| LauncherError::LaunchInfrastructureError(e.to_string()))?;

            let lifecycle = match parsed.lifecycle.as_str() {
                "pending" => Lifecycle::Pending,
                "running" => Lifecycle::Running,
                _ => Lifecycle::Stopped,
            };

            Ok(TaskDisposition {
                lifecycle,
                exit_code: parsed.exit_code,
                stopped_reason: parsed.stopped_reason,
            })
        })
        .await
    }

    async fn stop(&self, handle: &TaskHandle) -> Result<(), LauncherError> {
        let response = self
            .client
            .post(format!("{}/tasks/{}/stop", self.base_url, handle.0))
            .bearer_auth(&self.token)
            .send()
            .await
            .map_err(|e| LauncherError::LaunchInfrastructureError(e.to_string()))?;

        if !response.status().is_success() && response.status() != reqwest::StatusCode::NOT_FOUND
        {
            warn!(task_handle = %handle.0, status = %response.status(), "stop request failed, best-effort only");
        }
        Ok(())
    }
}
