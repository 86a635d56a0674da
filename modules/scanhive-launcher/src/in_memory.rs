use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tracing::debug;

use crate::error::LauncherError;
use crate::types::{LaunchRequest, Lifecycle, TaskDisposition, TaskHandle};
use crate::WorkerLauncher;

/// In-process fake used by Streaming Pipeline tests: no network, no
/// database, no container runtime. A scriptable fake that lets a test
/// assert the pipeline's behavior deterministically.
///
/// Every launched task has to stay reachable by later `describe`/`stop`
/// calls on the same instance, so state lives behind a `Mutex`.
pub struct InMemoryLauncher {
    next_id: AtomicU64,
    tasks: Mutex<HashMap<TaskHandle, TaskDisposition>>,
    scripted_failures: Mutex<HashMap<String, LauncherError>>,
}

impl Default for InMemoryLauncher {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryLauncher {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            tasks: Mutex::new(HashMap::new()),
            scripted_failures: Mutex::new(HashMap::new()),
        }
    }

    /// Scripts every future `launch` for `container_name` to fail with
    /// `error` until cleared.
    pub fn fail_launches_for(&self, container_name: &str, error: LauncherError) {
        self.scripted_failures
            .lock()
            .unwrap()
            .insert(container_name.to_string(), error);
    }

    /// Test hook simulating a worker container stopping (crash, OOM-kill,
    /// eviction) without writing its terminal Job Store status — the
    /// scenario §4.5.3's health task is meant to notice.
    pub fn simulate_stopped(&self, handle: &TaskHandle, exit_code: Option<i32>, reason: &str) {
        let mut tasks = self.tasks.lock().unwrap();
        if let Some(disposition) = tasks.get_mut(handle) {
            disposition.lifecycle = Lifecycle::Stopped;
            disposition.exit_code = exit_code;
            disposition.stopped_reason = Some(reason.to_string());
        }
    }

    pub fn launched_count(&self) -> usize {
        self.tasks.lock().unwrap().len()
    }
}

#[async_trait]
impl WorkerLauncher for InMemoryLauncher {
    async fn launch(&self, req: LaunchRequest) -> Result<TaskHandle, LauncherError> {
        if let Some(err) = self
            .scripted_failures
            .lock()
            .unwrap()
            .get(&req.container_name)
        {
            return Err(clone_error(err));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let handle = TaskHandle(format!("in-memory-task-{id}"));
        self.tasks.lock().unwrap().insert(
            handle.clone(),
            TaskDisposition {
                lifecycle: Lifecycle::Running,
                exit_code: None,
                stopped_reason: None,
            },
        );
        debug!(task_handle = %handle, job_id = %req.job_id, "in-memory worker launched");
        Ok(handle)
    }

    async fn describe(&self, handle: &TaskHandle) -> Result<TaskDisposition, LauncherError> {
        self.tasks
            .lock()
            .unwrap()
            .get(handle)
            .cloned()
            .ok_or_else(|| LauncherError::UnknownHandle(handle.0.clone()))
    }

    async fn stop(&self, handle: &TaskHandle) -> Result<(), LauncherError> {
        if let Some(disposition) = self.tasks.lock().unwrap().get_mut(handle) {
            disposition.lifecycle = Lifecycle::Stopped;
            disposition.stopped_reason = Some("stopped".to_string());
        }
        Ok(())
    }
}

fn clone_error(err: &LauncherError) -> LauncherError {
    match err {
        LauncherError::LaunchRejected(s) => LauncherError::LaunchRejected(s.clone()),
        LauncherError::LaunchInfrastructureError(s) => {
            LauncherError::LaunchInfrastructureError(s.clone())
        }
        LauncherError::ImageUnavailable(s) => LauncherError::ImageUnavailable(s.clone()),
        LauncherError::UnknownHandle(s) => LauncherError::UnknownHandle(s.clone()),
        LauncherError::Anyhow(e) => LauncherError::LaunchInfrastructureError(e.to_string()),
    }
}
