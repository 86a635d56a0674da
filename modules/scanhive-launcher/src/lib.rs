//! Worker Launcher (§4.4): an infrastructure-agnostic interface for
//! launching ephemeral container workers and observing their coarse
//! liveness. Confining all scheduler specifics behind this trait is what
//! makes the Streaming Pipeline testable without a real cluster.

pub mod error;
pub mod http;
pub mod in_memory;
pub mod types;

use async_trait::async_trait;

pub use error::LauncherError;
pub use http::HttpWorkerLauncher;
pub use in_memory::InMemoryLauncher;
pub use types::{env_keys, LaunchRequest, Lifecycle, Placement, TaskDisposition, TaskHandle};

#[async_trait]
pub trait WorkerLauncher: Send + Sync {
    async fn launch(&self, req: LaunchRequest) -> Result<TaskHandle, LauncherError>;
    async fn describe(&self, handle: &TaskHandle) -> Result<TaskDisposition, LauncherError>;
    async fn stop(&self, handle: &TaskHandle) -> Result<(), LauncherError>;
}
