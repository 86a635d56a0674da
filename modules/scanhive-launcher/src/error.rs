use thiserror::Error;

#[derive(Error, Debug)]
pub enum LauncherError {
    #[error("launch rejected: {0}")]
    LaunchRejected(String),

    #[error("launch infrastructure error: {0}")]
    LaunchInfrastructureError(String),

    #[error("image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("unknown task handle: {0}")]
    UnknownHandle(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl LauncherError {
    /// Per spec.md §9's recommended retry policy: no automatic retry on
    /// `LaunchRejected` (avoids quota cascades), bounded retry on
    /// `LaunchInfrastructureError`.
    pub fn is_transient(&self) -> bool {
        matches!(self, LauncherError::LaunchInfrastructureError(_))
    }
}
