use scanhive_common::ModuleName;
use scanhive_jobstore::JobStoreError;
use thiserror::Error;
use uuid::Uuid;

/// Validation failures from `execute_scan`'s first step (§4.6 step 1).
/// Returned synchronously, before the scan record exists.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("request contains no assets")]
    EmptyRequest,

    #[error("asset {0} requests no modules")]
    EmptyModuleSet(Uuid),

    #[error("asset {asset_id} requests unknown or disabled module {module}")]
    UnknownModule { asset_id: Uuid, module: ModuleName },

    #[error("scan {0} not found")]
    ScanNotFound(Uuid),

    #[error("job store unavailable: {0}")]
    Infrastructure(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<JobStoreError> for OrchestratorError {
    fn from(err: JobStoreError) -> Self {
        match err {
            JobStoreError::ScanNotFound(id) => OrchestratorError::ScanNotFound(id),
            other => OrchestratorError::Infrastructure(other.to_string()),
        }
    }
}
