use scanhive_common::ModuleName;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum JobStoreError {
    #[error("duplicate job for ({scan_id}, {asset_id}, {module}): an earlier attempt is still non-terminal")]
    DuplicateJob {
        scan_id: Uuid,
        asset_id: Uuid,
        module: ModuleName,
    },

    #[error("scan record {0} not found")]
    ScanNotFound(Uuid),

    #[error("job store unavailable: {0}")]
    Infrastructure(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
