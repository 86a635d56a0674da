use thiserror::Error;

use crate::ids::ModuleName;

/// Error taxonomy shared across the scan-execution subsystem. Individual
/// components (registry, job store, stream bus, launcher, pipeline,
/// orchestrator) layer their own narrower error enums on top of this where a
/// call site needs to match on something more specific; anything that only
/// needs to propagate ends up here via `#[from]`.
#[derive(Error, Debug)]
pub enum ScanhiveError {
    #[error("unknown module: {0}")]
    UnknownModule(ModuleName),

    #[error("validation error: {0}")]
    Validation(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("ambiguous producer among modules: {0:?}")]
    AmbiguousProducer(Vec<ModuleName>),

    #[error("duplicate job for ({scan_id}, {asset_id}, {module}): an earlier attempt is still non-terminal")]
    DuplicateJob {
        scan_id: uuid::Uuid,
        asset_id: uuid::Uuid,
        module: ModuleName,
    },

    #[error("infrastructure error: {0}")]
    Infrastructure(String),

    #[error("launch rejected: {0}")]
    LaunchRejected(String),

    #[error("launch infrastructure error: {0}")]
    LaunchInfrastructureError(String),

    #[error("image unavailable: {0}")]
    ImageUnavailable(String),

    #[error("worker timeout")]
    WorkerTimeout,

    #[error("config load error: {0}")]
    ConfigLoad(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
