use scanhive_common::depgraph::DepGraphError;
use scanhive_common::ModuleName;
use scanhive_jobstore::JobStoreError;
use scanhive_registry::RegistryError;
use scanhive_streambus::StreamBusError;
use thiserror::Error;

/// One launch's disposition within a failed launch sequence (§4.5.2 step 5).
#[derive(Debug, Clone)]
pub struct LaunchFailureDetail {
    pub module: ModuleName,
    pub error: String,
}

/// Fail-fast errors from the early, pre-monitoring stages of a pipeline run.
/// `Timeout` and multi-status outcomes are not here — a timeout still
/// resolves to a returned `PipelineOutcome` (§4.5.3's pseudocode returns the
/// aggregate even when the timeout elapsed), never a hard error.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    ConfigurationError(String),

    #[error("ambiguous producer among modules: {0:?}")]
    AmbiguousProducer(Vec<ModuleName>),

    #[error("launch failed: {0:?}")]
    LaunchFailure(Vec<LaunchFailureDetail>),

    #[error("infrastructure error: {0}")]
    InfrastructureError(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<DepGraphError> for PipelineError {
    fn from(err: DepGraphError) -> Self {
        match err {
            DepGraphError::Cycle(modules) => PipelineError::ConfigurationError(format!(
                "dependency cycle among requested modules: {modules:?}"
            )),
            DepGraphError::AmbiguousProducer(modules) => PipelineError::AmbiguousProducer(modules),
            DepGraphError::UnknownModule(module) => {
                PipelineError::ConfigurationError(format!("unknown module: {module}"))
            }
        }
    }
}

impl From<RegistryError> for PipelineError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::UnknownModule(m) => {
                PipelineError::ConfigurationError(format!("unknown module: {m}"))
            }
            RegistryError::Cycle(modules) => PipelineError::ConfigurationError(format!(
                "dependency cycle among requested modules: {modules:?}"
            )),
            RegistryError::AmbiguousProducer(modules) => PipelineError::AmbiguousProducer(modules),
            other => PipelineError::ConfigurationError(other.to_string()),
        }
    }
}

impl From<JobStoreError> for PipelineError {
    fn from(err: JobStoreError) -> Self {
        PipelineError::InfrastructureError(err.to_string())
    }
}

impl From<StreamBusError> for PipelineError {
    fn from(err: StreamBusError) -> Self {
        PipelineError::InfrastructureError(err.to_string())
    }
}
