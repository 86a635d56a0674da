use scanhive_common::ModuleName;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("unknown module: {0}")]
    UnknownModule(ModuleName),

    #[error("module catalog failed to load: {0}")]
    ConfigLoad(String),

    #[error("dependency cycle among enabled modules: {0:?}")]
    Cycle(Vec<ModuleName>),

    #[error("ambiguous producer among enabled modules sharing a dependency closure: {0:?}")]
    AmbiguousProducer(Vec<ModuleName>),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl From<scanhive_common::depgraph::DepGraphError> for RegistryError {
    fn from(err: scanhive_common::depgraph::DepGraphError) -> Self {
        match err {
            scanhive_common::depgraph::DepGraphError::Cycle(modules) => {
                RegistryError::Cycle(modules)
            }
            scanhive_common::depgraph::DepGraphError::AmbiguousProducer(modules) => {
                RegistryError::AmbiguousProducer(modules)
            }
            scanhive_common::depgraph::DepGraphError::UnknownModule(name) => {
                RegistryError::UnknownModule(name)
            }
        }
    }
}
