//! Shared types, error taxonomy, configuration, and telemetry init for every
//! scanhive crate. No domain logic lives here — just the plumbing every
//! other module needs.

pub mod cancel;
pub mod config;
pub mod depgraph;
pub mod error;
pub mod ids;
pub mod retry;
pub mod telemetry;
pub mod types;

pub use config::Config;
pub use error::ScanhiveError;
pub use ids::{short_correlation_id, AssetId, JobId, ModuleName, ScanId};
pub use types::{JobRole, JobStatus, ScanStatus};
