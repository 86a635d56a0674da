use anyhow::Result;
use tracing_subscriber::EnvFilter;

/// Initialize structured logging for a scanhive binary. Respects
/// `RUST_LOG`/`SCANHIVE_LOG` via `EnvFilter::from_default_env`, defaulting to
/// `info` for scanhive's own crates so a deployment with no env var set still
/// gets useful output.
pub fn init() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("scanhive=info".parse()?))
        .init();
    Ok(())
}
