use std::env;
use std::time::Duration;

/// Application configuration loaded from environment variables.
///
/// A single `Config` is shared by every binary (`scanhive-server`,
/// `scanhive-migrate`) and by integration tests; fields that only matter to
/// one binary are still loaded unconditionally since none of them are
/// expensive to read.
#[derive(Debug, Clone)]
pub struct Config {
    // Job Store (Postgres)
    pub database_url: String,

    // Stream Bus (Redis)
    pub redis_url: String,

    // Worker Launcher
    pub launcher_base_url: String,
    pub launcher_token: String,
    pub default_security_group_ids: Vec<String>,
    pub default_subnet_ids: Vec<String>,

    // Pipeline timing (§4.5 recommended values)
    pub poll_interval: Duration,
    pub health_check_interval: Duration,
    pub startup_grace_period: Duration,
    pub default_job_timeout: Duration,

    // Scan Orchestrator
    pub max_parallel_assets_per_scan: usize,

    // Inbound HTTP surface
    pub server_host: String,
    pub server_port: u16,
}

impl Config {
    /// Load configuration from environment variables.
    /// Panics with a clear message if required vars are missing.
    pub fn from_env() -> Self {
        let default_security_group_ids = env::var("DEFAULT_SECURITY_GROUP_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let default_subnet_ids = env::var("DEFAULT_SUBNET_IDS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: required_env("REDIS_URL"),
            launcher_base_url: required_env("LAUNCHER_BASE_URL"),
            launcher_token: required_env("LAUNCHER_TOKEN"),
            default_security_group_ids,
            default_subnet_ids,
            poll_interval: secs_env("SCANHIVE_POLL_INTERVAL_SECS", 10),
            health_check_interval: secs_env("SCANHIVE_HEALTH_CHECK_INTERVAL_SECS", 30),
            startup_grace_period: secs_env("SCANHIVE_STARTUP_GRACE_PERIOD_SECS", 120),
            default_job_timeout: secs_env("SCANHIVE_DEFAULT_JOB_TIMEOUT_SECS", 3600),
            max_parallel_assets_per_scan: env::var("SCANHIVE_MAX_PARALLEL_ASSETS_PER_SCAN")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(8),
            server_host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            server_port: env::var("SERVER_PORT")
                .unwrap_or_else(|_| "8080".to_string())
                .parse()
                .expect("SERVER_PORT must be a number"),
        }
    }

    /// Load config for the migration runner: only the database connection
    /// matters, everything else would panic on missing launcher/redis vars
    /// that a bare schema migration has no business requiring.
    pub fn migrate_from_env() -> Self {
        Self {
            database_url: required_env("DATABASE_URL"),
            redis_url: String::new(),
            launcher_base_url: String::new(),
            launcher_token: String::new(),
            default_security_group_ids: Vec::new(),
            default_subnet_ids: Vec::new(),
            poll_interval: Duration::from_secs(10),
            health_check_interval: Duration::from_secs(30),
            startup_grace_period: Duration::from_secs(120),
            default_job_timeout: Duration::from_secs(3600),
            max_parallel_assets_per_scan: 8,
            server_host: String::new(),
            server_port: 0,
        }
    }

    /// Log the first few characters of sensitive values for debugging, never
    /// the values themselves.
    pub fn log_redacted(&self) {
        let vars = [
            ("DATABASE_URL", &self.database_url),
            ("REDIS_URL", &self.redis_url),
            ("LAUNCHER_BASE_URL", &self.launcher_base_url),
            ("LAUNCHER_TOKEN", &self.launcher_token),
        ];
        for (name, value) in vars {
            if value.is_empty() {
                tracing::info!("{name} = (empty)");
            } else {
                tracing::info!("{name} = ({} chars)", value.len());
            }
        }
    }
}

fn secs_env(key: &str, default_secs: u64) -> Duration {
    let secs = env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default_secs);
    Duration::from_secs(secs)
}

fn required_env(key: &str) -> String {
    env::var(key).unwrap_or_else(|_| panic!("{key} environment variable is required"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn migrate_config_does_not_require_launcher_vars() {
        std::env::set_var("DATABASE_URL", "postgres://localhost/scanhive_test");
        let cfg = Config::migrate_from_env();
        assert_eq!(cfg.database_url, "postgres://localhost/scanhive_test");
        assert!(cfg.launcher_base_url.is_empty());
    }

    #[test]
    fn secs_env_falls_back_to_default() {
        std::env::remove_var("SCANHIVE_DOES_NOT_EXIST");
        assert_eq!(secs_env("SCANHIVE_DOES_NOT_EXIST", 42), Duration::from_secs(42));
    }
}
