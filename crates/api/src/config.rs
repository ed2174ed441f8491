use std::str::FromStr;
use std::time::Duration;

use loadplan_core::calculation::DEFAULT_ASYNC_ALGORITHMS;
use loadplan_core::reconcile::NumericFallback;

/// Where job correlations are kept.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRegistryKind {
    /// `calculation_jobs` table; survives restarts.
    Postgres,
    /// Process-local map; lost on restart.
    Memory,
}

impl FromStr for JobRegistryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "pg" => Ok(Self::Postgres),
            "memory" | "in_memory" => Ok(Self::Memory),
            other => Err(format!("unknown job registry '{other}'")),
        }
    }
}

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for local development.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `8080`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Deadline for a calculation submit, which may wait on a synchronous
    /// solve (default: `600`).
    pub submit_timeout_secs: u64,
    /// Compute service URL (default: `http://localhost:8000`).
    pub solver_url: String,
    /// Deadline on each upstream event-stream read (default: `300`).
    pub solver_stream_idle_timeout_secs: u64,
    pub job_registry: JobRegistryKind,
    /// Age after which a job correlation is treated as gone (default: `86400`).
    pub job_ttl_secs: u64,
    pub numeric_fallback: NumericFallback,
    /// Algorithms started as asynchronous jobs.
    pub async_algorithms: Vec<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                           | Default                     |
    /// |-----------------------------------|-----------------------------|
    /// | `HOST`                            | `0.0.0.0`                   |
    /// | `PORT`                            | `8080`                      |
    /// | `CORS_ORIGINS`                    | `http://localhost:3000`     |
    /// | `REQUEST_TIMEOUT_SECS`            | `30`                        |
    /// | `SUBMIT_TIMEOUT_SECS`             | `600`                       |
    /// | `SOLVER_URL`                      | `http://localhost:8000`     |
    /// | `SOLVER_STREAM_IDLE_TIMEOUT_SECS` | `300`                       |
    /// | `JOB_REGISTRY`                    | `postgres`                  |
    /// | `JOB_TTL_SECS`                    | `86400`                     |
    /// | `NUMERIC_FALLBACK`                | `zero_means_absent`         |
    /// | `ASYNC_ALGORITHMS`                | `PYTHON_GA,PYTHON_CLPTAC`   |
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary variable lookup.
    ///
    /// Panics on unparseable values so misconfiguration fails at start-up.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let host = var("HOST", "0.0.0.0");

        let port: u16 = var("PORT", "8080")
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins = split_list(&var("CORS_ORIGINS", "http://localhost:3000"));

        let request_timeout_secs: u64 = var("REQUEST_TIMEOUT_SECS", "30")
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let submit_timeout_secs: u64 = var("SUBMIT_TIMEOUT_SECS", "600")
            .parse()
            .expect("SUBMIT_TIMEOUT_SECS must be a valid u64");

        let solver_url = var("SOLVER_URL", "http://localhost:8000");

        let solver_stream_idle_timeout_secs: u64 = var("SOLVER_STREAM_IDLE_TIMEOUT_SECS", "300")
            .parse()
            .expect("SOLVER_STREAM_IDLE_TIMEOUT_SECS must be a valid u64");

        let job_registry: JobRegistryKind = var("JOB_REGISTRY", "postgres")
            .parse()
            .expect("JOB_REGISTRY must be 'postgres' or 'memory'");

        let job_ttl_secs: u64 = var("JOB_TTL_SECS", "86400")
            .parse()
            .expect("JOB_TTL_SECS must be a valid u64");

        let numeric_fallback: NumericFallback = var("NUMERIC_FALLBACK", "zero_means_absent")
            .parse()
            .expect("NUMERIC_FALLBACK must be 'zero_means_absent' or 'presence'");

        let async_algorithms = split_list(&var(
            "ASYNC_ALGORITHMS",
            &DEFAULT_ASYNC_ALGORITHMS.join(","),
        ));

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            submit_timeout_secs,
            solver_url,
            solver_stream_idle_timeout_secs,
            job_registry,
            job_ttl_secs,
            numeric_fallback,
            async_algorithms,
        }
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.solver_stream_idle_timeout_secs)
    }

    /// Registry TTL; `JOB_TTL_SECS=0` disables expiry.
    pub fn job_ttl(&self) -> Option<Duration> {
        (self.job_ttl_secs > 0).then(|| Duration::from_secs(self.job_ttl_secs))
    }
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}
