use httpbench_client::FetchConfig;
use httpbench_common::{BenchError, Result, Target, DEFAULT_CONNECT_TIMEOUT};
use std::time::Duration;

/// How the finished report is written to stdout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
}

/// Everything one benchmark run needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct BenchConfig {
    pub target: Target,
    pub requests: usize,
    /// Batch size; always at least 1 once resolved.
    pub concurrency: usize,
    pub connect_timeout: Duration,
    pub read_window: Option<Duration>,
    /// Sleep between consecutive batches.
    pub pause: Duration,
    pub format: OutputFormat,
}

impl BenchConfig {
    /// Build a config for `url`, leaving everything but the batch size at its default.
    pub fn new(url: &str, requests: usize, concurrency: Option<i64>) -> Result<Self> {
        let config = Self {
            target: Target::parse(url)?,
            requests,
            concurrency: resolve_concurrency(concurrency),
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            read_window: None,
            pause: Duration::ZERO,
            format: OutputFormat::Table,
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that must not start a run.
    pub fn validate(&self) -> Result<()> {
        if self.target.host.is_empty() {
            return Err(BenchError::EmptyTarget);
        }
        if self.requests == 0 {
            return Err(BenchError::NoRequests);
        }
        Ok(())
    }

    pub fn fetch_config(&self) -> FetchConfig {
        FetchConfig { connect_timeout: self.connect_timeout, read_window: self.read_window }
    }
}

/// Missing or non-positive concurrency falls back to the number of CPUs.
pub fn resolve_concurrency(requested: Option<i64>) -> usize {
    match requested {
        Some(n) if n > 0 => n as usize,
        _ => num_cpus::get().max(1),
    }
}
