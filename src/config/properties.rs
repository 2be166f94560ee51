use crate::executor::ExecutionPolicy;
use std::time::Duration;

/// Runtime properties of a sharding data source
#[derive(Debug, Clone)]
pub struct ShardingProperties {
    /// Worker permits shared by every statement; 0 means available parallelism
    pub executor_size: usize,

    /// Units of one statement allowed to run at the same time on one data source
    pub max_connections_per_query: usize,

    /// How long a unit waits for a worker permit
    pub acquire_timeout: Duration,

    /// Log logical and actual SQL of every statement
    pub sql_show: bool,

    /// Overrides the per-statement-kind default policy
    pub failure_policy: Option<ExecutionPolicy>,
}

impl ShardingProperties {
    pub fn new() -> Self {
        Self {
            executor_size: 0,
            max_connections_per_query: 1,
            acquire_timeout: Duration::from_secs(30),
            sql_show: false,
            failure_policy: None,
        }
    }

    /// Set the worker pool size
    pub fn executor_size(mut self, size: usize) -> Self {
        self.executor_size = size;
        self
    }

    /// Set the per-statement concurrency bound
    pub fn max_connections_per_query(mut self, max: usize) -> Self {
        self.max_connections_per_query = max;
        self
    }

    /// Set permit acquisition timeout
    pub fn acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    pub fn sql_show(mut self, enabled: bool) -> Self {
        self.sql_show = enabled;
        self
    }

    pub fn failure_policy(mut self, policy: ExecutionPolicy) -> Self {
        self.failure_policy = Some(policy);
        self
    }

    /// Pool size after resolving 0 to the number of CPUs.
    pub fn resolved_executor_size(&self) -> usize {
        if self.executor_size > 0 {
            return self.executor_size;
        }
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.max_connections_per_query == 0 {
            return Err("max_connections_per_query must be > 0".to_string());
        }

        if self.acquire_timeout.is_zero() {
            return Err("acquire_timeout must be > 0".to_string());
        }

        Ok(())
    }
}

impl Default for ShardingProperties {
    fn default() -> Self {
        Self::new()
    }
}
