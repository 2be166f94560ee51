// ============================================================================
// Parallel Execution Coordinator
// ============================================================================
//
// One tokio task per rewritten unit. Two semaphores bound concurrency: the
// engine-wide worker pool and, within one statement, a limit on simultaneous
// units per data source. Units on different data sources always overlap.
// Output position i always belongs to unit i, whatever order tasks finish in.
//
// ============================================================================

use super::backend::{Backend, ExecuteResponse};
use crate::config::ShardingProperties;
use crate::core::{Result, ShardingError};
use crate::rewrite::SqlUnit;
use futures::StreamExt;
use futures::stream::FuturesUnordered;
use lazy_static::lazy_static;
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{Instrument, Level, event, info_span};

const DEFAULT_ACQUIRE_TIMEOUT: Duration = Duration::from_secs(30);

lazy_static! {
    static ref GLOBAL_ENGINE: Arc<ExecutionEngine> = Arc::new(ExecutionEngine::new(
        ShardingProperties::default().resolved_executor_size(),
        DEFAULT_ACQUIRE_TIMEOUT,
    ));
}

/// What to do when a unit fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionPolicy {
    /// Return the first failure as soon as it is observed.
    FailFast,
    /// Wait for every unit, then report the first failure by position.
    CollectAll,
}

#[derive(Debug)]
pub struct ExecutionEngine {
    workers: Arc<Semaphore>,
    size: usize,
    acquire_timeout: Duration,
}

impl ExecutionEngine {
    pub fn new(size: usize, acquire_timeout: Duration) -> Self {
        let size = size.max(1);
        Self {
            workers: Arc::new(Semaphore::new(size)),
            size,
            acquire_timeout,
        }
    }

    pub fn from_properties(properties: &ShardingProperties) -> Result<Self> {
        properties.validate().map_err(ShardingError::Config)?;
        Ok(Self::new(properties.resolved_executor_size(), properties.acquire_timeout))
    }

    /// Process-wide engine sized to the available parallelism.
    pub fn global() -> Arc<ExecutionEngine> {
        Arc::clone(&GLOBAL_ENGINE)
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub fn available_workers(&self) -> usize {
        self.workers.available_permits()
    }

    /// Runs every unit and returns the responses in unit order.
    ///
    /// On failure no response is handed back: those already received are
    /// closed here, those still running are closed when they complete.
    pub async fn execute(
        &self,
        backend: Arc<dyn Backend>,
        units: Vec<SqlUnit>,
        max_connections_per_query: usize,
        policy: ExecutionPolicy,
    ) -> Result<Vec<ExecuteResponse>> {
        match policy {
            ExecutionPolicy::FailFast => self.execute_fail_fast(backend, units, max_connections_per_query).await,
            ExecutionPolicy::CollectAll => {
                let outcomes = self.execute_all(backend, units, max_connections_per_query).await;
                let mut responses = Vec::with_capacity(outcomes.len());
                let mut first_error = None;
                for outcome in outcomes {
                    match outcome {
                        Ok(response) => responses.push(response),
                        Err(err) => {
                            first_error.get_or_insert(err);
                        }
                    }
                }
                match first_error {
                    Some(err) => {
                        responses.into_iter().for_each(ExecuteResponse::close_quietly);
                        Err(err)
                    }
                    None => Ok(responses),
                }
            }
        }
    }

    /// Waits for every unit and returns each outcome at its unit's position.
    pub async fn execute_all(
        &self,
        backend: Arc<dyn Backend>,
        units: Vec<SqlUnit>,
        max_connections_per_query: usize,
    ) -> Vec<Result<ExecuteResponse>> {
        let data_sources: Vec<String> = units.iter().map(|u| u.data_source.clone()).collect();
        let handles = self.spawn_units(backend, units, max_connections_per_query);
        let mut outcomes = Vec::with_capacity(handles.len());
        for (handle, data_source) in handles.into_iter().zip(data_sources) {
            outcomes.push(join_outcome(handle.await, &data_source));
        }
        outcomes
    }

    async fn execute_fail_fast(
        &self,
        backend: Arc<dyn Backend>,
        units: Vec<SqlUnit>,
        max_connections_per_query: usize,
    ) -> Result<Vec<ExecuteResponse>> {
        let data_sources: Vec<String> = units.iter().map(|u| u.data_source.clone()).collect();
        let handles = self.spawn_units(backend, units, max_connections_per_query);
        let mut slots: Vec<Option<ExecuteResponse>> = (0..handles.len()).map(|_| None).collect();
        let mut pending: FuturesUnordered<_> = handles
            .into_iter()
            .enumerate()
            .map(|(index, handle)| async move { (index, handle.await) })
            .collect();

        while let Some((index, joined)) = pending.next().await {
            match join_outcome(joined, &data_sources[index]) {
                Ok(response) => slots[index] = Some(response),
                Err(err) => {
                    debug!("Unit {} on '{}' failed, abandoning statement", index, data_sources[index]);
                    slots.into_iter().flatten().for_each(ExecuteResponse::close_quietly);
                    if !pending.is_empty() {
                        tokio::spawn(async move {
                            while let Some((_, joined)) = pending.next().await {
                                if let Ok(Ok(response)) = joined {
                                    response.close_quietly();
                                }
                            }
                        });
                    }
                    return Err(err);
                }
            }
        }
        Ok(slots.into_iter().flatten().collect())
    }

    fn spawn_units(
        &self,
        backend: Arc<dyn Backend>,
        units: Vec<SqlUnit>,
        max_connections_per_query: usize,
    ) -> Vec<JoinHandle<Result<ExecuteResponse>>> {
        let mut per_data_source: HashMap<String, Arc<Semaphore>> = HashMap::new();
        units
            .into_iter()
            .enumerate()
            .map(|(index, unit)| {
                let backend = Arc::clone(&backend);
                let connections = Arc::clone(
                    per_data_source
                        .entry(unit.data_source.clone())
                        .or_insert_with(|| Arc::new(Semaphore::new(max_connections_per_query.max(1)))),
                );
                let workers = Arc::clone(&self.workers);
                let wait = self.acquire_timeout;
                tokio::spawn(async move {
                    let _connection_permit = acquire_permit(connections, wait, "connection").await?;
                    let _worker_permit = acquire_permit(workers, wait, "worker").await?;
                    let span = info_span!(
                        "sharding.execute.unit",
                        index = index,
                        data_source = %unit.data_source
                    );
                    execute_unit(backend, unit).instrument(span).await
                })
            })
            .collect()
    }
}

async fn execute_unit(backend: Arc<dyn Backend>, unit: SqlUnit) -> Result<ExecuteResponse> {
    event!(Level::DEBUG, sql = %unit.sql, "executing unit");
    match backend.execute(&unit.data_source, &unit.sql, &unit.parameters).await {
        Ok(response) => {
            event!(Level::DEBUG, "unit executed");
            Ok(response)
        }
        Err(err) => {
            event!(Level::ERROR, error = %err, "unit execution failed");
            Err(err)
        }
    }
}

async fn acquire_permit(semaphore: Arc<Semaphore>, wait: Duration, kind: &'static str) -> Result<OwnedSemaphorePermit> {
    timeout(wait, semaphore.acquire_owned())
        .await
        .map_err(|_| {
            ShardingError::Timeout(format!(
                "Could not acquire a {} permit within {}ms",
                kind,
                wait.as_millis()
            ))
        })?
        .map_err(|_| ShardingError::execution("executor", format!("{} semaphore closed", kind)))
}

fn join_outcome(
    joined: std::result::Result<Result<ExecuteResponse>, tokio::task::JoinError>,
    data_source: &str,
) -> Result<ExecuteResponse> {
    joined.map_err(|err| ShardingError::execution(data_source, format!("Execution task failed: {}", err)))?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnMetadata, ResultMetadata, Value};
    use crate::executor::MemoryBackend;

    fn unit(data_source: &str) -> SqlUnit {
        SqlUnit {
            data_source: data_source.to_string(),
            sql: format!("SELECT id FROM t_{}", data_source),
            parameters: Vec::new(),
        }
    }

    fn metadata() -> ResultMetadata {
        ResultMetadata::new(vec![ColumnMetadata::new("id", crate::core::DataType::Integer)])
    }

    fn first_value(response: &mut ExecuteResponse) -> Value {
        match response {
            ExecuteResponse::Query(result) => {
                assert!(result.next().unwrap());
                result.value(1).unwrap()
            }
            ExecuteResponse::Update(_) => panic!("expected rows"),
        }
    }

    #[tokio::test]
    async fn test_connection_limit_applies_per_data_source() {
        let latency = Duration::from_millis(150);
        let backend = Arc::new(
            MemoryBackend::new()
                .with_update("ds0", 1)
                .with_update("ds1", 1)
                .with_update("ds2", 1)
                .with_update("ds3", 1)
                .with_latency("ds0", latency)
                .with_latency("ds1", latency)
                .with_latency("ds2", latency)
                .with_latency("ds3", latency),
        );
        let engine = ExecutionEngine::new(8, Duration::from_secs(2));

        let started = std::time::Instant::now();
        let responses = engine
            .execute(
                backend.clone(),
                vec![unit("ds0"), unit("ds1"), unit("ds2"), unit("ds3")],
                1,
                ExecutionPolicy::FailFast,
            )
            .await
            .unwrap();
        assert_eq!(responses.len(), 4);
        assert!(started.elapsed() < latency * 3, "took {:?}", started.elapsed());

        let started = std::time::Instant::now();
        engine
            .execute(backend, vec![unit("ds0"), unit("ds0")], 1, ExecutionPolicy::FailFast)
            .await
            .unwrap();
        assert!(started.elapsed() >= latency * 2, "took {:?}", started.elapsed());
    }

    #[tokio::test]
    async fn test_positions_follow_units_not_completion() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_rows("ds0", metadata(), vec![vec![Value::Integer(0)]])
                .with_rows("ds1", metadata(), vec![vec![Value::Integer(1)]])
                .with_rows("ds2", metadata(), vec![vec![Value::Integer(2)]])
                .with_latency("ds0", Duration::from_millis(60))
                .with_latency("ds1", Duration::from_millis(30)),
        );
        let engine = ExecutionEngine::new(4, Duration::from_secs(1));
        let mut responses = engine
            .execute(backend.clone(), vec![unit("ds0"), unit("ds1"), unit("ds2")], 3, ExecutionPolicy::FailFast)
            .await
            .unwrap();

        let values: Vec<Value> = responses.iter_mut().map(first_value).collect();
        assert_eq!(values, vec![Value::Integer(0), Value::Integer(1), Value::Integer(2)]);
        assert_eq!(backend.executed()[0].data_source, "ds2");
        assert_eq!(engine.available_workers(), 4);
    }

    #[tokio::test]
    async fn test_fail_fast_closes_late_successes() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_rows("ds0", metadata(), vec![vec![Value::Integer(0)]])
                .with_latency("ds0", Duration::from_millis(80))
                .with_failure("ds1", "boom")
                .with_rows("ds2", metadata(), vec![vec![Value::Integer(2)]]),
        );
        let engine = ExecutionEngine::new(4, Duration::from_secs(1));
        let err = engine
            .execute(backend.clone(), vec![unit("ds0"), unit("ds1"), unit("ds2")], 3, ExecutionPolicy::FailFast)
            .await
            .unwrap_err();
        assert_eq!(err, ShardingError::execution("ds1", "boom"));

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(backend.opened_results(), 2);
        assert_eq!(backend.closed_results(), 2);
    }

    #[tokio::test]
    async fn test_collect_all_reports_first_failure_by_position() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_failure("ds0", "first")
                .with_latency("ds0", Duration::from_millis(40))
                .with_rows("ds1", metadata(), vec![vec![Value::Integer(1)]])
                .with_failure("ds2", "second"),
        );
        let engine = ExecutionEngine::new(2, Duration::from_secs(1));
        let units = vec![unit("ds0"), unit("ds1"), unit("ds2")];

        let outcomes = engine.execute_all(backend.clone(), units.clone(), 3).await;
        assert!(outcomes[0].is_err());
        assert!(outcomes[1].is_ok());
        assert!(outcomes[2].is_err());
        outcomes.into_iter().flatten().for_each(ExecuteResponse::close_quietly);

        let err = engine
            .execute(backend.clone(), units, 3, ExecutionPolicy::CollectAll)
            .await
            .unwrap_err();
        assert_eq!(err, ShardingError::execution("ds0", "first"));
        assert_eq!(backend.opened_results(), backend.closed_results());
    }

    #[tokio::test]
    async fn test_permit_timeout() {
        let backend = Arc::new(
            MemoryBackend::new()
                .with_update("ds0", 1)
                .with_latency("ds0", Duration::from_millis(200)),
        );
        let engine = ExecutionEngine::new(1, Duration::from_millis(20));
        let err = engine
            .execute(backend, vec![unit("ds0"), unit("ds0")], 1, ExecutionPolicy::FailFast)
            .await
            .unwrap_err();
        assert!(matches!(err, ShardingError::Timeout(_)));
    }

    #[test]
    fn test_from_properties_validates() {
        let props = ShardingProperties::new().executor_size(3);
        assert_eq!(ExecutionEngine::from_properties(&props).unwrap().size(), 3);
        assert!(ExecutionEngine::from_properties(&props.max_connections_per_query(0)).is_err());
        assert!(ExecutionEngine::global().size() >= 1);
    }
}
