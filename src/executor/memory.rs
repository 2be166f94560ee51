use super::backend::{Backend, ExecuteResponse};
use crate::core::{Result, ResultMetadata, Row, ShardingError, Value};
use crate::result::{MemoryQueryResult, UpdateResult};
use crate::rewrite::SqlUnit;
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone)]
enum Scripted {
    Rows {
        metadata: ResultMetadata,
        rows: Vec<Row>,
        fail_after: Option<(usize, String)>,
    },
    Update(u64),
    Failure(String),
}

#[derive(Debug, Clone)]
struct Script {
    data_source: String,
    sql_fragment: Option<String>,
    response: Scripted,
}

impl Script {
    fn matches(&self, data_source: &str, sql: &str) -> bool {
        self.data_source == data_source
            && self
                .sql_fragment
                .as_deref()
                .is_none_or(|fragment| sql.contains(fragment))
    }
}

/// In-process backend answering from scripted responses.
///
/// The most recently added script matching the data source (and SQL
/// fragment, when given) wins. Every query result it hands out shares one
/// close counter.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    scripts: Mutex<Vec<Script>>,
    latencies: Mutex<Vec<(String, Duration)>>,
    executed: Mutex<Vec<SqlUnit>>,
    opened: Arc<AtomicUsize>,
    closed: Arc<AtomicUsize>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn script(self, data_source: &str, sql_fragment: Option<&str>, response: Scripted) -> Self {
        if let Ok(mut scripts) = self.scripts.lock() {
            scripts.push(Script {
                data_source: data_source.to_string(),
                sql_fragment: sql_fragment.map(str::to_string),
                response,
            });
        }
        self
    }

    pub fn with_rows(self, data_source: &str, metadata: ResultMetadata, rows: Vec<Row>) -> Self {
        self.script(
            data_source,
            None,
            Scripted::Rows {
                metadata,
                rows,
                fail_after: None,
            },
        )
    }

    /// Rows returned only for SQL containing `fragment`.
    pub fn with_rows_matching(self, data_source: &str, fragment: &str, metadata: ResultMetadata, rows: Vec<Row>) -> Self {
        self.script(
            data_source,
            Some(fragment),
            Scripted::Rows {
                metadata,
                rows,
                fail_after: None,
            },
        )
    }

    /// A cursor that fails after producing `fail_after` of its rows.
    pub fn with_broken_rows(
        self,
        data_source: &str,
        metadata: ResultMetadata,
        rows: Vec<Row>,
        fail_after: usize,
        message: &str,
    ) -> Self {
        self.script(
            data_source,
            None,
            Scripted::Rows {
                metadata,
                rows,
                fail_after: Some((fail_after, message.to_string())),
            },
        )
    }

    pub fn with_update(self, data_source: &str, affected_rows: u64) -> Self {
        self.script(data_source, None, Scripted::Update(affected_rows))
    }

    pub fn with_failure(self, data_source: &str, message: &str) -> Self {
        self.script(data_source, None, Scripted::Failure(message.to_string()))
    }

    pub fn with_latency(self, data_source: &str, latency: Duration) -> Self {
        if let Ok(mut latencies) = self.latencies.lock() {
            latencies.push((data_source.to_string(), latency));
        }
        self
    }

    /// Statements received so far, in arrival order.
    pub fn executed(&self) -> Vec<SqlUnit> {
        self.executed.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Number of query results handed out.
    pub fn opened_results(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// Number of `close` calls across every query result handed out.
    pub fn closed_results(&self) -> usize {
        self.closed.load(Ordering::SeqCst)
    }

    fn latency(&self, data_source: &str) -> Result<Option<Duration>> {
        Ok(self
            .latencies
            .lock()?
            .iter()
            .rev()
            .find(|(name, _)| name == data_source)
            .map(|(_, latency)| *latency))
    }

    fn lookup(&self, data_source: &str, sql: &str) -> Result<Scripted> {
        self.scripts
            .lock()?
            .iter()
            .rev()
            .find(|script| script.matches(data_source, sql))
            .map(|script| script.response.clone())
            .ok_or_else(|| ShardingError::execution(data_source, format!("No scripted response for '{}'", sql)))
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn execute(&self, data_source: &str, sql: &str, parameters: &[Value]) -> Result<ExecuteResponse> {
        if let Some(latency) = self.latency(data_source)? {
            tokio::time::sleep(latency).await;
        }
        self.executed.lock()?.push(SqlUnit {
            data_source: data_source.to_string(),
            sql: sql.to_string(),
            parameters: parameters.to_vec(),
        });

        match self.lookup(data_source, sql)? {
            Scripted::Rows {
                metadata,
                rows,
                fail_after,
            } => {
                let mut result = MemoryQueryResult::new(metadata, rows).with_close_counter(self.closed.clone());
                if let Some((after, message)) = fail_after {
                    result = result.fail_after(after, message);
                }
                self.opened.fetch_add(1, Ordering::SeqCst);
                Ok(ExecuteResponse::Query(Box::new(result)))
            }
            Scripted::Update(affected) => Ok(ExecuteResponse::Update(UpdateResult::new(affected))),
            Scripted::Failure(message) => Err(ShardingError::execution(data_source, message)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnMetadata, DataType};

    fn metadata() -> ResultMetadata {
        ResultMetadata::new(vec![ColumnMetadata::new("id", DataType::Integer)])
    }

    #[tokio::test]
    async fn test_scripted_responses() {
        let backend = MemoryBackend::new()
            .with_rows("ds0", metadata(), vec![vec![Value::Integer(1)]])
            .with_rows_matching("ds0", "t_order_1", metadata(), vec![vec![Value::Integer(9)]])
            .with_update("ds1", 3)
            .with_failure("ds2", "connection refused");

        let mut query = match backend.execute("ds0", "SELECT id FROM t_order_1", &[]).await.unwrap() {
            ExecuteResponse::Query(result) => result,
            other => panic!("expected rows, got {:?}", other),
        };
        assert!(query.next().unwrap());
        assert_eq!(query.value(1).unwrap(), Value::Integer(9));
        query.close().unwrap();

        match backend.execute("ds1", "DELETE FROM t", &[Value::Integer(1)]).await.unwrap() {
            ExecuteResponse::Update(update) => assert_eq!(update.affected_rows, 3),
            other => panic!("expected update, got {:?}", other),
        }

        let err = backend.execute("ds2", "SELECT 1", &[]).await.unwrap_err();
        assert_eq!(err, ShardingError::execution("ds2", "connection refused"));
        assert!(backend.execute("ds9", "SELECT 1", &[]).await.is_err());

        assert_eq!(backend.opened_results(), 1);
        assert_eq!(backend.closed_results(), 1);
        assert_eq!(backend.executed().len(), 4);
        assert_eq!(backend.executed()[1].parameters, vec![Value::Integer(1)]);
    }
}
