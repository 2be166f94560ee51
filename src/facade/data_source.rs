use crate::config::ShardingProperties;
use crate::core::{Result, ShardingError, Value};
use crate::executor::{Backend, ExecuteResponse, ExecutionEngine, ExecutionPolicy};
use crate::merge::{MergeEngine, MergedResult, merge_update};
use crate::result::{QueryResult, UpdateResult};
use crate::rewrite::{KeyGenerator, SnowflakeKeyGenerator, SqlRewriter, SqlUnit};
use crate::routing::{RouteResult, RoutingEngine, SessionContext};
use crate::rule::{RuleHolder, ShardingRule};
use crate::statement::{SqlStatement, StatementKind};
use log::{debug, info};
use std::sync::Arc;

/// Outcome of one logical statement.
#[derive(Debug)]
pub enum ExecuteOutcome {
    Query(MergedResult),
    Update(UpdateResult),
}

impl ExecuteOutcome {
    pub fn into_query(self) -> Result<MergedResult> {
        match self {
            Self::Query(result) => Ok(result),
            Self::Update(_) => Err(ShardingError::Merge("Statement did not return rows".into())),
        }
    }

    pub fn into_update(self) -> Result<UpdateResult> {
        match self {
            Self::Update(result) => Ok(result),
            Self::Query(_) => Err(ShardingError::Merge("Statement returned rows".into())),
        }
    }
}

/// Entry point of the sharding layer: one logical data source over many
/// physical ones.
///
/// Every statement runs route, rewrite, execute and merge against the rule
/// snapshot current when it started. Replacing the rule never affects a
/// statement already in flight.
pub struct ShardingDataSource {
    rules: RuleHolder,
    backend: Arc<dyn Backend>,
    key_generator: Arc<dyn KeyGenerator>,
    engine: Arc<ExecutionEngine>,
    properties: ShardingProperties,
}

impl ShardingDataSource {
    /// Default properties, snowflake keys with worker id 0 and the global engine.
    pub fn new(rule: ShardingRule, backend: Arc<dyn Backend>) -> Result<Self> {
        Ok(Self {
            rules: RuleHolder::new(rule),
            backend,
            key_generator: Arc::new(SnowflakeKeyGenerator::new(0)?),
            engine: ExecutionEngine::global(),
            properties: ShardingProperties::default(),
        })
    }

    /// Applies `properties` with a dedicated execution engine.
    pub fn with_properties(mut self, properties: ShardingProperties) -> Result<Self> {
        self.engine = Arc::new(ExecutionEngine::from_properties(&properties)?);
        self.properties = properties;
        Ok(self)
    }

    pub fn with_key_generator(mut self, key_generator: Arc<dyn KeyGenerator>) -> Self {
        self.key_generator = key_generator;
        self
    }

    /// Shares an existing engine, e.g. between several data sources.
    pub fn with_engine(mut self, engine: Arc<ExecutionEngine>) -> Self {
        self.engine = engine;
        self
    }

    pub fn properties(&self) -> &ShardingProperties {
        &self.properties
    }

    pub fn rule(&self) -> Result<Arc<ShardingRule>> {
        self.rules.snapshot()
    }

    /// Swaps in a new rule for statements that start afterwards.
    pub fn renew_rule(&self, rule: ShardingRule) -> Result<()> {
        self.rules.renew(rule)
    }

    pub fn disable_data_sources(&self, names: &[String]) -> Result<()> {
        self.rules.disable_data_sources(names)
    }

    /// Routes and rewrites without executing.
    pub fn plan(
        &self,
        statement: &SqlStatement,
        parameters: &[Value],
        session: &mut SessionContext,
    ) -> Result<Vec<SqlUnit>> {
        let rule = self.rules.snapshot()?;
        let route = RoutingEngine::new(&rule, self.key_generator.as_ref()).route(statement, parameters, session)?;
        SqlRewriter::new(&rule, statement, &route, parameters).rewrite_all()
    }

    pub async fn execute(
        &self,
        session: &mut SessionContext,
        statement: &SqlStatement,
        parameters: &[Value],
    ) -> Result<ExecuteOutcome> {
        let rule = self.rules.snapshot()?;
        let route = RoutingEngine::new(&rule, self.key_generator.as_ref()).route(statement, parameters, session)?;
        let units = SqlRewriter::new(&rule, statement, &route, parameters).rewrite_all()?;
        self.show_sql(statement, &units);

        if units.is_empty() {
            debug!("Statement routed to no data node");
            return Ok(empty_outcome(statement.kind, &route));
        }

        let responses = self
            .engine
            .execute(
                Arc::clone(&self.backend),
                units,
                self.properties.max_connections_per_query,
                self.policy_for(statement.kind),
            )
            .await?;

        let outcome = if statement.kind.is_query() || responses.iter().all(ExecuteResponse::is_query) {
            let results = responses
                .into_iter()
                .filter_map(|response| match response {
                    ExecuteResponse::Query(result) => Some(result),
                    ExecuteResponse::Update(_) => None,
                })
                .collect::<Vec<Box<dyn QueryResult>>>();
            ExecuteOutcome::Query(MergeEngine::new(statement, parameters).merge(results)?)
        } else {
            ExecuteOutcome::Update(merge_update(responses, &route.generated_keys)?)
        };

        if statement.kind == StatementKind::Tcl {
            apply_transaction_control(session, &statement.sql);
        }
        Ok(outcome)
    }

    fn policy_for(&self, kind: StatementKind) -> ExecutionPolicy {
        self.properties.failure_policy.unwrap_or(if kind.is_query() {
            ExecutionPolicy::CollectAll
        } else {
            ExecutionPolicy::FailFast
        })
    }

    fn show_sql(&self, statement: &SqlStatement, units: &[SqlUnit]) {
        if !self.properties.sql_show {
            return;
        }
        info!("Logic SQL: {}", statement.sql);
        for unit in units {
            info!("Actual SQL: {}", unit);
        }
    }
}

fn empty_outcome(kind: StatementKind, route: &RouteResult) -> ExecuteOutcome {
    if kind.is_query() {
        ExecuteOutcome::Query(MergedResult::empty())
    } else {
        ExecuteOutcome::Update(UpdateResult::new(0).with_generated_keys(route.generated_keys.clone()))
    }
}

/// Session bookkeeping after a transaction-control statement succeeded.
fn apply_transaction_control(session: &mut SessionContext, sql: &str) {
    let normalized = sql
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_ascii_uppercase();
    let normalized = normalized.trim_end_matches(';').trim_end();

    if normalized.starts_with("BEGIN") || normalized.starts_with("START TRANSACTION") {
        session.begin();
    } else if normalized.starts_with("COMMIT") {
        session.commit();
    } else if normalized.starts_with("ROLLBACK") {
        session.rollback();
    } else if let Some(value) = normalized.strip_prefix("SET AUTOCOMMIT") {
        match value.trim_start_matches([' ', '=']) {
            "0" | "FALSE" | "OFF" => session.begin(),
            "1" | "TRUE" | "ON" => session.commit(),
            _ => {}
        }
    }
}
