// ============================================================================
// Routing Engine
// ============================================================================
//
// Statement + parameters + session -> RouteResult. Pure with respect to the
// rule snapshot; the only mutation is the session's master-visited flag.
//
// Route kinds:
// - unicast: one unit (no tables, DAL, DQL over broadcast tables)
// - database broadcast: one unit per data source (TCL, DCL)
// - table broadcast: one unit per data node (DDL over a sharded table)
// - standard: strategy-driven (DQL/DML over sharded tables)
//
// ============================================================================

use super::condition::extract_sharding_values;
use super::master_slave::MasterSlaveRouter;
use super::route_result::{RouteResult, RoutingUnit};
use super::session::SessionContext;
use crate::core::{Result, ShardingError, Value};
use crate::rewrite::KeyGenerator;
use crate::rule::{DataNode, ShardingRule, ShardingStrategy, ShardingValue, TableRule};
use crate::statement::{Condition, ConditionGroup, SqlStatement, StatementKind, ValueExpr};
use log::debug;

#[derive(Clone, Copy)]
enum HintTarget {
    Database,
    Table,
}

pub struct RoutingEngine<'a> {
    rule: &'a ShardingRule,
    key_generator: &'a dyn KeyGenerator,
}

impl<'a> RoutingEngine<'a> {
    pub fn new(rule: &'a ShardingRule, key_generator: &'a dyn KeyGenerator) -> Self {
        Self { rule, key_generator }
    }

    pub fn route(
        &self,
        statement: &SqlStatement,
        parameters: &[Value],
        session: &mut SessionContext,
    ) -> Result<RouteResult> {
        let mut result = self.route_logical(statement, parameters, session)?;
        self.resolve_master_slave(&mut result, statement.kind, session);
        debug!(
            "Routed {:?} statement to {} unit(s): {}",
            statement.kind,
            result.len(),
            result
                .units
                .iter()
                .map(|u| u.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(result)
    }

    fn route_logical(
        &self,
        statement: &SqlStatement,
        parameters: &[Value],
        session: &SessionContext,
    ) -> Result<RouteResult> {
        let tables = statement.logic_tables();
        let sharded: Vec<&TableRule> = tables.iter().filter_map(|t| self.rule.table_rule(t)).collect();

        match statement.kind {
            StatementKind::Tcl | StatementKind::Dcl => Ok(self.database_broadcast()),
            StatementKind::Dal => self.unicast(&sharded),
            StatementKind::Ddl => {
                if !sharded.is_empty() {
                    self.check_configured(&tables)?;
                    self.table_broadcast(&sharded)
                } else if tables.is_empty() {
                    Ok(self.database_broadcast())
                } else {
                    self.route_unsharded(&tables, statement.kind)
                }
            }
            StatementKind::Dql | StatementKind::Dml => {
                if sharded.is_empty() {
                    if tables.is_empty() {
                        return self.unicast(&[]);
                    }
                    return self.route_unsharded(&tables, statement.kind);
                }
                self.check_configured(&tables)?;
                if statement.is_insert() {
                    self.route_insert(sharded[0], statement, parameters, session)
                } else {
                    self.route_sharded(&sharded, statement, parameters, session)
                }
            }
        }
    }

    /// Tables mixed with sharded ones must be sharded or broadcast.
    fn check_configured(&self, tables: &[String]) -> Result<()> {
        match tables
            .iter()
            .find(|t| !self.rule.is_sharded(t) && !self.rule.is_broadcast(t))
        {
            Some(table) => Err(ShardingError::Routing(format!(
                "Table '{}' has no sharding rule and is not a broadcast table",
                table
            ))),
            None => Ok(()),
        }
    }

    fn unicast_data_source(&self) -> &str {
        self.rule
            .default_data_source()
            .or_else(|| self.rule.data_source_names().first().map(String::as_str))
            .unwrap_or_default()
    }

    fn unicast(&self, sharded: &[&TableRule]) -> Result<RouteResult> {
        let mut result = RouteResult::default();
        let Some(primary) = sharded.first() else {
            result.push(RoutingUnit::new(self.unicast_data_source()));
            return Ok(result);
        };
        let node = primary.data_nodes().first().ok_or_else(|| {
            ShardingError::Routing(format!("Table '{}' has no data nodes", primary.logic_table()))
        })?;
        let mut unit = RoutingUnit::new(node.data_source.as_str()).with_table(primary.logic_table(), node.table.as_str());
        for other in &sharded[1..] {
            let actual = other.actual_tables(&node.data_source).into_iter().next().ok_or_else(|| {
                ShardingError::Routing(format!(
                    "Table '{}' has no actual table on '{}'",
                    other.logic_table(),
                    node.data_source
                ))
            })?;
            unit = unit.with_table(other.logic_table(), actual);
        }
        result.push(unit);
        Ok(result)
    }

    fn database_broadcast(&self) -> RouteResult {
        let mut result = RouteResult::default();
        for data_source in self.rule.data_source_names() {
            result.push(RoutingUnit::new(data_source.as_str()));
        }
        result
    }

    fn table_broadcast(&self, sharded: &[&TableRule]) -> Result<RouteResult> {
        let names: Vec<String> = sharded.iter().map(|r| r.logic_table().to_string()).collect();
        if sharded.len() > 1 && !self.rule.all_binding(&names) {
            return Err(ShardingError::Routing(format!(
                "Cannot broadcast DDL over unrelated sharded tables {:?}",
                names
            )));
        }
        let mut result = RouteResult::default();
        for node in sharded[0].data_nodes() {
            result.push(self.binding_unit(sharded[0], node, &sharded[1..])?);
        }
        Ok(result)
    }

    /// Broadcast and unconfigured tables only.
    fn route_unsharded(&self, tables: &[String], kind: StatementKind) -> Result<RouteResult> {
        let all_broadcast = tables.iter().all(|t| self.rule.is_broadcast(t));
        if all_broadcast && kind.is_query() {
            return self.unicast(&[]);
        }
        let mut result = RouteResult::default();
        if all_broadcast {
            for data_source in self.rule.data_source_names() {
                result.push(RoutingUnit::new(data_source.as_str()));
            }
            return Ok(result);
        }
        match self.rule.default_data_source() {
            Some(data_source) => {
                result.push(RoutingUnit::new(data_source));
                Ok(result)
            }
            None => Err(ShardingError::Routing(format!(
                "No sharding rule or default data source for {:?}",
                tables
                    .iter()
                    .filter(|t| !self.rule.is_broadcast(t))
                    .collect::<Vec<_>>()
            ))),
        }
    }

    /// Unit on `node`'s data source with binding tables at the same position.
    fn binding_unit(&self, primary: &TableRule, node: &DataNode, others: &[&TableRule]) -> Result<RoutingUnit> {
        let index = primary
            .actual_table_index(&node.data_source, &node.table)
            .ok_or_else(|| ShardingError::Routing(format!("Unknown data node '{}'", node)))?;
        let mut unit = RoutingUnit::new(node.data_source.as_str()).with_table(primary.logic_table(), node.table.as_str());
        for other in others {
            let actual = other.actual_table_at(&node.data_source, index).ok_or_else(|| {
                ShardingError::Routing(format!(
                    "Binding table '{}' has no actual table #{} on '{}'",
                    other.logic_table(),
                    index,
                    node.data_source
                ))
            })?;
            unit = unit.with_table(other.logic_table(), actual);
        }
        Ok(unit)
    }

    fn route_sharded(
        &self,
        sharded: &[&TableRule],
        statement: &SqlStatement,
        parameters: &[Value],
        session: &SessionContext,
    ) -> Result<RouteResult> {
        let default_group = ConditionGroup::default();
        let groups: Vec<&ConditionGroup> = if statement.conditions.is_empty() {
            vec![&default_group]
        } else {
            statement.conditions.iter().collect()
        };
        let names: Vec<String> = sharded.iter().map(|r| r.logic_table().to_string()).collect();
        let mut result = RouteResult::default();

        if sharded.len() == 1 || self.rule.all_binding(&names) {
            let nodes = self.route_table_in_groups(sharded[0], &names, &groups, parameters, session)?;
            for node in &nodes {
                result.push(self.binding_unit(sharded[0], node, &sharded[1..])?);
            }
            return Ok(result);
        }

        let mut routed: Vec<Vec<DataNode>> = Vec::with_capacity(sharded.len());
        for table_rule in sharded {
            let sources = vec![table_rule.logic_table().to_string()];
            let nodes = self.route_table_in_groups(table_rule, &sources, &groups, parameters, session)?;
            if nodes.is_empty() {
                return Ok(result);
            }
            routed.push(nodes);
        }

        let data_sources_of = |nodes: &[DataNode]| {
            let mut names: Vec<String> = Vec::new();
            for node in nodes {
                if !names.contains(&node.data_source) {
                    names.push(node.data_source.clone());
                }
            }
            names
        };
        let first_sources = data_sources_of(&routed[0]);
        for (table_rule, nodes) in sharded.iter().zip(routed.iter()).skip(1) {
            let mut sources = data_sources_of(nodes);
            let mut expected = first_sources.clone();
            sources.sort();
            expected.sort();
            if sources != expected {
                return Err(ShardingError::IncompatibleJoin(format!(
                    "'{}' routes to {:?} but '{}' routes to {:?}",
                    sharded[0].logic_table(),
                    expected,
                    table_rule.logic_table(),
                    sources
                )));
            }
        }

        for data_source in &first_sources {
            let mut partial = vec![RoutingUnit::new(data_source.as_str())];
            for (table_rule, nodes) in sharded.iter().zip(routed.iter()) {
                let mut next = Vec::new();
                for unit in &partial {
                    for node in nodes.iter().filter(|n| n.data_source == *data_source) {
                        next.push(unit.clone().with_table(table_rule.logic_table(), node.table.as_str()));
                    }
                }
                partial = next;
            }
            for unit in partial {
                result.push(unit);
            }
        }
        Ok(result)
    }

    /// Union of the nodes each OR branch routes to, in data-node order.
    fn route_table_in_groups(
        &self,
        table_rule: &TableRule,
        source_tables: &[String],
        groups: &[&ConditionGroup],
        parameters: &[Value],
        session: &SessionContext,
    ) -> Result<Vec<DataNode>> {
        let mut hit = vec![false; table_rule.data_nodes().len()];
        for group in groups {
            for node in self.route_table(table_rule, source_tables, group, parameters, session)? {
                if let Some(pos) = table_rule.data_nodes().iter().position(|n| *n == node) {
                    hit[pos] = true;
                }
            }
        }
        Ok(table_rule
            .data_nodes()
            .iter()
            .zip(hit)
            .filter(|(_, hit)| *hit)
            .map(|(node, _)| node.clone())
            .collect())
    }

    fn route_table(
        &self,
        table_rule: &TableRule,
        source_tables: &[String],
        group: &ConditionGroup,
        parameters: &[Value],
        session: &SessionContext,
    ) -> Result<Vec<DataNode>> {
        let database_strategy = self.rule.database_strategy(table_rule);
        let Some(database_values) = self.sharding_values(
            database_strategy,
            HintTarget::Database,
            table_rule,
            source_tables,
            group,
            parameters,
            session,
        )?
        else {
            return Ok(Vec::new());
        };
        let table_strategy = self.rule.table_strategy(table_rule);
        let Some(table_values) = self.sharding_values(
            table_strategy,
            HintTarget::Table,
            table_rule,
            source_tables,
            group,
            parameters,
            session,
        )?
        else {
            return Ok(Vec::new());
        };

        let mut nodes = Vec::new();
        let data_sources = database_strategy.do_sharding(&table_rule.data_source_names(), &database_values)?;
        for data_source in data_sources {
            let available = table_rule.actual_tables(&data_source);
            for table in table_strategy.do_sharding(&available, &table_values)? {
                nodes.push(DataNode::new(data_source.as_str(), table));
            }
        }
        Ok(nodes)
    }

    fn sharding_values(
        &self,
        strategy: &ShardingStrategy,
        target: HintTarget,
        table_rule: &TableRule,
        source_tables: &[String],
        group: &ConditionGroup,
        parameters: &[Value],
        session: &SessionContext,
    ) -> Result<Option<Vec<ShardingValue>>> {
        if strategy.is_hint() {
            let hint = match target {
                HintTarget::Database => session.database_hint(table_rule.logic_table()),
                HintTarget::Table => session.table_hint(table_rule.logic_table()),
            };
            return Ok(Some(
                hint.map(|values| vec![ShardingValue::list(table_rule.logic_table(), "", values.to_vec())])
                    .unwrap_or_default(),
            ));
        }
        extract_sharding_values(
            group,
            parameters,
            table_rule.logic_table(),
            source_tables,
            &strategy.sharding_columns(),
        )
    }

    fn route_insert(
        &self,
        table_rule: &TableRule,
        statement: &SqlStatement,
        parameters: &[Value],
        session: &SessionContext,
    ) -> Result<RouteResult> {
        let insert = statement
            .insert
            .as_ref()
            .ok_or_else(|| ShardingError::Routing("INSERT statement without VALUES".into()))?;
        let logic_table = table_rule.logic_table();
        if insert.columns.is_empty() && table_rule.data_nodes().len() > 1 {
            return Err(ShardingError::Routing(format!(
                "INSERT into sharded table '{}' needs an explicit column list",
                logic_table
            )));
        }

        // Without a column list every row already spells out the key column.
        let key_column = table_rule
            .generate_key_column()
            .filter(|column| insert.columns_end.is_some() && insert.column_index(column).is_none())
            .map(str::to_string);
        let generated_keys = match &key_column {
            Some(_) => insert
                .rows
                .iter()
                .map(|_| self.key_generator.generate_key())
                .collect::<Result<Vec<_>>>()?,
            None => Vec::new(),
        };

        let mut columns = self.rule.database_strategy(table_rule).sharding_columns();
        columns.extend(self.rule.table_strategy(table_rule).sharding_columns());
        let sources = vec![logic_table.to_string()];

        let mut rows_by_node: Vec<Vec<usize>> = vec![Vec::new(); table_rule.data_nodes().len()];
        for (row_index, row) in insert.rows.iter().enumerate() {
            let mut conditions = Vec::new();
            for column in &columns {
                let value = if key_column.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(column)) {
                    generated_keys[row_index].clone()
                } else if let Some(idx) = insert.column_index(column) {
                    row.values
                        .get(idx)
                        .ok_or_else(|| {
                            ShardingError::Routing(format!(
                                "INSERT row {} has no value for column '{}'",
                                row_index, column
                            ))
                        })?
                        .resolve(parameters)?
                } else {
                    continue;
                };
                conditions.push(Condition::equal(logic_table, column.as_str(), ValueExpr::Literal(value)));
            }

            let group = ConditionGroup::new(conditions);
            let nodes = self.route_table(table_rule, &sources, &group, &[], session)?;
            let [node] = nodes.as_slice() else {
                return Err(ShardingError::Routing(format!(
                    "INSERT row {} of '{}' routes to {} data nodes, expected exactly one",
                    row_index,
                    logic_table,
                    nodes.len()
                )));
            };
            if let Some(pos) = table_rule.data_nodes().iter().position(|n| n == node) {
                rows_by_node[pos].push(row_index);
            }
        }

        let mut result = RouteResult {
            generated_keys,
            generate_key_column: key_column,
            ..RouteResult::default()
        };
        for (node, rows) in table_rule.data_nodes().iter().zip(rows_by_node) {
            if rows.is_empty() {
                continue;
            }
            let mut unit = RoutingUnit::new(node.data_source.as_str()).with_table(logic_table, node.table.as_str());
            unit.insert_rows = rows;
            result.push(unit);
        }
        Ok(result)
    }

    fn resolve_master_slave(&self, result: &mut RouteResult, kind: StatementKind, session: &mut SessionContext) {
        if self.rule.master_slave_rules().is_empty() {
            return;
        }
        let logic: Vec<String> = result.units.iter().map(|u| u.logic_data_source.clone()).collect();
        let refs: Vec<&str> = logic.iter().map(String::as_str).collect();
        let resolved = MasterSlaveRouter::new(self.rule).resolve(&refs, kind, session);
        for unit in &mut result.units {
            if let Some(physical) = resolved.get(&unit.logic_data_source) {
                unit.data_source = physical.clone();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rewrite::IncrementKeyGenerator;
    use crate::statement::{ConditionOperator, OrderDirection};

    fn rule() -> ShardingRule {
        let order = TableRule::from_inline("t_order", "ds${0..1}.t_order_${0..1}")
            .unwrap()
            .with_database_strategy(ShardingStrategy::inline("user_id", "ds${user_id % 2}").unwrap())
            .with_table_strategy(ShardingStrategy::inline("order_id", "t_order_${order_id % 2}").unwrap())
            .with_generate_key_column("order_id");
        let item = TableRule::from_inline("t_order_item", "ds${0..1}.t_order_item_${0..1}")
            .unwrap()
            .with_database_strategy(ShardingStrategy::inline("user_id", "ds${user_id % 2}").unwrap())
            .with_table_strategy(ShardingStrategy::inline("order_id", "t_order_item_${order_id % 2}").unwrap());
        let user = TableRule::from_inline("t_user", "ds${0..1}.t_user")
            .unwrap()
            .with_database_strategy(ShardingStrategy::inline("user_id", "ds${user_id % 2}").unwrap());
        ShardingRule::builder()
            .data_sources(["ds0", "ds1"])
            .table_rule(order)
            .table_rule(item)
            .table_rule(user)
            .binding_group(["t_order", "t_order_item"])
            .broadcast_table("t_config")
            .build()
            .unwrap()
    }

    fn route(statement: &SqlStatement, parameters: &[Value]) -> Result<RouteResult> {
        let rule = rule();
        let keys = IncrementKeyGenerator::new(1000);
        let mut session = SessionContext::new();
        RoutingEngine::new(&rule, &keys).route(statement, parameters, &mut session)
    }

    fn targets(result: &RouteResult) -> Vec<String> {
        result.units.iter().map(|u| u.to_string()).collect()
    }

    #[test]
    fn test_equality_routes_to_single_node() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_order WHERE user_id = ? AND order_id = ?")
            .table("t_order")
            .where_and(vec![
                Condition::equal("t_order", "user_id", ValueExpr::param(0)),
                Condition::equal("t_order", "order_id", ValueExpr::param(1)),
            ])
            .build()
            .unwrap();
        let result = route(&stmt, &[Value::Integer(11), Value::Integer(4)]).unwrap();
        assert_eq!(targets(&result), vec!["ds1[t_order_0]"]);
    }

    #[test]
    fn test_no_condition_routes_everywhere() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_order ORDER BY order_id")
            .table("t_order")
            .order_by("order_id", OrderDirection::Asc)
            .build()
            .unwrap();
        let result = route(&stmt, &[]).unwrap();
        assert_eq!(
            targets(&result),
            vec!["ds0[t_order_0]", "ds0[t_order_1]", "ds1[t_order_0]", "ds1[t_order_1]"]
        );
    }

    #[test]
    fn test_or_branches_are_unioned() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_order WHERE user_id = 1 OR user_id = 2")
            .table("t_order")
            .where_and(vec![Condition::equal("t_order", "user_id", ValueExpr::literal(1))])
            .where_and(vec![Condition::new(
                "t_order",
                "user_id",
                ConditionOperator::Equal(ValueExpr::literal(2)),
            )])
            .build()
            .unwrap();
        assert_eq!(route(&stmt, &[]).unwrap().len(), 4);
    }

    #[test]
    fn test_binding_join_uses_same_position() {
        let stmt = SqlStatement::builder(
            StatementKind::Dql,
            "SELECT * FROM t_order o JOIN t_order_item i ON o.order_id = i.order_id WHERE i.order_id = 3 AND o.user_id = 2",
        )
        .table_as("t_order", "o")
        .table_as("t_order_item", "i")
        .where_and(vec![
            Condition::equal("t_order_item", "order_id", ValueExpr::literal(3)),
            Condition::equal("t_order", "user_id", ValueExpr::literal(2)),
        ])
        .build()
        .unwrap();
        let result = route(&stmt, &[]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result.units[0].actual_table("t_order"), Some("t_order_1"));
        assert_eq!(result.units[0].actual_table("t_order_item"), Some("t_order_item_1"));
        assert_eq!(result.units[0].data_source, "ds0");
    }

    #[test]
    fn test_unbound_join_is_cartesian_per_data_source() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_order o JOIN t_user u ON o.user_id = u.user_id")
            .table("t_order")
            .table("t_user")
            .build()
            .unwrap();
        let result = route(&stmt, &[]).unwrap();
        assert_eq!(result.len(), 4);
        assert!(result.units.iter().all(|u| u.actual_table("t_user") == Some("t_user")));
    }

    #[test]
    fn test_unbound_join_on_different_data_sources_is_rejected() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_order o JOIN t_user u ON 1 = 1")
            .table("t_order")
            .table("t_user")
            .where_and(vec![
                Condition::equal("t_order", "user_id", ValueExpr::literal(1)),
                Condition::equal("t_user", "user_id", ValueExpr::literal(2)),
            ])
            .build()
            .unwrap();
        let err = route(&stmt, &[]).unwrap_err();
        assert!(matches!(err, ShardingError::IncompatibleJoin(_)));
    }

    #[test]
    fn test_broadcast_tables() {
        let select = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_config")
            .table("t_config")
            .build()
            .unwrap();
        assert_eq!(targets(&route(&select, &[]).unwrap()), vec!["ds0"]);

        let update = SqlStatement::builder(StatementKind::Dml, "UPDATE t_config SET v = 1")
            .table("t_config")
            .build()
            .unwrap();
        assert_eq!(targets(&route(&update, &[]).unwrap()), vec!["ds0", "ds1"]);
    }

    #[test]
    fn test_unconfigured_table_is_rejected() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_unknown")
            .table("t_unknown")
            .build()
            .unwrap();
        assert!(matches!(route(&stmt, &[]).unwrap_err(), ShardingError::Routing(_)));
    }

    #[test]
    fn test_ddl_and_tcl_broadcast() {
        let ddl = SqlStatement::builder(StatementKind::Ddl, "TRUNCATE TABLE t_order")
            .table("t_order")
            .build()
            .unwrap();
        assert_eq!(route(&ddl, &[]).unwrap().len(), 4);

        let tcl = SqlStatement::builder(StatementKind::Tcl, "COMMIT").build().unwrap();
        assert_eq!(targets(&route(&tcl, &[]).unwrap()), vec!["ds0", "ds1"]);

        let dal = SqlStatement::builder(StatementKind::Dal, "SHOW TABLES").build().unwrap();
        assert_eq!(targets(&route(&dal, &[]).unwrap()), vec!["ds0"]);
    }

    #[test]
    fn test_insert_generates_keys_and_splits_rows() {
        let stmt = SqlStatement::builder(
            StatementKind::Dml,
            "INSERT INTO t_order (user_id, status) VALUES (?, 'a'), (2, 'b'), (?, 'c')",
        )
        .table("t_order")
        .build()
        .unwrap();
        let result = route(&stmt, &[Value::Integer(1), Value::Integer(3)]).unwrap();
        assert_eq!(result.generated_keys, vec![Value::Integer(1000), Value::Integer(1001), Value::Integer(1002)]);
        assert_eq!(result.generate_key_column.as_deref(), Some("order_id"));

        // keys 1000/1002 are even, 1001 odd; user 1,3 -> ds1, user 2 -> ds0
        assert_eq!(targets(&result), vec!["ds0[t_order_1]", "ds1[t_order_0]"]);
        assert_eq!(result.units[0].insert_rows, vec![1]);
        assert_eq!(result.units[1].insert_rows, vec![0, 2]);
    }

    #[test]
    fn test_insert_without_column_list_keeps_its_own_key() {
        let rule = ShardingRule::builder()
            .data_sources(["ds0", "ds1"])
            .table_rule(
                TableRule::from_inline("t_single", "ds0.t_single")
                    .unwrap()
                    .with_generate_key_column("id"),
            )
            .build()
            .unwrap();
        let keys = IncrementKeyGenerator::new(10);
        let stmt = SqlStatement::builder(StatementKind::Dml, "INSERT INTO t_single VALUES (1, 'a')")
            .table("t_single")
            .build()
            .unwrap();
        let result = RoutingEngine::new(&rule, &keys)
            .route(&stmt, &[], &mut SessionContext::new())
            .unwrap();
        assert_eq!(targets(&result), vec!["ds0[t_single]"]);
        assert_eq!(result.generate_key_column, None);
        assert!(result.generated_keys.is_empty());
    }

    #[test]
    fn test_non_numeric_shard_value_is_unsupported() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_order WHERE user_id = 'abc'")
            .table("t_order")
            .where_and(vec![Condition::equal("t_order", "user_id", ValueExpr::literal("abc"))])
            .build()
            .unwrap();
        assert!(matches!(route(&stmt, &[]).unwrap_err(), ShardingError::UnsupportedRouting(_)));
    }

    #[test]
    fn test_hint_strategy_reads_session() {
        let rule = ShardingRule::builder()
            .data_sources(["ds0", "ds1"])
            .table_rule(
                TableRule::from_inline("t_log", "ds${0..1}.t_log")
                    .unwrap()
                    .with_database_strategy(ShardingStrategy::Hint {
                        algorithm: crate::rule::StandardAlgorithm::Modulo { sharding_count: 2 },
                    }),
            )
            .build()
            .unwrap();
        let keys = IncrementKeyGenerator::new(0);
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT * FROM t_log")
            .table("t_log")
            .build()
            .unwrap();
        let mut session = SessionContext::new();
        let engine = RoutingEngine::new(&rule, &keys);
        assert_eq!(engine.route(&stmt, &[], &mut session).unwrap().len(), 2);

        session.set_database_hint("t_log", vec![Value::Integer(5)]);
        let result = engine.route(&stmt, &[], &mut session).unwrap();
        assert_eq!(targets(&result), vec!["ds1[t_log]"]);
    }
}
