// ============================================================================
// Logical statement model
// ============================================================================
//
// The router, rewriter and merger consume a `SqlStatement`: the logical SQL
// text plus the structure a parser extracted from it. The builder locates the
// rewrite tokens (table names, LIMIT, VALUES rows, derived items) in the text
// so the rewriter never re-parses SQL.
//
// ============================================================================

pub mod condition;
pub mod insert;
pub mod locate;
pub mod select;

pub use condition::{Condition, ConditionGroup, ConditionOperator, ValueExpr};
pub use insert::{InsertClause, InsertRow};
pub use select::{
    AggregationItem, AggregationKind, DerivedColumn, Limit, LimitValue, NullOrdering, OrderDirection, OrderItem,
    Pagination,
};

use crate::core::{Result, ShardingError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    /// SELECT
    Dql,
    /// INSERT / UPDATE / DELETE
    Dml,
    /// CREATE / ALTER / DROP / TRUNCATE
    Ddl,
    /// SHOW / DESCRIBE / USE
    Dal,
    /// GRANT / REVOKE
    Dcl,
    /// BEGIN / COMMIT / ROLLBACK / SET AUTOCOMMIT
    Tcl,
}

impl StatementKind {
    pub fn is_query(self) -> bool {
        matches!(self, Self::Dql)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub name: String,
    pub alias: Option<String>,
}

/// Positions in the logical SQL the rewriter substitutes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlToken {
    Table {
        start: usize,
        end: usize,
        logic_table: String,
    },
    /// Index names get the actual table appended: `idx_status_t_order_1`.
    Index {
        start: usize,
        end: usize,
        index_name: String,
        logic_table: String,
    },
    /// End of the select list, where derived columns go.
    Items { position: usize },
    /// Where an ORDER BY mirroring the GROUP BY is appended.
    OrderBy { position: usize },
}

impl SqlToken {
    pub fn start(&self) -> usize {
        match self {
            Self::Table { start, .. } | Self::Index { start, .. } => *start,
            Self::Items { position } | Self::OrderBy { position } => *position,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SqlStatement {
    pub kind: StatementKind,
    pub sql: String,
    pub tables: Vec<TableRef>,
    /// OR of AND groups; empty when the statement has no usable predicate.
    pub conditions: Vec<ConditionGroup>,
    pub order_by: Vec<OrderItem>,
    pub group_by: Vec<OrderItem>,
    pub aggregations: Vec<AggregationItem>,
    pub derived_columns: Vec<DerivedColumn>,
    pub limit: Option<Limit>,
    pub insert: Option<InsertClause>,
    pub tokens: Vec<SqlToken>,
}

impl SqlStatement {
    pub fn builder(kind: StatementKind, sql: impl Into<String>) -> SqlStatementBuilder {
        SqlStatementBuilder::new(kind, sql)
    }

    pub fn logic_tables(&self) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for table in &self.tables {
            if !names.iter().any(|n| n.eq_ignore_ascii_case(&table.name)) {
                names.push(table.name.clone());
            }
        }
        names
    }

    pub fn is_insert(&self) -> bool {
        self.insert.is_some()
    }

    pub fn has_aggregation(&self) -> bool {
        !self.aggregations.is_empty()
    }

    pub fn is_grouping(&self) -> bool {
        !self.group_by.is_empty() || self.has_aggregation()
    }

    /// Grouping can stream only when per-shard rows arrive sorted by the
    /// group columns, i.e. ORDER BY is absent or names the same columns.
    pub fn groups_in_memory(&self) -> bool {
        if self.group_by.is_empty() || self.order_by.is_empty() {
            return false;
        }
        self.group_by.len() != self.order_by.len()
            || !self
                .group_by
                .iter()
                .zip(self.order_by.iter())
                .all(|(g, o)| g.same_column(o))
    }
}

pub struct SqlStatementBuilder {
    kind: StatementKind,
    sql: String,
    tables: Vec<TableRef>,
    indexes: Vec<(String, String)>,
    conditions: Vec<ConditionGroup>,
    order_by: Vec<OrderItem>,
    group_by: Vec<OrderItem>,
    aggregations: Vec<AggregationItem>,
    select_items: Option<Vec<String>>,
}

impl SqlStatementBuilder {
    pub fn new(kind: StatementKind, sql: impl Into<String>) -> Self {
        Self {
            kind,
            sql: sql.into(),
            tables: Vec::new(),
            indexes: Vec::new(),
            conditions: Vec::new(),
            order_by: Vec::new(),
            group_by: Vec::new(),
            aggregations: Vec::new(),
            select_items: None,
        }
    }

    pub fn table(mut self, name: impl Into<String>) -> Self {
        self.tables.push(TableRef {
            name: name.into(),
            alias: None,
        });
        self
    }

    pub fn table_as(mut self, name: impl Into<String>, alias: impl Into<String>) -> Self {
        self.tables.push(TableRef {
            name: name.into(),
            alias: Some(alias.into()),
        });
        self
    }

    pub fn index(mut self, index_name: impl Into<String>, logic_table: impl Into<String>) -> Self {
        self.indexes.push((index_name.into(), logic_table.into()));
        self
    }

    /// Adds one OR branch made of AND-ed conditions.
    pub fn where_and(mut self, conditions: Vec<Condition>) -> Self {
        self.conditions.push(ConditionGroup::new(conditions));
        self
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.order_by.push(OrderItem::new(column, direction));
        self
    }

    pub fn order_by_item(mut self, item: OrderItem) -> Self {
        self.order_by.push(item);
        self
    }

    pub fn group_by(mut self, column: impl Into<String>) -> Self {
        self.group_by.push(OrderItem::new(column, OrderDirection::Asc));
        self
    }

    pub fn aggregation(mut self, kind: AggregationKind, argument: impl Into<String>, label: impl Into<String>) -> Self {
        self.aggregations.push(AggregationItem::new(kind, argument, label));
        self
    }

    /// Labels of the select list. When given, ORDER BY / GROUP BY columns
    /// missing from it are selected as derived columns.
    pub fn select_items<I, S>(mut self, labels: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select_items = Some(labels.into_iter().map(Into::into).collect());
        self
    }

    pub fn build(self) -> Result<SqlStatement> {
        let sql = self.sql;
        let mut tokens = Vec::new();
        for table in &self.tables {
            for (start, end) in locate::find_identifier(&sql, &table.name) {
                tokens.push(SqlToken::Table {
                    start,
                    end,
                    logic_table: table.name.clone(),
                });
            }
        }
        for (index_name, logic_table) in &self.indexes {
            for (start, end) in locate::find_identifier(&sql, index_name) {
                tokens.push(SqlToken::Index {
                    start,
                    end,
                    index_name: index_name.clone(),
                    logic_table: logic_table.clone(),
                });
            }
        }

        let insert = if self.kind == StatementKind::Dml && sql.trim_start().to_ascii_uppercase().starts_with("INSERT") {
            Some(locate::locate_insert(&sql)?)
        } else {
            None
        };

        let mut aggregations = self.aggregations;
        let mut order_by = self.order_by;
        let mut group_by = self.group_by;
        let mut derived_columns = Vec::new();
        let mut limit = None;

        if self.kind == StatementKind::Dql {
            limit = locate::locate_limit(&sql)?;

            let mut avg_index = 0;
            for aggregation in aggregations.iter_mut().filter(|a| a.kind == AggregationKind::Avg) {
                let count = AggregationItem::new(
                    AggregationKind::Count,
                    aggregation.argument.clone(),
                    format!("AVG_DERIVED_COUNT_{}", avg_index),
                );
                let sum = AggregationItem::new(
                    AggregationKind::Sum,
                    aggregation.argument.clone(),
                    format!("AVG_DERIVED_SUM_{}", avg_index),
                );
                for derived in [&count, &sum] {
                    derived_columns.push(DerivedColumn {
                        expression: derived.expression(),
                        alias: derived.label.clone(),
                    });
                }
                aggregation.derived = vec![count, sum];
                avg_index += 1;
            }

            if let Some(selected) = &self.select_items {
                let is_selected = |item: &OrderItem| {
                    selected.iter().any(|label| {
                        label == "*" || label.eq_ignore_ascii_case(item.label()) || label.eq_ignore_ascii_case(&item.column)
                    })
                };
                for (n, item) in group_by.iter_mut().enumerate() {
                    if !is_selected(item) {
                        let alias = format!("GROUP_BY_DERIVED_{}", n);
                        derived_columns.push(DerivedColumn {
                            expression: item.column.clone(),
                            alias: alias.clone(),
                        });
                        item.derived_alias = Some(alias);
                    }
                }
                let mut order_index = 0;
                for item in order_by.iter_mut() {
                    if let Some(group) = group_by.iter().find(|g| g.column.eq_ignore_ascii_case(&item.column)) {
                        item.derived_alias = group.derived_alias.clone();
                        continue;
                    }
                    if !is_selected(item) {
                        let alias = format!("ORDER_BY_DERIVED_{}", order_index);
                        order_index += 1;
                        derived_columns.push(DerivedColumn {
                            expression: item.column.clone(),
                            alias: alias.clone(),
                        });
                        item.derived_alias = Some(alias);
                    }
                }
            }

            if !derived_columns.is_empty() {
                let from = locate::find_keyword(&sql, "FROM", 0).ok_or_else(|| {
                    ShardingError::Rewrite(format!("Cannot place derived columns without FROM: '{}'", sql))
                })?;
                tokens.push(SqlToken::Items {
                    position: sql[..from].trim_end().len(),
                });
            }

            if !group_by.is_empty() && order_by.is_empty() {
                let position = match &limit {
                    Some(_) => locate::find_keyword(&sql, "LIMIT", 0)
                        .map(|at| sql[..at].trim_end().len())
                        .unwrap_or_else(|| locate::statement_end(&sql)),
                    None => locate::statement_end(&sql),
                };
                tokens.push(SqlToken::OrderBy { position });
            }
        }

        tokens.sort_by_key(|t| t.start());

        Ok(SqlStatement {
            kind: self.kind,
            sql,
            tables: self.tables,
            conditions: self.conditions,
            order_by,
            group_by,
            aggregations,
            derived_columns,
            limit,
            insert,
            tokens,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_locates_table_tokens() {
        let stmt = SqlStatement::builder(
            StatementKind::Dql,
            "SELECT o.order_id FROM t_order o WHERE o.user_id = ? ORDER BY o.order_id",
        )
        .table_as("t_order", "o")
        .where_and(vec![Condition::equal("t_order", "user_id", ValueExpr::param(0))])
        .order_by("o.order_id", OrderDirection::Asc)
        .build()
        .unwrap();

        assert_eq!(stmt.tokens.len(), 1);
        assert!(matches!(&stmt.tokens[0], SqlToken::Table { logic_table, .. } if logic_table == "t_order"));
        assert!(stmt.limit.is_none());
        assert!(!stmt.is_grouping());
    }

    #[test]
    fn test_avg_gets_derived_columns() {
        let stmt = SqlStatement::builder(
            StatementKind::Dql,
            "SELECT user_id, AVG(price) AS avg_price FROM t_order GROUP BY user_id LIMIT 2",
        )
        .table("t_order")
        .group_by("user_id")
        .aggregation(AggregationKind::Avg, "price", "avg_price")
        .build()
        .unwrap();

        let avg = &stmt.aggregations[0];
        assert_eq!(avg.derived_count().unwrap().label, "AVG_DERIVED_COUNT_0");
        assert_eq!(avg.derived_sum().unwrap().expression(), "SUM(price)");
        assert_eq!(stmt.derived_columns.len(), 2);

        let items = stmt.tokens.iter().find_map(|t| match t {
            SqlToken::Items { position } => Some(*position),
            _ => None,
        });
        assert_eq!(&stmt.sql[..items.unwrap()], "SELECT user_id, AVG(price) AS avg_price");

        let order_by = stmt.tokens.iter().find_map(|t| match t {
            SqlToken::OrderBy { position } => Some(*position),
            _ => None,
        });
        assert!(stmt.sql[..order_by.unwrap()].ends_with("GROUP BY user_id"));
    }

    #[test]
    fn test_order_by_not_selected_is_derived() {
        let stmt = SqlStatement::builder(StatementKind::Dql, "SELECT order_id FROM t_order ORDER BY status DESC")
            .table("t_order")
            .select_items(["order_id"])
            .order_by("status", OrderDirection::Desc)
            .build()
            .unwrap();
        assert_eq!(stmt.order_by[0].label(), "ORDER_BY_DERIVED_0");
        assert_eq!(
            stmt.derived_columns,
            vec![DerivedColumn {
                expression: "status".into(),
                alias: "ORDER_BY_DERIVED_0".into()
            }]
        );
    }

    #[test]
    fn test_groups_in_memory() {
        let streaming = SqlStatement::builder(StatementKind::Dql, "SELECT a, COUNT(*) AS c FROM t GROUP BY a ORDER BY a DESC")
            .table("t")
            .group_by("a")
            .order_by("a", OrderDirection::Desc)
            .aggregation(AggregationKind::Count, "*", "c")
            .build()
            .unwrap();
        assert!(!streaming.groups_in_memory());

        let memory = SqlStatement::builder(StatementKind::Dql, "SELECT a, COUNT(*) AS c FROM t GROUP BY a ORDER BY c")
            .table("t")
            .group_by("a")
            .order_by("c", OrderDirection::Asc)
            .aggregation(AggregationKind::Count, "*", "c")
            .build()
            .unwrap();
        assert!(memory.groups_in_memory());
    }

    #[test]
    fn test_insert_is_located() {
        let stmt = SqlStatement::builder(StatementKind::Dml, "INSERT INTO t_order (user_id) VALUES (1), (2)")
            .table("t_order")
            .build()
            .unwrap();
        assert!(stmt.is_insert());
        assert_eq!(stmt.insert.unwrap().rows.len(), 2);
    }
}
