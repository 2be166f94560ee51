// ============================================================================
// SQL Rewriter
// ============================================================================
//
// Produces one executable statement per routing unit by splicing edits into
// the logical SQL at token positions. The logical text is never re-parsed, and
// rewriting the same unit twice yields the same output.
//
// ============================================================================

use crate::core::{Result, ShardingError, Value};
use crate::routing::{RouteResult, RoutingUnit};
use crate::rule::ShardingRule;
use crate::statement::{InsertClause, LimitValue, OrderItem, SqlStatement, SqlToken, ValueExpr};
use std::fmt;

/// Rewritten SQL bound to the data source it runs on.
#[derive(Debug, Clone, PartialEq)]
pub struct SqlUnit {
    pub data_source: String,
    pub sql: String,
    pub parameters: Vec<Value>,
}

impl fmt::Display for SqlUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ::: {}", self.data_source, self.sql)?;
        if !self.parameters.is_empty() {
            let params: Vec<String> = self.parameters.iter().map(|p| p.to_string()).collect();
            write!(f, " ::: [{}]", params.join(", "))?;
        }
        Ok(())
    }
}

/// Row count used when every shard row is needed for in-memory grouping.
const UNBOUNDED_ROW_COUNT: u64 = u64::MAX;

struct Edit {
    start: usize,
    end: usize,
    text: String,
}

pub struct SqlRewriter<'a> {
    rule: &'a ShardingRule,
    statement: &'a SqlStatement,
    route: &'a RouteResult,
    parameters: &'a [Value],
}

impl<'a> SqlRewriter<'a> {
    pub fn new(
        rule: &'a ShardingRule,
        statement: &'a SqlStatement,
        route: &'a RouteResult,
        parameters: &'a [Value],
    ) -> Self {
        Self {
            rule,
            statement,
            route,
            parameters,
        }
    }

    pub fn rewrite_all(&self) -> Result<Vec<SqlUnit>> {
        self.route.units.iter().map(|unit| self.rewrite(unit)).collect()
    }

    pub fn rewrite(&self, unit: &RoutingUnit) -> Result<SqlUnit> {
        let mut edits = Vec::new();
        let mut parameters = self.parameters.to_vec();

        for token in &self.statement.tokens {
            if let Some(edit) = self.token_edit(token, unit)? {
                edits.push(edit);
            }
        }
        if self.route.len() > 1 {
            self.paginate(&mut edits, &mut parameters)?;
        }
        if let Some(insert) = &self.statement.insert {
            parameters = self.split_insert(insert, unit, &mut edits, &parameters)?;
        }

        Ok(SqlUnit {
            data_source: unit.data_source.clone(),
            sql: apply_edits(&self.statement.sql, edits)?,
            parameters,
        })
    }

    fn token_edit(&self, token: &SqlToken, unit: &RoutingUnit) -> Result<Option<Edit>> {
        Ok(match token {
            SqlToken::Table { start, end, logic_table } => match unit.actual_table(logic_table) {
                Some(actual) => Some(Edit {
                    start: *start,
                    end: *end,
                    text: actual.to_string(),
                }),
                None if self.rule.is_sharded(logic_table) && !unit.tables.is_empty() => {
                    return Err(ShardingError::Rewrite(format!(
                        "Routing unit {} has no actual table for '{}'",
                        unit, logic_table
                    )));
                }
                None => None,
            },
            SqlToken::Index {
                start,
                end,
                index_name,
                logic_table,
            } => unit.actual_table(logic_table).map(|actual| Edit {
                start: *start,
                end: *end,
                text: format!("{}_{}", index_name, actual),
            }),
            SqlToken::Items { position } if !self.statement.derived_columns.is_empty() => {
                let items: Vec<String> = self
                    .statement
                    .derived_columns
                    .iter()
                    .map(|d| format!("{} AS {}", d.expression, d.alias))
                    .collect();
                Some(Edit {
                    start: *position,
                    end: *position,
                    text: format!(", {}", items.join(", ")),
                })
            }
            SqlToken::Items { .. } => None,
            SqlToken::OrderBy { position } => {
                // NULL placement must agree with what the group merge compares.
                let columns: Vec<String> = self.statement.group_by.iter().map(OrderItem::to_sql).collect();
                Some(Edit {
                    start: *position,
                    end: *position,
                    text: format!(" ORDER BY {}", columns.join(", ")),
                })
            }
        })
    }

    /// `LIMIT offset, count` becomes `LIMIT 0, offset + count` on every shard.
    fn paginate(&self, edits: &mut Vec<Edit>, parameters: &mut [Value]) -> Result<()> {
        let Some(limit) = &self.statement.limit else {
            return Ok(());
        };
        let page = limit.resolve(self.parameters)?;
        let row_count = if self.statement.groups_in_memory() {
            UNBOUNDED_ROW_COUNT
        } else {
            match page.row_count {
                Some(count) => page.offset.saturating_add(count),
                None => UNBOUNDED_ROW_COUNT,
            }
        };
        if let Some(offset) = &limit.offset {
            rewrite_limit_value(offset, 0, edits, parameters)?;
        }
        if let Some(count) = &limit.row_count {
            rewrite_limit_value(count, row_count, edits, parameters)?;
        }
        Ok(())
    }

    /// Keeps only the VALUES rows this unit owns and appends generated keys.
    fn split_insert(
        &self,
        insert: &InsertClause,
        unit: &RoutingUnit,
        edits: &mut Vec<Edit>,
        parameters: &[Value],
    ) -> Result<Vec<Value>> {
        let sql = &self.statement.sql;
        let key_column = self.route.generate_key_column.as_deref();

        if let Some(column) = key_column {
            let columns_end = insert.columns_end.ok_or_else(|| {
                ShardingError::Rewrite(format!("Cannot add generated '{}' to an INSERT without a column list", column))
            })?;
            edits.push(Edit {
                start: columns_end,
                end: columns_end,
                text: format!(", {}", column),
            });
        }

        // Units without recorded rows (single-node or broadcast inserts) carry every row.
        let owned: Vec<usize> = if unit.insert_rows.is_empty() {
            (0..insert.rows.len()).collect()
        } else {
            unit.insert_rows.clone()
        };

        let mut rows_text = Vec::with_capacity(owned.len());
        let span = insert.parameters_span();
        let mut rewritten = parameters
            .get(..span.start)
            .ok_or_else(|| missing_parameters(span.start, parameters.len()))?
            .to_vec();
        for &index in &owned {
            let row = insert
                .rows
                .get(index)
                .ok_or_else(|| ShardingError::Rewrite(format!("Routing unit {} owns unknown row {}", unit, index)))?;
            let text = &sql[row.start..row.end];
            match (key_column, self.route.generated_keys.get(index)) {
                (Some(_), Some(key)) => {
                    rows_text.push(format!("{}, {})", &text[..text.len() - 1], key.to_sql_literal()));
                }
                (Some(column), None) => {
                    return Err(ShardingError::Rewrite(format!(
                        "No generated '{}' for INSERT row {}",
                        column, index
                    )));
                }
                (None, _) => rows_text.push(text.to_string()),
            }
            let row_params = parameters
                .get(row.parameters.clone())
                .ok_or_else(|| missing_parameters(row.parameters.end, parameters.len()))?;
            rewritten.extend_from_slice(row_params);
        }
        rewritten.extend_from_slice(parameters.get(span.end..).unwrap_or_default());

        if let Some((start, end)) = insert.values_span() {
            edits.push(Edit {
                start,
                end,
                text: rows_text.join(", "),
            });
        }
        Ok(rewritten)
    }
}

fn missing_parameters(needed: usize, bound: usize) -> ShardingError {
    ShardingError::Rewrite(format!("Statement needs {} parameters, {} bound", needed, bound))
}

fn rewrite_limit_value(limit: &LimitValue, value: u64, edits: &mut Vec<Edit>, parameters: &mut [Value]) -> Result<()> {
    match &limit.value {
        ValueExpr::Parameter(index) => {
            let bound = parameters.len();
            let slot = parameters
                .get_mut(*index)
                .ok_or_else(|| missing_parameters(index + 1, bound))?;
            *slot = Value::Integer(i64::try_from(value).unwrap_or(i64::MAX));
        }
        _ => edits.push(Edit {
            start: limit.start,
            end: limit.end,
            text: value.to_string(),
        }),
    }
    Ok(())
}

fn apply_edits(sql: &str, mut edits: Vec<Edit>) -> Result<String> {
    edits.sort_by_key(|e| (e.start, e.end));
    let mut out = String::with_capacity(sql.len() + 32);
    let mut cursor = 0;
    for edit in edits {
        if edit.start < cursor || edit.end > sql.len() {
            return Err(ShardingError::Rewrite(format!(
                "Overlapping rewrite at byte {} of '{}'",
                edit.start, sql
            )));
        }
        out.push_str(&sql[cursor..edit.start]);
        out.push_str(&edit.text);
        cursor = edit.end;
    }
    out.push_str(&sql[cursor..]);
    Ok(out)
}
