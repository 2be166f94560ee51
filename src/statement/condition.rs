use crate::core::{Result, ShardingError, Value};

/// A value in a predicate or VALUES row: a literal, a positional `?`
/// parameter, or an expression the router cannot evaluate.
#[derive(Debug, Clone, PartialEq)]
pub enum ValueExpr {
    Literal(Value),
    /// 0-based ordinal of the `?` in the statement.
    Parameter(usize),
    Expression(String),
}

impl ValueExpr {
    pub fn literal(value: impl Into<Value>) -> Self {
        Self::Literal(value.into())
    }

    pub fn param(index: usize) -> Self {
        Self::Parameter(index)
    }

    pub fn resolve(&self, parameters: &[Value]) -> Result<Value> {
        match self {
            Self::Literal(value) => Ok(value.clone()),
            Self::Parameter(index) => parameters.get(*index).cloned().ok_or_else(|| {
                ShardingError::UnsupportedRouting(format!(
                    "Parameter index {} out of bounds ({} parameters bound)",
                    index,
                    parameters.len()
                ))
            }),
            Self::Expression(text) => Err(ShardingError::UnsupportedRouting(format!(
                "Cannot shard on expression '{}'",
                text
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConditionOperator {
    Equal(ValueExpr),
    In(Vec<ValueExpr>),
    Between(ValueExpr, ValueExpr),
    LessThan(ValueExpr),
    LessOrEqual(ValueExpr),
    GreaterThan(ValueExpr),
    GreaterOrEqual(ValueExpr),
}

/// `table.column <op> value`, with `table` being the logical table name.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub table: String,
    pub column: String,
    pub operator: ConditionOperator,
}

impl Condition {
    pub fn new(table: impl Into<String>, column: impl Into<String>, operator: ConditionOperator) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
            operator,
        }
    }

    pub fn equal(table: impl Into<String>, column: impl Into<String>, value: ValueExpr) -> Self {
        Self::new(table, column, ConditionOperator::Equal(value))
    }

    pub fn in_list(table: impl Into<String>, column: impl Into<String>, values: Vec<ValueExpr>) -> Self {
        Self::new(table, column, ConditionOperator::In(values))
    }

    pub fn between(table: impl Into<String>, column: impl Into<String>, low: ValueExpr, high: ValueExpr) -> Self {
        Self::new(table, column, ConditionOperator::Between(low, high))
    }
}

/// Conditions joined by AND. A statement's predicate is an OR of these.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConditionGroup {
    pub conditions: Vec<Condition>,
}

impl ConditionGroup {
    pub fn new(conditions: Vec<Condition>) -> Self {
        Self { conditions }
    }
}
