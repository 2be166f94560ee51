use super::condition::ValueExpr;
use crate::core::{Result, ShardingError, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

/// Placement of NULLs in an ordering.
///
/// Defaults follow PostgreSQL and Oracle: ASC puts NULLs last, DESC puts them
/// first. Backends that sort the other way (MySQL, SQLite, SQL Server) need
/// [`OrderItem::with_nulls`] on every item the statement itself orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NullOrdering {
    NullsFirst,
    NullsLast,
}

impl NullOrdering {
    pub fn default_for(direction: OrderDirection) -> Self {
        match direction {
            OrderDirection::Asc => Self::NullsLast,
            OrderDirection::Desc => Self::NullsFirst,
        }
    }
}

/// One ORDER BY or GROUP BY item, identified by its result column label.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderItem {
    pub column: String,
    pub direction: OrderDirection,
    pub nulls: NullOrdering,
    /// Alias of a derived select item, when the column is not selected.
    pub derived_alias: Option<String>,
}

impl OrderItem {
    pub fn new(column: impl Into<String>, direction: OrderDirection) -> Self {
        Self {
            column: column.into(),
            direction,
            nulls: NullOrdering::default_for(direction),
            derived_alias: None,
        }
    }

    pub fn with_nulls(mut self, nulls: NullOrdering) -> Self {
        self.nulls = nulls;
        self
    }

    /// Label to look up in the result metadata: the derived alias, or the
    /// column without its owner prefix.
    pub fn label(&self) -> &str {
        match &self.derived_alias {
            Some(alias) => alias,
            None => self.column.rsplit('.').next().unwrap_or(&self.column),
        }
    }

    /// `column ASC NULLS LAST`: direction and NULL placement spelled out.
    pub fn to_sql(&self) -> String {
        let direction = match self.direction {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        };
        let nulls = match self.nulls {
            NullOrdering::NullsFirst => "NULLS FIRST",
            NullOrdering::NullsLast => "NULLS LAST",
        };
        format!("{} {} {}", self.column, direction, nulls)
    }

    pub(crate) fn same_column(&self, other: &OrderItem) -> bool {
        self.label().eq_ignore_ascii_case(other.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregationKind {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Count => "COUNT",
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
        };
        write!(f, "{}", name)
    }
}

/// An aggregate select item such as `AVG(price) AS avg_price`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationItem {
    pub kind: AggregationKind,
    pub argument: String,
    pub label: String,
    /// For AVG: the COUNT and SUM items added to every shard's query.
    pub derived: Vec<AggregationItem>,
}

impl AggregationItem {
    pub fn new(kind: AggregationKind, argument: impl Into<String>, label: impl Into<String>) -> Self {
        Self {
            kind,
            argument: argument.into(),
            label: label.into(),
            derived: Vec::new(),
        }
    }

    pub fn expression(&self) -> String {
        format!("{}({})", self.kind, self.argument)
    }

    pub fn derived_count(&self) -> Option<&AggregationItem> {
        self.derived.iter().find(|d| d.kind == AggregationKind::Count)
    }

    pub fn derived_sum(&self) -> Option<&AggregationItem> {
        self.derived.iter().find(|d| d.kind == AggregationKind::Sum)
    }
}

/// A select item appended by the rewriter: `<expression> AS <alias>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivedColumn {
    pub expression: String,
    pub alias: String,
}

/// One LIMIT term and its span in the logical SQL.
#[derive(Debug, Clone, PartialEq)]
pub struct LimitValue {
    pub value: ValueExpr,
    pub start: usize,
    pub end: usize,
}

impl LimitValue {
    pub fn resolve(&self, parameters: &[Value]) -> Result<u64> {
        let value = self.value.resolve(parameters)?;
        value
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
            .ok_or_else(|| ShardingError::Rewrite(format!("Invalid LIMIT value '{}'", value)))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub offset: Option<LimitValue>,
    pub row_count: Option<LimitValue>,
}

/// Resolved global window: skip `offset`, then yield at most `row_count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Pagination {
    pub offset: u64,
    pub row_count: Option<u64>,
}

impl Limit {
    pub fn resolve(&self, parameters: &[Value]) -> Result<Pagination> {
        let offset = match &self.offset {
            Some(offset) => offset.resolve(parameters)?,
            None => 0,
        };
        let row_count = match &self.row_count {
            Some(count) => Some(count.resolve(parameters)?),
            None => None,
        };
        Ok(Pagination { offset, row_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_ordering_defaults() {
        assert_eq!(NullOrdering::default_for(OrderDirection::Asc), NullOrdering::NullsLast);
        assert_eq!(NullOrdering::default_for(OrderDirection::Desc), NullOrdering::NullsFirst);
    }

    #[test]
    fn test_order_item_label() {
        let item = OrderItem::new("o.order_id", OrderDirection::Desc);
        assert_eq!(item.label(), "order_id");
        assert_eq!(item.nulls, NullOrdering::NullsFirst);

        let mut derived = OrderItem::new("o.status", OrderDirection::Asc);
        derived.derived_alias = Some("ORDER_BY_DERIVED_0".into());
        assert_eq!(derived.label(), "ORDER_BY_DERIVED_0");
    }

    #[test]
    fn test_order_item_sql_names_null_placement() {
        assert_eq!(OrderItem::new("user_id", OrderDirection::Asc).to_sql(), "user_id ASC NULLS LAST");
        let item = OrderItem::new("o.status", OrderDirection::Asc).with_nulls(NullOrdering::NullsFirst);
        assert_eq!(item.to_sql(), "o.status ASC NULLS FIRST");
    }

    #[test]
    fn test_limit_resolve() {
        let limit = Limit {
            offset: Some(LimitValue { value: ValueExpr::param(0), start: 0, end: 1 }),
            row_count: Some(LimitValue { value: ValueExpr::literal(10), start: 3, end: 5 }),
        };
        let page = limit.resolve(&[Value::Integer(5)]).unwrap();
        assert_eq!(page, Pagination { offset: 5, row_count: Some(10) });
        assert!(limit.resolve(&[Value::Integer(-1)]).is_err());
    }
}
