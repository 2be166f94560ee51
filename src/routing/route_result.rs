use crate::core::Value;
use std::fmt;

/// One logical-to-actual table substitution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableUnit {
    pub logic_table: String,
    pub actual_table: String,
}

/// One data source plus the table names its rewritten statement uses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingUnit {
    /// Physical data source the statement runs on.
    pub data_source: String,
    /// Data-source name as the sharding rule knows it (a master-slave group
    /// name before read/write resolution).
    pub logic_data_source: String,
    pub tables: Vec<TableUnit>,
    /// INSERT rows carried by this unit, as indexes into the VALUES list.
    pub insert_rows: Vec<usize>,
}

impl RoutingUnit {
    pub fn new(data_source: impl Into<String>) -> Self {
        let data_source = data_source.into();
        Self {
            logic_data_source: data_source.clone(),
            data_source,
            tables: Vec::new(),
            insert_rows: Vec::new(),
        }
    }

    pub fn with_table(mut self, logic_table: impl Into<String>, actual_table: impl Into<String>) -> Self {
        self.tables.push(TableUnit {
            logic_table: logic_table.into(),
            actual_table: actual_table.into(),
        });
        self
    }

    pub fn actual_table(&self, logic_table: &str) -> Option<&str> {
        self.tables
            .iter()
            .find(|t| t.logic_table.eq_ignore_ascii_case(logic_table))
            .map(|t| t.actual_table.as_str())
    }

    fn same_target(&self, other: &RoutingUnit) -> bool {
        if self.data_source != other.data_source || self.tables.len() != other.tables.len() {
            return false;
        }
        self.tables.iter().all(|t| other.tables.contains(t))
    }
}

impl fmt::Display for RoutingUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data_source)?;
        if !self.tables.is_empty() {
            let tables: Vec<&str> = self.tables.iter().map(|t| t.actual_table.as_str()).collect();
            write!(f, "[{}]", tables.join(", "))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct RouteResult {
    pub units: Vec<RoutingUnit>,
    /// Keys generated for INSERT rows, one per row, in VALUES order.
    pub generated_keys: Vec<Value>,
    /// Column the generated keys belong to.
    pub generate_key_column: Option<String>,
}

impl RouteResult {
    /// Adds a unit, merging it into an existing one with the same target.
    pub fn push(&mut self, unit: RoutingUnit) {
        match self.units.iter_mut().find(|existing| existing.same_target(&unit)) {
            Some(existing) => {
                for row in unit.insert_rows {
                    if !existing.insert_rows.contains(&row) {
                        existing.insert_rows.push(row);
                    }
                }
                existing.insert_rows.sort_unstable();
            }
            None => self.units.push(unit),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_single(&self) -> bool {
        self.units.len() == 1
    }

    pub fn data_sources(&self) -> Vec<&str> {
        let mut names: Vec<&str> = Vec::new();
        for unit in &self.units {
            if !names.contains(&unit.data_source.as_str()) {
                names.push(&unit.data_source);
            }
        }
        names
    }
}
