use super::master_slave::MasterSlaveRule;
use super::strategy::ShardingStrategy;
use super::table_rule::TableRule;
use crate::core::{Result, ShardingError};
use std::collections::{HashMap, HashSet};

static NO_STRATEGY: ShardingStrategy = ShardingStrategy::None;

/// The complete, validated rule set. Immutable once built; reloads replace it.
#[derive(Debug, Clone)]
pub struct ShardingRule {
    data_source_names: Vec<String>,
    table_rules: Vec<TableRule>,
    table_index: HashMap<String, usize>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: HashSet<String>,
    default_data_source: Option<String>,
    default_database_strategy: Option<ShardingStrategy>,
    default_table_strategy: Option<ShardingStrategy>,
    master_slave_rules: Vec<MasterSlaveRule>,
}

impl ShardingRule {
    pub fn builder() -> ShardingRuleBuilder {
        ShardingRuleBuilder::default()
    }

    /// Logical data-source names: plain data sources plus master-slave group names.
    pub fn data_source_names(&self) -> &[String] {
        &self.data_source_names
    }

    pub fn table_rules(&self) -> &[TableRule] {
        &self.table_rules
    }

    pub fn table_rule(&self, logic_table: &str) -> Option<&TableRule> {
        self.table_index
            .get(&logic_table.to_ascii_lowercase())
            .map(|idx| &self.table_rules[*idx])
    }

    pub fn is_sharded(&self, logic_table: &str) -> bool {
        self.table_rule(logic_table).is_some()
    }

    pub fn is_broadcast(&self, logic_table: &str) -> bool {
        self.broadcast_tables.contains(&logic_table.to_ascii_lowercase())
    }

    pub fn default_data_source(&self) -> Option<&str> {
        self.default_data_source.as_deref()
    }

    /// Table strategy, falling back to the default strategy, then to `None`.
    pub fn database_strategy<'a>(&'a self, table_rule: &'a TableRule) -> &'a ShardingStrategy {
        table_rule
            .database_strategy()
            .or(self.default_database_strategy.as_ref())
            .unwrap_or(&NO_STRATEGY)
    }

    pub fn table_strategy<'a>(&'a self, table_rule: &'a TableRule) -> &'a ShardingStrategy {
        table_rule
            .table_strategy()
            .or(self.default_table_strategy.as_ref())
            .unwrap_or(&NO_STRATEGY)
    }

    /// Lower-cased binding group containing `logic_table`.
    pub fn binding_group(&self, logic_table: &str) -> Option<&[String]> {
        let key = logic_table.to_ascii_lowercase();
        self.binding_groups
            .iter()
            .find(|group| group.contains(&key))
            .map(Vec::as_slice)
    }

    /// True when every table is sharded and all share one binding group.
    pub fn all_binding(&self, logic_tables: &[String]) -> bool {
        let Some(first) = logic_tables.first() else {
            return false;
        };
        let Some(group) = self.binding_group(first) else {
            return false;
        };
        logic_tables
            .iter()
            .all(|table| group.contains(&table.to_ascii_lowercase()))
    }

    pub fn master_slave_rules(&self) -> &[MasterSlaveRule] {
        &self.master_slave_rules
    }

    pub fn master_slave_rule(&self, logical_data_source: &str) -> Option<&MasterSlaveRule> {
        self.master_slave_rules
            .iter()
            .find(|rule| rule.name() == logical_data_source)
    }

    /// New snapshot with the given slave data sources disabled.
    pub fn with_disabled_data_sources(&self, names: &[String]) -> Result<Self> {
        for name in names {
            if !self.master_slave_rules.iter().any(|rule| rule.slaves().contains(name)) {
                return Err(ShardingError::Config(format!(
                    "Data source '{}' is not a slave of any master-slave rule",
                    name
                )));
            }
        }
        let mut next = self.clone();
        next.master_slave_rules = self
            .master_slave_rules
            .iter()
            .map(|rule| rule.with_disabled(names))
            .collect::<Result<Vec<_>>>()?;
        Ok(next)
    }
}

#[derive(Debug, Default)]
pub struct ShardingRuleBuilder {
    data_sources: Vec<String>,
    table_rules: Vec<TableRule>,
    binding_groups: Vec<Vec<String>>,
    broadcast_tables: Vec<String>,
    default_data_source: Option<String>,
    default_database_strategy: Option<ShardingStrategy>,
    default_table_strategy: Option<ShardingStrategy>,
    master_slave_rules: Vec<MasterSlaveRule>,
}

impl ShardingRuleBuilder {
    pub fn data_source(mut self, name: impl Into<String>) -> Self {
        self.data_sources.push(name.into());
        self
    }

    pub fn data_sources<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.data_sources.extend(names.into_iter().map(Into::into));
        self
    }

    pub fn table_rule(mut self, rule: TableRule) -> Self {
        self.table_rules.push(rule);
        self
    }

    pub fn binding_group<I, S>(mut self, tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.binding_groups
            .push(tables.into_iter().map(|t| t.into().to_ascii_lowercase()).collect());
        self
    }

    pub fn broadcast_table(mut self, table: impl Into<String>) -> Self {
        self.broadcast_tables.push(table.into());
        self
    }

    pub fn default_data_source(mut self, name: impl Into<String>) -> Self {
        self.default_data_source = Some(name.into());
        self
    }

    pub fn default_database_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.default_database_strategy = Some(strategy);
        self
    }

    pub fn default_table_strategy(mut self, strategy: ShardingStrategy) -> Self {
        self.default_table_strategy = Some(strategy);
        self
    }

    pub fn master_slave_rule(mut self, rule: MasterSlaveRule) -> Self {
        self.master_slave_rules.push(rule);
        self
    }

    pub fn build(self) -> Result<ShardingRule> {
        let mut seen = HashSet::new();
        for name in &self.data_sources {
            if !seen.insert(name.as_str()) {
                return Err(ShardingError::Config(format!("Duplicate data source '{}'", name)));
            }
        }

        // Master-slave members collapse into their group name.
        let group_of = |name: &str| -> String {
            self.master_slave_rules
                .iter()
                .find(|rule| rule.contains(name))
                .map(|rule| rule.name().to_string())
                .unwrap_or_else(|| name.to_string())
        };
        let mut data_source_names: Vec<String> = Vec::new();
        for name in self
            .data_sources
            .iter()
            .map(|ds| group_of(ds))
            .chain(self.master_slave_rules.iter().map(|r| r.name().to_string()))
        {
            if !data_source_names.contains(&name) {
                data_source_names.push(name);
            }
        }
        if data_source_names.is_empty() {
            return Err(ShardingError::Config("At least one data source is required".into()));
        }

        let mut table_rules = self.table_rules.clone();
        let mut table_index = HashMap::new();
        for (idx, rule) in table_rules.iter_mut().enumerate() {
            rule.rename_data_sources(group_of);
            for node in rule.data_nodes() {
                if !data_source_names.contains(&node.data_source) {
                    return Err(ShardingError::Config(format!(
                        "Data node '{}' of table '{}' names an unknown data source",
                        node,
                        rule.logic_table()
                    )));
                }
            }
            for strategy in rule.database_strategy().into_iter().chain(rule.table_strategy()) {
                strategy.validate().map_err(|err| {
                    ShardingError::Config(format!("Table '{}': {}", rule.logic_table(), config_message(err)))
                })?;
            }
            if table_index
                .insert(rule.logic_table().to_ascii_lowercase(), idx)
                .is_some()
            {
                return Err(ShardingError::Config(format!(
                    "Table '{}' is configured twice",
                    rule.logic_table()
                )));
            }
        }

        let broadcast_tables: HashSet<String> = self
            .broadcast_tables
            .iter()
            .map(|t| t.to_ascii_lowercase())
            .collect();
        if let Some(table) = broadcast_tables.iter().find(|t| table_index.contains_key(*t)) {
            return Err(ShardingError::Config(format!(
                "Table '{}' cannot be both sharded and broadcast",
                table
            )));
        }

        for group in &self.binding_groups {
            let mut layout = None;
            for table in group {
                let rule = table_index.get(table).map(|idx| &table_rules[*idx]).ok_or_else(|| {
                    ShardingError::Config(format!("Binding table '{}' has no table rule", table))
                })?;
                let current = rule.layout();
                match &layout {
                    None => layout = Some(current),
                    Some(expected) if *expected != current => {
                        return Err(ShardingError::Config(format!(
                            "Binding table '{}' is not co-located with '{}'",
                            table, group[0]
                        )));
                    }
                    Some(_) => {}
                }
            }
        }

        for strategy in self
            .default_database_strategy
            .iter()
            .chain(self.default_table_strategy.iter())
        {
            strategy.validate().map_err(|err| {
                ShardingError::Config(format!("Default strategy: {}", config_message(err)))
            })?;
        }

        let default_data_source = self.default_data_source.as_deref().map(group_of);
        if let Some(name) = &default_data_source {
            if !data_source_names.contains(name) {
                return Err(ShardingError::Config(format!(
                    "Default data source '{}' is unknown",
                    name
                )));
            }
        }

        Ok(ShardingRule {
            data_source_names,
            table_rules,
            table_index,
            binding_groups: self.binding_groups,
            broadcast_tables,
            default_data_source,
            default_database_strategy: self.default_database_strategy,
            default_table_strategy: self.default_table_strategy,
            master_slave_rules: self.master_slave_rules,
        })
    }
}

fn config_message(err: ShardingError) -> String {
    match err {
        ShardingError::Config(message) => message,
        other => other.to_string(),
    }
}
