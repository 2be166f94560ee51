use crate::core::{Result, ShardingError};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// How a read picks among the enabled slaves of a group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalanceAlgorithm {
    #[default]
    RoundRobin,
    Random,
}

/// Read/write split group exposed to sharding rules under one logical name.
#[derive(Debug, Clone)]
pub struct MasterSlaveRule {
    name: String,
    master: String,
    slaves: Vec<String>,
    load_balance: LoadBalanceAlgorithm,
    disabled: HashSet<String>,
    // Shared across snapshots so a rule reload does not reset the rotation.
    next_slave: Arc<AtomicUsize>,
}

impl MasterSlaveRule {
    pub fn new(
        name: impl Into<String>,
        master: impl Into<String>,
        slaves: Vec<String>,
        load_balance: LoadBalanceAlgorithm,
    ) -> Result<Self> {
        let name = name.into();
        let master = master.into();
        if name.is_empty() || master.is_empty() {
            return Err(ShardingError::Config(
                "Master-slave rule needs a name and a master".into(),
            ));
        }
        if slaves.iter().any(|s| *s == master) {
            return Err(ShardingError::Config(format!(
                "Master-slave rule '{}' lists master '{}' as a slave",
                name, master
            )));
        }
        let mut seen = HashSet::new();
        if let Some(duplicate) = slaves.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(ShardingError::Config(format!(
                "Master-slave rule '{}' lists slave '{}' twice",
                name, duplicate
            )));
        }
        Ok(Self {
            name,
            master,
            slaves,
            load_balance,
            disabled: HashSet::new(),
            next_slave: Arc::new(AtomicUsize::new(0)),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn master(&self) -> &str {
        &self.master
    }

    pub fn slaves(&self) -> &[String] {
        &self.slaves
    }

    pub fn load_balance(&self) -> LoadBalanceAlgorithm {
        self.load_balance
    }

    pub fn contains(&self, data_source: &str) -> bool {
        self.master == data_source || self.slaves.iter().any(|s| s == data_source)
    }

    pub fn enabled_slaves(&self) -> Vec<&str> {
        self.slaves
            .iter()
            .filter(|s| !self.disabled.contains(*s))
            .map(String::as_str)
            .collect()
    }

    pub fn is_disabled(&self, slave: &str) -> bool {
        self.disabled.contains(slave)
    }

    /// Picks a slave for a read, or the master when every slave is disabled.
    pub fn select_read_source(&self) -> &str {
        let enabled = self.enabled_slaves();
        if enabled.is_empty() {
            return &self.master;
        }
        let index = match self.load_balance {
            LoadBalanceAlgorithm::RoundRobin => self.next_slave.fetch_add(1, Ordering::Relaxed) % enabled.len(),
            LoadBalanceAlgorithm::Random => rand::thread_rng().gen_range(0..enabled.len()),
        };
        enabled[index]
    }

    /// Copy of this rule with `names` marked disabled. Only slaves can be disabled.
    pub fn with_disabled(&self, names: &[String]) -> Result<Self> {
        let mut next = self.clone();
        for name in names {
            if *name == self.master {
                return Err(ShardingError::Config(format!(
                    "Cannot disable master '{}' of '{}'",
                    name, self.name
                )));
            }
            if self.slaves.contains(name) {
                next.disabled.insert(name.clone());
            }
        }
        Ok(next)
    }
}
