// ============================================================================
// Rule Holder
// ============================================================================
//
// Readers clone the current `Arc<ShardingRule>` and keep using it for the
// whole statement. Reloads build a fresh rule and swap the pointer, so a
// route in flight never sees a half-updated rule.

use super::sharding_rule::ShardingRule;
use crate::core::Result;
use log::info;
use std::sync::{Arc, RwLock};

#[derive(Debug)]
pub struct RuleHolder {
    current: RwLock<Arc<ShardingRule>>,
}

impl RuleHolder {
    pub fn new(rule: ShardingRule) -> Self {
        Self {
            current: RwLock::new(Arc::new(rule)),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<ShardingRule>> {
        Ok(self.current.read()?.clone())
    }

    /// Replaces the whole rule set.
    pub fn renew(&self, rule: ShardingRule) -> Result<()> {
        let mut current = self.current.write()?;
        *current = Arc::new(rule);
        info!("Sharding rule renewed ({} data sources)", current.data_source_names().len());
        Ok(())
    }

    /// Marks slave data sources as disabled in a new snapshot.
    pub fn disable_data_sources(&self, names: &[String]) -> Result<()> {
        let mut current = self.current.write()?;
        let next = current.with_disabled_data_sources(names)?;
        *current = Arc::new(next);
        info!("Disabled data sources: {:?}", names);
        Ok(())
    }
}
