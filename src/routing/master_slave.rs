use super::session::SessionContext;
use crate::rule::ShardingRule;
use crate::statement::StatementKind;
use log::debug;
use std::collections::HashMap;

/// Resolves master-slave group names to physical data sources for one statement.
pub struct MasterSlaveRouter<'a> {
    rule: &'a ShardingRule,
}

impl<'a> MasterSlaveRouter<'a> {
    pub fn new(rule: &'a ShardingRule) -> Self {
        Self { rule }
    }

    /// Writes, statements inside a transaction, and anything after the
    /// session touched a master go to the master.
    fn use_master(kind: StatementKind, session: &SessionContext) -> bool {
        !kind.is_query() || session.in_transaction() || session.master_visited()
    }

    /// Returns one physical name per logical name, choosing a slave at most
    /// once per group so every unit of a statement reads from the same replica.
    pub fn resolve(
        &self,
        logic_data_sources: &[&str],
        kind: StatementKind,
        session: &mut SessionContext,
    ) -> HashMap<String, String> {
        let use_master = Self::use_master(kind, session);
        let mut resolved = HashMap::new();
        let mut touched_master = false;
        for logic in logic_data_sources {
            if resolved.contains_key(*logic) {
                continue;
            }
            let physical = match self.rule.master_slave_rule(logic) {
                Some(group) if use_master => {
                    touched_master = true;
                    group.master().to_string()
                }
                Some(group) => group.select_read_source().to_string(),
                None => logic.to_string(),
            };
            debug!("Data source '{}' resolved to '{}'", logic, physical);
            resolved.insert(logic.to_string(), physical);
        }
        if touched_master {
            session.mark_master_visited();
        }
        resolved
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rule::{LoadBalanceAlgorithm, MasterSlaveRule, TableRule};

    fn rule() -> ShardingRule {
        let group = MasterSlaveRule::new(
            "ms_ds",
            "master",
            vec!["slave0".into(), "slave1".into()],
            LoadBalanceAlgorithm::RoundRobin,
        )
        .unwrap();
        ShardingRule::builder()
            .data_sources(["master", "slave0", "slave1", "ds1"])
            .master_slave_rule(group)
            .table_rule(TableRule::from_inline("t_user", "ms_ds.t_user").unwrap())
            .build()
            .unwrap()
    }

    #[test]
    fn test_reads_go_to_slaves_writes_pin_master() {
        let rule = rule();
        let router = MasterSlaveRouter::new(&rule);
        let mut session = SessionContext::new();

        let read = router.resolve(&["ms_ds", "ds1"], StatementKind::Dql, &mut session);
        assert!(read["ms_ds"].starts_with("slave"));
        assert_eq!(read["ds1"], "ds1");
        assert!(!session.master_visited());

        let write = router.resolve(&["ms_ds"], StatementKind::Dml, &mut session);
        assert_eq!(write["ms_ds"], "master");
        assert!(session.master_visited());

        let after = router.resolve(&["ms_ds"], StatementKind::Dql, &mut session);
        assert_eq!(after["ms_ds"], "master");

        session.close();
        let fresh = router.resolve(&["ms_ds"], StatementKind::Dql, &mut session);
        assert!(fresh["ms_ds"].starts_with("slave"));
    }

    #[test]
    fn test_transaction_reads_use_master() {
        let rule = rule();
        let router = MasterSlaveRouter::new(&rule);
        let mut session = SessionContext::new();
        session.begin();
        let read = router.resolve(&["ms_ds"], StatementKind::Dql, &mut session);
        assert_eq!(read["ms_ds"], "master");
        assert!(session.master_visited());
    }
}
