use crate::core::Value;
use std::collections::HashMap;

/// Per-connection routing state, passed explicitly through every route call.
///
/// Tracks whether a transaction is open, whether this session has already
/// been pinned to a master, and the hint values supplied for hint strategies.
#[derive(Debug, Default, Clone)]
pub struct SessionContext {
    in_transaction: bool,
    master_visited: bool,
    database_hints: HashMap<String, Vec<Value>>,
    table_hints: HashMap<String, Vec<Value>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&mut self) {
        self.in_transaction = true;
    }

    pub fn commit(&mut self) {
        self.end_transaction();
    }

    pub fn rollback(&mut self) {
        self.end_transaction();
    }

    /// Connection close: forget every piece of session state.
    pub fn close(&mut self) {
        self.end_transaction();
        self.clear_hints();
    }

    fn end_transaction(&mut self) {
        self.in_transaction = false;
        self.master_visited = false;
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    pub fn master_visited(&self) -> bool {
        self.master_visited
    }

    pub(crate) fn mark_master_visited(&mut self) {
        self.master_visited = true;
    }

    pub fn set_database_hint(&mut self, logic_table: &str, values: Vec<Value>) {
        self.database_hints.insert(logic_table.to_ascii_lowercase(), values);
    }

    pub fn set_table_hint(&mut self, logic_table: &str, values: Vec<Value>) {
        self.table_hints.insert(logic_table.to_ascii_lowercase(), values);
    }

    pub fn database_hint(&self, logic_table: &str) -> Option<&[Value]> {
        self.database_hints
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn table_hint(&self, logic_table: &str) -> Option<&[Value]> {
        self.table_hints
            .get(&logic_table.to_ascii_lowercase())
            .map(Vec::as_slice)
    }

    pub fn clear_hints(&mut self) {
        self.database_hints.clear();
        self.table_hints.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transaction_end_clears_master_visited() {
        let mut session = SessionContext::new();
        session.begin();
        session.mark_master_visited();
        assert!(session.in_transaction());
        assert!(session.master_visited());

        session.commit();
        assert!(!session.in_transaction());
        assert!(!session.master_visited());
    }

    #[test]
    fn test_close_clears_hints() {
        let mut session = SessionContext::new();
        session.set_database_hint("T_ORDER", vec![Value::Integer(1)]);
        assert_eq!(session.database_hint("t_order"), Some(&[Value::Integer(1)][..]));
        session.mark_master_visited();

        session.close();
        assert!(session.database_hint("t_order").is_none());
        assert!(!session.master_visited());
    }
}
