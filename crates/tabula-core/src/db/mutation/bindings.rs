use crate::{db::mutation::operation::ParameterUsage, value::Value};
use std::collections::BTreeMap;

///
/// ParameterBindings
///
/// Per-call value table, keyed by (table, usage, column). Owned by one
/// executor lease and cleared after every statement.
///

#[derive(Debug, Default)]
pub struct ParameterBindings {
    tables: BTreeMap<String, TableBindings>,
}

#[derive(Debug, Default)]
struct TableBindings {
    set: BTreeMap<String, Value>,
    restrict: BTreeMap<String, Value>,
}

impl TableBindings {
    const fn values(&self, usage: ParameterUsage) -> &BTreeMap<String, Value> {
        match usage {
            ParameterUsage::Set => &self.set,
            ParameterUsage::Restrict => &self.restrict,
        }
    }

    const fn values_mut(&mut self, usage: ParameterUsage) -> &mut BTreeMap<String, Value> {
        match usage {
            ParameterUsage::Set => &mut self.set,
            ParameterUsage::Restrict => &mut self.restrict,
        }
    }
}

impl ParameterBindings {
    /// Bind `value`; a later bind for the same slot replaces it.
    pub fn bind(&mut self, table: &str, column: &str, usage: ParameterUsage, value: Value) {
        let bindings = match self.tables.get_mut(table) {
            Some(bindings) => bindings,
            None => self.tables.entry(table.to_string()).or_default(),
        };
        bindings.values_mut(usage).insert(column.to_string(), value);
    }

    pub fn bind_set(&mut self, table: &str, column: &str, value: Value) {
        self.bind(table, column, ParameterUsage::Set, value);
    }

    pub fn bind_restriction(&mut self, table: &str, column: &str, value: Value) {
        self.bind(table, column, ParameterUsage::Restrict, value);
    }

    #[must_use]
    pub fn get(&self, table: &str, column: &str, usage: ParameterUsage) -> Option<&Value> {
        self.tables.get(table)?.values(usage).get(column)
    }

    /// True when every `Set` binding for `table` is null (or none exist).
    #[must_use]
    pub fn set_values_all_null(&self, table: &str) -> bool {
        self.tables
            .get(table)
            .is_none_or(|bindings| bindings.set.values().all(Value::is_all_null))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}
