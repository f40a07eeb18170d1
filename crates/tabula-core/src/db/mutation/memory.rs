use crate::{
    db::mutation::{
        operation::MutationKind,
        statement::{BoundStatement, BoundValue, StatementPort},
    },
    error::InternalError,
    value::Value,
};
use std::collections::{BTreeMap, BTreeSet};

pub type Row = BTreeMap<String, Value>;

///
/// MemoryRowStore
///
/// Statement port that applies bound statements to in-memory tables instead
/// of sending SQL anywhere. Keeps an inline-SQL log of everything it ran.
///

#[derive(Debug, Default)]
pub struct MemoryRowStore {
    tables: BTreeMap<String, Vec<Row>>,
    log: Vec<String>,
    batch_keys: Vec<Option<String>>,
    failing: BTreeSet<String>,
}

impl MemoryRowStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_row<I, S>(&mut self, table: &str, columns: I)
    where
        I: IntoIterator<Item = (S, Value)>,
        S: Into<String>,
    {
        let row = columns
            .into_iter()
            .map(|(column, value)| (column.into(), value))
            .collect();
        self.tables.entry(table.to_string()).or_default().push(row);
    }

    #[must_use]
    pub fn rows(&self, table: &str) -> &[Row] {
        self.tables.get(table).map_or(&[], Vec::as_slice)
    }

    /// Rows of `table` whose `column` equals `value`.
    #[must_use]
    pub fn find(&self, table: &str, column: &str, value: &Value) -> Vec<&Row> {
        self.rows(table)
            .iter()
            .filter(|row| row.get(column) == Some(value))
            .collect()
    }

    /// Inline SQL of every executed statement, in order.
    #[must_use]
    pub fn statements(&self) -> &[String] {
        &self.log
    }

    /// Batch key of every executed statement, in order.
    #[must_use]
    pub fn batch_keys(&self) -> &[Option<String>] {
        &self.batch_keys
    }

    pub fn clear_log(&mut self) {
        self.log.clear();
        self.batch_keys.clear();
    }

    /// Make every later statement against `table` fail.
    pub fn fail_table(&mut self, table: &str) {
        self.failing.insert(table.to_string());
    }

    fn matches(row: &Row, restrictions: &[(&str, Option<Value>)]) -> bool {
        restrictions.iter().all(|(column, expected)| {
            let actual = row.get(*column);
            match expected {
                Some(expected) => actual == Some(expected),
                None => actual.is_none_or(Value::is_null),
            }
        })
    }

    fn assigned(value: &BoundValue<'_>) -> Value {
        match value {
            BoundValue::Value(value) => value.clone(),
            BoundValue::Sql(expression) => Value::text(*expression),
        }
    }
}

impl StatementPort for MemoryRowStore {
    fn execute(&mut self, statement: &BoundStatement<'_>) -> Result<u64, InternalError> {
        if self.failing.contains(statement.table) {
            return Err(InternalError::statement_failed(format!(
                "table '{}' rejected {} statement",
                statement.table, statement.kind
            )));
        }

        self.log.push(statement.inline_sql());
        self.batch_keys
            .push(statement.batch_key.map(ToString::to_string));
        let rows = self.tables.entry(statement.table.to_string()).or_default();

        let affected = match statement.kind {
            MutationKind::Insert => {
                rows.push(
                    statement
                        .assignments
                        .iter()
                        .map(|(column, value)| ((*column).to_string(), Self::assigned(value)))
                        .collect(),
                );
                1
            }
            MutationKind::Update => {
                let mut affected = 0;
                for row in rows
                    .iter_mut()
                    .filter(|row| Self::matches(row, &statement.restrictions))
                {
                    for (column, value) in &statement.assignments {
                        row.insert((*column).to_string(), Self::assigned(value));
                    }
                    affected += 1;
                }
                affected
            }
            MutationKind::Delete => {
                let before = rows.len();
                rows.retain(|row| !Self::matches(row, &statement.restrictions));
                u64::try_from(before - rows.len()).unwrap_or(u64::MAX)
            }
        };

        Ok(affected)
    }
}
