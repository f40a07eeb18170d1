use crate::{
    db::mutation::{
        operation::MutationKind,
        statement::{BoundStatement, StatementPort},
    },
    error::InternalError,
    value::Value,
};
use std::collections::BTreeMap;

///
/// RecordedStatement
/// Owned copy of one bound statement.
///

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct RecordedStatement {
    pub(crate) table: String,
    pub(crate) kind: MutationKind,
    pub(crate) sql: String,
    pub(crate) inline: String,
    pub(crate) assignments: Vec<(String, Option<Value>)>,
    pub(crate) restrictions: Vec<(String, Option<Value>)>,
    pub(crate) batch_key: Option<String>,
}

///
/// RecordingPort
/// Records every statement and reports a fixed row count per table (default 1).
///

#[derive(Debug, Default)]
pub(crate) struct RecordingPort {
    pub(crate) statements: Vec<RecordedStatement>,
    rows: BTreeMap<String, u64>,
}

impl RecordingPort {
    pub(crate) fn rows_for(mut self, table: &str, rows: u64) -> Self {
        self.rows.insert(table.to_string(), rows);
        self
    }

    pub(crate) fn inline(&self) -> Vec<&str> {
        self.statements
            .iter()
            .map(|statement| statement.inline.as_str())
            .collect()
    }
}

impl StatementPort for RecordingPort {
    fn execute(&mut self, statement: &BoundStatement<'_>) -> Result<u64, InternalError> {
        self.statements.push(RecordedStatement {
            table: statement.table.to_string(),
            kind: statement.kind,
            sql: statement.sql.to_string(),
            inline: statement.inline_sql(),
            assignments: statement
                .assignments
                .iter()
                .map(|(column, value)| ((*column).to_string(), value.as_value().cloned()))
                .collect(),
            restrictions: statement
                .restrictions
                .iter()
                .map(|(column, value)| ((*column).to_string(), value.clone()))
                .collect(),
            batch_key: statement.batch_key.map(ToString::to_string),
        });

        Ok(self.rows.get(statement.table).copied().unwrap_or(1))
    }
}
