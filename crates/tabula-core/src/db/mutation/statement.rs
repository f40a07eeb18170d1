use crate::{
    db::mutation::operation::{BatchKey, MutationKind},
    error::InternalError,
    value::Value,
};
use std::fmt::Write as _;

///
/// StatementPort
///
/// Connection-layer seam. Runs one bound statement and reports the number of
/// affected rows. Implementations may defer batched statements; they still
/// report the rows the statement will affect.
///

pub trait StatementPort {
    fn execute(&mut self, statement: &BoundStatement<'_>) -> Result<u64, InternalError>;
}

impl<P: StatementPort + ?Sized> StatementPort for &mut P {
    fn execute(&mut self, statement: &BoundStatement<'_>) -> Result<u64, InternalError> {
        (**self).execute(statement)
    }
}

///
/// BoundStatement
///
/// One statement with its parameters resolved. Carries the structured
/// assignments and restrictions next to the text so ports that do not speak
/// SQL can apply it directly.
///

#[derive(Clone, Debug, PartialEq)]
pub struct BoundStatement<'a> {
    pub path: &'a str,
    pub table: &'a str,
    pub kind: MutationKind,
    pub sql: &'a str,
    /// Placeholder values in order.
    pub params: Vec<Value>,
    pub assignments: Vec<(&'a str, BoundValue<'a>)>,
    /// `None` means `IS NULL`.
    pub restrictions: Vec<(&'a str, Option<Value>)>,
    pub batch_key: Option<&'a BatchKey>,
}

impl BoundStatement<'_> {
    /// Statement text with every `?` replaced by its literal value.
    #[must_use]
    pub fn inline_sql(&self) -> String {
        let mut out = String::with_capacity(self.sql.len() + 16);
        let mut params = self.params.iter().peekable();

        for ch in self.sql.chars() {
            match (ch, params.next_if(|_| ch == '?')) {
                (_, Some(value)) => {
                    let _ = write!(out, "{value}");
                }
                (ch, None) => out.push(ch),
            }
        }

        out
    }

    #[must_use]
    pub fn assigned(&self, column: &str) -> Option<&BoundValue<'_>> {
        self.assignments
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }

    #[must_use]
    pub fn restricted(&self, column: &str) -> Option<&Option<Value>> {
        self.restrictions
            .iter()
            .find(|(name, _)| *name == column)
            .map(|(_, value)| value)
    }
}

///
/// BoundValue
///

#[derive(Clone, Debug, PartialEq)]
pub enum BoundValue<'a> {
    Value(Value),
    /// Database-side expression; no parameter consumed.
    Sql(&'a str),
}

impl BoundValue<'_> {
    #[must_use]
    pub const fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            Self::Sql(_) => None,
        }
    }
}
