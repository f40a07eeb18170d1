use crate::{
    db::mutation::sql::MutationSqlBuilder,
    error::InternalError,
};
use derive_more::Display;
use std::collections::BTreeSet;

///
/// MutationKind
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum MutationKind {
    #[display("INSERT")]
    Insert,
    #[display("UPDATE")]
    Update,
    #[display("DELETE")]
    Delete,
}

///
/// ParameterUsage
/// Whether a bound value feeds a written column or a WHERE restriction.
///

#[derive(Clone, Copy, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub enum ParameterUsage {
    #[display("set")]
    Set,
    #[display("restrict")]
    Restrict,
}

///
/// ColumnValue
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColumnValue {
    /// `?`, resolved from the bindings under `usage`.
    Param(ParameterUsage),
    /// Literal `null`.
    Null,
    /// SQL expression written verbatim (database-generated values).
    Sql(String),
}

///
/// ColumnAssignment
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ColumnAssignment {
    pub column: String,
    pub value: ColumnValue,
}

///
/// ColumnRestriction
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ColumnRestriction {
    /// `column = ?`
    Param(String),
    /// `column IS NULL`
    IsNull(String),
}

impl ColumnRestriction {
    #[must_use]
    pub fn column(&self) -> &str {
        match self {
            Self::Param(column) | Self::IsNull(column) => column,
        }
    }
}

///
/// Expectation
/// Affected-row check applied after a statement runs.
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum Expectation {
    #[default]
    None,
    RowCount(u64),
}

impl Expectation {
    /// A mismatch is an optimistic-lock conflict.
    pub fn verify(self, actual: u64, path: &str, table: &str) -> Result<(), InternalError> {
        match self {
            Self::RowCount(expected) if expected != actual => {
                Err(InternalError::stale_state(path, table, expected, actual))
            }
            _ => Ok(()),
        }
    }
}

///
/// TableMutation
/// One fully shaped statement against one table.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TableMutation {
    pub table: String,
    pub table_index: usize,
    pub kind: MutationKind,
    pub assignments: Vec<ColumnAssignment>,
    pub restrictions: Vec<ColumnRestriction>,
    pub sql: String,
    pub expectation: Expectation,
}

impl TableMutation {
    #[must_use]
    pub fn builder(table: impl Into<String>, table_index: usize, kind: MutationKind) -> TableMutationBuilder {
        TableMutationBuilder {
            table: table.into(),
            table_index,
            kind,
            assignments: Vec::new(),
            restrictions: Vec::new(),
            expectation: Expectation::None,
            custom_sql: None,
        }
    }

    /// Bound parameters in placeholder order: assignments, then restrictions.
    pub fn parameters(&self) -> impl Iterator<Item = (ParameterUsage, &str)> + '_ {
        let assigned = self.assignments.iter().filter_map(|assignment| {
            match assignment.value {
                ColumnValue::Param(usage) => Some((usage, assignment.column.as_str())),
                _ => None,
            }
        });
        let restricted = self.restrictions.iter().filter_map(|restriction| match restriction {
            ColumnRestriction::Param(column) => Some((ParameterUsage::Restrict, column.as_str())),
            ColumnRestriction::IsNull(_) => None,
        });

        assigned.chain(restricted)
    }

    /// Columns written from `Set` bindings.
    pub fn set_columns(&self) -> impl Iterator<Item = &str> + '_ {
        self.assignments.iter().filter_map(|assignment| match assignment.value {
            ColumnValue::Param(ParameterUsage::Set) => Some(assignment.column.as_str()),
            _ => None,
        })
    }
}

///
/// TableMutationBuilder
///

#[derive(Debug)]
pub struct TableMutationBuilder {
    table: String,
    table_index: usize,
    kind: MutationKind,
    assignments: Vec<ColumnAssignment>,
    restrictions: Vec<ColumnRestriction>,
    expectation: Expectation,
    custom_sql: Option<String>,
}

impl TableMutationBuilder {
    pub fn assign(&mut self, column: impl Into<String>, value: ColumnValue) -> &mut Self {
        self.assignments.push(ColumnAssignment {
            column: column.into(),
            value,
        });
        self
    }

    pub fn assign_param(&mut self, column: impl Into<String>) -> &mut Self {
        self.assign(column, ColumnValue::Param(ParameterUsage::Set))
    }

    pub fn restrict(&mut self, column: impl Into<String>) -> &mut Self {
        self.restrictions.push(ColumnRestriction::Param(column.into()));
        self
    }

    pub fn restrict_null(&mut self, column: impl Into<String>) -> &mut Self {
        self.restrictions
            .push(ColumnRestriction::IsNull(column.into()));
        self
    }

    pub const fn expect(&mut self, expectation: Expectation) -> &mut Self {
        self.expectation = expectation;
        self
    }

    /// Use `sql` verbatim instead of rendering; placeholders must still follow
    /// assignment-then-restriction order.
    pub fn custom_sql(&mut self, sql: impl Into<String>) -> &mut Self {
        self.custom_sql = Some(sql.into());
        self
    }

    #[must_use]
    pub fn has_assignments(&self) -> bool {
        !self.assignments.is_empty()
    }

    pub fn build(self, sql: &dyn MutationSqlBuilder) -> TableMutation {
        let rendered = self.custom_sql.unwrap_or_else(|| {
            sql.render(self.kind, &self.table, &self.assignments, &self.restrictions)
        });

        TableMutation {
            table: self.table,
            table_index: self.table_index,
            kind: self.kind,
            assignments: self.assignments,
            restrictions: self.restrictions,
            sql: rendered,
            expectation: self.expectation,
        }
    }
}

///
/// OptionalTableUpdate
///
/// Update of a table whose row may legitimately be missing. Executed as:
/// all written values null ⇒ delete; otherwise update, and insert when the
/// update touched no row.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct OptionalTableUpdate {
    pub update: TableMutation,
    pub insert: TableMutation,
    pub delete: TableMutation,
}

impl OptionalTableUpdate {
    /// Derive the insert and delete companions from an update shape.
    #[must_use]
    pub fn from_update(
        update: TableMutation,
        key_columns: &[String],
        sql: &dyn MutationSqlBuilder,
    ) -> Self {
        let mut insert = TableMutation::builder(&update.table, update.table_index, MutationKind::Insert);
        for column in key_columns {
            insert.assign(column, ColumnValue::Param(ParameterUsage::Restrict));
        }
        for assignment in &update.assignments {
            insert.assign(&assignment.column, assignment.value.clone());
        }
        insert.expect(Expectation::RowCount(1));

        let mut delete = TableMutation::builder(&update.table, update.table_index, MutationKind::Delete);
        for column in key_columns {
            delete.restrict(column);
        }

        Self {
            insert: insert.build(sql),
            delete: delete.build(sql),
            update,
        }
    }
}

///
/// MutationOperation
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum MutationOperation {
    Table(TableMutation),
    OptionalTable(OptionalTableUpdate),
    /// Table present in the group but not touched by this action.
    Skipped { table: String, table_index: usize },
}

impl MutationOperation {
    #[must_use]
    pub fn table(&self) -> &str {
        match self {
            Self::Table(mutation) => &mutation.table,
            Self::OptionalTable(optional) => &optional.update.table,
            Self::Skipped { table, .. } => table,
        }
    }

    #[must_use]
    pub const fn table_index(&self) -> usize {
        match self {
            Self::Table(mutation) => mutation.table_index,
            Self::OptionalTable(optional) => optional.update.table_index,
            Self::Skipped { table_index, .. } => *table_index,
        }
    }

    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// Every statement shape this operation may issue.
    pub fn statements(&self) -> impl Iterator<Item = &TableMutation> + '_ {
        let (primary, insert, delete) = match self {
            Self::Table(mutation) => (Some(mutation), None, None),
            Self::OptionalTable(optional) => (
                Some(&optional.update),
                Some(&optional.insert),
                Some(&optional.delete),
            ),
            Self::Skipped { .. } => (None, None, None),
        };

        primary.into_iter().chain(insert).chain(delete)
    }

    /// The primary statement shape (the update for optional tables).
    #[must_use]
    pub const fn primary(&self) -> Option<&TableMutation> {
        match self {
            Self::Table(mutation) => Some(mutation),
            Self::OptionalTable(optional) => Some(&optional.update),
            Self::Skipped { .. } => None,
        }
    }
}

///
/// MutationOperationGroup
///
/// Ordered per-table operations for one logical action.
/// At most one operation per physical table.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct MutationOperationGroup {
    path: String,
    kind: MutationKind,
    operations: Vec<MutationOperation>,
}

impl MutationOperationGroup {
    pub fn new(
        path: impl Into<String>,
        kind: MutationKind,
        operations: Vec<MutationOperation>,
    ) -> Result<Self, InternalError> {
        let path = path.into();
        let mut tables = BTreeSet::new();
        for operation in &operations {
            if !tables.insert(operation.table()) {
                return Err(InternalError::executor_invariant(format!(
                    "mutation group for '{path}' has more than one operation on table '{}'",
                    operation.table()
                )));
            }
        }

        Ok(Self {
            path,
            kind,
            operations,
        })
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub const fn kind(&self) -> MutationKind {
        self.kind
    }

    #[must_use]
    pub fn operations(&self) -> &[MutationOperation] {
        &self.operations
    }

    #[must_use]
    pub fn operation_for(&self, table_index: usize) -> Option<&MutationOperation> {
        self.operations
            .iter()
            .find(|operation| operation.table_index() == table_index)
    }

    /// Number of operations that issue statements.
    #[must_use]
    pub fn executable_count(&self) -> usize {
        self.operations
            .iter()
            .filter(|operation| !operation.is_skipped())
            .count()
    }
}

///
/// BatchKey
///
/// Grouping token for structurally identical statements issued in the same
/// transactional scope.
///

#[derive(Clone, Debug, Display, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[display("{_0}")]
pub struct BatchKey(String);

impl BatchKey {
    #[must_use]
    pub fn new(path: &str, kind: impl std::fmt::Display) -> Self {
        Self(format!("{path}#{kind}"))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}
