use crate::{error::InternalError, value::Value};
use std::{fmt, sync::Arc};

///
/// AttributeModel
/// One persistent attribute of an entity, with the columns it writes.
///

#[derive(Clone, Debug)]
pub struct AttributeModel {
    /// Position within the owning entity; assigned by the entity builder.
    pub index: usize,
    pub name: String,
    /// Ordered column list; the attribute's value spans these columns.
    pub columns: Vec<ColumnModel>,
    pub kind: AttributeKind,
    pub updatable: bool,
    /// Included in `ALL` / `DIRTY` optimistic-lock restrictions.
    pub versionable: bool,
    pub lazy: bool,
    /// Always restricted on, independent of dirtiness.
    pub partition_key: bool,
    pub generation: ValueGeneration,
}

impl AttributeModel {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            index: 0,
            name: name.into(),
            columns: Vec::new(),
            kind: AttributeKind::Basic,
            updatable: true,
            versionable: true,
            lazy: false,
            partition_key: false,
            generation: ValueGeneration::None,
        }
    }

    /// Add a column living in `table`.
    #[must_use]
    pub fn column(mut self, table: impl Into<String>, name: impl Into<String>) -> Self {
        self.columns.push(ColumnModel::new(table, name));
        self
    }

    /// Add a column that is written on insert only.
    #[must_use]
    pub fn insert_only_column(mut self, table: impl Into<String>, name: impl Into<String>) -> Self {
        let mut column = ColumnModel::new(table, name);
        column.updatable = false;
        self.columns.push(column);
        self
    }

    #[must_use]
    pub const fn kind(mut self, kind: AttributeKind) -> Self {
        self.kind = kind;
        self
    }

    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.updatable = false;
        self
    }

    #[must_use]
    pub const fn exclude_from_lock(mut self) -> Self {
        self.versionable = false;
        self
    }

    #[must_use]
    pub const fn lazy(mut self) -> Self {
        self.lazy = true;
        self
    }

    #[must_use]
    pub const fn partition_key(mut self) -> Self {
        self.partition_key = true;
        self
    }

    #[must_use]
    pub fn generated(mut self, generation: ValueGeneration) -> Self {
        self.generation = generation;
        self
    }

    #[must_use]
    pub const fn column_span(&self) -> usize {
        self.columns.len()
    }

    /// Per-column updatability mask.
    #[must_use]
    pub fn updatable_columns(&self) -> Vec<bool> {
        self.columns
            .iter()
            .map(|column| self.updatable && column.updatable)
            .collect()
    }

    /// Attribute writes a SQL expression instead of a bound parameter.
    #[must_use]
    pub const fn writes_value_in_sql(&self) -> bool {
        matches!(self.generation, ValueGeneration::OnExecution { sql: Some(_) })
    }

    /// True if any column of this attribute lives in `table`.
    #[must_use]
    pub fn maps_to_table(&self, table: usize) -> bool {
        self.columns.iter().any(|column| column.table_index == table)
    }

    /// Indexes of the distinct tables this attribute writes, in column order.
    #[must_use]
    pub fn tables(&self) -> Vec<usize> {
        let mut tables = Vec::with_capacity(1);
        for column in &self.columns {
            if !tables.contains(&column.table_index) {
                tables.push(column.table_index);
            }
        }

        tables
    }

    /// Pair each column that lives in `table` with its slice of `value`.
    pub fn column_values<'v>(
        &'v self,
        table: usize,
        value: &'v Value,
    ) -> Result<Vec<(&'v ColumnModel, &'v Value)>, InternalError> {
        let parts = value.columns(self.column_span()).ok_or_else(|| {
            InternalError::model_invariant(format!(
                "value for attribute '{}' does not span {} column(s): {value}",
                self.name,
                self.column_span()
            ))
        })?;

        Ok(self
            .columns
            .iter()
            .zip(parts)
            .filter(|(column, _)| column.table_index == table)
            .collect())
    }
}

///
/// ColumnModel
///

#[derive(Clone, Debug)]
pub struct ColumnModel {
    pub name: String,
    pub table: String,
    /// Resolved by the entity builder.
    pub table_index: usize,
    pub updatable: bool,
}

impl ColumnModel {
    #[must_use]
    pub fn new(table: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            table: table.into(),
            table_index: 0,
            updatable: true,
        }
    }
}

///
/// AttributeKind
///
/// Type-level dirty checking. `Component` values are `Value::Composite`, one
/// part per column; the other kinds compare the value as a whole.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttributeKind {
    Basic,
    CaseInsensitiveText,
    Component,
}

impl AttributeKind {
    /// Compare `old` and `new` restricted to the columns enabled in `mask`.
    #[must_use]
    pub fn is_dirty(self, old: &Value, new: &Value, mask: &[bool]) -> bool {
        if !mask.iter().any(|include| *include) {
            return false;
        }

        match self {
            Self::Basic => old != new,
            Self::CaseInsensitiveText => match (old, new) {
                (Value::Text(a), Value::Text(b)) => a.to_lowercase() != b.to_lowercase(),
                _ => old != new,
            },
            Self::Component => {
                let (Some(old_parts), Some(new_parts)) =
                    (old.columns(mask.len()), new.columns(mask.len()))
                else {
                    return true;
                };

                old_parts
                    .iter()
                    .zip(new_parts.iter())
                    .zip(mask)
                    .any(|((a, b), include)| *include && a != b)
            }
        }
    }
}

///
/// ValueGeneration
///
/// How an attribute's value is produced on update.
///

#[derive(Clone, Debug, Default)]
pub enum ValueGeneration {
    #[default]
    None,
    /// Produced in memory before the statement is built.
    BeforeExecution(Arc<dyn BeforeExecutionGenerator>),
    /// Produced by the database while the statement runs; `sql` is the
    /// expression written into the SET clause, if any.
    OnExecution { sql: Option<String> },
}

impl ValueGeneration {
    #[must_use]
    pub fn on_execution_sql(sql: impl Into<String>) -> Self {
        Self::OnExecution {
            sql: Some(sql.into()),
        }
    }

    #[must_use]
    pub const fn is_on_execution(&self) -> bool {
        matches!(self, Self::OnExecution { .. })
    }
}

///
/// BeforeExecutionGenerator
///

pub trait BeforeExecutionGenerator: Send + Sync + fmt::Debug {
    /// Produce the value to write, given the attribute's current in-memory value.
    fn generate(&self, current: Option<&Value>) -> Result<Value, InternalError>;
}
