use crate::db::mutation::operation::{
    ColumnAssignment, ColumnRestriction, ColumnValue, MutationKind,
};
use std::fmt::{self, Write as _};

///
/// MutationSqlBuilder
///
/// Renders one table mutation shape into statement text. Dialect concerns
/// live behind this seam; the engine only relies on placeholder order
/// (assignments, then restrictions).
///

pub trait MutationSqlBuilder: Send + Sync + fmt::Debug {
    fn render(
        &self,
        kind: MutationKind,
        table: &str,
        assignments: &[ColumnAssignment],
        restrictions: &[ColumnRestriction],
    ) -> String;
}

///
/// StandardSqlBuilder
/// Plain ANSI statements with `?` placeholders.
///

#[derive(Clone, Copy, Debug, Default)]
pub struct StandardSqlBuilder;

impl MutationSqlBuilder for StandardSqlBuilder {
    fn render(
        &self,
        kind: MutationKind,
        table: &str,
        assignments: &[ColumnAssignment],
        restrictions: &[ColumnRestriction],
    ) -> String {
        let mut sql = String::with_capacity(64);

        match kind {
            MutationKind::Insert => {
                let _ = write!(sql, "INSERT INTO {table} (");
                for (i, assignment) in assignments.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str(&assignment.column);
                }
                sql.push_str(") VALUES (");
                for (i, assignment) in assignments.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    push_value(&mut sql, &assignment.value);
                }
                sql.push(')');

                return sql;
            }
            MutationKind::Update => {
                let _ = write!(sql, "UPDATE {table} SET ");
                for (i, assignment) in assignments.iter().enumerate() {
                    if i > 0 {
                        sql.push_str(", ");
                    }
                    sql.push_str(&assignment.column);
                    sql.push('=');
                    push_value(&mut sql, &assignment.value);
                }
            }
            MutationKind::Delete => {
                let _ = write!(sql, "DELETE FROM {table}");
            }
        }

        for (i, restriction) in restrictions.iter().enumerate() {
            sql.push_str(if i == 0 { " WHERE " } else { " AND " });
            match restriction {
                ColumnRestriction::Param(column) => {
                    let _ = write!(sql, "{column}=?");
                }
                ColumnRestriction::IsNull(column) => {
                    let _ = write!(sql, "{column} IS NULL");
                }
            }
        }

        sql
    }
}

fn push_value(sql: &mut String, value: &ColumnValue) {
    match value {
        ColumnValue::Param(_) => sql.push('?'),
        ColumnValue::Null => sql.push_str("null"),
        ColumnValue::Sql(expression) => sql.push_str(expression),
    }
}
