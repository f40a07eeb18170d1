use crate::{
    db::{
        collection::{
            executors::ExecutorSlots, persistent::PersistentCollection,
            row_ops::CollectionMutationTarget,
        },
        mutation::{
            executor::{ExecutionSummary, finish_release},
            statement::StatementPort,
        },
    },
    error::InternalError,
    obs::sink::{ExecKind, Span},
    value::Value,
};
use std::sync::Arc;

///
/// InsertRowsCoordinator
/// Writes the rows of collection entries that are not yet in the database.
///

#[derive(Clone, Debug)]
pub struct InsertRowsCoordinator {
    target: Arc<CollectionMutationTarget>,
}

impl InsertRowsCoordinator {
    #[must_use]
    pub const fn new(target: Arc<CollectionMutationTarget>) -> Self {
        Self { target }
    }

    /// Insert every entry that needs a row. Returns the number of statements run.
    pub fn insert_rows<P, C>(
        &self,
        port: &mut P,
        key: &Value,
        collection: &mut C,
    ) -> Result<usize, InternalError>
    where
        P: StatementPort + ?Sized,
        C: PersistentCollection + ?Sized,
    {
        self.insert_rows_where(port, key, collection, |_, _| true)
    }

    /// Like [`Self::insert_rows`], restricted to entries accepted by `filter`.
    ///
    /// `filter` sees each entry with its position; positions count every
    /// entry, including ones that are filtered out or already stored.
    pub fn insert_rows_where<P, C>(
        &self,
        port: &mut P,
        key: &Value,
        collection: &mut C,
        filter: impl Fn(&Value, usize) -> bool,
    ) -> Result<usize, InternalError>
    where
        P: StatementPort + ?Sized,
        C: PersistentCollection + ?Sized,
    {
        let target = &*self.target;
        let model = target.model();
        if model.inverse {
            tracing::debug!(role = %model.role, "inverse collection role; rows are not written");
            return Ok(0);
        }

        let mut span = Span::new(
            ExecKind::InsertRows,
            &model.role,
            target.services().config().track_metrics,
        );

        collection.pre_insert(model)?;
        let collection = &*collection;
        if collection.entries().is_empty() {
            tracing::debug!(role = %model.role, "no rows to insert");
            return Ok(0);
        }

        let mut slots = ExecutorSlots::new(target.services().executors(), model.variant_count());
        let result = insert_entries(target, port, key, collection, &filter, &mut slots);
        let summary = finish_release(result, slots.release_all())?;

        span.add(summary.statements, summary.rows);
        tracing::debug!(
            role = %model.role,
            statements = summary.statements,
            "inserted collection rows"
        );

        Ok(summary.statements)
    }
}

fn insert_entries<'t, P, C>(
    target: &'t CollectionMutationTarget,
    port: &mut P,
    key: &Value,
    collection: &C,
    filter: &impl Fn(&Value, usize) -> bool,
    slots: &mut ExecutorSlots<'t, 't>,
) -> Result<ExecutionSummary, InternalError>
where
    P: StatementPort + ?Sized,
    C: PersistentCollection + ?Sized,
{
    let model = target.model();
    let mut summary = ExecutionSummary::default();

    for (position, entry) in collection.entries().iter().enumerate() {
        if !collection.needs_inserting(entry, position) || !filter(entry, position) {
            continue;
        }

        let variant = model.variant_of(entry)?;
        let operations = target.operations(variant)?;
        let row = operations.row_values(model, key, Some(position), Some(entry))?;

        let executor = slots.get_or_acquire(variant, operations.insert())?;
        operations.insert().bind(executor.bindings(), &row)?;
        summary.add(executor.execute(port)?);
    }

    Ok(summary)
}
