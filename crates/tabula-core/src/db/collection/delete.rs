use crate::{
    db::{
        collection::{
            executors::ExecutorSlots,
            persistent::{PersistentCollection, Removal},
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
/// DeleteRowsCoordinator
///
/// Removes the rows of entries dropped since the collection was loaded.
/// Indexed join-table roles address rows by position, every other role by
/// element value.
///

#[derive(Clone, Debug)]
pub struct DeleteRowsCoordinator {
    target: Arc<CollectionMutationTarget>,
}

impl DeleteRowsCoordinator {
    #[must_use]
    pub const fn new(target: Arc<CollectionMutationTarget>) -> Self {
        Self { target }
    }

    /// Delete the rows of removed entries. Returns the number of statements run.
    pub fn delete_rows<P, C>(
        &self,
        port: &mut P,
        key: &Value,
        collection: &C,
    ) -> Result<usize, InternalError>
    where
        P: StatementPort + ?Sized,
        C: PersistentCollection + ?Sized,
    {
        let target = &*self.target;
        let model = target.model();
        if model.inverse {
            tracing::debug!(role = %model.role, "inverse collection role; rows are not deleted");
            return Ok(0);
        }

        let removals = collection.removals(model.deletes_by_index());
        if removals.is_empty() {
            tracing::debug!(role = %model.role, "no rows to delete");
            return Ok(0);
        }

        let mut span = Span::new(
            ExecKind::DeleteRows,
            &model.role,
            target.services().config().track_metrics,
        );
        let mut slots = ExecutorSlots::new(target.services().executors(), model.variant_count());
        let result = delete_removals(target, port, key, &removals, &mut slots);
        let summary = finish_release(result, slots.release_all())?;

        span.add(summary.statements, summary.rows);
        tracing::debug!(
            role = %model.role,
            statements = summary.statements,
            "deleted collection rows"
        );

        Ok(summary.statements)
    }
}

fn delete_removals<'t, P>(
    target: &'t CollectionMutationTarget,
    port: &mut P,
    key: &Value,
    removals: &[Removal],
    slots: &mut ExecutorSlots<'t, 't>,
) -> Result<ExecutionSummary, InternalError>
where
    P: StatementPort + ?Sized,
{
    let model = target.model();
    let by_index = model.deletes_by_index();
    let mut summary = ExecutionSummary::default();

    for removal in removals {
        let (variant, position, element) = match removal {
            Removal::Position(position) if by_index => (0, Some(*position), None),
            Removal::Element(element) if !by_index => (model.variant_of(element)?, None, Some(element)),
            Removal::Position(position) => {
                return Err(InternalError::collection_invariant(format!(
                    "role '{}' deletes by element but got removed position {position}",
                    model.role
                )));
            }
            Removal::Element(element) => {
                return Err(InternalError::collection_invariant(format!(
                    "role '{}' deletes by position but got removed element {element}",
                    model.role
                )));
            }
        };

        let operations = target.operations(variant)?;
        let row = operations.row_values(model, key, position, element)?;

        let executor = slots.get_or_acquire(variant, operations.delete())?;
        operations.delete().bind(executor.bindings(), &row)?;
        summary.add(executor.execute(port)?);
    }

    Ok(summary)
}
