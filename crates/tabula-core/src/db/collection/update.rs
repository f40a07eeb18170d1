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
/// UpdateRowsCoordinator
///
/// Rewrites rows in place: changed elements of a positional join table, or
/// shifted positions of one-to-many list elements. Roles whose rows cannot
/// be updated get the `NoOp` variant, which never touches the database.
///

#[derive(Clone, Debug)]
pub enum UpdateRowsCoordinator {
    Rows(Arc<CollectionMutationTarget>),
    NoOp { role: String },
}

impl UpdateRowsCoordinator {
    #[must_use]
    pub fn new(target: Arc<CollectionMutationTarget>) -> Self {
        if target.model().is_row_update_possible() {
            Self::Rows(target)
        } else {
            Self::NoOp {
                role: target.model().role.clone(),
            }
        }
    }

    #[must_use]
    pub const fn is_noop(&self) -> bool {
        matches!(self, Self::NoOp { .. })
    }

    /// Update every entry whose element or position changed. Returns the
    /// number of rows updated.
    pub fn update_rows<P, C>(
        &self,
        port: &mut P,
        key: &Value,
        collection: &C,
    ) -> Result<usize, InternalError>
    where
        P: StatementPort + ?Sized,
        C: PersistentCollection + ?Sized,
    {
        let target = match self {
            Self::Rows(target) => &**target,
            Self::NoOp { role } => {
                tracing::trace!(role = %role, "collection rows are never updated in place");
                return Ok(0);
            }
        };
        let model = target.model();

        // Trailing slots may already be gone; walk back to front so positions stay stable.
        let mut entries: Vec<(usize, &Value)> = collection.entries().iter().enumerate().collect();
        if collection.has_structural_removal() {
            entries.reverse();
        }

        let mut span = Span::new(
            ExecKind::UpdateRows,
            &model.role,
            target.services().config().track_metrics,
        );
        let mut slots = ExecutorSlots::new(target.services().executors(), model.variant_count());
        let result = update_entries(target, port, key, collection, &entries, &mut slots);
        let (updated, summary) = finish_release(result, slots.release_all())?;

        span.add(summary.statements, summary.rows);
        if updated > 0 {
            tracing::debug!(role = %model.role, rows = updated, "updated collection rows");
        }

        Ok(updated)
    }
}

fn update_entries<'t, P, C>(
    target: &'t CollectionMutationTarget,
    port: &mut P,
    key: &Value,
    collection: &C,
    entries: &[(usize, &Value)],
    slots: &mut ExecutorSlots<'t, 't>,
) -> Result<(usize, ExecutionSummary), InternalError>
where
    P: StatementPort + ?Sized,
    C: PersistentCollection + ?Sized,
{
    let model = target.model();
    let mut summary = ExecutionSummary::default();
    let mut updated = 0;

    for &(position, entry) in entries {
        if !collection.needs_updating(entry, position) {
            continue;
        }

        let variant = model.variant_of(entry)?;
        let operations = target.operations(variant)?;
        let update = operations.update().ok_or_else(|| {
            InternalError::collection_invariant(format!(
                "role '{}' has no row update statement",
                model.role
            ))
        })?;
        let row = operations.row_values(model, key, Some(position), Some(entry))?;

        let executor = slots.get_or_acquire(variant, update)?;
        update.bind(executor.bindings(), &row)?;
        summary.add(executor.execute(port)?);
        updated += 1;
    }

    Ok((updated, summary))
}
