use crate::{
    db::{
        collection::row_ops::CollectionMutationTarget,
        mutation::{executor::ExecutionSummary, statement::StatementPort},
    },
    error::InternalError,
    obs::sink::{ExecKind, Span},
    value::Value,
};
use std::sync::Arc;

///
/// RemoveCoordinator
/// Deletes every row of one owner's collection, across all variants.
///

#[derive(Clone, Debug)]
pub struct RemoveCoordinator {
    target: Arc<CollectionMutationTarget>,
}

impl RemoveCoordinator {
    #[must_use]
    pub const fn new(target: Arc<CollectionMutationTarget>) -> Self {
        Self { target }
    }

    /// Remove every row owned by `key`. Returns the number of rows affected.
    pub fn delete_all_rows<P>(&self, port: &mut P, key: &Value) -> Result<u64, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        let target = &*self.target;
        let model = target.model();
        if model.inverse {
            tracing::debug!(role = %model.role, "inverse collection role; rows are not removed");
            return Ok(0);
        }

        let mut span = Span::new(
            ExecKind::DeleteAllRows,
            &model.role,
            target.services().config().track_metrics,
        );
        let executors = target.services().executors();
        let mut summary = ExecutionSummary::default();

        for variant in 0..model.variant_count() {
            let operations = target.operations(variant)?;
            let row = operations.row_values(model, key, None, None)?;
            let delete_all = operations.delete_all();

            let executed = executors.with_executor(
                delete_all.group(),
                delete_all.batch_key(),
                |executor| {
                    delete_all.bind(executor.bindings(), &row)?;
                    executor.execute(port)
                },
            )?;
            span.add(executed.statements, executed.rows);
            summary.add(executed);
        }

        tracing::debug!(role = %model.role, rows = summary.rows, "removed collection rows");

        Ok(summary.rows)
    }
}
