//! Pooled mutation executors.
//!
//! A `MutationExecutor` is an exclusive lease over one binding buffer, tied to
//! one operation group. Leases go back to the pool through `release`, or
//! best-effort on drop when an error unwinds past the caller.

use crate::{
    db::mutation::{
        bindings::ParameterBindings,
        operation::{
            BatchKey, ColumnRestriction, ColumnValue, MutationOperation, MutationOperationGroup,
            OptionalTableUpdate, ParameterUsage, TableMutation,
        },
        statement::{BoundStatement, BoundValue, StatementPort},
    },
    error::InternalError,
    obs::sink::{self, MetricsEvent},
    value::Value,
};
use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

const MAX_IDLE_BINDINGS: usize = 16;

///
/// MutationExecutorService
///

#[derive(Debug)]
pub struct MutationExecutorService {
    idle: Mutex<Vec<ParameterBindings>>,
    acquired: AtomicU64,
    released: AtomicU64,
    track_metrics: bool,
}

impl Default for MutationExecutorService {
    fn default() -> Self {
        Self::new(true)
    }
}

impl MutationExecutorService {
    #[must_use]
    pub const fn new(track_metrics: bool) -> Self {
        Self {
            idle: Mutex::new(Vec::new()),
            acquired: AtomicU64::new(0),
            released: AtomicU64::new(0),
            track_metrics,
        }
    }

    /// Lease an executor for `group`.
    pub fn acquire<'s, 'g>(
        &'s self,
        group: &'g MutationOperationGroup,
        batch_key: Option<&'g BatchKey>,
    ) -> MutationExecutor<'s, 'g> {
        // A poisoned pool only costs a fresh buffer.
        let bindings = self
            .idle
            .lock()
            .ok()
            .and_then(|mut idle| idle.pop())
            .unwrap_or_default();

        self.acquired.fetch_add(1, Ordering::Relaxed);
        self.record(MetricsEvent::ExecutorPool {
            acquired: 1,
            released: 0,
        });

        MutationExecutor {
            service: self,
            group,
            batch_key,
            bindings: Some(bindings),
        }
    }

    /// Run `f` with a leased executor and release it on every exit path.
    /// A release failure never replaces an error returned by `f`.
    pub fn with_executor<T>(
        &self,
        group: &MutationOperationGroup,
        batch_key: Option<&BatchKey>,
        f: impl FnOnce(&mut MutationExecutor<'_, '_>) -> Result<T, InternalError>,
    ) -> Result<T, InternalError> {
        let mut executor = self.acquire(group, batch_key);
        let result = f(&mut executor);
        let released = executor.release();

        finish_release(result, released)
    }

    #[must_use]
    pub fn stats(&self) -> PoolStats {
        PoolStats {
            acquired: self.acquired.load(Ordering::Relaxed),
            released: self.released.load(Ordering::Relaxed),
            idle: self.idle.lock().map_or(0, |idle| idle.len()),
        }
    }

    pub(crate) fn record(&self, event: MetricsEvent<'_>) {
        if self.track_metrics {
            sink::record(event);
        }
    }

    fn recycle(&self, mut bindings: ParameterBindings) -> Result<(), InternalError> {
        bindings.clear();
        self.released.fetch_add(1, Ordering::Relaxed);
        self.record(MetricsEvent::ExecutorPool {
            acquired: 0,
            released: 1,
        });

        let mut idle = self
            .idle
            .lock()
            .map_err(|_| InternalError::executor_internal("mutation executor pool lock poisoned"))?;
        if idle.len() < MAX_IDLE_BINDINGS {
            idle.push(bindings);
        }

        Ok(())
    }
}

///
/// PoolStats
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct PoolStats {
    pub acquired: u64,
    pub released: u64,
    pub idle: usize,
}

impl PoolStats {
    /// Leases acquired but not yet released.
    #[must_use]
    pub const fn in_use(&self) -> u64 {
        self.acquired.saturating_sub(self.released)
    }
}

///
/// ExecutionSummary
///

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ExecutionSummary {
    pub statements: usize,
    pub rows: u64,
}

impl ExecutionSummary {
    pub const fn add(&mut self, other: Self) {
        self.statements += other.statements;
        self.rows = self.rows.saturating_add(other.rows);
    }

    const fn single(rows: u64) -> Self {
        Self {
            statements: 1,
            rows,
        }
    }
}

///
/// MutationExecutor
///

#[derive(Debug)]
pub struct MutationExecutor<'s, 'g> {
    service: &'s MutationExecutorService,
    group: &'g MutationOperationGroup,
    batch_key: Option<&'g BatchKey>,
    bindings: Option<ParameterBindings>,
}

impl<'g> MutationExecutor<'_, 'g> {
    #[must_use]
    pub const fn group(&self) -> &'g MutationOperationGroup {
        self.group
    }

    pub fn bindings(&mut self) -> &mut ParameterBindings {
        self.bindings.get_or_insert_with(ParameterBindings::default)
    }

    /// Execute every operation of the group.
    pub fn execute<P>(&mut self, port: &mut P) -> Result<ExecutionSummary, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        self.execute_where(port, |_| true)
    }

    /// Execute the group's operations accepted by `include`, in group order.
    /// Bindings are cleared afterwards, whether or not a statement failed.
    pub fn execute_where<P>(
        &mut self,
        port: &mut P,
        include: impl Fn(&MutationOperation) -> bool,
    ) -> Result<ExecutionSummary, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        let bindings = self.bindings.take().unwrap_or_default();
        let result = self.run_group(&bindings, port, include);

        let mut bindings = bindings;
        bindings.clear();
        self.bindings = Some(bindings);

        result
    }

    /// Return the lease to the pool.
    pub fn release(mut self) -> Result<(), InternalError> {
        match self.bindings.take() {
            Some(bindings) => self.service.recycle(bindings),
            None => Ok(()),
        }
    }

    fn run_group<P>(
        &self,
        bindings: &ParameterBindings,
        port: &mut P,
        include: impl Fn(&MutationOperation) -> bool,
    ) -> Result<ExecutionSummary, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        let mut summary = ExecutionSummary::default();

        for operation in self.group.operations() {
            if operation.is_skipped() || !include(operation) {
                continue;
            }

            match operation {
                MutationOperation::Table(mutation) => {
                    summary.add(ExecutionSummary::single(self.run(mutation, bindings, port)?));
                }
                MutationOperation::OptionalTable(optional) => {
                    summary.add(self.run_optional(optional, bindings, port)?);
                }
                MutationOperation::Skipped { .. } => {}
            }
        }

        Ok(summary)
    }

    fn run_optional<P>(
        &self,
        optional: &'g OptionalTableUpdate,
        bindings: &ParameterBindings,
        port: &mut P,
    ) -> Result<ExecutionSummary, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        if bindings.set_values_all_null(&optional.update.table) {
            return Ok(ExecutionSummary::single(
                self.run(&optional.delete, bindings, port)?,
            ));
        }

        let updated = self.run(&optional.update, bindings, port)?;
        if updated > 0 {
            return Ok(ExecutionSummary::single(updated));
        }

        let inserted = self.run(&optional.insert, bindings, port)?;

        Ok(ExecutionSummary {
            statements: 2,
            rows: inserted,
        })
    }

    fn run<P>(
        &self,
        mutation: &'g TableMutation,
        bindings: &ParameterBindings,
        port: &mut P,
    ) -> Result<u64, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        let statement = self.bind(mutation, bindings)?;
        let rows = port.execute(&statement)?;

        tracing::trace!(
            entity = self.group.path(),
            table = %mutation.table,
            kind = %mutation.kind,
            sql = %mutation.sql,
            rows,
            "executed mutation statement"
        );

        if let Err(err) = mutation
            .expectation
            .verify(rows, self.group.path(), &mutation.table)
        {
            self.service.record(MetricsEvent::StaleState {
                path: self.group.path(),
            });
            return Err(err);
        }

        Ok(rows)
    }

    fn bind(
        &self,
        mutation: &'g TableMutation,
        bindings: &ParameterBindings,
    ) -> Result<BoundStatement<'g>, InternalError> {
        let lookup = |column: &str, usage| {
            bindings
                .get(&mutation.table, column, usage)
                .cloned()
                .ok_or_else(|| {
                    InternalError::executor_invariant(format!(
                        "no {usage} binding for column '{column}' of table '{}' ({})",
                        mutation.table,
                        self.group.path()
                    ))
                })
        };

        let mut params = Vec::new();
        let mut assignments = Vec::with_capacity(mutation.assignments.len());
        for assignment in &mutation.assignments {
            let value = match &assignment.value {
                ColumnValue::Param(usage) => {
                    let value = lookup(&assignment.column, *usage)?;
                    params.push(value.clone());
                    BoundValue::Value(value)
                }
                ColumnValue::Null => BoundValue::Value(Value::Null),
                ColumnValue::Sql(expression) => BoundValue::Sql(expression),
            };
            assignments.push((assignment.column.as_str(), value));
        }

        let mut restrictions = Vec::with_capacity(mutation.restrictions.len());
        for restriction in &mutation.restrictions {
            match restriction {
                ColumnRestriction::Param(column) => {
                    let value = lookup(column, ParameterUsage::Restrict)?;
                    params.push(value.clone());
                    restrictions.push((column.as_str(), Some(value)));
                }
                ColumnRestriction::IsNull(column) => {
                    restrictions.push((column.as_str(), None));
                }
            }
        }

        Ok(BoundStatement {
            path: self.group.path(),
            table: &mutation.table,
            kind: mutation.kind,
            sql: &mutation.sql,
            params,
            assignments,
            restrictions,
            batch_key: self.batch_key,
        })
    }
}

impl Drop for MutationExecutor<'_, '_> {
    fn drop(&mut self) {
        if let Some(bindings) = self.bindings.take()
            && let Err(err) = self.service.recycle(bindings)
        {
            tracing::warn!(
                entity = self.group.path(),
                error = %err,
                "dropped mutation executor could not be returned to the pool"
            );
        }
    }
}

/// Combine a call result with its release result, keeping the call's error.
pub(crate) fn finish_release<T>(
    result: Result<T, InternalError>,
    released: Result<(), InternalError>,
) -> Result<T, InternalError> {
    match (result, released) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(release_err)) => Err(release_err),
        (Err(err), Ok(())) => Err(err),
        (Err(err), Err(release_err)) => {
            tracing::warn!(
                error = %release_err,
                "mutation executor release failed while another error was propagating"
            );
            Err(err)
        }
    }
}
