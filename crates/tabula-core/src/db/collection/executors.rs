use crate::{
    db::{
        collection::row_ops::RowOperation,
        mutation::executor::{MutationExecutor, MutationExecutorService},
    },
    error::InternalError,
};

///
/// ExecutorSlots
///
/// One lazily leased executor per physical variant, held for the length of
/// a single coordinator call so rows of the same variant share a lease.
///

pub(crate) struct ExecutorSlots<'s, 'g> {
    service: &'s MutationExecutorService,
    slots: Vec<Option<MutationExecutor<'s, 'g>>>,
}

impl<'s, 'g> ExecutorSlots<'s, 'g> {
    pub(crate) fn new(service: &'s MutationExecutorService, variants: usize) -> Self {
        Self {
            service,
            slots: (0..variants).map(|_| None).collect(),
        }
    }

    /// Executor for `variant`, leased for `operation` on first use.
    pub(crate) fn get_or_acquire(
        &mut self,
        variant: usize,
        operation: &'g RowOperation,
    ) -> Result<&mut MutationExecutor<'s, 'g>, InternalError> {
        let service = self.service;
        let slot = self.slots.get_mut(variant).ok_or_else(|| {
            InternalError::collection_invariant(format!("no executor slot for variant {variant}"))
        })?;

        Ok(slot.get_or_insert_with(|| service.acquire(operation.group(), operation.batch_key())))
    }

    /// Release every leased executor; the first failure is returned.
    pub(crate) fn release_all(self) -> Result<(), InternalError> {
        let mut first = None;
        for executor in self.slots.into_iter().flatten() {
            if let Err(err) = executor.release() {
                match first {
                    None => first = Some(err),
                    Some(_) => tracing::warn!(error = %err, "additional executor release failed"),
                }
            }
        }

        first.map_or(Ok(()), Err)
    }
}
