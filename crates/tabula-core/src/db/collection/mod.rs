//! Collection row coordination.
//!
//! A collection role's rows are written by four coordinators sharing one
//! [`CollectionMutationTarget`]: insert, delete, in-place update, and
//! delete-all. [`CollectionMutations`] bundles them per role.

mod executors;

pub mod delete;
pub mod insert;
pub mod persistent;
pub mod remove;
pub mod row_ops;
pub mod update;

pub use delete::DeleteRowsCoordinator;
pub use insert::InsertRowsCoordinator;
pub use persistent::{PersistentBag, PersistentCollection, PersistentList, Removal};
pub use remove::RemoveCoordinator;
pub use row_ops::{CollectionMutationTarget, RowMutationOperations, RowOperation, RowValues};
pub use update::UpdateRowsCoordinator;

use crate::{
    db::services::MutationServices, error::InternalError, model::collection::CollectionModel,
};
use std::sync::Arc;

///
/// CollectionMutations
/// Every row coordinator of one collection role.
///

#[derive(Clone, Debug)]
pub struct CollectionMutations {
    target: Arc<CollectionMutationTarget>,
    insert: InsertRowsCoordinator,
    delete: DeleteRowsCoordinator,
    update: UpdateRowsCoordinator,
    remove: RemoveCoordinator,
}

impl CollectionMutations {
    /// Validate `model` and wire the coordinators for it.
    pub fn new(
        model: Arc<CollectionModel>,
        services: Arc<MutationServices>,
    ) -> Result<Self, InternalError> {
        let target = Arc::new(CollectionMutationTarget::new(model, services)?);

        Ok(Self {
            insert: InsertRowsCoordinator::new(Arc::clone(&target)),
            delete: DeleteRowsCoordinator::new(Arc::clone(&target)),
            update: UpdateRowsCoordinator::new(Arc::clone(&target)),
            remove: RemoveCoordinator::new(Arc::clone(&target)),
            target,
        })
    }

    #[must_use]
    pub fn target(&self) -> &CollectionMutationTarget {
        &self.target
    }

    #[must_use]
    pub const fn insert(&self) -> &InsertRowsCoordinator {
        &self.insert
    }

    #[must_use]
    pub const fn delete(&self) -> &DeleteRowsCoordinator {
        &self.delete
    }

    #[must_use]
    pub const fn update(&self) -> &UpdateRowsCoordinator {
        &self.update
    }

    #[must_use]
    pub const fn remove(&self) -> &RemoveCoordinator {
        &self.remove
    }
}
