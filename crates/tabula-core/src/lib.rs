//! Core runtime for Tabula: the mapping model, the entity update coordinator,
//! the collection row coordinators, and the pooled mutation executors they
//! share.

// public exports are one module level down
pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod obs;
pub mod value;

// test
#[cfg(test)]
pub(crate) mod test_support;

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No executors, ports, or helpers are re-exported here.
///

pub mod prelude {
    pub use crate::{
        model::{
            attribute::{AttributeKind, AttributeModel, ValueGeneration},
            collection::{CollectionLayout, CollectionModel, ElementSubtype},
            entity::{EntityModel, OptimisticLockStyle},
            table::TableModel,
        },
        value::{EntityRef, Slot, Value},
    };
}
