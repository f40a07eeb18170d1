//! ## Crate layout
//! - `core`: mapping model, update and collection coordinators, executor
//!   pool, statement port, and observability.
//! - `error`: the public error type callers match on.
//!
//! The `prelude` module carries the vocabulary a persistence layer needs to
//! describe its mappings and drive the coordinators.

pub use tabula_core as core;

pub mod error;

pub use error::{Error, ErrorKind, ErrorOrigin};

//
// Consts
//

/// Workspace version re-export for downstream tooling/tests.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

///
/// Prelude
///

pub mod prelude {
    pub use crate::core::{
        config::EngineConfig,
        db::{
            MutationServices,
            collection::{
                CollectionMutations, PersistentBag, PersistentCollection as _, PersistentList,
            },
            mutation::{MemoryRowStore, StatementPort},
            update::{UpdateCoordinator, UpdateOutcome, UpdateRequest},
        },
        prelude::*,
    };
    pub use crate::{Error, ErrorKind};
}
