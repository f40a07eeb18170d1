//! Mutation coordination.
//!
//! `update` turns an entity's old and new state into table UPDATEs,
//! `collection` turns a collection's membership diff into row mutations, and
//! both execute through the pooled executors in `mutation`.

pub mod collection;
pub mod dirty;
pub mod mutation;
pub mod services;
pub mod update;

pub use services::MutationServices;
