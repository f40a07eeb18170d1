//! Mutation plumbing shared by the entity and collection coordinators:
//! statement shapes, parameter bindings, statement text, the connection-layer
//! port, and the pooled executors that tie them together.

pub mod bindings;
pub mod executor;
pub mod memory;
pub mod operation;
pub mod sql;
pub mod statement;

pub use bindings::ParameterBindings;
pub use executor::{ExecutionSummary, MutationExecutor, MutationExecutorService, PoolStats};
pub use memory::MemoryRowStore;
pub use operation::{
    BatchKey, ColumnAssignment, ColumnRestriction, ColumnValue, Expectation, MutationKind,
    MutationOperation, MutationOperationGroup, OptionalTableUpdate, ParameterUsage,
    TableMutation, TableMutationBuilder,
};
pub use sql::{MutationSqlBuilder, StandardSqlBuilder};
pub use statement::{BoundStatement, BoundValue, StatementPort};
