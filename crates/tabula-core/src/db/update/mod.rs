//! Entity UPDATE planning and execution.

pub mod analysis;
pub mod coordinator;

pub use analysis::{
    AnalysisInput, AttributeAnalysis, DirtinessStatus, LockRestriction, TableAnalysis, TableSet,
    UpdateValuesAnalysis,
};
pub use coordinator::{UpdateCoordinator, UpdateOutcome, UpdateRequest};
