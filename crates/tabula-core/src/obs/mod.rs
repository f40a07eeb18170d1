//! Observability: process-local mutation telemetry and sink abstractions.

pub(crate) mod metrics;
pub(crate) mod sink;

// re-exports
pub use metrics::{EventOps, EventReport, EventState, TargetCounters, TargetSummary};
pub use sink::{
    ExecKind, MetricsEvent, MetricsSink, UpdatePathKind, metrics_report, metrics_reset_all,
    with_metrics_sink,
};
