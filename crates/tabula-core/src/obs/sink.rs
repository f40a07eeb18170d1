//! Where coordinator telemetry goes.
//!
//! Coordinators emit `MetricsEvent`s through `record` and never touch
//! `obs::metrics` themselves. By default events land in the thread-local
//! counters; `with_metrics_sink` routes them elsewhere for one scope.
use crate::obs::metrics;
use derive_more::Display;
use std::{cell::RefCell, rc::Rc};

thread_local! {
    static SINK_STACK: RefCell<Vec<Rc<dyn MetricsSink>>> = const { RefCell::new(Vec::new()) };
}

///
/// ExecKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum ExecKind {
    #[display("update")]
    Update,
    #[display("version_increment")]
    VersionIncrement,
    #[display("insert_rows")]
    InsertRows,
    #[display("delete_rows")]
    DeleteRows,
    #[display("update_rows")]
    UpdateRows,
    #[display("delete_all_rows")]
    DeleteAllRows,
}

///
/// UpdatePathKind
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
pub enum UpdatePathKind {
    #[display("skipped")]
    Skipped,
    #[display("version_only")]
    VersionOnly,
    #[display("static")]
    Static,
    #[display("dynamic")]
    Dynamic,
}

///
/// MetricsEvent
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum MetricsEvent<'a> {
    ExecStart {
        kind: ExecKind,
        path: &'a str,
    },
    ExecFinish {
        kind: ExecKind,
        path: &'a str,
        statements: u64,
        rows: u64,
    },
    UpdatePath {
        path: &'a str,
        kind: UpdatePathKind,
    },
    StaleState {
        path: &'a str,
    },
    ExecutorPool {
        acquired: u64,
        released: u64,
    },
}

///
/// MetricsSink
///

pub trait MetricsSink {
    fn record(&self, event: MetricsEvent<'_>);
}

///
/// GlobalMetricsSink
/// Folds events into the thread-local counters.
///

pub(crate) struct GlobalMetricsSink;

impl MetricsSink for GlobalMetricsSink {
    fn record(&self, event: MetricsEvent<'_>) {
        match event {
            MetricsEvent::ExecStart { kind, path } => {
                metrics::with_state_mut(|m| {
                    let ops = &mut m.ops;
                    let counter = match kind {
                        ExecKind::Update => &mut ops.update_calls,
                        ExecKind::VersionIncrement => &mut ops.version_increment_calls,
                        ExecKind::InsertRows => &mut ops.insert_rows_calls,
                        ExecKind::DeleteRows => &mut ops.delete_rows_calls,
                        ExecKind::UpdateRows => &mut ops.update_rows_calls,
                        ExecKind::DeleteAllRows => &mut ops.delete_all_rows_calls,
                    };
                    *counter = counter.saturating_add(1);

                    let entry = m.targets.entry(path.to_string()).or_default();
                    entry.calls = entry.calls.saturating_add(1);
                });
            }

            MetricsEvent::ExecFinish {
                path,
                statements,
                rows,
                ..
            } => {
                metrics::with_state_mut(|m| {
                    m.ops.statements = m.ops.statements.saturating_add(statements);
                    m.ops.rows_affected = m.ops.rows_affected.saturating_add(rows);

                    let entry = m.targets.entry(path.to_string()).or_default();
                    entry.statements = entry.statements.saturating_add(statements);
                    entry.rows_affected = entry.rows_affected.saturating_add(rows);
                });
            }

            MetricsEvent::UpdatePath { path, kind } => {
                metrics::with_state_mut(|m| {
                    let ops = &mut m.ops;
                    let counter = match kind {
                        UpdatePathKind::Skipped => &mut ops.path_skipped,
                        UpdatePathKind::VersionOnly => &mut ops.path_version_only,
                        UpdatePathKind::Static => &mut ops.path_static,
                        UpdatePathKind::Dynamic => &mut ops.path_dynamic,
                    };
                    *counter = counter.saturating_add(1);

                    if kind == UpdatePathKind::Dynamic {
                        let entry = m.targets.entry(path.to_string()).or_default();
                        entry.dynamic_updates = entry.dynamic_updates.saturating_add(1);
                    }
                });
            }

            MetricsEvent::StaleState { path } => {
                metrics::with_state_mut(|m| {
                    m.ops.stale_state = m.ops.stale_state.saturating_add(1);
                    let entry = m.targets.entry(path.to_string()).or_default();
                    entry.stale_state = entry.stale_state.saturating_add(1);
                });
            }

            MetricsEvent::ExecutorPool { acquired, released } => {
                metrics::with_state_mut(|m| {
                    m.ops.executors_acquired = m.ops.executors_acquired.saturating_add(acquired);
                    m.ops.executors_released = m.ops.executors_released.saturating_add(released);
                });
            }
        }
    }
}

pub(crate) fn record(event: MetricsEvent<'_>) {
    // clone out of the stack so a sink may itself install overrides
    let top = SINK_STACK.with(|stack| stack.borrow().last().cloned());
    match top {
        Some(sink) => sink.record(event),
        None => GlobalMetricsSink.record(event),
    }
}

/// Snapshot the current metrics state.
///
/// `window_start_ms` filters by window start (`EventState::window_start_ms`),
/// not by per-event timestamps.
#[must_use]
pub fn metrics_report(window_start_ms: Option<u64>) -> metrics::EventReport {
    metrics::report_window_start(window_start_ms)
}

/// Reset all metrics state.
pub fn metrics_reset_all() {
    metrics::reset_all();
}

/// Run `f` with every event routed to `sink`. Overrides nest, and the
/// previous sink is restored however `f` exits.
pub fn with_metrics_sink<T>(sink: Rc<dyn MetricsSink>, f: impl FnOnce() -> T) -> T {
    struct Restore;

    impl Drop for Restore {
        fn drop(&mut self) {
            SINK_STACK.with(|stack| {
                stack.borrow_mut().pop();
            });
        }
    }

    SINK_STACK.with(|stack| stack.borrow_mut().push(sink));
    let _restore = Restore;

    f()
}

///
/// Span
///
/// RAII guard that emits start/finish metrics events for one coordinator call.
/// Finish accounting happens even when the call returns early with an error.
///

pub(crate) struct Span<'a> {
    kind: ExecKind,
    path: &'a str,
    statements: u64,
    rows: u64,
    enabled: bool,
}

impl<'a> Span<'a> {
    /// Start a span; a disabled span records nothing.
    #[must_use]
    pub(crate) fn new(kind: ExecKind, path: &'a str, enabled: bool) -> Self {
        if enabled {
            record(MetricsEvent::ExecStart { kind, path });
        }

        Self {
            kind,
            path,
            statements: 0,
            rows: 0,
            enabled,
        }
    }

    pub(crate) fn add(&mut self, statements: usize, rows: u64) {
        self.statements = self
            .statements
            .saturating_add(u64::try_from(statements).unwrap_or(u64::MAX));
        self.rows = self.rows.saturating_add(rows);
    }

    /// Record an event under this span's enablement.
    pub(crate) fn record(&self, event: MetricsEvent<'_>) {
        if self.enabled {
            record(event);
        }
    }
}

impl Drop for Span<'_> {
    fn drop(&mut self) {
        if self.enabled {
            record(MetricsEvent::ExecFinish {
                kind: self.kind,
                path: self.path,
                statements: self.statements,
                rows: self.rows,
            });
        }
    }
}
