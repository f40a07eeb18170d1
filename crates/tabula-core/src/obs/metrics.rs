use serde::{Deserialize, Serialize};
use std::{
    cell::RefCell,
    cmp::Ordering,
    collections::BTreeMap,
    time::{SystemTime, UNIX_EPOCH},
};

///
/// EventState
/// Ephemeral, in-memory counters for mutation coordination.
///

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct EventState {
    pub ops: EventOps,
    /// Keyed by entity path or collection role.
    pub targets: BTreeMap<String, TargetCounters>,
    pub window_start_ms: u64,
}

impl Default for EventState {
    fn default() -> Self {
        Self {
            ops: EventOps::default(),
            targets: BTreeMap::new(),
            window_start_ms: now_millis(),
        }
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX))
}

///
/// EventOps
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventOps {
    // Coordinator entrypoints
    pub update_calls: u64,
    pub version_increment_calls: u64,
    pub insert_rows_calls: u64,
    pub delete_rows_calls: u64,
    pub update_rows_calls: u64,
    pub delete_all_rows_calls: u64,

    // Update paths
    pub path_skipped: u64,
    pub path_version_only: u64,
    pub path_static: u64,
    pub path_dynamic: u64,

    // Statements
    pub statements: u64,
    pub rows_affected: u64,
    pub stale_state: u64,

    // Executor pool
    pub executors_acquired: u64,
    pub executors_released: u64,
}

///
/// TargetCounters
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TargetCounters {
    pub calls: u64,
    pub statements: u64,
    pub rows_affected: u64,
    pub dynamic_updates: u64,
    pub stale_state: u64,
}

thread_local! {
    static EVENT_STATE: RefCell<EventState> = RefCell::new(EventState::default());
}

/// Borrow metrics immutably.
pub(crate) fn with_state<R>(f: impl FnOnce(&EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&m.borrow()))
}

/// Borrow metrics mutably.
pub(crate) fn with_state_mut<R>(f: impl FnOnce(&mut EventState) -> R) -> R {
    EVENT_STATE.with(|m| f(&mut m.borrow_mut()))
}

/// Reset all event state and restart the window.
pub fn reset_all() {
    with_state_mut(|m| *m = EventState::default());
}

///
/// EventReport
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct EventReport {
    /// Ephemeral runtime counters since `window_start_ms`.
    pub counters: Option<EventState>,
    /// Per-target counters and averages.
    pub target_counters: Vec<TargetSummary>,
}

///
/// TargetSummary
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct TargetSummary {
    pub path: String,
    pub calls: u64,
    pub statements: u64,
    pub rows_affected: u64,
    pub dynamic_updates: u64,
    pub stale_state: u64,
    pub avg_statements_per_call: f64,
}

/// Build a report from in-memory counters.
///
/// A `window_start_ms` later than the current window yields an empty report.
#[must_use]
#[expect(clippy::cast_precision_loss)]
pub(crate) fn report_window_start(window_start_ms: Option<u64>) -> EventReport {
    let snap = with_state(Clone::clone);
    if window_start_ms.is_some_and(|start| start > snap.window_start_ms) {
        return EventReport::default();
    }

    let mut target_counters: Vec<TargetSummary> = snap
        .targets
        .iter()
        .map(|(path, counters)| TargetSummary {
            path: path.clone(),
            calls: counters.calls,
            statements: counters.statements,
            rows_affected: counters.rows_affected,
            dynamic_updates: counters.dynamic_updates,
            stale_state: counters.stale_state,
            avg_statements_per_call: if counters.calls > 0 {
                counters.statements as f64 / counters.calls as f64
            } else {
                0.0
            },
        })
        .collect();

    // Heaviest targets first; ties broken by path.
    target_counters.sort_by(|a, b| {
        match b
            .avg_statements_per_call
            .partial_cmp(&a.avg_statements_per_call)
            .unwrap_or(Ordering::Equal)
        {
            Ordering::Equal => a.path.cmp(&b.path),
            other => other,
        }
    });

    EventReport {
        counters: Some(snap),
        target_counters,
    }
}

///
/// TESTS
///

#[cfg(test)]
#[expect(clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn reset_all_clears_state() {
        with_state_mut(|m| {
            m.ops.update_calls = 3;
            m.ops.statements = 2;
            m.targets.insert(
                "alpha".to_string(),
                TargetCounters {
                    calls: 1,
                    ..Default::default()
                },
            );
        });

        reset_all();

        with_state(|m| {
            assert_eq!(m.ops.update_calls, 0);
            assert_eq!(m.ops.statements, 0);
            assert!(m.targets.is_empty());
        });
    }

    #[test]
    fn report_sorts_targets_by_average_statements() {
        reset_all();
        with_state_mut(|m| {
            m.targets.insert(
                "alpha".to_string(),
                TargetCounters {
                    calls: 2,
                    statements: 6,
                    ..Default::default()
                },
            );
            m.targets.insert(
                "beta".to_string(),
                TargetCounters {
                    calls: 1,
                    statements: 5,
                    ..Default::default()
                },
            );
            m.targets.insert(
                "gamma".to_string(),
                TargetCounters {
                    calls: 2,
                    statements: 6,
                    ..Default::default()
                },
            );
        });

        let report = report_window_start(None);
        let paths: Vec<_> = report
            .target_counters
            .iter()
            .map(|t| t.path.as_str())
            .collect();

        assert_eq!(paths, ["beta", "alpha", "gamma"]);
        assert_eq!(report.target_counters[0].avg_statements_per_call, 5.0);
        assert_eq!(report.target_counters[1].avg_statements_per_call, 3.0);
    }

    #[test]
    fn window_start_after_window_returns_empty() {
        reset_all();
        let window_start = with_state(|m| m.window_start_ms);

        let report = report_window_start(Some(window_start.saturating_add(1)));
        assert!(report.counters.is_none());
        assert!(report.target_counters.is_empty());

        let report = report_window_start(Some(window_start));
        assert!(report.counters.is_some());
    }
}
