use super::*;
use crate::{
    model::{attribute::AttributeModel, table::TableModel},
    test_support::{person_model, person_state},
};
use proptest::prelude::*;

fn analyze_person(
    style: OptimisticLockStyle,
    values: &[Slot],
    old_values: Option<&[Slot]>,
    dirty: Option<&[usize]>,
    force_dynamic: bool,
) -> UpdateValuesAnalysis {
    let model = person_model(style);
    let lock_include = |index: usize| match style {
        OptimisticLockStyle::None => false,
        OptimisticLockStyle::Version => model.version == Some(index),
        OptimisticLockStyle::All | OptimisticLockStyle::Dirty => true,
    };
    let dirtiness = |index: usize| match dirty {
        None => DirtinessStatus::ConsiderLikeDirty,
        Some(dirty) if dirty.contains(&index) => DirtinessStatus::Dirty,
        Some(_) => DirtinessStatus::NotDirty,
    };

    UpdateValuesAnalysis::analyze(
        &model,
        AnalysisInput {
            values,
            old_version: Some(&Value::Int(3)),
            old_values,
            dirty,
            force_dynamic,
        },
        |_| true,
        lock_include,
        dirtiness,
    )
    .expect("analysis should succeed")
}

#[test]
fn unknown_dirtiness_seeds_every_mutable_table() {
    let values = person_state("Ada", Some("ada@x"), Some("bio"), 3);
    let analysis = analyze_person(OptimisticLockStyle::Version, &values, None, None, false);

    assert_eq!(analysis.tables_needing_update().iter().collect::<Vec<_>>(), vec![0, 1]);
    assert!(!analysis.needs_dynamic_update());
    assert_eq!(analysis.table(0).map(|t| t.set_attributes.clone()), Some(vec![0, 1, 3]));
    assert_eq!(analysis.table(1).map(|t| t.set_attributes.clone()), Some(vec![2]));
}

#[test]
fn immutable_table_is_never_seeded() {
    let model = EntityModel::builder("app::Audit")
        .table(TableModel::new("audit", ["id"]))
        .table(TableModel::new("audit_log", ["audit_id"]).immutable())
        .attribute(AttributeModel::new("state").column("audit", "state"))
        .attribute(AttributeModel::new("entry").column("audit_log", "entry"))
        .build()
        .expect("model should build");
    let values = [Slot::loaded("open"), Slot::loaded("created")];

    let analysis = UpdateValuesAnalysis::analyze(
        &model,
        AnalysisInput {
            values: &values,
            old_version: None,
            old_values: None,
            dirty: None,
            force_dynamic: false,
        },
        |_| true,
        |_| false,
        |_| DirtinessStatus::ConsiderLikeDirty,
    )
    .expect("analysis should succeed");

    assert!(analysis.tables_needing_update().contains(0));
    assert!(!analysis.tables_needing_update().contains(1));
    assert!(analysis.table(1).is_some_and(|t| t.set_attributes.is_empty()));
}

#[test]
fn clean_dirty_list_is_a_noop() {
    let values = person_state("Ada", Some("ada@x"), None, 3);
    let analysis = analyze_person(
        OptimisticLockStyle::Version,
        &values,
        Some(&values),
        Some(&[]),
        false,
    );

    assert!(analysis.is_noop());
    assert!(analysis
        .attributes()
        .iter()
        .all(|attribute| attribute.dirtiness() == DirtinessStatus::NotDirty));
}

#[test]
fn version_lock_uses_explicit_old_version() {
    let values = person_state("Ada", Some("ada@x"), None, 4);
    let analysis = analyze_person(OptimisticLockStyle::Version, &values, None, Some(&[0, 3]), false);

    let locks = &analysis.table(0).expect("identifier table").locks;
    assert_eq!(
        locks,
        &vec![LockRestriction {
            attribute: 3,
            column: "version".to_string(),
            value: Some(Value::Int(3)),
        }]
    );
    assert!(!analysis.tables_needing_update().contains(1));
}

#[test]
fn null_lock_value_forces_dynamic_for_that_table() {
    let old = person_state("Ada", None, None, 3);
    let values = person_state("Ada L", None, None, 3);
    let analysis = analyze_person(OptimisticLockStyle::All, &values, Some(&old), Some(&[0]), false);

    let email = analysis.table(0).and_then(|t| t.locks.iter().find(|l| l.column == "email"));
    assert_eq!(email.map(|lock| lock.value.clone()), Some(None));
    assert!(analysis.tables_needing_dynamic_update().contains(0));
    // the secondary table has a null lock too, but nothing to write
    assert!(!analysis.tables_needing_dynamic_update().contains(1));
}

#[test]
fn unfetched_old_value_is_not_locked() {
    let mut old = person_state("Ada", Some("ada@x"), None, 3);
    old[1] = Slot::Unfetched;
    let values = person_state("Ada L", Some("ada@x"), None, 3);
    let analysis = analyze_person(OptimisticLockStyle::All, &values, Some(&old), Some(&[0]), false);

    let locks = &analysis.table(0).expect("identifier table").locks;
    assert!(locks.iter().all(|lock| lock.column != "email"));
    assert!(analysis.tables_needing_dynamic_update().contains(0));
}

#[test]
fn non_null_tracking_covers_new_and_previous_values() {
    let old = person_state("Ada", None, Some("old"), 3);
    let values = person_state("Ada", None, None, 3);
    let analysis = analyze_person(OptimisticLockStyle::None, &values, Some(&old), Some(&[2]), false);

    assert!(!analysis.tables_with_non_null_values().contains(1));
    assert!(analysis.tables_with_previous_non_null_values().contains(1));
    assert!(analysis.tables_needing_update().contains(1));
}

#[test]
fn arity_mismatch_is_rejected() {
    let model = person_model(OptimisticLockStyle::None);
    let values = [Slot::loaded("Ada")];

    let err = UpdateValuesAnalysis::analyze(
        &model,
        AnalysisInput {
            values: &values,
            old_version: None,
            old_values: None,
            dirty: None,
            force_dynamic: false,
        },
        |_| true,
        |_| false,
        |_| DirtinessStatus::Dirty,
    )
    .expect_err("short value array should fail");

    assert_eq!(err.origin, crate::error::ErrorOrigin::Analysis);
}

fn status() -> impl Strategy<Value = DirtinessStatus> {
    prop_oneof![
        Just(DirtinessStatus::NotDirty),
        Just(DirtinessStatus::ConsiderLikeDirty),
        Just(DirtinessStatus::Dirty),
    ]
}

proptest! {
    #[test]
    fn marks_never_downgrade(marks in proptest::collection::vec(status(), 0..12)) {
        let mut attribute = AttributeAnalysis::new(0);
        let mut highest = DirtinessStatus::NotDirty;

        for mark in marks {
            let before = attribute.dirtiness();
            attribute.mark(mark);
            highest = highest.max(mark);

            prop_assert!(attribute.dirtiness() >= before);
            prop_assert_eq!(attribute.dirtiness(), highest);
        }
    }

    #[test]
    fn dynamic_tables_are_a_subset_of_tables_needing_update(
        dirty in proptest::collection::btree_set(0usize..4, 0..4),
        known in any::<bool>(),
        force in any::<bool>(),
        null_email in any::<bool>(),
    ) {
        let dirty: Vec<usize> = dirty.into_iter().collect();
        let email = (!null_email).then_some("ada@x");
        let old = person_state("Ada", email, None, 3);
        let values = person_state("Ada L", Some("new@x"), Some("bio"), 4);

        for style in [
            OptimisticLockStyle::None,
            OptimisticLockStyle::Version,
            OptimisticLockStyle::All,
        ] {
            let analysis = analyze_person(
                style,
                &values,
                Some(&old),
                known.then_some(dirty.as_slice()),
                force,
            );

            prop_assert!(analysis
                .tables_needing_dynamic_update()
                .is_subset(analysis.tables_needing_update()));
            if force && !analysis.is_noop() {
                prop_assert_eq!(
                    analysis.tables_needing_dynamic_update(),
                    analysis.tables_needing_update()
                );
            }
        }
    }
}
