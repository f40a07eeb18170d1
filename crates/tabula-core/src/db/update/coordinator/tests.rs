use super::*;
use crate::{
    db::mutation::memory::MemoryRowStore,
    error::ErrorClass,
    model::attribute::BeforeExecutionGenerator,
    obs::sink::{metrics_report, metrics_reset_all},
    test_support::{
        RecordingPort, person_builder, person_model, person_state, root_builder, root_model,
        services, services_from_toml,
    },
};
use proptest::prelude::*;

fn coordinator(model: Arc<EntityModel>) -> UpdateCoordinator {
    UpdateCoordinator::new(model, services()).expect("coordinator should build")
}

fn root_state(name: &str, version: i64) -> Vec<Slot> {
    vec![Slot::loaded(name), Slot::loaded(version)]
}

///
/// VERSION-ONLY PATH
///

#[test]
fn version_only_update_renders_single_statement() {
    let coordinator = coordinator(root_model());
    let values = root_state("a", 4);
    let old = root_state("a", 3);
    let id = Value::Int(7);
    let old_version = Value::Int(3);
    let mut port = RecordingPort::default();

    let outcome = coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values)
                .old_values(&old)
                .old_version(&old_version)
                .dirty(&[1]),
        )
        .expect("version-only update should succeed");

    assert_eq!(outcome.path, UpdatePathKind::VersionOnly);
    assert_eq!(outcome.statements, 1);
    assert_eq!(port.inline(), ["UPDATE root SET version=4 WHERE id=7 AND version=3"]);
}

#[test]
fn version_only_update_with_null_old_version_uses_is_null() {
    let coordinator = coordinator(root_model());
    let values = root_state("a", 1);
    let id = Value::Int(7);
    let mut port = RecordingPort::default();

    coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values)
                .old_version(&Value::Null)
                .dirty(&[1]),
        )
        .expect("version-only update should succeed");

    assert_eq!(
        port.inline(),
        ["UPDATE root SET version=1 WHERE id=7 AND version IS NULL"]
    );
}

#[test]
fn version_only_update_without_old_version_is_rejected() {
    let coordinator = coordinator(root_model());
    let values = root_state("a", 4);
    let id = Value::Int(7);
    let mut port = RecordingPort::default();

    let err = coordinator
        .coordinate_update(&mut port, &UpdateRequest::new(&id, &values).dirty(&[1]))
        .expect_err("missing old version should fail");

    assert_eq!(err.class, ErrorClass::InvariantViolation);
    assert_eq!(err.origin, ErrorOrigin::Analysis);
    assert!(port.statements.is_empty());
}

#[test]
fn collection_change_without_dirty_list_takes_version_only_path() {
    let coordinator = coordinator(root_model());
    let values = root_state("a", 4);
    let old = root_state("a", 3);
    let id = Value::Int(7);
    let mut port = RecordingPort::default();

    let outcome = coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values)
                .old_values(&old)
                .dirty_collection(),
        )
        .expect("version-only update should succeed");

    assert_eq!(outcome.path, UpdatePathKind::VersionOnly);
    assert_eq!(port.inline(), ["UPDATE root SET version=4 WHERE id=7 AND version=3"]);
}

#[test]
fn force_version_increment_uses_version_statement() {
    let coordinator = coordinator(root_model());
    let mut port = RecordingPort::default();

    let rows = coordinator
        .force_version_increment(&mut port, &Value::Int(7), &Value::Int(3), &Value::Int(4))
        .expect("increment should succeed");

    assert_eq!(rows, 1);
    assert_eq!(port.inline(), ["UPDATE root SET version=4 WHERE id=7 AND version=3"]);
}

#[test]
fn force_version_increment_without_version_is_unsupported() {
    let model = Arc::new(root_builder().build().expect("model should build"));
    let coordinator = coordinator(model);
    let mut port = RecordingPort::default();

    let err = coordinator
        .force_version_increment(&mut port, &Value::Int(7), &Value::Int(3), &Value::Int(4))
        .expect_err("unversioned increment should fail");

    assert_eq!(err.class, ErrorClass::Unsupported);
    assert!(port.statements.is_empty());
}

///
/// NO-OP
///

#[test]
fn unchanged_state_with_empty_dirty_list_issues_nothing() {
    let coordinator = coordinator(root_model());
    let values = root_state("a", 3);
    let id = Value::Int(7);
    let old_version = Value::Int(3);
    let mut port = RecordingPort::default();

    for _ in 0..2 {
        let outcome = coordinator
            .coordinate_update(
                &mut port,
                &UpdateRequest::new(&id, &values)
                    .old_values(&values)
                    .old_version(&old_version)
                    .dirty(&[]),
            )
            .expect("no-op update should succeed");

        assert_eq!(outcome.path, UpdatePathKind::Skipped);
        assert_eq!(outcome.statements, 0);
    }

    assert!(port.statements.is_empty());
    assert_eq!(coordinator.services.executors().stats().acquired, 0);
}

#[test]
fn read_only_instance_without_dirty_attributes_is_skipped() {
    let coordinator = coordinator(root_model());
    let values = root_state("a", 3);
    let id = Value::Int(7);
    let old_version = Value::Int(3);
    let mut port = RecordingPort::default();

    let outcome = coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values)
                .old_version(&old_version)
                .read_only(),
        )
        .expect("read-only update should succeed");

    assert_eq!(outcome.path, UpdatePathKind::Skipped);
    assert!(port.statements.is_empty());
}

///
/// LOCK STYLES
///

fn person_update(
    style_model: Arc<EntityModel>,
    values: &[Slot],
    old: &[Slot],
    dirty: &[usize],
) -> (UpdateOutcome, RecordingPort) {
    let coordinator = coordinator(style_model);
    let id = Value::Int(1);
    let mut port = RecordingPort::default();

    let outcome = coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, values).old_values(old).dirty(dirty),
        )
        .expect("update should succeed");

    (outcome, port)
}

#[test]
fn version_style_restricts_on_version_only() {
    let (outcome, port) = person_update(
        person_model(OptimisticLockStyle::Version),
        &person_state("Ada L", Some("ada@x"), None, 4),
        &person_state("Ada", Some("ada@x"), None, 3),
        &[0, 3],
    );

    assert_eq!(outcome.path, UpdatePathKind::Static);
    assert_eq!(
        port.inline(),
        ["UPDATE people SET name='Ada L', email='ada@x', version=4 WHERE id=1 AND version=3"]
    );
}

#[test]
fn all_style_restricts_on_every_versionable_column() {
    let (outcome, port) = person_update(
        person_model(OptimisticLockStyle::All),
        &person_state("Ada L", Some("ada@x"), None, 4),
        &person_state("Ada", Some("ada@x"), None, 3),
        &[0, 3],
    );

    assert_eq!(outcome.path, UpdatePathKind::Static);
    assert_eq!(
        port.inline(),
        ["UPDATE people SET name='Ada L', email='ada@x', version=4 WHERE id=1 AND name='Ada' AND email='ada@x' AND version=3"]
    );
}

#[test]
fn all_style_with_null_old_value_switches_to_is_null_dynamically() {
    let (outcome, port) = person_update(
        person_model(OptimisticLockStyle::All),
        &person_state("Ada L", None, None, 4),
        &person_state("Ada", None, None, 3),
        &[0, 3],
    );

    assert_eq!(outcome.path, UpdatePathKind::Dynamic);
    assert_eq!(
        port.inline(),
        ["UPDATE people SET name='Ada L', email=null, version=4 WHERE id=1 AND name='Ada' AND email IS NULL AND version=3"]
    );
}

#[test]
fn dirty_style_restricts_on_dirty_columns_only() {
    let model = Arc::new(
        person_builder(OptimisticLockStyle::Dirty)
            .dynamic_update()
            .build()
            .expect("model should build"),
    );
    let (outcome, port) = person_update(
        model,
        &person_state("Ada L", Some("ada@x"), None, 4),
        &person_state("Ada", Some("ada@x"), None, 3),
        &[0, 3],
    );

    assert_eq!(outcome.path, UpdatePathKind::Dynamic);
    assert_eq!(
        port.inline(),
        ["UPDATE people SET name='Ada L', version=4 WHERE id=1 AND name='Ada' AND version=3"]
    );
}

#[test]
fn none_style_restricts_on_key_only() {
    let (_, port) = person_update(
        person_model(OptimisticLockStyle::None),
        &person_state("Ada L", Some("ada@x"), None, 4),
        &person_state("Ada", Some("ada@x"), None, 3),
        &[0, 3],
    );

    assert_eq!(
        port.inline(),
        ["UPDATE people SET name='Ada L', email='ada@x', version=4 WHERE id=1"]
    );
}

#[test]
fn all_style_without_previous_state_is_unsupported() {
    let coordinator = coordinator(person_model(OptimisticLockStyle::All));
    let values = person_state("Ada L", None, None, 4);
    let id = Value::Int(1);
    let old_version = Value::Int(3);
    let mut port = RecordingPort::default();

    let err = coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values)
                .old_version(&old_version)
                .dirty(&[0, 3]),
        )
        .expect_err("all-style lock needs old values");

    assert_eq!(err.class, ErrorClass::Unsupported);
    assert_eq!(err.origin, ErrorOrigin::Analysis);
    assert!(port.statements.is_empty());
}

///
/// MASKS
///

#[test]
fn unfetched_lazy_attribute_is_left_out_of_a_dynamic_update() {
    let mut values = person_state("Ada L", None, None, 4);
    values[1] = Slot::Unfetched;
    let mut old = person_state("Ada", None, None, 3);
    old[1] = Slot::Unfetched;

    let (outcome, port) = person_update(
        person_model(OptimisticLockStyle::Version),
        &values,
        &old,
        &[0, 3],
    );

    assert_eq!(outcome.path, UpdatePathKind::Dynamic);
    assert_eq!(
        port.inline(),
        ["UPDATE people SET name='Ada L', version=4 WHERE id=1 AND version=3"]
    );
}

///
/// OPTIONAL TABLES
///

#[test]
fn optional_table_row_is_inserted_then_deleted() {
    let coordinator = coordinator(person_model(OptimisticLockStyle::Version));
    let id = Value::Int(1);
    let mut store = MemoryRowStore::new();
    store.insert_row(
        "people",
        [
            ("id", Value::Int(1)),
            ("name", Value::text("Ada")),
            ("email", Value::text("ada@x")),
            ("version", Value::Int(3)),
        ],
    );

    let old = person_state("Ada", Some("ada@x"), None, 3);
    let values = person_state("Ada", Some("ada@x"), Some("hello"), 4);
    let outcome = coordinator
        .coordinate_update(
            &mut store,
            &UpdateRequest::new(&id, &values).old_values(&old).dirty(&[2, 3]),
        )
        .expect("first update should succeed");

    assert_eq!(outcome.path, UpdatePathKind::Static);
    assert_eq!((outcome.statements, outcome.rows), (3, 2));
    assert_eq!(
        store.statements(),
        [
            "UPDATE people SET name='Ada', email='ada@x', version=4 WHERE id=1 AND version=3",
            "UPDATE people_ext SET bio='hello' WHERE person_id=1",
            "INSERT INTO people_ext (person_id, bio) VALUES (1, 'hello')",
        ]
    );

    store.clear_log();
    let old = values;
    let values = person_state("Ada", Some("ada@x"), None, 5);
    coordinator
        .coordinate_update(
            &mut store,
            &UpdateRequest::new(&id, &values).old_values(&old).dirty(&[2, 3]),
        )
        .expect("second update should succeed");

    assert_eq!(
        store.statements(),
        [
            "UPDATE people SET name='Ada', email='ada@x', version=5 WHERE id=1 AND version=4",
            "DELETE FROM people_ext WHERE person_id=1",
        ]
    );
    assert!(store.rows("people_ext").is_empty());
    assert_eq!(store.find("people", "version", &Value::Int(5)).len(), 1);
}

#[test]
fn optional_table_without_values_before_or_after_is_left_alone() {
    let coordinator = coordinator(person_model(OptimisticLockStyle::Version));
    let id = Value::Int(9);
    let old = person_state("Ada", Some("ada@x"), None, 3);
    let values = person_state("Ada L", Some("ada@x"), None, 4);
    let mut port = RecordingPort::default();

    let outcome = coordinator
        .coordinate_update(&mut port, &UpdateRequest::new(&id, &values).old_values(&old))
        .expect("update should succeed");

    assert_eq!(outcome.path, UpdatePathKind::Static);
    assert_eq!(
        port.inline(),
        ["UPDATE people SET name='Ada L', email='ada@x', version=4 WHERE id=9 AND version=3"]
    );
}

///
/// RESTRICTIONS
///

#[test]
fn row_id_replaces_key_columns_on_identifier_table() {
    let model = Arc::new(
        root_builder()
            .version(AttributeModel::new("version").column("root", "version"))
            .row_id("rowid")
            .build()
            .expect("model should build"),
    );
    let coordinator = coordinator(model);
    let values = root_state("b", 4);
    let id = Value::Int(7);
    let row_id = Value::Int(99);
    let old_version = Value::Int(3);
    let mut port = RecordingPort::default();

    coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values)
                .row_id(&row_id)
                .old_version(&old_version)
                .dirty(&[0, 1]),
        )
        .expect("update should succeed");

    assert_eq!(
        port.inline(),
        ["UPDATE root SET name='b', version=4 WHERE rowid=99 AND version=3"]
    );
}

#[test]
fn partition_key_is_always_restricted() {
    let model = Arc::new(
        root_builder()
            .attribute(
                AttributeModel::new("region")
                    .column("root", "region")
                    .immutable()
                    .partition_key(),
            )
            .version(AttributeModel::new("version").column("root", "version"))
            .build()
            .expect("model should build"),
    );
    let coordinator = coordinator(model);
    let values = vec![Slot::loaded("b"), Slot::loaded("eu"), Slot::loaded(4_i64)];
    let old = vec![Slot::loaded("a"), Slot::loaded("eu"), Slot::loaded(3_i64)];
    let id = Value::Int(7);
    let mut port = RecordingPort::default();

    coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values).old_values(&old).dirty(&[0, 2]),
        )
        .expect("update should succeed");

    assert_eq!(
        port.inline(),
        ["UPDATE root SET name='b', version=4 WHERE id=7 AND version=3 AND region='eu'"]
    );
}

#[test]
fn custom_update_sql_is_used_verbatim() {
    let model = Arc::new(
        EntityModel::builder("app::Root")
            .table(
                TableModel::new("root", ["id"])
                    .custom_update_sql("update root set name = ? where id = ?"),
            )
            .attribute(AttributeModel::new("name").column("root", "name"))
            .build()
            .expect("model should build"),
    );
    let coordinator = coordinator(model);
    let values = vec![Slot::loaded("b")];
    let id = Value::Int(7);
    let mut port = RecordingPort::default();

    coordinator
        .coordinate_update(&mut port, &UpdateRequest::new(&id, &values).dirty(&[0]))
        .expect("update should succeed");

    assert_eq!(port.inline(), ["update root set name = 'b' where id = 7"]);
}

///
/// GENERATION AND BATCHING
///

#[derive(Debug)]
struct Stamp;

impl BeforeExecutionGenerator for Stamp {
    fn generate(&self, _: Option<&Value>) -> Result<Value, InternalError> {
        Ok(Value::Int(100))
    }
}

#[test]
fn pre_update_generation_is_written_and_reported() {
    let model = Arc::new(
        root_builder()
            .attribute(
                AttributeModel::new("stamp")
                    .column("root", "stamp")
                    .generated(ValueGeneration::BeforeExecution(Arc::new(Stamp))),
            )
            .version(AttributeModel::new("version").column("root", "version"))
            .build()
            .expect("model should build"),
    );
    let coordinator = coordinator(model);
    let values = vec![Slot::loaded("b"), Slot::loaded(0_i64), Slot::loaded(4_i64)];
    let old = vec![Slot::loaded("a"), Slot::loaded(0_i64), Slot::loaded(3_i64)];
    let id = Value::Int(7);
    let mut port = RecordingPort::default();

    let outcome = coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values).old_values(&old).dirty(&[0, 2]),
        )
        .expect("update should succeed");

    assert_eq!(outcome.generated, vec![(1, Value::Int(100))]);
    assert_eq!(
        port.inline(),
        ["UPDATE root SET name='b', stamp=100, version=4 WHERE id=7 AND version=3"]
    );
}

#[test]
fn sql_generated_values_disable_batching() {
    let batched = services_from_toml("[mutation]\nbatch_size = 50\n");
    let plain = UpdateCoordinator::new(root_model(), Arc::clone(&batched))
        .expect("coordinator should build");
    assert_eq!(
        plain.batch_key().map(BatchKey::as_str),
        Some("app::Root#UPDATE")
    );

    let model = Arc::new(
        root_builder()
            .attribute(
                AttributeModel::new("touched")
                    .column("root", "touched")
                    .generated(ValueGeneration::on_execution_sql("now()")),
            )
            .version(AttributeModel::new("version").column("root", "version"))
            .build()
            .expect("model should build"),
    );
    let generated =
        UpdateCoordinator::new(model, batched).expect("coordinator should build");
    assert!(generated.batch_key().is_none());

    let values = vec![Slot::loaded("b"), Slot::loaded(Value::Null), Slot::loaded(4_i64)];
    let old = vec![Slot::loaded("a"), Slot::loaded(Value::Null), Slot::loaded(3_i64)];
    let id = Value::Int(7);
    let mut port = RecordingPort::default();

    generated
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values).old_values(&old).dirty(&[0, 2]),
        )
        .expect("update should succeed");

    assert_eq!(
        port.inline(),
        ["UPDATE root SET name='b', touched=now(), version=4 WHERE id=7 AND version=3"]
    );
    assert_eq!(port.statements[0].batch_key, None);
}

#[test]
fn version_only_statements_use_their_own_batch_key() {
    let coordinator = UpdateCoordinator::new(
        root_model(),
        services_from_toml("[mutation]\nbatch_size = 50\n"),
    )
    .expect("coordinator should build");
    let values = root_state("a", 4);
    let id = Value::Int(7);
    let old_version = Value::Int(3);
    let mut port = RecordingPort::default();

    coordinator
        .coordinate_update(
            &mut port,
            &UpdateRequest::new(&id, &values)
                .old_version(&old_version)
                .dirty(&[1]),
        )
        .expect("version-only update should succeed");

    assert_eq!(port.statements[0].batch_key.as_deref(), Some("app::Root#VERSION"));
}

///
/// CONFLICTS
///

#[test]
fn stale_version_is_a_conflict_and_releases_the_executor() {
    metrics_reset_all();
    let coordinator = coordinator(root_model());
    let values = root_state("b", 4);
    let id = Value::Int(7);
    let old_version = Value::Int(3);
    let mut store = MemoryRowStore::new();
    store.insert_row(
        "root",
        [("id", Value::Int(7)), ("name", Value::text("a")), ("version", Value::Int(2))],
    );

    let err = coordinator
        .coordinate_update(
            &mut store,
            &UpdateRequest::new(&id, &values)
                .old_version(&old_version)
                .dirty(&[0, 1]),
        )
        .expect_err("stale version should conflict");

    assert!(err.is_conflict());
    assert_eq!(
        err.stale_state_detail().map(|detail| detail.table.as_str()),
        Some("root")
    );
    assert_eq!(coordinator.services.executors().stats().in_use(), 0);

    let counters = metrics_report(None)
        .counters
        .expect("report should include counters");
    assert_eq!(counters.ops.stale_state, 1);
    assert_eq!(counters.ops.update_calls, 1);
    assert_eq!(counters.ops.executors_acquired, counters.ops.executors_released);
}

///
/// STATIC / DYNAMIC EQUIVALENCE
///

fn flat_model(dynamic: bool) -> Arc<EntityModel> {
    let builder = EntityModel::builder("app::Flat")
        .table(TableModel::new("flat", ["id"]))
        .attribute(AttributeModel::new("a").column("flat", "a"))
        .attribute(AttributeModel::new("b").column("flat", "b"))
        .attribute(AttributeModel::new("c").column("flat", "c"));
    let builder = if dynamic {
        builder.dynamic_update()
    } else {
        builder
    };

    Arc::new(builder.build().expect("flat model should build"))
}

proptest! {
    #[test]
    fn static_and_dynamic_bind_the_same_values(
        new in proptest::collection::vec(any::<i64>(), 3),
        old in proptest::collection::vec(any::<i64>(), 3),
    ) {
        let values: Vec<Slot> = new.iter().copied().map(Slot::loaded).collect();
        let old: Vec<Slot> = old.iter().copied().map(Slot::loaded).collect();
        let id = Value::Int(1);
        let mut recorded = Vec::new();

        for dynamic in [false, true] {
            let coordinator = coordinator(flat_model(dynamic));
            let mut port = RecordingPort::default();
            let outcome = coordinator
                .coordinate_update(
                    &mut port,
                    &UpdateRequest::new(&id, &values).old_values(&old).dirty(&[0, 1, 2]),
                )
                .expect("update should succeed");

            let expected = if dynamic { UpdatePathKind::Dynamic } else { UpdatePathKind::Static };
            prop_assert_eq!(outcome.path, expected);
            prop_assert_eq!(port.statements.len(), 1);
            let statement = port.statements.remove(0);
            recorded.push((statement.sql, statement.assignments, statement.restrictions));
        }

        prop_assert_eq!(&recorded[0], &recorded[1]);
    }
}
