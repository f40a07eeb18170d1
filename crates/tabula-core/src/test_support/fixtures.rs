use crate::{
    config::EngineConfig,
    db::services::MutationServices,
    model::{
        attribute::AttributeModel,
        collection::{CollectionLayout, CollectionModel, ElementSubtype},
        entity::{EntityModel, EntityModelBuilder, OptimisticLockStyle},
        table::TableModel,
    },
    value::{Slot, Value},
};
use std::sync::Arc;

pub(crate) fn services() -> Arc<MutationServices> {
    Arc::new(MutationServices::default())
}

pub(crate) fn services_from_toml(source: &str) -> Arc<MutationServices> {
    let config = EngineConfig::from_toml_str(source).expect("test config should parse");

    Arc::new(MutationServices::new(&config))
}

/// `app::Root`: `root(id)` with `name` (0) and `version` (1).
pub(crate) fn root_builder() -> EntityModelBuilder {
    EntityModel::builder("app::Root")
        .table(TableModel::new("root", ["id"]))
        .attribute(AttributeModel::new("name").column("root", "name"))
}

pub(crate) fn root_model() -> Arc<EntityModel> {
    Arc::new(
        root_builder()
            .version(AttributeModel::new("version").column("root", "version"))
            .build()
            .expect("root model should build"),
    )
}

/// `hr::Person` over `people(id)` and optional `people_ext(person_id)`:
/// `name` (0), lazy `email` (1), `bio` (2, secondary table), `version` (3).
pub(crate) fn person_builder(style: OptimisticLockStyle) -> EntityModelBuilder {
    EntityModel::builder("hr::Person")
        .table(TableModel::new("people", ["id"]))
        .table(TableModel::new("people_ext", ["person_id"]).optional())
        .attribute(AttributeModel::new("name").column("people", "name"))
        .attribute(AttributeModel::new("email").column("people", "email").lazy())
        .attribute(AttributeModel::new("bio").column("people_ext", "bio"))
        .version(AttributeModel::new("version").column("people", "version"))
        .lock_style(style)
}

pub(crate) fn person_model(style: OptimisticLockStyle) -> Arc<EntityModel> {
    Arc::new(
        person_builder(style)
            .build()
            .expect("person model should build"),
    )
}

/// Person state in attribute order.
pub(crate) fn person_state(name: &str, email: Option<&str>, bio: Option<&str>, version: i64) -> Vec<Slot> {
    vec![
        Slot::loaded(name),
        Slot::loaded(Value::from(email)),
        Slot::loaded(Value::from(bio)),
        Slot::loaded(version),
    ]
}

/// Indexed join-table list `shop::Order.notes` in `order_notes`.
pub(crate) fn notes_role() -> Arc<CollectionModel> {
    Arc::new(
        CollectionModel::list(
            "shop::Order.notes",
            CollectionLayout::JoinTable {
                table: "order_notes".to_string(),
                element_columns: vec!["note".to_string()],
            },
        )
        .owner_key(["order_id"])
        .index_column("pos", 0),
    )
}

/// Join-table bag `shop::Order.tags` in `order_tags`.
pub(crate) fn tags_role() -> Arc<CollectionModel> {
    Arc::new(
        CollectionModel::bag(
            "shop::Order.tags",
            CollectionLayout::JoinTable {
                table: "order_tags".to_string(),
                element_columns: vec!["tag".to_string()],
            },
        )
        .owner_key(["order_id"]),
    )
}

/// Polymorphic one-to-many bag `zoo::Keeper.animals` over `cats` and `dogs`.
pub(crate) fn animals_role() -> Arc<CollectionModel> {
    Arc::new(
        CollectionModel::bag(
            "zoo::Keeper.animals",
            CollectionLayout::OneToMany {
                subtypes: vec![
                    ElementSubtype::new("Cat", "cats", ["id"]),
                    ElementSubtype::new("Dog", "dogs", ["id"]),
                ],
            },
        )
        .owner_key(["keeper_id"]),
    )
}

/// Indexed one-to-many list `shop::Order.items`: `items(id)` rows linked by
/// `order_id` and ordered by `pos`.
pub(crate) fn items_role() -> Arc<CollectionModel> {
    Arc::new(
        CollectionModel::list(
            "shop::Order.items",
            CollectionLayout::OneToMany {
                subtypes: vec![ElementSubtype::new("Item", "items", ["id"])],
            },
        )
        .owner_key(["order_id"])
        .index_column("pos", 0),
    )
}
