//! Cached row statements of one collection role.
//!
//! Every physical variant of a role (the join table, or one concrete element
//! table of a one-to-many role) gets one `RowMutationOperations` bundle,
//! built on first use and shared by every later call.

use crate::{
    db::{
        mutation::{
            bindings::ParameterBindings,
            operation::{
                BatchKey, ColumnValue, Expectation, MutationKind, MutationOperation,
                MutationOperationGroup, TableMutation, TableMutationBuilder,
            },
        },
        services::MutationServices,
    },
    error::InternalError,
    model::collection::{CollectionLayout, CollectionModel},
    value::Value,
};
use std::{
    collections::BTreeMap,
    sync::{Arc, OnceLock},
};

///
/// RowValues
/// Column values of one collection row, keyed by column name.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct RowValues(BTreeMap<String, Value>);

impl RowValues {
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.0.get(column)
    }

    fn insert_spanning(&mut self, columns: &[String], value: &Value, what: &str) -> Result<(), InternalError> {
        let parts = value.columns(columns.len()).ok_or_else(|| {
            InternalError::collection_invariant(format!(
                "{what} {value} does not span {} column(s)",
                columns.len()
            ))
        })?;
        for (column, part) in columns.iter().zip(parts) {
            self.0.insert(column.clone(), part.clone());
        }

        Ok(())
    }
}

///
/// RowOperation
/// One cached statement group for a row action, with its batch key.
///

#[derive(Debug)]
pub struct RowOperation {
    group: MutationOperationGroup,
    batch_key: Option<BatchKey>,
}

impl RowOperation {
    fn new(
        model: &CollectionModel,
        services: &MutationServices,
        action: MutationKind,
        subtype: Option<&str>,
        builder: TableMutationBuilder,
    ) -> Result<Self, InternalError> {
        let mutation = builder.build(services.sql());
        let kind = mutation.kind;
        let group = MutationOperationGroup::new(
            &model.role,
            kind,
            vec![MutationOperation::Table(mutation)],
        )?;
        let batch_key = services
            .config()
            .batching_enabled()
            .then(|| match subtype {
                Some(entity) => BatchKey::new(&model.role, format!("{action}#{entity}")),
                None => BatchKey::new(&model.role, action),
            });

        Ok(Self { group, batch_key })
    }

    /// Statements that never share a batch with other rows.
    fn unbatched(mut self) -> Self {
        self.batch_key = None;
        self
    }

    #[must_use]
    pub const fn group(&self) -> &MutationOperationGroup {
        &self.group
    }

    #[must_use]
    pub const fn batch_key(&self) -> Option<&BatchKey> {
        self.batch_key.as_ref()
    }

    /// The single statement shape of this operation.
    #[must_use]
    pub fn mutation(&self) -> Option<&TableMutation> {
        self.group
            .operations()
            .first()
            .and_then(MutationOperation::primary)
    }

    /// Bind `row` into every placeholder of this operation.
    pub fn bind(&self, bindings: &mut ParameterBindings, row: &RowValues) -> Result<(), InternalError> {
        for operation in self.group.operations() {
            for mutation in operation.statements() {
                for (usage, column) in mutation.parameters() {
                    let value = row.get(column).ok_or_else(|| {
                        InternalError::collection_invariant(format!(
                            "no value for column '{column}' of table '{}' ({})",
                            mutation.table,
                            self.group.path()
                        ))
                    })?;
                    bindings.bind(&mutation.table, column, usage, value.clone());
                }
            }
        }

        Ok(())
    }
}

///
/// RowMutationOperations
///
/// Insert, update, delete and delete-all statements for one physical variant.
/// `update` is absent when rows of this role cannot be rewritten in place.
///

#[derive(Debug)]
pub struct RowMutationOperations {
    variant: usize,
    table: String,
    element_columns: Vec<String>,
    insert: RowOperation,
    update: Option<RowOperation>,
    delete: RowOperation,
    delete_all: RowOperation,
}

impl RowMutationOperations {
    pub fn build(
        model: &CollectionModel,
        services: &MutationServices,
        variant: usize,
    ) -> Result<Self, InternalError> {
        match &model.layout {
            CollectionLayout::JoinTable {
                table,
                element_columns,
            } => Self::join_table(model, services, table, element_columns),
            CollectionLayout::OneToMany { subtypes } => {
                let subtype = subtypes.get(variant).ok_or_else(|| {
                    InternalError::collection_invariant(format!(
                        "role '{}' has no variant {variant}",
                        model.role
                    ))
                })?;
                let polymorphic = subtypes.len() > 1;

                Self::one_to_many(
                    model,
                    services,
                    variant,
                    &subtype.table,
                    &subtype.id_columns,
                    polymorphic.then_some(subtype.entity.as_str()),
                )
            }
        }
    }

    /// `INSERT` / `DELETE` / `UPDATE` rows of a dedicated collection table.
    fn join_table(
        model: &CollectionModel,
        services: &MutationServices,
        table: &str,
        element_columns: &[String],
    ) -> Result<Self, InternalError> {
        let owner = &model.owner_key_columns;
        let index = model.index_column.as_ref().map(|index| index.name.as_str());

        let mut insert = TableMutation::builder(table, 0, MutationKind::Insert);
        for column in owner.iter().map(String::as_str).chain(index).chain(element_columns.iter().map(String::as_str)) {
            insert.assign_param(column);
        }
        insert.expect(Expectation::RowCount(1));

        let mut delete = TableMutation::builder(table, 0, MutationKind::Delete);
        for column in owner {
            delete.restrict(column);
        }
        if model.deletes_by_index() {
            delete.restrict(index.unwrap_or_default());
            delete.expect(Expectation::RowCount(1));
        } else {
            for column in element_columns {
                delete.restrict(column);
            }
        }

        let update = if model.is_row_update_possible() {
            let mut update = TableMutation::builder(table, 0, MutationKind::Update);
            for column in element_columns {
                update.assign_param(column);
            }
            for column in owner {
                update.restrict(column);
            }
            update
                .restrict(index.unwrap_or_default())
                .expect(Expectation::RowCount(1));

            Some(RowOperation::new(model, services, MutationKind::Update, None, update)?)
        } else {
            None
        };

        let mut delete_all = TableMutation::builder(table, 0, MutationKind::Delete);
        for column in owner {
            delete_all.restrict(column);
        }

        Ok(Self {
            variant: 0,
            table: table.to_string(),
            element_columns: element_columns.to_vec(),
            insert: RowOperation::new(model, services, MutationKind::Insert, None, insert)?,
            update,
            delete: RowOperation::new(model, services, MutationKind::Delete, None, delete)?,
            delete_all: RowOperation::new(model, services, MutationKind::Delete, None, delete_all)?
                .unbatched(),
        })
    }

    /// Link and unlink element rows through their foreign key.
    fn one_to_many(
        model: &CollectionModel,
        services: &MutationServices,
        variant: usize,
        table: &str,
        id_columns: &[String],
        subtype: Option<&str>,
    ) -> Result<Self, InternalError> {
        let owner = &model.owner_key_columns;
        let index = model.index_column.as_ref().map(|index| index.name.as_str());

        let mut insert = TableMutation::builder(table, 0, MutationKind::Update);
        for column in owner.iter().map(String::as_str).chain(index) {
            insert.assign_param(column);
        }
        for column in id_columns {
            insert.restrict(column);
        }
        insert.expect(Expectation::RowCount(1));

        let unlink = |builder: &mut TableMutationBuilder| {
            for column in owner.iter().map(String::as_str).chain(index) {
                builder.assign(column, ColumnValue::Null);
            }
            for column in owner {
                builder.restrict(column);
            }
        };

        let mut delete = TableMutation::builder(table, 0, MutationKind::Update);
        unlink(&mut delete);
        for column in id_columns {
            delete.restrict(column);
        }
        delete.expect(Expectation::RowCount(1));

        let mut delete_all = TableMutation::builder(table, 0, MutationKind::Update);
        unlink(&mut delete_all);

        // Shifted list elements: rewrite the position, relinking the owner so
        // an element moved into a vacated slot is attached as well.
        let update = if model.is_row_update_possible() {
            let mut update = TableMutation::builder(table, 0, MutationKind::Update);
            for column in owner.iter().map(String::as_str).chain(index) {
                update.assign_param(column);
            }
            for column in id_columns {
                update.restrict(column);
            }
            update.expect(Expectation::RowCount(1));

            Some(RowOperation::new(model, services, MutationKind::Update, subtype, update)?)
        } else {
            None
        };

        Ok(Self {
            variant,
            table: table.to_string(),
            element_columns: id_columns.to_vec(),
            insert: RowOperation::new(model, services, MutationKind::Insert, subtype, insert)?,
            update,
            delete: RowOperation::new(model, services, MutationKind::Delete, subtype, delete)?,
            delete_all: RowOperation::new(model, services, MutationKind::Delete, subtype, delete_all)?
                .unbatched(),
        })
    }

    #[must_use]
    pub const fn variant(&self) -> usize {
        self.variant
    }

    #[must_use]
    pub fn table(&self) -> &str {
        &self.table
    }

    #[must_use]
    pub const fn insert(&self) -> &RowOperation {
        &self.insert
    }

    #[must_use]
    pub const fn update(&self) -> Option<&RowOperation> {
        self.update.as_ref()
    }

    #[must_use]
    pub const fn delete(&self) -> &RowOperation {
        &self.delete
    }

    #[must_use]
    pub const fn delete_all(&self) -> &RowOperation {
        &self.delete_all
    }

    /// Column values for one row: owner key, then position and element when given.
    pub fn row_values(
        &self,
        model: &CollectionModel,
        key: &Value,
        position: Option<usize>,
        element: Option<&Value>,
    ) -> Result<RowValues, InternalError> {
        let mut row = RowValues::default();
        row.insert_spanning(&model.owner_key_columns, key, "owner key")?;

        if let (Some(index), Some(position)) = (&model.index_column, position) {
            row.0.insert(index.name.clone(), index.value_at(position));
        }
        if let Some(element) = element {
            row.insert_spanning(&self.element_columns, element, "element")?;
        }

        Ok(row)
    }
}

///
/// CollectionMutationTarget
///
/// A collection role being mutated, with its lazily built per-variant
/// statement bundles.
///

#[derive(Debug)]
pub struct CollectionMutationTarget {
    model: Arc<CollectionModel>,
    services: Arc<MutationServices>,
    variants: Vec<OnceLock<RowMutationOperations>>,
}

impl CollectionMutationTarget {
    pub fn new(model: Arc<CollectionModel>, services: Arc<MutationServices>) -> Result<Self, InternalError> {
        model.validate()?;
        let variants = (0..model.variant_count()).map(|_| OnceLock::new()).collect();

        Ok(Self {
            model,
            services,
            variants,
        })
    }

    #[must_use]
    pub fn model(&self) -> &CollectionModel {
        &self.model
    }

    #[must_use]
    pub fn services(&self) -> &MutationServices {
        &self.services
    }

    /// Statement bundle for `variant`, built on first use.
    pub fn operations(&self, variant: usize) -> Result<&RowMutationOperations, InternalError> {
        let slot = self.variants.get(variant).ok_or_else(|| {
            InternalError::collection_invariant(format!(
                "role '{}' has no variant {variant}",
                self.model.role
            ))
        })?;
        if let Some(operations) = slot.get() {
            return Ok(operations);
        }

        let operations = RowMutationOperations::build(&self.model, &self.services, variant)?;

        Ok(slot.get_or_init(|| operations))
    }

    /// Number of variants whose statements have been built so far.
    #[must_use]
    pub fn built_variants(&self) -> usize {
        self.variants
            .iter()
            .filter(|slot| slot.get().is_some())
            .count()
    }
}
