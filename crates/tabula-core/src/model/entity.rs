use crate::{
    error::{ErrorOrigin, InternalError},
    model::{attribute::AttributeModel, table::TableModel},
};
use derive_more::Display;
use serde::Deserialize;
use std::collections::BTreeSet;

///
/// OptimisticLockStyle
///
/// Which columns join the WHERE clause of an UPDATE to detect concurrent
/// modification.
///

#[derive(Clone, Copy, Debug, Default, Deserialize, Display, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum OptimisticLockStyle {
    #[display("none")]
    None,
    #[default]
    #[display("version")]
    Version,
    #[display("all")]
    All,
    #[display("dirty")]
    Dirty,
}

///
/// EntityModel
/// Boot-time mutation metadata for one entity type.
///

#[derive(Clone, Debug)]
pub struct EntityModel {
    /// Fully-qualified name (for batch keys and diagnostics).
    pub path: String,
    /// Ordered table list; index 0 is the identifier table.
    pub tables: Vec<TableModel>,
    /// Ordered attribute list (authoritative for value array positions).
    pub attributes: Vec<AttributeModel>,
    pub version: Option<usize>,
    pub lock_style: OptimisticLockStyle,
    pub dynamic_update: bool,
    pub mutable: bool,
    pub row_id_column: Option<String>,
}

impl EntityModel {
    #[must_use]
    pub fn builder(path: impl Into<String>) -> EntityModelBuilder {
        EntityModelBuilder::new(path)
    }

    #[must_use]
    pub fn identifier_table(&self) -> &TableModel {
        &self.tables[0]
    }

    #[must_use]
    pub fn version_attribute(&self) -> Option<&AttributeModel> {
        self.version.map(|index| &self.attributes[index])
    }

    #[must_use]
    pub fn attribute_count(&self) -> usize {
        self.attributes.len()
    }

    /// Per-attribute, per-column updatability, aligned with `attributes`.
    #[must_use]
    pub fn column_updatability(&self) -> Vec<Vec<bool>> {
        self.attributes
            .iter()
            .map(AttributeModel::updatable_columns)
            .collect()
    }

    /// Some attribute's SQL text may differ call-to-call or needs read-back.
    #[must_use]
    pub fn has_update_generated_values(&self) -> bool {
        self.attributes
            .iter()
            .any(|attribute| attribute.generation.is_on_execution())
    }

    #[must_use]
    pub fn partition_attributes(&self) -> Vec<&AttributeModel> {
        self.attributes
            .iter()
            .filter(|attribute| attribute.partition_key)
            .collect()
    }
}

///
/// EntityModelBuilder
///

#[derive(Debug)]
pub struct EntityModelBuilder {
    path: String,
    tables: Vec<TableModel>,
    attributes: Vec<AttributeModel>,
    version: Option<String>,
    lock_style: OptimisticLockStyle,
    dynamic_update: bool,
    mutable: bool,
    row_id_column: Option<String>,
}

impl EntityModelBuilder {
    fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            tables: Vec::new(),
            attributes: Vec::new(),
            version: None,
            lock_style: OptimisticLockStyle::default(),
            dynamic_update: false,
            mutable: true,
            row_id_column: None,
        }
    }

    /// Add a table; the first table added is the identifier table.
    #[must_use]
    pub fn table(mut self, table: TableModel) -> Self {
        self.tables.push(table);
        self
    }

    #[must_use]
    pub fn attribute(mut self, attribute: AttributeModel) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// Add the version attribute; it must map one column of the identifier table.
    #[must_use]
    pub fn version(mut self, attribute: AttributeModel) -> Self {
        self.version = Some(attribute.name.clone());
        self.attributes.push(attribute);
        self
    }

    #[must_use]
    pub const fn lock_style(mut self, style: OptimisticLockStyle) -> Self {
        self.lock_style = style;
        self
    }

    #[must_use]
    pub const fn dynamic_update(mut self) -> Self {
        self.dynamic_update = true;
        self
    }

    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    #[must_use]
    pub fn row_id(mut self, column: impl Into<String>) -> Self {
        self.row_id_column = Some(column.into());
        self
    }

    pub fn build(self) -> Result<EntityModel, InternalError> {
        let Self {
            path,
            mut tables,
            mut attributes,
            version,
            lock_style,
            dynamic_update,
            mutable,
            row_id_column,
        } = self;

        if tables.is_empty() {
            return Err(InternalError::model_invariant(format!(
                "entity '{path}' declares no tables"
            )));
        }

        let mut table_names = BTreeSet::new();
        for (index, table) in tables.iter_mut().enumerate() {
            if !table_names.insert(table.name.clone()) {
                return Err(InternalError::model_invariant(format!(
                    "entity '{path}' declares table '{}' twice",
                    table.name
                )));
            }
            if table.key_columns.is_empty() {
                return Err(InternalError::model_invariant(format!(
                    "table '{}' of entity '{path}' has no key columns",
                    table.name
                )));
            }
            table.index = index;
            table.attributes.clear();
        }
        if tables[0].optional {
            return Err(InternalError::model_invariant(format!(
                "identifier table '{}' of entity '{path}' cannot be optional",
                tables[0].name
            )));
        }

        let mut attribute_names = BTreeSet::new();
        for (index, attribute) in attributes.iter_mut().enumerate() {
            if !attribute_names.insert(attribute.name.clone()) {
                return Err(InternalError::model_invariant(format!(
                    "entity '{path}' declares attribute '{}' twice",
                    attribute.name
                )));
            }
            if attribute.columns.is_empty() {
                return Err(InternalError::model_invariant(format!(
                    "attribute '{}' of entity '{path}' maps no columns",
                    attribute.name
                )));
            }
            attribute.index = index;

            for column in &mut attribute.columns {
                let table = tables
                    .iter()
                    .position(|table| table.name == column.table)
                    .ok_or_else(|| {
                        InternalError::model_invariant(format!(
                            "attribute '{}' of entity '{path}' maps unknown table '{}'",
                            attribute.name, column.table
                        ))
                    })?;
                column.table_index = table;
            }
            for table in attribute.tables() {
                tables[table].attributes.push(index);
            }
        }

        let version = match version {
            Some(name) => {
                let index = attributes
                    .iter()
                    .position(|attribute| attribute.name == name)
                    .ok_or_else(|| {
                        InternalError::model_invariant(format!(
                            "version attribute '{name}' missing from entity '{path}'"
                        ))
                    })?;
                let attribute = &attributes[index];
                if attribute.column_span() != 1 || attribute.columns[0].table_index != 0 {
                    return Err(InternalError::model_invariant(format!(
                        "version attribute '{name}' of entity '{path}' must map exactly one identifier-table column"
                    )));
                }

                Some(index)
            }
            None => None,
        };

        if version.is_none() && lock_style == OptimisticLockStyle::Version {
            // Unversioned entities under the default style simply carry no lock.
            return Ok(EntityModel {
                path,
                tables,
                attributes,
                version,
                lock_style: OptimisticLockStyle::None,
                dynamic_update,
                mutable,
                row_id_column,
            });
        }
        if lock_style == OptimisticLockStyle::Dirty && !dynamic_update {
            return Err(InternalError::unsupported(
                ErrorOrigin::Model,
                format!("entity '{path}' uses optimistic-lock style 'dirty' without dynamic update"),
            ));
        }

        Ok(EntityModel {
            path,
            tables,
            attributes,
            version,
            lock_style,
            dynamic_update,
            mutable,
            row_id_column,
        })
    }
}
