use crate::{
    error::{ErrorOrigin, InternalError},
    value::Value,
};
use std::collections::BTreeSet;

///
/// CollectionKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CollectionKind {
    /// Ordered by a position column; rows are addressed by position.
    List,
    /// Unordered, duplicates allowed; rows are addressed by value.
    Bag,
}

///
/// IndexColumn
/// Position column of an indexed collection; `base` is the stored value of
/// the first position.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct IndexColumn {
    pub name: String,
    pub base: i64,
}

impl IndexColumn {
    /// Stored value for an in-memory position.
    #[must_use]
    pub fn value_at(&self, position: usize) -> Value {
        Value::Int(
            self.base
                .saturating_add(i64::try_from(position).unwrap_or(i64::MAX)),
        )
    }
}

///
/// ElementSubtype
/// One concrete element entity of a one-to-many role and the table it lives in.
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ElementSubtype {
    pub entity: String,
    pub table: String,
    pub id_columns: Vec<String>,
}

impl ElementSubtype {
    #[must_use]
    pub fn new<I, S>(entity: impl Into<String>, table: impl Into<String>, id_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            entity: entity.into(),
            table: table.into(),
            id_columns: id_columns.into_iter().map(Into::into).collect(),
        }
    }
}

///
/// CollectionLayout
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub enum CollectionLayout {
    /// Rows live in a dedicated collection table.
    JoinTable {
        table: String,
        element_columns: Vec<String>,
    },
    /// Rows are the element entities' own rows, linked by a foreign key.
    /// More than one subtype means the elements are spread over several
    /// concrete tables.
    OneToMany { subtypes: Vec<ElementSubtype> },
}

///
/// CollectionModel
/// Boot-time metadata for one collection role.
///

#[derive(Clone, Debug)]
pub struct CollectionModel {
    /// Role path (e.g. `shop::Order.lines`), used for batch keys and diagnostics.
    pub role: String,
    pub kind: CollectionKind,
    /// Foreign-key columns referencing the owner, in the row table(s).
    pub owner_key_columns: Vec<String>,
    pub index_column: Option<IndexColumn>,
    pub layout: CollectionLayout,
    /// Elements can be rewritten in place.
    pub mutable_elements: bool,
    /// The other side owns the association; this role issues no row mutations.
    pub inverse: bool,
}

impl CollectionModel {
    #[must_use]
    pub fn list(role: impl Into<String>, layout: CollectionLayout) -> Self {
        Self::new(role, CollectionKind::List, layout)
    }

    #[must_use]
    pub fn bag(role: impl Into<String>, layout: CollectionLayout) -> Self {
        Self::new(role, CollectionKind::Bag, layout)
    }

    fn new(role: impl Into<String>, kind: CollectionKind, layout: CollectionLayout) -> Self {
        Self {
            role: role.into(),
            kind,
            owner_key_columns: Vec::new(),
            index_column: None,
            layout,
            mutable_elements: true,
            inverse: false,
        }
    }

    #[must_use]
    pub fn owner_key<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.owner_key_columns = columns.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn index_column(mut self, name: impl Into<String>, base: i64) -> Self {
        self.index_column = Some(IndexColumn {
            name: name.into(),
            base,
        });
        self
    }

    #[must_use]
    pub const fn immutable_elements(mut self) -> Self {
        self.mutable_elements = false;
        self
    }

    #[must_use]
    pub const fn inverse(mut self) -> Self {
        self.inverse = true;
        self
    }

    #[must_use]
    pub const fn is_indexed(&self) -> bool {
        matches!(self.kind, CollectionKind::List)
    }

    #[must_use]
    pub const fn is_one_to_many(&self) -> bool {
        matches!(self.layout, CollectionLayout::OneToMany { .. })
    }

    /// Removed rows are addressed by position rather than by element value.
    #[must_use]
    pub const fn deletes_by_index(&self) -> bool {
        self.is_indexed() && !self.is_one_to_many()
    }

    /// Rows can be rewritten in place: element values of a positional join
    /// table, or the stored position of a one-to-many list element.
    #[must_use]
    pub const fn is_row_update_possible(&self) -> bool {
        !self.inverse
            && ((self.deletes_by_index() && self.mutable_elements)
                || (self.is_indexed() && self.is_one_to_many()))
    }

    /// Number of physical row variants (one per concrete element table).
    #[must_use]
    pub fn variant_count(&self) -> usize {
        match &self.layout {
            CollectionLayout::JoinTable { .. } => 1,
            CollectionLayout::OneToMany { subtypes } => subtypes.len(),
        }
    }

    /// Resolve the physical variant a collection element belongs to.
    pub fn variant_of(&self, element: &Value) -> Result<usize, InternalError> {
        match &self.layout {
            CollectionLayout::JoinTable { .. } => Ok(0),
            CollectionLayout::OneToMany { subtypes } if subtypes.len() == 1 => Ok(0),
            CollectionLayout::OneToMany { subtypes } => {
                let Value::Ref(entity) = element else {
                    return Err(InternalError::collection_invariant(format!(
                        "element of polymorphic role '{}' is not an entity reference: {element}",
                        self.role
                    )));
                };

                subtypes
                    .iter()
                    .position(|subtype| subtype.entity == entity.entity)
                    .ok_or_else(|| {
                        InternalError::collection_invariant(format!(
                            "role '{}' has no element subtype '{}'",
                            self.role, entity.entity
                        ))
                    })
            }
        }
    }

    /// Check structural consistency once at boot.
    pub fn validate(&self) -> Result<(), InternalError> {
        if self.owner_key_columns.is_empty() {
            return Err(InternalError::model_invariant(format!(
                "collection role '{}' has no owner key columns",
                self.role
            )));
        }
        if self.is_indexed() && self.index_column.is_none() {
            return Err(InternalError::model_invariant(format!(
                "indexed collection role '{}' has no index column",
                self.role
            )));
        }

        match &self.layout {
            CollectionLayout::JoinTable {
                element_columns, ..
            } if element_columns.is_empty() => Err(InternalError::model_invariant(format!(
                "collection role '{}' maps no element columns",
                self.role
            ))),
            CollectionLayout::JoinTable { .. } => Ok(()),
            CollectionLayout::OneToMany { subtypes } => {
                if subtypes.is_empty() {
                    return Err(InternalError::model_invariant(format!(
                        "one-to-many role '{}' declares no element subtypes",
                        self.role
                    )));
                }
                let mut names = BTreeSet::new();
                for subtype in subtypes {
                    if !names.insert(subtype.entity.as_str()) {
                        return Err(InternalError::model_invariant(format!(
                            "one-to-many role '{}' declares subtype '{}' twice",
                            self.role, subtype.entity
                        )));
                    }
                    if subtype.id_columns.is_empty() {
                        return Err(InternalError::unsupported(
                            ErrorOrigin::Model,
                            format!(
                                "subtype '{}' of role '{}' has no id columns",
                                subtype.entity, self.role
                            ),
                        ));
                    }
                }

                Ok(())
            }
        }
    }
}
