//! Runtime values bound into mutation statements.
//!
//! `Value` is the column-level currency of the engine; `Slot` is what the
//! persistence context hands over per attribute, where an attribute may not
//! have been fetched yet.

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

///
/// Value
///
/// One attribute or column value.
/// Multi-column attributes and composite keys use `Composite`, one slot per column.
///

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Text(String),
    Blob(Vec<u8>),
    Composite(Vec<Self>),
    Ref(EntityRef),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True when every column this value spans is null.
    #[must_use]
    pub fn is_all_null(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Composite(parts) => parts.iter().all(Self::is_all_null),
            _ => false,
        }
    }

    /// Build a text value.
    #[must_use]
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Split this value across `span` columns.
    ///
    /// Single-column values pass through; composites must match the span exactly.
    /// Entity references decompose into their identifier.
    pub fn columns(&self, span: usize) -> Option<Vec<&Self>> {
        match (self, span) {
            (Self::Ref(entity), _) => entity.id.columns(span),
            (Self::Composite(parts), n) if parts.len() == n => Some(parts.iter().collect()),
            (Self::Composite(_), _) => None,
            (Self::Null, n) => Some(std::iter::repeat_n(self, n).collect()),
            (value, 1) => Some(vec![value]),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "null"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Uint(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Text(v) => write!(f, "'{}'", v.replace('\'', "''")),
            Self::Blob(v) => write!(f, "x'{}'", hex(v)),
            Self::Composite(parts) => {
                write!(f, "(")?;
                for (i, part) in parts.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{part}")?;
                }
                write!(f, ")")
            }
            Self::Ref(entity) => write!(f, "{entity}"),
        }
    }
}

fn hex(bytes: &[u8]) -> String {
    use std::fmt::Write as _;

    bytes.iter().fold(String::new(), |mut out, b| {
        let _ = write!(out, "{b:02x}");
        out
    })
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Self::Uint(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Text(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

///
/// EntityRef
///
/// Reference to a persistent entity by concrete entity name and identifier.
/// Collection elements of entity type carry these so polymorphic roles can
/// route each element to the table of its concrete subtype.
///

#[derive(Clone, Debug, Deserialize, Display, PartialEq, Serialize)]
#[display("{entity}#{id}")]
pub struct EntityRef {
    pub entity: String,
    pub id: Box<Value>,
}

impl EntityRef {
    pub fn new(entity: impl Into<String>, id: impl Into<Value>) -> Self {
        Self {
            entity: entity.into(),
            id: Box::new(id.into()),
        }
    }
}

///
/// Slot
///
/// One attribute position in a state snapshot.
/// `Unfetched` marks a lazy attribute that was never loaded; it carries no
/// information to compare against.
///

#[derive(Clone, Debug, Default, PartialEq)]
pub enum Slot {
    Loaded(Value),
    #[default]
    Unfetched,
}

impl Slot {
    /// Build a loaded slot.
    pub fn loaded(value: impl Into<Value>) -> Self {
        Self::Loaded(value.into())
    }

    #[must_use]
    pub const fn is_unfetched(&self) -> bool {
        matches!(self, Self::Unfetched)
    }

    #[must_use]
    pub const fn value(&self) -> Option<&Value> {
        match self {
            Self::Loaded(value) => Some(value),
            Self::Unfetched => None,
        }
    }

    /// Loaded and not null.
    #[must_use]
    pub fn is_non_null(&self) -> bool {
        self.value().is_some_and(|v| !v.is_all_null())
    }
}

impl From<Value> for Slot {
    fn from(value: Value) -> Self {
        Self::Loaded(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_decomposes_composites_and_refs() {
        let key = Value::Composite(vec![Value::Int(1), Value::text("a")]);
        assert_eq!(
            key.columns(2),
            Some(vec![&Value::Int(1), &Value::text("a")])
        );
        assert_eq!(key.columns(3), None);

        let entity = Value::Ref(EntityRef::new("Item", 9_i64));
        assert_eq!(entity.columns(1), Some(vec![&Value::Int(9)]));

        assert_eq!(Value::Null.columns(2), Some(vec![&Value::Null, &Value::Null]));
        assert_eq!(Value::Int(4).columns(2), None);
    }

    #[test]
    fn display_renders_sql_literals() {
        assert_eq!(Value::text("o'k").to_string(), "'o''k'");
        assert_eq!(Value::Blob(vec![0xab, 0x01]).to_string(), "x'ab01'");
        assert_eq!(Value::Null.to_string(), "null");
        assert_eq!(
            Value::Ref(EntityRef::new("Item", 3_i64)).to_string(),
            "Item#3"
        );
    }

    #[test]
    fn slot_non_null_ignores_unfetched() {
        assert!(!Slot::Unfetched.is_non_null());
        assert!(!Slot::from(Value::Null).is_non_null());
        assert!(!Slot::from(Value::Composite(vec![Value::Null])).is_non_null());
        assert!(Slot::loaded(5_i64).is_non_null());
    }
}
