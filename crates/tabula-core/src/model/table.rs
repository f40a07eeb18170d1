///
/// TableModel
/// One physical table an entity spans.
///

#[derive(Clone, Debug)]
pub struct TableModel {
    /// Position within the owning entity; the identifier table is always 0.
    pub index: usize,
    pub name: String,
    pub key_columns: Vec<String>,
    /// Row may be absent when all of its non-key columns are null.
    pub optional: bool,
    pub mutable: bool,
    /// Replaces the generated UPDATE text for this table.
    pub custom_update_sql: Option<String>,
    /// Attribute indexes with at least one column here; assigned by the entity builder.
    pub attributes: Vec<usize>,
}

impl TableModel {
    #[must_use]
    pub fn new<I, S>(name: impl Into<String>, key_columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: 0,
            name: name.into(),
            key_columns: key_columns.into_iter().map(Into::into).collect(),
            optional: false,
            mutable: true,
            custom_update_sql: None,
            attributes: Vec::new(),
        }
    }

    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    #[must_use]
    pub const fn immutable(mut self) -> Self {
        self.mutable = false;
        self
    }

    #[must_use]
    pub fn custom_update_sql(mut self, sql: impl Into<String>) -> Self {
        self.custom_update_sql = Some(sql.into());
        self
    }

    #[must_use]
    pub const fn is_identifier_table(&self) -> bool {
        self.index == 0
    }
}
