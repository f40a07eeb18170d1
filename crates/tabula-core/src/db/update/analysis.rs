//! Per-call update values analysis.
//!
//! One fold over the entity's attributes decides, per table and attribute,
//! what goes into the SET clause, what goes into the WHERE clause, and which
//! tables actually need a statement.

use crate::{
    error::InternalError,
    model::{
        attribute::AttributeModel,
        entity::{EntityModel, OptimisticLockStyle},
    },
    value::{Slot, Value},
};

///
/// DirtinessStatus
///
/// Ordered so that `max` is the upgrade operation; a status is never
/// downgraded within one analysis pass.
///

#[derive(Clone, Copy, Debug, Default, Eq, Ord, PartialEq, PartialOrd)]
pub enum DirtinessStatus {
    #[default]
    NotDirty,
    /// Written, but does not on its own make the table need an update.
    ConsiderLikeDirty,
    Dirty,
}

impl DirtinessStatus {
    #[must_use]
    pub fn upgrade(self, other: Self) -> Self {
        self.max(other)
    }
}

///
/// AttributeAnalysis
///

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AttributeAnalysis {
    pub index: usize,
    pub include_in_set: bool,
    pub include_in_lock: bool,
    dirtiness: DirtinessStatus,
}

impl AttributeAnalysis {
    const fn new(index: usize) -> Self {
        Self {
            index,
            include_in_set: false,
            include_in_lock: false,
            dirtiness: DirtinessStatus::NotDirty,
        }
    }

    #[must_use]
    pub const fn dirtiness(&self) -> DirtinessStatus {
        self.dirtiness
    }

    pub fn mark(&mut self, status: DirtinessStatus) {
        self.dirtiness = self.dirtiness.upgrade(status);
    }
}

///
/// LockRestriction
/// One WHERE column carrying an old value; `None` renders `IS NULL`.
///

#[derive(Clone, Debug, PartialEq)]
pub struct LockRestriction {
    pub attribute: usize,
    pub column: String,
    pub value: Option<Value>,
}

///
/// TableAnalysis
///

#[derive(Clone, Debug, Default, PartialEq)]
pub struct TableAnalysis {
    pub index: usize,
    /// Included attributes with at least one column on this table, in order.
    pub set_attributes: Vec<usize>,
    pub locks: Vec<LockRestriction>,
}

///
/// TableSet
///

#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct TableSet(Vec<bool>);

impl TableSet {
    #[must_use]
    pub fn with_capacity(tables: usize) -> Self {
        Self(vec![false; tables])
    }

    pub fn insert(&mut self, table: usize) {
        if let Some(slot) = self.0.get_mut(table) {
            *slot = true;
        }
    }

    #[must_use]
    pub fn contains(&self, table: usize) -> bool {
        self.0.get(table).copied().unwrap_or(false)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        !self.0.iter().any(|member| *member)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.iter().filter(|member| **member).count()
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.0
            .iter()
            .enumerate()
            .filter_map(|(table, member)| member.then_some(table))
    }

    #[must_use]
    pub fn is_subset(&self, other: &Self) -> bool {
        self.iter().all(|table| other.contains(table))
    }
}

///
/// AnalysisInput
///

#[derive(Clone, Copy, Debug)]
pub struct AnalysisInput<'a> {
    pub values: &'a [Slot],
    pub old_version: Option<&'a Value>,
    pub old_values: Option<&'a [Slot]>,
    pub dirty: Option<&'a [usize]>,
    pub force_dynamic: bool,
}

///
/// UpdateValuesAnalysis
///
/// Immutable result of one analysis pass. Created per update call and
/// discarded once the statements are bound.
///

#[derive(Clone, Debug)]
pub struct UpdateValuesAnalysis {
    tables: Vec<TableAnalysis>,
    attributes: Vec<AttributeAnalysis>,
    needing_update: TableSet,
    needing_dynamic_update: TableSet,
    with_non_null_values: TableSet,
    with_previous_non_null_values: TableSet,
}

impl UpdateValuesAnalysis {
    /// Run the analysis.
    ///
    /// `include` selects SET attributes, `lock_include` selects WHERE
    /// attributes and `dirty` classifies included attributes.
    pub fn analyze(
        model: &EntityModel,
        input: AnalysisInput<'_>,
        include: impl Fn(usize) -> bool,
        lock_include: impl Fn(usize) -> bool,
        dirty: impl Fn(usize) -> DirtinessStatus,
    ) -> Result<Self, InternalError> {
        if input.values.len() != model.attribute_count() {
            return Err(InternalError::analysis_invariant(format!(
                "update of '{}' supplied {} values for {} attributes",
                model.path,
                input.values.len(),
                model.attribute_count()
            )));
        }
        if let Some(old) = input.old_values
            && old.len() != model.attribute_count()
        {
            return Err(InternalError::analysis_invariant(format!(
                "update of '{}' supplied {} old values for {} attributes",
                model.path,
                old.len(),
                model.attribute_count()
            )));
        }

        let seed = AnalysisState::seed(model, input.dirty.is_none());
        let state = model.attributes.iter().try_fold(seed, |state, attribute| {
            state.visit(model, attribute, &input, &include, &lock_include, &dirty)
        })?;

        Ok(state.finish(model, &input))
    }

    #[must_use]
    pub fn tables(&self) -> &[TableAnalysis] {
        &self.tables
    }

    #[must_use]
    pub fn table(&self, index: usize) -> Option<&TableAnalysis> {
        self.tables.get(index)
    }

    #[must_use]
    pub fn attributes(&self) -> &[AttributeAnalysis] {
        &self.attributes
    }

    #[must_use]
    pub const fn tables_needing_update(&self) -> &TableSet {
        &self.needing_update
    }

    #[must_use]
    pub const fn tables_needing_dynamic_update(&self) -> &TableSet {
        &self.needing_dynamic_update
    }

    #[must_use]
    pub const fn tables_with_non_null_values(&self) -> &TableSet {
        &self.with_non_null_values
    }

    #[must_use]
    pub const fn tables_with_previous_non_null_values(&self) -> &TableSet {
        &self.with_previous_non_null_values
    }

    /// No table needs a statement.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.needing_update.is_empty()
    }

    #[must_use]
    pub fn needs_dynamic_update(&self) -> bool {
        !self.needing_dynamic_update.is_empty()
    }
}

///
/// AnalysisState
/// Accumulator threaded through the attribute fold.
///

struct AnalysisState {
    tables: Vec<TableAnalysis>,
    attributes: Vec<AttributeAnalysis>,
    needing_update: TableSet,
    with_non_null_values: TableSet,
    with_previous_non_null_values: TableSet,
    /// Tables whose lock shape differs from the static statement.
    irregular_locks: TableSet,
}

impl AnalysisState {
    fn seed(model: &EntityModel, seed_all: bool) -> Self {
        let count = model.tables.len();
        let mut needing_update = TableSet::with_capacity(count);
        if seed_all {
            for table in model.tables.iter().filter(|table| table.mutable) {
                needing_update.insert(table.index);
            }
        }

        Self {
            tables: model
                .tables
                .iter()
                .map(|table| TableAnalysis {
                    index: table.index,
                    ..TableAnalysis::default()
                })
                .collect(),
            attributes: Vec::with_capacity(model.attribute_count()),
            needing_update,
            with_non_null_values: TableSet::with_capacity(count),
            with_previous_non_null_values: TableSet::with_capacity(count),
            irregular_locks: TableSet::with_capacity(count),
        }
    }

    fn visit(
        mut self,
        model: &EntityModel,
        attribute: &AttributeModel,
        input: &AnalysisInput<'_>,
        include: &impl Fn(usize) -> bool,
        lock_include: &impl Fn(usize) -> bool,
        dirty: &impl Fn(usize) -> DirtinessStatus,
    ) -> Result<Self, InternalError> {
        let index = attribute.index;
        let mut analysis = AttributeAnalysis::new(index);

        if include(index) {
            analysis.include_in_set = true;
            analysis.mark(dirty(index));

            let current = input.values[index].value();
            let previous = input
                .old_values
                .and_then(|old| old[index].value());

            for table in attribute.tables() {
                if !model.tables[table].mutable {
                    continue;
                }
                self.tables[table].set_attributes.push(index);

                if analysis.dirtiness() == DirtinessStatus::Dirty {
                    self.needing_update.insert(table);
                }
                if has_non_null_on(attribute, table, current)? {
                    self.with_non_null_values.insert(table);
                }
                if has_non_null_on(attribute, table, previous)? {
                    self.with_previous_non_null_values.insert(table);
                }
            }
        }

        if lock_include(index) {
            analysis.include_in_lock = true;
            self.add_locks(model, attribute, input)?;
        }

        self.attributes.push(analysis);

        Ok(self)
    }

    fn add_locks(
        &mut self,
        model: &EntityModel,
        attribute: &AttributeModel,
        input: &AnalysisInput<'_>,
    ) -> Result<(), InternalError> {
        let index = attribute.index;
        let old = if model.version == Some(index) {
            input
                .old_version
                .or_else(|| input.old_values.and_then(|old| old[index].value()))
        } else {
            input.old_values.and_then(|old| old[index].value())
        };

        // Unfetched old values carry nothing to compare against.
        let Some(old) = old else {
            for table in attribute.tables() {
                self.irregular_locks.insert(table);
            }
            return Ok(());
        };

        for table in attribute.tables() {
            for (column, part) in attribute.column_values(table, old)? {
                let entry = &mut self.tables[table];
                if entry.locks.iter().any(|lock| lock.column == column.name) {
                    continue;
                }
                if part.is_null() {
                    self.irregular_locks.insert(table);
                }
                entry.locks.push(LockRestriction {
                    attribute: index,
                    column: column.name.clone(),
                    value: (!part.is_null()).then(|| part.clone()),
                });
            }
        }

        Ok(())
    }

    fn finish(mut self, model: &EntityModel, input: &AnalysisInput<'_>) -> UpdateValuesAnalysis {
        let style_dynamic = input.force_dynamic
            || (model.dynamic_update && input.dirty.is_some())
            || model.lock_style == OptimisticLockStyle::Dirty;

        // A table with nothing to SET never needs a statement.
        let mut needing_update = TableSet::with_capacity(model.tables.len());
        for table in self.needing_update.iter() {
            if !self.tables[table].set_attributes.is_empty() {
                needing_update.insert(table);
            }
        }
        self.needing_update = needing_update;

        // Dynamic marks are only ever recorded for tables that need an update.
        let mut needing_dynamic_update = TableSet::with_capacity(model.tables.len());
        for table in self.needing_update.iter() {
            if style_dynamic || self.irregular_locks.contains(table) {
                needing_dynamic_update.insert(table);
            }
        }

        UpdateValuesAnalysis {
            tables: self.tables,
            attributes: self.attributes,
            needing_update: self.needing_update,
            needing_dynamic_update,
            with_non_null_values: self.with_non_null_values,
            with_previous_non_null_values: self.with_previous_non_null_values,
        }
    }
}

fn has_non_null_on(
    attribute: &AttributeModel,
    table: usize,
    value: Option<&Value>,
) -> Result<bool, InternalError> {
    let Some(value) = value else {
        return Ok(false);
    };

    Ok(attribute
        .column_values(table, value)?
        .iter()
        .any(|(_, part)| !part.is_null()))
}

#[cfg(test)]
mod tests;
