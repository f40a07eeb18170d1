//! Entity update coordination.
//!
//! Chooses between the cached static statement set, a per-call dynamic one
//! and the version-only shortcut, binds values, executes through a pooled
//! executor and verifies affected rows.

use crate::{
    db::{
        dirty,
        mutation::{
            bindings::ParameterBindings,
            executor::ExecutionSummary,
            operation::{
                BatchKey, ColumnValue, Expectation, MutationKind, MutationOperation, MutationOperationGroup,
                OptionalTableUpdate, ParameterUsage, TableMutation,
            },
            statement::StatementPort,
        },
        services::MutationServices,
        update::analysis::{AnalysisInput, DirtinessStatus, UpdateValuesAnalysis},
    },
    error::{ErrorOrigin, InternalError},
    model::{
        attribute::{AttributeModel, ValueGeneration},
        entity::{EntityModel, OptimisticLockStyle},
        table::TableModel,
    },
    obs::sink::{ExecKind, MetricsEvent, Span, UpdatePathKind},
    value::{Slot, Value},
};
use std::{
    borrow::Cow,
    collections::BTreeMap,
    sync::{Arc, OnceLock},
};

///
/// UpdateRequest
///
/// Old and new state of one entity instance, as handed over by the flush.
///

#[derive(Clone, Copy, Debug)]
pub struct UpdateRequest<'a> {
    pub id: &'a Value,
    pub row_id: Option<&'a Value>,
    pub values: &'a [Slot],
    pub old_version: Option<&'a Value>,
    pub old_values: Option<&'a [Slot]>,
    /// `None` means dirtiness is unknown.
    pub dirty: Option<&'a [usize]>,
    pub has_dirty_collection: bool,
    /// The instance is read-only in the current session.
    pub read_only: bool,
}

impl<'a> UpdateRequest<'a> {
    #[must_use]
    pub const fn new(id: &'a Value, values: &'a [Slot]) -> Self {
        Self {
            id,
            row_id: None,
            values,
            old_version: None,
            old_values: None,
            dirty: None,
            has_dirty_collection: false,
            read_only: false,
        }
    }

    #[must_use]
    pub const fn row_id(mut self, row_id: &'a Value) -> Self {
        self.row_id = Some(row_id);
        self
    }

    #[must_use]
    pub const fn old_version(mut self, version: &'a Value) -> Self {
        self.old_version = Some(version);
        self
    }

    #[must_use]
    pub const fn old_values(mut self, values: &'a [Slot]) -> Self {
        self.old_values = Some(values);
        self
    }

    #[must_use]
    pub const fn dirty(mut self, dirty: &'a [usize]) -> Self {
        self.dirty = Some(dirty);
        self
    }

    #[must_use]
    pub const fn dirty_collection(mut self) -> Self {
        self.has_dirty_collection = true;
        self
    }

    #[must_use]
    pub const fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }
}

///
/// UpdateOutcome
///

#[derive(Clone, Debug, PartialEq)]
pub struct UpdateOutcome {
    pub path: UpdatePathKind,
    pub statements: usize,
    pub rows: u64,
    /// Values produced by pre-update generation, by attribute index.
    pub generated: Vec<(usize, Value)>,
}

impl UpdateOutcome {
    fn new(path: UpdatePathKind, summary: ExecutionSummary, generated: Vec<(usize, Value)>) -> Self {
        Self {
            path,
            statements: summary.statements,
            rows: summary.rows,
            generated,
        }
    }
}

///
/// UpdateMask
/// Attributes this call may write, and whether it forces dynamic SQL.
///

struct UpdateMask {
    include: Vec<bool>,
    force_dynamic: bool,
}

///
/// PreparedValues
/// New values and dirty list after pre-update generation.
///

struct PreparedValues<'r> {
    values: Cow<'r, [Slot]>,
    dirty: Option<Cow<'r, [usize]>>,
    generated: Vec<(usize, Value)>,
}

///
/// UpdateCoordinator
///
/// Owns the cached static and version-only groups of one entity type.
/// Cached groups are read-only after construction.
///

#[derive(Debug)]
pub struct UpdateCoordinator {
    model: Arc<EntityModel>,
    services: Arc<MutationServices>,
    /// Per table: column name to (attribute index, position within the attribute).
    columns: Vec<BTreeMap<String, (usize, usize)>>,
    column_masks: Vec<Vec<bool>>,
    static_group: MutationOperationGroup,
    static_row_id_group: OnceLock<MutationOperationGroup>,
    version_group: Option<MutationOperationGroup>,
    batch_key: Option<BatchKey>,
    version_batch_key: Option<BatchKey>,
}

impl UpdateCoordinator {
    pub fn new(model: Arc<EntityModel>, services: Arc<MutationServices>) -> Result<Self, InternalError> {
        let mut columns = vec![BTreeMap::new(); model.tables.len()];
        for attribute in &model.attributes {
            for (position, column) in attribute.columns.iter().enumerate() {
                columns[column.table_index].insert(column.name.clone(), (attribute.index, position));
            }
        }

        let static_group = build_static_group(&model, &services, false)?;
        let version_group = model
            .version
            .map(|_| build_version_group(&model, &services, false))
            .transpose()?;

        let batching = services.config().batching_enabled() && !model.has_update_generated_values();
        let batch_key = batching.then(|| BatchKey::new(&model.path, MutationKind::Update));
        let version_batch_key = batching.then(|| BatchKey::new(&model.path, "VERSION"));

        Ok(Self {
            columns,
            column_masks: model.column_updatability(),
            static_group,
            static_row_id_group: OnceLock::new(),
            version_group,
            batch_key,
            version_batch_key,
            model,
            services,
        })
    }

    #[must_use]
    pub fn model(&self) -> &EntityModel {
        &self.model
    }

    #[must_use]
    pub const fn static_group(&self) -> &MutationOperationGroup {
        &self.static_group
    }

    #[must_use]
    pub const fn version_group(&self) -> Option<&MutationOperationGroup> {
        self.version_group.as_ref()
    }

    #[must_use]
    pub const fn batch_key(&self) -> Option<&BatchKey> {
        self.batch_key.as_ref()
    }

    /// Persist the difference between old and new state of one instance.
    pub fn coordinate_update<P>(
        &self,
        port: &mut P,
        request: &UpdateRequest<'_>,
    ) -> Result<UpdateOutcome, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        let model = &*self.model;
        let mut span = Span::new(
            ExecKind::Update,
            &model.path,
            self.services.config().track_metrics,
        );
        self.check_arity(request)?;

        // 1. version-only shortcut
        if let Some(new_version) = self.version_only_target(request)? {
            // an explicit null old version locks with IS NULL; a missing one is a caller bug
            let old_version = self.old_version(request).ok_or_else(|| {
                InternalError::analysis_invariant(format!(
                    "version-only update of '{}' without an old version",
                    model.path
                ))
            })?;
            let summary = self.update_version(port, request.id, Some(old_version), new_version)?;

            return Ok(self.finish(&mut span, UpdatePathKind::VersionOnly, summary, Vec::new()));
        }

        self.check_lock_inputs(request)?;

        // 2. pre-update generation
        let PreparedValues {
            values,
            dirty,
            generated,
        } = self.generate_values(request)?;
        let dirty = dirty.as_deref();

        // 3. updatability mask
        let mask = self.update_mask(request, &values, dirty);

        // 4. analysis
        let analysis = UpdateValuesAnalysis::analyze(
            model,
            AnalysisInput {
                values: &values,
                old_version: self.old_version(request),
                old_values: request.old_values,
                dirty,
                force_dynamic: mask.force_dynamic,
            },
            |index| mask.include[index],
            |index| self.lock_include(index, dirty),
            |index| self.dirtiness(index, dirty, request.has_dirty_collection),
        )?;

        // 5. execute
        if analysis.is_noop() {
            tracing::debug!(entity = %model.path, "no tables to update");

            return Ok(self.finish(
                &mut span,
                UpdatePathKind::Skipped,
                ExecutionSummary::default(),
                generated,
            ));
        }

        let use_row_id = self.services.config().use_row_id
            && model.row_id_column.is_some()
            && request.row_id.is_some();
        let executors = self.services.executors();

        if analysis.needs_dynamic_update() {
            let group = self.build_dynamic_group(&analysis, use_row_id)?;
            let summary = executors.with_executor(&group, None, |executor| {
                self.bind_group(executor.bindings(), &group, &analysis, &values, request, use_row_id)?;
                executor.execute(port)
            })?;

            Ok(self.finish(&mut span, UpdatePathKind::Dynamic, summary, generated))
        } else {
            let group = self.static_group_for(use_row_id)?;
            let needing = analysis.tables_needing_update();
            let summary = executors.with_executor(group, self.batch_key.as_ref(), |executor| {
                self.bind_group(executor.bindings(), group, &analysis, &values, request, use_row_id)?;
                executor.execute_where(port, |operation| {
                    let table = operation.table_index();
                    needing.contains(table) && !self.is_absent_optional(&analysis, table)
                })
            })?;

            Ok(self.finish(&mut span, UpdatePathKind::Static, summary, generated))
        }
    }

    /// Increment the version of an otherwise unchanged instance.
    pub fn force_version_increment<P>(
        &self,
        port: &mut P,
        id: &Value,
        current_version: &Value,
        next_version: &Value,
    ) -> Result<u64, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        if self.model.version.is_none() {
            return Err(InternalError::unsupported(
                ErrorOrigin::Executor,
                format!(
                    "cannot force version increment on non-versioned entity '{}'",
                    self.model.path
                ),
            ));
        }

        let mut span = Span::new(
            ExecKind::VersionIncrement,
            &self.model.path,
            self.services.config().track_metrics,
        );
        let summary = self.update_version(port, id, Some(current_version), next_version)?;
        span.add(summary.statements, summary.rows);
        span.record(MetricsEvent::UpdatePath {
            path: &self.model.path,
            kind: UpdatePathKind::VersionOnly,
        });

        Ok(summary.rows)
    }

    fn finish(
        &self,
        span: &mut Span<'_>,
        path: UpdatePathKind,
        summary: ExecutionSummary,
        generated: Vec<(usize, Value)>,
    ) -> UpdateOutcome {
        span.add(summary.statements, summary.rows);
        span.record(MetricsEvent::UpdatePath {
            path: &self.model.path,
            kind: path,
        });
        tracing::debug!(
            entity = %self.model.path,
            path = %path,
            statements = summary.statements,
            rows = summary.rows,
            "coordinated update"
        );

        UpdateOutcome::new(path, summary, generated)
    }

    fn check_arity(&self, request: &UpdateRequest<'_>) -> Result<(), InternalError> {
        let expected = self.model.attribute_count();
        if request.values.len() != expected
            || request.old_values.is_some_and(|old| old.len() != expected)
        {
            return Err(InternalError::analysis_invariant(format!(
                "update of '{}' expects {expected} attribute values",
                self.model.path
            )));
        }
        if let Some(dirty) = request.dirty
            && let Some(index) = dirty.iter().find(|index| **index >= expected)
        {
            return Err(InternalError::analysis_invariant(format!(
                "dirty attribute index {index} out of range for '{}'",
                self.model.path
            )));
        }

        Ok(())
    }

    fn check_lock_inputs(&self, request: &UpdateRequest<'_>) -> Result<(), InternalError> {
        let model = &*self.model;
        match model.lock_style {
            OptimisticLockStyle::All | OptimisticLockStyle::Dirty if request.old_values.is_none() => {
                Err(InternalError::unsupported(
                    ErrorOrigin::Analysis,
                    format!(
                        "optimistic-lock style '{}' of '{}' requires the previous state",
                        model.lock_style, model.path
                    ),
                ))
            }
            OptimisticLockStyle::Version if self.old_version(request).is_none() => {
                Err(InternalError::analysis_invariant(format!(
                    "versioned update of '{}' without an old version",
                    model.path
                )))
            }
            _ => Ok(()),
        }
    }

    fn old_version<'r>(&self, request: &UpdateRequest<'r>) -> Option<&'r Value> {
        let index = self.model.version?;

        request
            .old_version
            .or_else(|| request.old_values.and_then(|old| old[index].value()))
    }

    /// New version value when only the version changed.
    fn version_only_target<'r>(
        &self,
        request: &UpdateRequest<'r>,
    ) -> Result<Option<&'r Value>, InternalError> {
        let Some(version) = self.model.version else {
            return Ok(None);
        };
        let Some(new_version) = request.values[version].value() else {
            return Ok(None);
        };

        let eligible = match (request.dirty, request.old_values) {
            (Some(dirty), _) => dirty == [version],
            (None, Some(old)) if request.has_dirty_collection => {
                self.old_version(request) != Some(new_version)
                    && dirty::find_dirty(
                        &self.model.attributes,
                        request.values,
                        old,
                        &self.column_masks,
                    )
                    .is_none_or(|changed| changed == [version])
            }
            (None, _) => false,
        };

        Ok(eligible.then_some(new_version))
    }

    fn update_version<P>(
        &self,
        port: &mut P,
        id: &Value,
        old_version: Option<&Value>,
        new_version: &Value,
    ) -> Result<ExecutionSummary, InternalError>
    where
        P: StatementPort + ?Sized,
    {
        let model = &*self.model;
        let (Some(version), Some(cached)) = (model.version_attribute(), self.version_group.as_ref())
        else {
            return Err(InternalError::unsupported(
                ErrorOrigin::Executor,
                format!("entity '{}' has no version attribute", model.path),
            ));
        };

        let old_version = old_version.filter(|old| !old.is_null());
        let adhoc;
        let group = if old_version.is_some() {
            cached
        } else {
            adhoc = build_version_group(model, &self.services, true)?;
            &adhoc
        };

        let table = model.identifier_table();
        let column = &version.columns[0].name;

        self.services
            .executors()
            .with_executor(group, self.version_batch_key.as_ref(), |executor| {
                let bindings = executor.bindings();
                bind_keys(bindings, table, id)?;
                bindings.bind_set(&table.name, column, new_version.clone());
                if let Some(old) = old_version {
                    bindings.bind_restriction(&table.name, column, old.clone());
                }

                executor.execute(port)
            })
    }

    fn generate_values<'r>(
        &self,
        request: &UpdateRequest<'r>,
    ) -> Result<PreparedValues<'r>, InternalError> {
        let mut values = Cow::Borrowed(request.values);
        let mut dirty = request.dirty.map(Cow::Borrowed);
        let mut generated = Vec::new();

        for attribute in &self.model.attributes {
            let ValueGeneration::BeforeExecution(generator) = &attribute.generation else {
                continue;
            };
            if !attribute.updatable {
                continue;
            }

            let index = attribute.index;
            let value = generator.generate(values[index].value())?;
            values.to_mut()[index] = Slot::Loaded(value.clone());
            if let Some(dirty) = dirty.as_mut()
                && !dirty.contains(&index)
            {
                dirty.to_mut().push(index);
            }
            generated.push((index, value));
        }

        Ok(PreparedValues {
            values,
            dirty,
            generated,
        })
    }

    fn update_mask(&self, request: &UpdateRequest<'_>, values: &[Slot], dirty: Option<&[usize]>) -> UpdateMask {
        let model = &*self.model;
        let writable = |attribute: &AttributeModel| attribute.updatable || attribute.writes_value_in_sql();
        let is_dirty = |index: usize| dirty.is_some_and(|dirty| dirty.contains(&index));
        let collection_version =
            |index: usize| request.has_dirty_collection && model.version == Some(index);

        let (include, force_dynamic) = if model.dynamic_update && dirty.is_some() {
            let include = model
                .attributes
                .iter()
                .map(|attribute| {
                    writable(attribute)
                        && (is_dirty(attribute.index)
                            || collection_version(attribute.index)
                            || attribute.writes_value_in_sql())
                })
                .collect();
            (include, true)
        } else if request.read_only || !model.mutable {
            let include = model
                .attributes
                .iter()
                .map(|attribute| writable(attribute) && is_dirty(attribute.index))
                .collect();
            (include, true)
        } else if values.iter().any(Slot::is_unfetched) {
            let include = model
                .attributes
                .iter()
                .map(|attribute| {
                    writable(attribute)
                        && !values[attribute.index].is_unfetched()
                        && (is_dirty(attribute.index)
                            || !attribute.lazy
                            || attribute.writes_value_in_sql())
                })
                .collect();
            (include, true)
        } else {
            (model.attributes.iter().map(writable).collect(), false)
        };

        UpdateMask {
            include,
            force_dynamic,
        }
    }

    fn lock_include(&self, index: usize, dirty: Option<&[usize]>) -> bool {
        let model = &*self.model;
        let attribute = &model.attributes[index];

        match model.lock_style {
            OptimisticLockStyle::None => false,
            OptimisticLockStyle::Version => model.version == Some(index),
            OptimisticLockStyle::All => attribute.versionable,
            OptimisticLockStyle::Dirty => {
                attribute.versionable && dirty.is_some_and(|dirty| dirty.contains(&index))
            }
        }
    }

    fn dirtiness(&self, index: usize, dirty: Option<&[usize]>, has_dirty_collection: bool) -> DirtinessStatus {
        let Some(dirty) = dirty else {
            return DirtinessStatus::ConsiderLikeDirty;
        };

        if dirty.contains(&index) || (has_dirty_collection && self.model.version == Some(index)) {
            DirtinessStatus::Dirty
        } else if self.model.attributes[index].writes_value_in_sql() {
            DirtinessStatus::ConsiderLikeDirty
        } else {
            DirtinessStatus::NotDirty
        }
    }

    fn static_group_for(&self, use_row_id: bool) -> Result<&MutationOperationGroup, InternalError> {
        if !use_row_id {
            return Ok(&self.static_group);
        }
        if let Some(group) = self.static_row_id_group.get() {
            return Ok(group);
        }

        let group = build_static_group(&self.model, &self.services, true)?;

        Ok(self.static_row_id_group.get_or_init(|| group))
    }

    /// Optional table whose row neither existed with values nor gets any now.
    fn is_absent_optional(&self, analysis: &UpdateValuesAnalysis, table: usize) -> bool {
        self.model.tables.get(table).is_some_and(|mapping| mapping.optional)
            && !analysis.tables_with_non_null_values().contains(table)
            && !analysis
                .tables_with_previous_non_null_values()
                .contains(table)
    }

    fn build_dynamic_group(
        &self,
        analysis: &UpdateValuesAnalysis,
        use_row_id: bool,
    ) -> Result<MutationOperationGroup, InternalError> {
        let model = &*self.model;
        let mut operations = Vec::with_capacity(model.tables.len());

        for table in &model.tables {
            let skipped = || MutationOperation::Skipped {
                table: table.name.clone(),
                table_index: table.index,
            };

            if !analysis.tables_needing_update().contains(table.index) {
                operations.push(skipped());
                continue;
            }

            // Custom statement text only fits the full static value set.
            if table.custom_update_sql.is_some() {
                let operation = self
                    .static_group_for(use_row_id)?
                    .operation_for(table.index)
                    .cloned()
                    .unwrap_or_else(skipped);
                operations.push(operation);
                continue;
            }

            if self.is_absent_optional(analysis, table.index) {
                operations.push(skipped());
                continue;
            }

            let Some(entry) = analysis.table(table.index) else {
                operations.push(skipped());
                continue;
            };
            let locks: Vec<(&str, bool)> = entry
                .locks
                .iter()
                .map(|lock| (lock.column.as_str(), lock.value.is_none()))
                .collect();

            operations.push(table_update(
                model,
                &self.services,
                table,
                &entry.set_attributes,
                &locks,
                use_row_id,
            ));
        }

        MutationOperationGroup::new(&model.path, MutationKind::Update, operations)
    }

    fn bind_group(
        &self,
        bindings: &mut ParameterBindings,
        group: &MutationOperationGroup,
        analysis: &UpdateValuesAnalysis,
        values: &[Slot],
        request: &UpdateRequest<'_>,
        use_row_id: bool,
    ) -> Result<(), InternalError> {
        for operation in group.operations() {
            let index = operation.table_index();
            if operation.is_skipped() || !analysis.tables_needing_update().contains(index) {
                continue;
            }

            let table = &self.model.tables[index];
            let restrictions = self.restriction_values(table, analysis, values, request, use_row_id)?;

            for mutation in operation.statements() {
                for (usage, column) in mutation.parameters() {
                    let value = match usage {
                        ParameterUsage::Set => self.set_value(index, column, values)?,
                        ParameterUsage::Restrict => {
                            restrictions.get(column).cloned().ok_or_else(|| {
                                InternalError::analysis_invariant(format!(
                                    "no restriction value for column '{column}' of table '{}' ({})",
                                    table.name, self.model.path
                                ))
                            })?
                        }
                    };
                    bindings.bind(&table.name, column, usage, value);
                }
            }
        }

        Ok(())
    }

    fn set_value(&self, table: usize, column: &str, values: &[Slot]) -> Result<Value, InternalError> {
        let (index, position) = self.columns[table].get(column).copied().ok_or_else(|| {
            InternalError::analysis_invariant(format!(
                "column '{column}' is not mapped by '{}'",
                self.model.path
            ))
        })?;
        let attribute = &self.model.attributes[index];

        let Slot::Loaded(value) = &values[index] else {
            return Err(InternalError::analysis_invariant(format!(
                "attribute '{}' of '{}' is unfetched but bound for update",
                attribute.name, self.model.path
            )));
        };

        value
            .columns(attribute.column_span())
            .and_then(|parts| parts.get(position).map(|part| (*part).clone()))
            .ok_or_else(|| {
                InternalError::analysis_invariant(format!(
                    "value of attribute '{}' does not span its columns: {value}",
                    attribute.name
                ))
            })
    }

    fn restriction_values(
        &self,
        table: &TableModel,
        analysis: &UpdateValuesAnalysis,
        values: &[Slot],
        request: &UpdateRequest<'_>,
        use_row_id: bool,
    ) -> Result<BTreeMap<String, Value>, InternalError> {
        let model = &*self.model;
        let mut out = BTreeMap::new();

        if use_row_id
            && table.is_identifier_table()
            && let (Some(column), Some(row_id)) = (&model.row_id_column, request.row_id)
        {
            out.insert(column.clone(), row_id.clone());
        }
        for (column, part) in key_parts(table, request.id)? {
            out.insert(column.clone(), part.clone());
        }

        if let Some(entry) = analysis.table(table.index) {
            for lock in &entry.locks {
                if let Some(value) = &lock.value {
                    out.entry(lock.column.clone()).or_insert_with(|| value.clone());
                }
            }
        }

        for attribute in model.partition_attributes() {
            if !attribute.maps_to_table(table.index) {
                continue;
            }
            let source = request
                .old_values
                .and_then(|old| old[attribute.index].value())
                .or_else(|| values[attribute.index].value());
            if let Some(value) = source {
                for (column, part) in attribute.column_values(table.index, value)? {
                    out.entry(column.name.clone()).or_insert_with(|| part.clone());
                }
            }
        }

        Ok(out)
    }
}

fn key_parts<'t, 'v>(
    table: &'t TableModel,
    id: &'v Value,
) -> Result<impl Iterator<Item = (&'t String, &'v Value)>, InternalError> {
    let parts = id.columns(table.key_columns.len()).ok_or_else(|| {
        InternalError::analysis_invariant(format!(
            "identifier {id} does not span the key columns of table '{}'",
            table.name
        ))
    })?;

    Ok(table.key_columns.iter().zip(parts))
}

fn bind_keys(
    bindings: &mut ParameterBindings,
    table: &TableModel,
    id: &Value,
) -> Result<(), InternalError> {
    for (column, part) in key_parts(table, id)? {
        bindings.bind_restriction(&table.name, column, part.clone());
    }

    Ok(())
}

/// Static statement set: every writable attribute, lock columns per style.
fn build_static_group(
    model: &EntityModel,
    services: &MutationServices,
    use_row_id: bool,
) -> Result<MutationOperationGroup, InternalError> {
    let operations = model
        .tables
        .iter()
        .map(|table| {
            if !table.mutable {
                return MutationOperation::Skipped {
                    table: table.name.clone(),
                    table_index: table.index,
                };
            }

            let sets: Vec<usize> = table
                .attributes
                .iter()
                .copied()
                .filter(|index| {
                    let attribute = &model.attributes[*index];
                    attribute.updatable || attribute.writes_value_in_sql()
                })
                .collect();
            let locks = static_locks(model, table);

            table_update(model, services, table, &sets, &locks, use_row_id)
        })
        .collect();

    MutationOperationGroup::new(&model.path, MutationKind::Update, operations)
}

fn static_locks<'m>(model: &'m EntityModel, table: &TableModel) -> Vec<(&'m str, bool)> {
    let columns_of = |attribute: &'m AttributeModel| {
        attribute
            .columns
            .iter()
            .filter(|column| column.table_index == table.index)
            .map(|column| (column.name.as_str(), false))
    };

    match model.lock_style {
        OptimisticLockStyle::None | OptimisticLockStyle::Dirty => Vec::new(),
        OptimisticLockStyle::Version => model
            .version_attribute()
            .map(|version| columns_of(version).collect())
            .unwrap_or_default(),
        OptimisticLockStyle::All => model
            .attributes
            .iter()
            .filter(|attribute| attribute.versionable)
            .flat_map(columns_of)
            .collect(),
    }
}

/// Shape one table's UPDATE. Optional tables get insert/delete companions.
fn table_update(
    model: &EntityModel,
    services: &MutationServices,
    table: &TableModel,
    sets: &[usize],
    locks: &[(&str, bool)],
    use_row_id: bool,
) -> MutationOperation {
    let mut builder = TableMutation::builder(&table.name, table.index, MutationKind::Update);

    for attribute in sets.iter().map(|index| &model.attributes[*index]) {
        for column in attribute
            .columns
            .iter()
            .filter(|column| column.table_index == table.index && column.updatable)
        {
            match &attribute.generation {
                ValueGeneration::OnExecution { sql: Some(expression) } => {
                    builder.assign(&column.name, ColumnValue::Sql(expression.clone()));
                }
                _ => {
                    builder.assign_param(&column.name);
                }
            }
        }
    }

    if !builder.has_assignments() {
        return MutationOperation::Skipped {
            table: table.name.clone(),
            table_index: table.index,
        };
    }

    let mut restricted: Vec<&str> = Vec::new();
    match (&model.row_id_column, use_row_id && table.is_identifier_table()) {
        (Some(row_id), true) => {
            builder.restrict(row_id);
            restricted.push(row_id);
        }
        _ => {
            for key in &table.key_columns {
                builder.restrict(key);
                restricted.push(key);
            }
        }
    }
    for &(column, is_null) in locks {
        if restricted.contains(&column) {
            continue;
        }
        if is_null {
            builder.restrict_null(column);
        } else {
            builder.restrict(column);
        }
        restricted.push(column);
    }
    for attribute in model.partition_attributes() {
        for column in attribute
            .columns
            .iter()
            .filter(|column| column.table_index == table.index)
        {
            if !restricted.contains(&column.name.as_str()) {
                builder.restrict(&column.name);
                restricted.push(&column.name);
            }
        }
    }

    if let Some(sql) = &table.custom_update_sql {
        builder.custom_sql(sql);
    }

    if table.optional {
        let update = builder.build(services.sql());

        return MutationOperation::OptionalTable(OptionalTableUpdate::from_update(
            update,
            &table.key_columns,
            services.sql(),
        ));
    }

    builder.expect(Expectation::RowCount(1));

    MutationOperation::Table(builder.build(services.sql()))
}

/// `UPDATE <identifier table> SET version=? WHERE <keys> AND version=?`.
fn build_version_group(
    model: &EntityModel,
    services: &MutationServices,
    null_old_version: bool,
) -> Result<MutationOperationGroup, InternalError> {
    let version = model.version_attribute().ok_or_else(|| {
        InternalError::model_invariant(format!("entity '{}' has no version attribute", model.path))
    })?;
    let table = model.identifier_table();
    let column = &version.columns[0].name;

    let mut builder = TableMutation::builder(&table.name, table.index, MutationKind::Update);
    builder.assign_param(column);
    for key in &table.key_columns {
        builder.restrict(key);
    }
    if null_old_version {
        builder.restrict_null(column);
    } else {
        builder.restrict(column);
    }
    builder.expect(Expectation::RowCount(1));

    MutationOperationGroup::new(
        &model.path,
        MutationKind::Update,
        vec![MutationOperation::Table(builder.build(services.sql()))],
    )
}

#[cfg(test)]
mod tests;
