use crate::{
    config::{EngineConfig, MutationConfig},
    db::mutation::{
        executor::MutationExecutorService,
        sql::{MutationSqlBuilder, StandardSqlBuilder},
    },
};
use std::sync::Arc;

///
/// MutationServices
///
/// Shared collaborators of every coordinator: the statement text builder,
/// the executor pool, and the mutation configuration.
///

#[derive(Debug)]
pub struct MutationServices {
    sql: Arc<dyn MutationSqlBuilder>,
    executors: MutationExecutorService,
    config: MutationConfig,
}

impl MutationServices {
    #[must_use]
    pub fn new(config: &EngineConfig) -> Self {
        Self::with_sql_builder(config, Arc::new(StandardSqlBuilder))
    }

    #[must_use]
    pub fn with_sql_builder(config: &EngineConfig, sql: Arc<dyn MutationSqlBuilder>) -> Self {
        Self {
            sql,
            executors: MutationExecutorService::new(config.mutation.track_metrics),
            config: config.mutation.clone(),
        }
    }

    #[must_use]
    pub fn sql(&self) -> &dyn MutationSqlBuilder {
        self.sql.as_ref()
    }

    #[must_use]
    pub const fn executors(&self) -> &MutationExecutorService {
        &self.executors
    }

    #[must_use]
    pub const fn config(&self) -> &MutationConfig {
        &self.config
    }
}

impl Default for MutationServices {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}
