//! Engine configuration.
//!
//! Loaded from TOML by the embedding application; every field has a default
//! so an empty document is a valid configuration.

use crate::error::{ErrorClass, ErrorOrigin, InternalError};
use serde::Deserialize;
use thiserror::Error as ThisError;

///
/// EngineConfig
///

#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    #[serde(default)]
    pub mutation: MutationConfig,
}

impl EngineConfig {
    /// Parse and validate a TOML configuration document.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;

        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.mutation.batch_size > MutationConfig::MAX_BATCH_SIZE {
            return Err(ConfigError::BatchSizeTooLarge {
                batch_size: self.mutation.batch_size,
                max: MutationConfig::MAX_BATCH_SIZE,
            });
        }

        Ok(())
    }
}

///
/// MutationConfig
///
/// `batch_size <= 1` disables batch keys entirely.
///

#[derive(Clone, Debug, Deserialize, Eq, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct MutationConfig {
    pub batch_size: u32,
    pub use_row_id: bool,
    pub track_metrics: bool,
}

impl MutationConfig {
    pub const MAX_BATCH_SIZE: u32 = 10_000;

    #[must_use]
    pub const fn batching_enabled(&self) -> bool {
        self.batch_size > 1
    }
}

impl Default for MutationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1,
            use_row_id: true,
            track_metrics: true,
        }
    }
}

///
/// ConfigError
///

#[derive(Debug, ThisError)]
pub enum ConfigError {
    #[error("invalid engine configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("batch_size {batch_size} exceeds maximum {max}")]
    BatchSizeTooLarge { batch_size: u32, max: u32 },
}

impl From<ConfigError> for InternalError {
    fn from(err: ConfigError) -> Self {
        Self::new(ErrorClass::Config, ErrorOrigin::Config, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_uses_defaults() {
        let config = EngineConfig::from_toml_str("").expect("empty config should parse");

        assert_eq!(config, EngineConfig::default());
        assert!(!config.mutation.batching_enabled());
        assert!(config.mutation.use_row_id);
    }

    #[test]
    fn mutation_section_overrides_defaults() {
        let config = EngineConfig::from_toml_str(
            r"
            [mutation]
            batch_size = 50
            use_row_id = false
            ",
        )
        .expect("config should parse");

        assert_eq!(config.mutation.batch_size, 50);
        assert!(config.mutation.batching_enabled());
        assert!(!config.mutation.use_row_id);
        assert!(config.mutation.track_metrics);
    }

    #[test]
    fn unknown_fields_are_rejected() {
        let err = EngineConfig::from_toml_str("[mutation]\nbatch = 3\n")
            .expect_err("unknown field should be rejected");

        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn oversized_batch_converts_to_config_error() {
        let err = EngineConfig::from_toml_str("[mutation]\nbatch_size = 20000\n")
            .expect_err("batch size should be bounded");
        let internal = InternalError::from(err);

        assert_eq!(internal.class, ErrorClass::Config);
        assert_eq!(internal.origin, ErrorOrigin::Config);
    }
}
