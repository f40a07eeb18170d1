use derive_more::Display;
use serde::{Deserialize, Serialize};
use tabula_core::{
    config::ConfigError,
    error::{ErrorClass, ErrorOrigin as CoreErrorOrigin, InternalError},
};
use thiserror::Error as ThisError;

///
/// Error
/// Public error type with a stable kind + origin taxonomy.
///

#[derive(Debug, Deserialize, Serialize, ThisError)]
#[error("{message}")]
pub struct Error {
    pub kind: ErrorKind,
    pub origin: ErrorOrigin,
    pub message: String,
}

impl Error {
    pub fn new(kind: ErrorKind, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            kind,
            origin,
            message: message.into(),
        }
    }

    /// The mutation lost an optimistic-lock race and should be retried by the caller.
    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.kind, ErrorKind::Conflict { .. })
    }
}

impl From<InternalError> for Error {
    fn from(err: InternalError) -> Self {
        let kind = match err.class {
            ErrorClass::Conflict => match err.stale_state_detail() {
                Some(detail) => ErrorKind::Conflict {
                    table: Some(detail.table.clone()),
                    expected: detail.expected,
                    actual: detail.actual,
                },
                None => ErrorKind::Conflict {
                    table: None,
                    expected: 0,
                    actual: 0,
                },
            },
            ErrorClass::Config => ErrorKind::Config,
            ErrorClass::Unsupported => ErrorKind::Unsupported,
            ErrorClass::Internal | ErrorClass::InvariantViolation => ErrorKind::Internal,
        };

        Self::new(kind, err.origin.into(), err.message)
    }
}

impl From<ConfigError> for Error {
    fn from(err: ConfigError) -> Self {
        InternalError::from(err).into()
    }
}

///
/// ErrorKind
/// Public error taxonomy for callers.
///

#[derive(Clone, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorKind {
    /// A keyed statement touched an unexpected number of rows.
    #[display("conflict")]
    Conflict {
        table: Option<String>,
        expected: u64,
        actual: u64,
    },

    /// The mapping asks for something the engine does not support.
    #[display("unsupported")]
    Unsupported,

    #[display("config")]
    Config,

    /// The caller cannot remediate this.
    #[display("internal")]
    Internal,
}

///
/// ErrorOrigin
///

#[derive(Clone, Copy, Debug, Deserialize, Display, Eq, PartialEq, Serialize)]
pub enum ErrorOrigin {
    Analysis,
    Collection,
    Config,
    Executor,
    Model,
    Statement,
}

impl From<CoreErrorOrigin> for ErrorOrigin {
    fn from(origin: CoreErrorOrigin) -> Self {
        match origin {
            CoreErrorOrigin::Analysis => Self::Analysis,
            CoreErrorOrigin::Collection => Self::Collection,
            CoreErrorOrigin::Config => Self::Config,
            CoreErrorOrigin::Executor => Self::Executor,
            CoreErrorOrigin::Model => Self::Model,
            CoreErrorOrigin::Statement => Self::Statement,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tabula_core::config::EngineConfig;

    #[test]
    fn statement_failures_are_internal() {
        let err: Error = InternalError::statement_failed("connection reset").into();

        assert_eq!(err.kind, ErrorKind::Internal);
        assert_eq!(err.origin, ErrorOrigin::Statement);
        assert_eq!(err.to_string(), "connection reset");
        assert!(!err.is_conflict());
    }

    #[test]
    fn config_errors_keep_their_origin() {
        let err: Error = EngineConfig::from_toml_str("[mutation]\nbatch_size = \"many\"\n")
            .expect_err("bad batch size should fail")
            .into();

        assert_eq!(err.kind, ErrorKind::Config);
        assert_eq!(err.origin, ErrorOrigin::Config);
    }

    #[test]
    fn error_serializes_kind_and_origin() {
        let err = Error::new(ErrorKind::Unsupported, ErrorOrigin::Model, "no id columns");
        let json = serde_json::to_value(&err).expect("error should serialize");

        assert_eq!(json["kind"], "Unsupported");
        assert_eq!(json["origin"], "Model");
        assert_eq!(json["message"], "no id columns");
        assert_eq!(err.kind.to_string(), "unsupported");
    }
}
