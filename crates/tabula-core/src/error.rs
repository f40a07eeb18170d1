use std::fmt;
use thiserror::Error as ThisError;

///
/// InternalError
///
/// Structured runtime error with a stable internal classification.
/// Not a stable API; intended for internal use and may change without notice.
///

#[derive(Debug, ThisError)]
#[error("{message}")]
pub struct InternalError {
    pub class: ErrorClass,
    pub origin: ErrorOrigin,
    pub message: String,

    /// Optional structured error detail.
    /// The variant (if present) must correspond to `class`.
    pub detail: Option<ErrorDetail>,
}

impl InternalError {
    /// Construct an InternalError without structured detail.
    pub fn new(class: ErrorClass, origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self {
            class,
            origin,
            message: message.into(),
            detail: None,
        }
    }

    /// Construct a model-origin invariant violation.
    pub(crate) fn model_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Model,
            message.into(),
        )
    }

    /// Construct an analysis-origin invariant violation.
    pub(crate) fn analysis_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Analysis,
            message.into(),
        )
    }

    /// Construct an executor-origin invariant violation.
    pub(crate) fn executor_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Executor,
            message.into(),
        )
    }

    /// Construct a collection-origin invariant violation.
    pub(crate) fn collection_invariant(message: impl Into<String>) -> Self {
        Self::new(
            ErrorClass::InvariantViolation,
            ErrorOrigin::Collection,
            message.into(),
        )
    }

    /// Construct an executor-origin internal error.
    pub(crate) fn executor_internal(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Executor, message.into())
    }

    /// Construct an unsupported error for a specific origin.
    pub(crate) fn unsupported(origin: ErrorOrigin, message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Unsupported, origin, message.into())
    }

    /// Construct a statement-origin failure.
    ///
    /// Statement ports (the connection layer) use this to surface driver errors.
    pub fn statement_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorClass::Internal, ErrorOrigin::Statement, message.into())
    }

    /// Construct an optimistic-lock conflict for one table mutation.
    pub(crate) fn stale_state(
        path: impl Into<String>,
        table: impl Into<String>,
        expected: u64,
        actual: u64,
    ) -> Self {
        let detail = StaleStateError {
            path: path.into(),
            table: table.into(),
            expected,
            actual,
        };

        Self {
            class: ErrorClass::Conflict,
            origin: ErrorOrigin::Executor,
            message: detail.to_string(),
            detail: Some(ErrorDetail::StaleState(detail)),
        }
    }

    #[must_use]
    pub const fn is_conflict(&self) -> bool {
        matches!(self.class, ErrorClass::Conflict)
    }

    /// Borrow the stale-state detail, if this error is an optimistic-lock conflict.
    #[must_use]
    pub const fn stale_state_detail(&self) -> Option<&StaleStateError> {
        match &self.detail {
            Some(ErrorDetail::StaleState(detail)) => Some(detail),
            _ => None,
        }
    }

    #[must_use]
    pub fn display_with_class(&self) -> String {
        format!("{}:{}: {}", self.origin, self.class, self.message)
    }
}

///
/// ErrorDetail
///
/// Structured, class-specific error detail carried by [`InternalError`].
///

#[derive(Debug, ThisError)]
pub enum ErrorDetail {
    #[error("{0}")]
    StaleState(StaleStateError),
}

///
/// StaleStateError
///
/// A keyed mutation touched a different number of rows than expected.
/// Never returned directly; always wrapped in [`ErrorDetail::StaleState`].
///

#[derive(Clone, Debug, Eq, PartialEq, ThisError)]
#[error(
    "row was updated or deleted by another transaction: {path} on table '{table}' (expected {expected} row(s), got {actual})"
)]
pub struct StaleStateError {
    pub path: String,
    pub table: String,
    pub expected: u64,
    pub actual: u64,
}

///
/// ErrorClass
/// Internal error taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorClass {
    Conflict,
    Config,
    Internal,
    InvariantViolation,
    Unsupported,
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Conflict => "conflict",
            Self::Config => "config",
            Self::Internal => "internal",
            Self::InvariantViolation => "invariant_violation",
            Self::Unsupported => "unsupported",
        };
        write!(f, "{label}")
    }
}

///
/// ErrorOrigin
/// Internal origin taxonomy for runtime classification.
/// Not a stable API; may change without notice.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ErrorOrigin {
    Analysis,
    Collection,
    Config,
    Executor,
    Model,
    Statement,
}

impl fmt::Display for ErrorOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Analysis => "analysis",
            Self::Collection => "collection",
            Self::Config => "config",
            Self::Executor => "executor",
            Self::Model => "model",
            Self::Statement => "statement",
        };
        write!(f, "{label}")
    }
}
