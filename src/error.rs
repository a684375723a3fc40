//! Engine error types.
//!
//! User errors (`TooManyHoles`, `ArityMismatch`, ...) are surfaced to callers
//! as soft query failures (`QueryResult { success: false, reason }`) and never
//! mutate session state. `Timeout` and `StepLimit` are recoverable: traversals
//! check a shared deadline token and abandon the branch cleanly.

use thiserror::Error;

/// All errors produced by the engine.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    /// Query carries more holes than the configured maximum.
    #[error("Too many holes (max {max})")]
    TooManyHoles { max: usize },

    /// A relation's declared arity was violated.
    #[error("Arity mismatch for '{operator}': declared {declared}, got {actual}")]
    ArityMismatch {
        operator: String,
        declared: usize,
        actual: usize,
    },

    /// Operator is not known to the relation dictionary and strict mode is on.
    #[error("Unknown operator '{0}'")]
    UnknownOperator(String),

    /// An `@name` reference has no registered metadata record.
    #[error("Unresolved reference '@{0}'")]
    UnresolvedReference(String),

    /// A rule conclusion uses a variable that no condition leaf binds.
    #[error("Malformed rule '{rule}': variable '{variable}' in conclusion is not bound by any condition")]
    MalformedRule { rule: String, variable: String },

    /// Statement is structurally unusable (missing operator, variable where
    /// ground term required, malformed compound).
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Per-query deadline exceeded.
    #[error("Timeout")]
    Timeout,

    /// Per-query step budget exceeded.
    #[error("StepLimit")]
    StepLimit,

    /// Persistence failure (I/O or serialisation).
    #[error("Storage error: {0}")]
    Storage(String),

    /// Configuration could not be loaded or failed validation.
    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Whether this error is a resource-limit interruption rather than a
    /// user or system fault. Limit errors may carry partial results.
    pub fn is_limit(&self) -> bool {
        matches!(self, EngineError::Timeout | EngineError::StepLimit)
    }
}
