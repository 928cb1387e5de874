use crate::mapping::StorageType;
use thiserror::Error;

/// Failure taxonomy for the persistence engine.
///
/// Every public operation either completes its documented side effect or
/// fails with one of these kinds; nothing is swallowed or retried.
#[derive(Error, Debug)]
pub enum OrmError {
    #[error("mapping for entity '{0}' is already registered")]
    DuplicateMapping(String),

    #[error("invalid mapping: {0}")]
    InvalidMapping(String),

    #[error("no mapping registered for entity '{0}'")]
    UnknownEntity(String),

    /// An existing table is incompatible with the registered mapping.
    /// Non-retryable; requires operator action or forced recreation.
    #[error("schema mismatch for table '{table}': {reason}")]
    SchemaMismatch { table: String, reason: String },

    #[error("unknown field '{field}' for entity '{entity}'")]
    UnknownField { entity: String, field: String },

    #[error("literal '{literal}' is not a valid {expected} for field '{field}'")]
    LiteralTypeMismatch {
        field: String,
        expected: StorageType,
        literal: String,
    },

    #[error("predicate syntax error: {0}")]
    PredicateSyntax(String),

    #[error("value for field '{field}' is not a valid {expected}")]
    ValueTypeMismatch {
        field: String,
        expected: StorageType,
    },

    #[error("missing value for non-nullable field '{field}'")]
    MissingValue { field: String },

    #[error("a row with the same primary key already exists for entity '{entity}'")]
    DuplicateKey { entity: String },

    #[error("no row matches the primary key of entity '{entity}'")]
    NotFound { entity: String },

    /// Driver-level unique/primary-key constraint violation. The engine
    /// attributes this to [`OrmError::DuplicateKey`] where it can.
    #[error("unique constraint violated: {0}")]
    ConstraintViolation(String),

    /// Driver-level failure, potentially transient. The core propagates
    /// it as-is so a caller may decide to retry.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
}

pub type Result<T> = std::result::Result<T, OrmError>;
