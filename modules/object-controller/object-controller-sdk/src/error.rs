//! Error types for the object controller and its collaborators.

use thiserror::Error;

/// Errors returned by `ObjectControllerClient` operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObjectControllerError {
    /// Malformed boolean structure, query on `ACL`, bad regex options.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    /// Malformed field name in a query, sort or update.
    #[error("invalid key name: {0}")]
    InvalidKeyName(String),

    /// Update value with `$` or `.` inside a nested key.
    #[error("invalid nested key: {0}")]
    InvalidNestedKey(String),

    #[error("invalid class name: {0}")]
    InvalidClassName(String),

    /// Malformed operator payload or ACL.
    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    /// Field value does not match the schema type.
    #[error("incorrect type for field '{field}': expected {expected}")]
    IncorrectType { field: String, expected: String },

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    #[error("object not found")]
    ObjectNotFound,

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("class {class_name} is not empty, contains {count} objects, cannot drop schema")]
    ClassNotEmpty { class_name: String, count: u64 },

    /// Commit/abort with no open session, or begin while one is open.
    #[error("invalid transaction state: {0}")]
    InvalidTransactionState(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Errors reported by a schema registry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("class '{class_name}' does not exist")]
    ClassNotFound { class_name: String },

    #[error("invalid class name: {class_name}")]
    InvalidClassName { class_name: String },

    #[error("permission denied for action {operation} on class {class_name}")]
    PermissionDenied {
        class_name: String,
        operation: String,
    },

    #[error("incorrect type for field '{field}': expected {expected}")]
    IncorrectType { field: String, expected: String },

    #[error("schema registry error: {0}")]
    Internal(String),
}

/// Errors reported by a storage backend.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("unknown transactional session: {0}")]
    UnknownSession(String),

    #[error("unsupported by storage backend: {0}")]
    Unsupported(String),

    #[error("storage backend error: {0}")]
    Backend(String),
}

impl From<SchemaError> for ObjectControllerError {
    fn from(e: SchemaError) -> Self {
        match e {
            SchemaError::InvalidClassName { class_name } => Self::InvalidClassName(class_name),
            SchemaError::PermissionDenied { .. } => Self::PermissionDenied(e.to_string()),
            SchemaError::IncorrectType { field, expected } => {
                Self::IncorrectType { field, expected }
            }
            SchemaError::ClassNotFound { .. } | SchemaError::Internal(_) => {
                Self::Internal(e.to_string())
            }
        }
    }
}

impl From<StorageError> for ObjectControllerError {
    fn from(e: StorageError) -> Self {
        Self::Internal(e.to_string())
    }
}
