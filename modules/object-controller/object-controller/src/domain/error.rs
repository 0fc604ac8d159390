//! Domain errors for the object controller.

use object_controller_sdk::{
    ObjectControllerError, SchemaError, StorageError, UpdateOperatorError,
};

/// Internal domain errors.
#[derive(thiserror::Error, Debug)]
pub enum DomainError {
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("invalid key name: {0}")]
    InvalidKeyName(String),

    #[error("invalid nested key: {0}")]
    InvalidNestedKey(String),

    #[error("invalid class name: {0}")]
    InvalidClassName(String),

    #[error("invalid JSON: {0}")]
    InvalidJson(String),

    #[error("unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("object not found")]
    ObjectNotFound,

    #[error("class {class_name} is not empty, contains {count} objects")]
    ClassNotEmpty { class_name: String, count: u64 },

    #[error("schema registry: {0}")]
    Schema(#[from] SchemaError),

    #[error("storage backend: {0}")]
    Storage(#[from] StorageError),

    #[error("transaction: {0}")]
    Transaction(ObjectControllerError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DomainError {
    #[must_use]
    pub fn invalid_query(msg: impl Into<String>) -> Self {
        Self::InvalidQuery(msg.into())
    }

    #[must_use]
    pub fn invalid_key(key: &str) -> Self {
        Self::InvalidKeyName(format!("Invalid key name: {key}"))
    }
}

impl From<UpdateOperatorError> for DomainError {
    fn from(e: UpdateOperatorError) -> Self {
        match e {
            UpdateOperatorError::Unsupported(tag) => Self::UnsupportedOperator(tag),
            UpdateOperatorError::InvalidPayload { .. } => Self::InvalidJson(e.to_string()),
        }
    }
}

impl From<DomainError> for ObjectControllerError {
    fn from(e: DomainError) -> Self {
        match e {
            DomainError::InvalidQuery(msg) => Self::InvalidQuery(msg),
            DomainError::InvalidKeyName(msg) => Self::InvalidKeyName(msg),
            DomainError::InvalidNestedKey(msg) => Self::InvalidNestedKey(msg),
            DomainError::InvalidClassName(msg) => Self::InvalidClassName(msg),
            DomainError::InvalidJson(msg) => Self::InvalidJson(msg),
            DomainError::UnsupportedOperator(msg) => Self::UnsupportedOperator(msg),
            DomainError::ObjectNotFound => Self::ObjectNotFound,
            DomainError::ClassNotEmpty { class_name, count } => {
                Self::ClassNotEmpty { class_name, count }
            }
            DomainError::Schema(e) => e.into(),
            DomainError::Storage(e) => e.into(),
            DomainError::Transaction(e) => e,
            DomainError::Internal(msg) => Self::Internal(msg),
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;

    #[test]
    fn schema_denial_maps_to_permission_denied() {
        let e: ObjectControllerError = DomainError::from(SchemaError::PermissionDenied {
            class_name: "Post".to_owned(),
            operation: "find".to_owned(),
        })
        .into();
        assert!(matches!(e, ObjectControllerError::PermissionDenied(_)));
    }

    #[test]
    fn storage_failure_maps_to_internal() {
        let e: ObjectControllerError =
            DomainError::from(StorageError::Backend("boom".to_owned())).into();
        assert!(matches!(e, ObjectControllerError::Internal(msg) if msg.contains("boom")));
    }

    #[test]
    fn bad_operator_payload_is_invalid_json() {
        let e = DomainError::from(UpdateOperatorError::InvalidPayload {
            op: "Add",
            reason: "objects must be an array".to_owned(),
        });
        assert!(matches!(e, DomainError::InvalidJson(_)));
    }
}
