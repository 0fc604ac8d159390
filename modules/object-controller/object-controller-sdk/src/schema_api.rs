//! Schema registry interface.

use std::collections::HashMap;

use async_trait::async_trait;
use objgate_security::AclGroup;

use crate::error::SchemaError;
use crate::models::{ClassSchema, Document, FieldType};
use crate::permissions::{ClassLevelPermissions, Operation, PermissionDenial};

/// Read-only view of every known class at one point in time.
#[derive(Debug, Clone, Default)]
pub struct SchemaSnapshot {
    classes: HashMap<String, ClassSchema>,
}

impl SchemaSnapshot {
    #[must_use]
    pub fn new(classes: impl IntoIterator<Item = ClassSchema>) -> Self {
        Self {
            classes: classes
                .into_iter()
                .map(|c| (c.class_name.clone(), c))
                .collect(),
        }
    }

    #[must_use]
    pub fn class(&self, class_name: &str) -> Option<&ClassSchema> {
        self.classes.get(class_name)
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    /// Declared type of `field` (root of a dotted path).
    #[must_use]
    pub fn expected_type(&self, class_name: &str, field: &str) -> Option<&FieldType> {
        let root = field.split('.').next().unwrap_or(field);
        self.class(class_name).and_then(|c| c.fields.get(root))
    }

    #[must_use]
    pub fn class_level_permissions(&self, class_name: &str) -> Option<&ClassLevelPermissions> {
        self.class(class_name)
            .and_then(|c| c.class_level_permissions.as_ref())
    }

    /// Base-level check only; `true` for classes without a permission table.
    #[must_use]
    pub fn test_permissions(&self, class_name: &str, acl: &AclGroup, op: Operation) -> bool {
        self.class_level_permissions(class_name)
            .is_none_or(|clp| clp.test_permissions(acl, op))
    }

    /// Validates that `acl` may perform `op` on `class_name`.
    ///
    /// # Errors
    ///
    /// `SchemaError::PermissionDenied` when the check fails.
    pub fn validate_permission(
        &self,
        class_name: &str,
        acl: &AclGroup,
        op: Operation,
        action: Option<Operation>,
    ) -> Result<(), SchemaError> {
        let Some(clp) = self.class_level_permissions(class_name) else {
            return Ok(());
        };
        clp.validate_permission(acl, op, action).map_err(|denial| {
            tracing::debug!(
                class_name,
                operation = %op,
                authentication_required = denial == PermissionDenial::AuthenticationRequired,
                "class-level permission denied"
            );
            SchemaError::PermissionDenied {
                class_name: class_name.to_owned(),
                operation: op.to_string(),
            }
        })
    }
}

/// Schema registry consumed by the controller.
#[async_trait]
pub trait SchemaRegistryClient: Send + Sync {
    /// Current snapshot; `clear_cache` forces a reload.
    ///
    /// # Errors
    /// Registry failure.
    async fn load_schema(&self, clear_cache: bool) -> Result<SchemaSnapshot, SchemaError>;

    /// Returns the class, creating it with default fields if absent.
    ///
    /// # Errors
    /// `InvalidClassName` or registry failure.
    async fn enforce_class_exists(&self, class_name: &str) -> Result<ClassSchema, SchemaError>;

    /// Checks field values against the class's field types.
    ///
    /// # Errors
    /// `IncorrectType` on the first mismatching field.
    async fn validate_object(&self, class_name: &str, object: &Document)
    -> Result<(), SchemaError>;

    /// Forgets a class definition after its collection was dropped.
    ///
    /// # Errors
    /// Registry failure.
    async fn delete_class(&self, class_name: &str) -> Result<(), SchemaError>;
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::permissions::OperationPermissions;

    fn snapshot() -> SchemaSnapshot {
        SchemaSnapshot::new([
            ClassSchema::new("Post")
                .with_field(
                    "likes",
                    FieldType::Relation {
                        target_class: "_User".to_owned(),
                    },
                )
                .with_field("meta", FieldType::Object)
                .with_permissions(ClassLevelPermissions {
                    delete: Some(OperationPermissions::allow(["role:admin"])),
                    ..ClassLevelPermissions::default()
                }),
            ClassSchema::new("Open"),
        ])
    }

    #[test]
    fn expected_type_uses_root_field() {
        let s = snapshot();
        assert_eq!(s.expected_type("Post", "meta.title"), Some(&FieldType::Object));
        assert!(s.expected_type("Post", "likes").unwrap().is_relation());
        assert!(s.expected_type("Missing", "x").is_none());
    }

    #[test]
    fn validate_permission_reports_class_and_operation() {
        let s = snapshot();
        let err = s
            .validate_permission("Post", &AclGroup::public(), Operation::Delete, None)
            .unwrap_err();
        assert_eq!(
            err,
            SchemaError::PermissionDenied {
                class_name: "Post".to_owned(),
                operation: "delete".to_owned(),
            }
        );
        assert!(
            s.validate_permission("Open", &AclGroup::default(), Operation::Delete, None)
                .is_ok()
        );
    }
}
