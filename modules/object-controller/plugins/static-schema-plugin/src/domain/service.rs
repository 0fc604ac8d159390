//! Service implementation for the static schema plugin.

use std::collections::HashMap;

use anyhow::{Context, bail};
use object_controller_sdk::{
    ACL_FIELD, ClassSchema, Document, FieldType, OBJECT_ID_FIELD, ROLE_CLASS, SESSION_CLASS,
    SchemaError, SchemaSnapshot, USER_CLASS,
};
use parking_lot::RwLock;
use regex::Regex;
use serde_json::Value;

use crate::config::StaticSchemaPluginConfig;

/// Letter-led word, optionally prefixed by `_` for built-in classes.
const CLASS_NAME_PATTERN: &str = "^_?[A-Za-z][A-Za-z0-9_]*$";

/// Config-backed schema registry.
///
/// Classes start from configuration and grow as objects with new fields
/// are validated.
pub struct Service {
    class_name_rule: Regex,
    classes: RwLock<HashMap<String, ClassSchema>>,
}

impl Service {
    /// Create a service from plugin configuration.
    ///
    /// # Errors
    ///
    /// Duplicate or invalid class names.
    pub fn from_config(cfg: &StaticSchemaPluginConfig) -> anyhow::Result<Self> {
        let class_name_rule =
            Regex::new(CLASS_NAME_PATTERN).context("compiling class name pattern")?;
        let mut classes = HashMap::with_capacity(cfg.classes.len());
        for class in &cfg.classes {
            if !class_name_rule.is_match(&class.class_name) {
                bail!("invalid class name in config: {}", class.class_name);
            }
            let mut merged = default_class(&class.class_name);
            merged.fields.extend(class.fields.clone());
            merged.class_level_permissions = class.class_level_permissions.clone();
            if classes.insert(class.class_name.clone(), merged).is_some() {
                bail!("class declared twice: {}", class.class_name);
            }
        }
        tracing::info!(classes = classes.len(), "static schema loaded");
        Ok(Self {
            class_name_rule,
            classes: RwLock::new(classes),
        })
    }

    #[must_use]
    pub fn snapshot(&self) -> SchemaSnapshot {
        SchemaSnapshot::new(self.classes.read().values().cloned())
    }

    /// # Errors
    ///
    /// `InvalidClassName`.
    pub fn enforce_class_exists(&self, class_name: &str) -> Result<ClassSchema, SchemaError> {
        if !self.class_name_rule.is_match(class_name) {
            return Err(SchemaError::InvalidClassName {
                class_name: class_name.to_owned(),
            });
        }
        let mut classes = self.classes.write();
        let class = classes.entry(class_name.to_owned()).or_insert_with(|| {
            tracing::info!(class_name, "class created with default fields");
            default_class(class_name)
        });
        Ok(class.clone())
    }

    /// Type-checks declared fields and records undeclared ones.
    ///
    /// # Errors
    ///
    /// `ClassNotFound` for an unknown class, `IncorrectType` on the first
    /// mismatching field.
    pub fn validate_object(&self, class_name: &str, object: &Document) -> Result<(), SchemaError> {
        let mut classes = self.classes.write();
        let class = classes
            .get_mut(class_name)
            .ok_or_else(|| SchemaError::ClassNotFound {
                class_name: class_name.to_owned(),
            })?;
        for (field, value) in object {
            if field.starts_with('_') || value.is_null() || is_operation(value) {
                continue;
            }
            match class.fields.get(field) {
                Some(expected) if !value_fits(expected, value) => {
                    return Err(SchemaError::IncorrectType {
                        field: field.clone(),
                        expected: type_name(expected),
                    });
                }
                Some(_) => {}
                None => {
                    if let Some(inferred) = infer_type(value) {
                        tracing::debug!(class_name, field, "field added to class");
                        class.fields.insert(field.clone(), inferred);
                    }
                }
            }
        }
        Ok(())
    }

    /// # Errors
    ///
    /// `ClassNotFound`.
    pub fn delete_class(&self, class_name: &str) -> Result<(), SchemaError> {
        self.classes
            .write()
            .remove(class_name)
            .map(|_| ())
            .ok_or_else(|| SchemaError::ClassNotFound {
                class_name: class_name.to_owned(),
            })
    }
}

fn pointer_to(target: &str) -> FieldType {
    FieldType::Pointer {
        target_class: target.to_owned(),
    }
}

fn relation_to(target: &str) -> FieldType {
    FieldType::Relation {
        target_class: target.to_owned(),
    }
}

/// Default columns of a new class.
fn default_class(class_name: &str) -> ClassSchema {
    let class = ClassSchema::new(class_name)
        .with_field(OBJECT_ID_FIELD, FieldType::String)
        .with_field("createdAt", FieldType::Date)
        .with_field("updatedAt", FieldType::Date)
        .with_field(ACL_FIELD, FieldType::Acl);
    match class_name {
        USER_CLASS => class
            .with_field("username", FieldType::String)
            .with_field("password", FieldType::String)
            .with_field("email", FieldType::String)
            .with_field("emailVerified", FieldType::Boolean)
            .with_field("authData", FieldType::Object),
        ROLE_CLASS => class
            .with_field("name", FieldType::String)
            .with_field("users", relation_to(USER_CLASS))
            .with_field("roles", relation_to(ROLE_CLASS)),
        SESSION_CLASS => class
            .with_field("user", pointer_to(USER_CLASS))
            .with_field("sessionToken", FieldType::String)
            .with_field("expiresAt", FieldType::Date),
        _ => class,
    }
}

fn is_operation(value: &Value) -> bool {
    value.as_object().is_some_and(|o| o.contains_key("__op"))
}

fn tagged_type(value: &Value) -> Option<&str> {
    value.as_object()?.get("__type")?.as_str()
}

fn value_fits(expected: &FieldType, value: &Value) -> bool {
    match expected {
        FieldType::String => value.is_string(),
        FieldType::Number => value.is_number(),
        FieldType::Boolean => value.is_boolean(),
        FieldType::Date => value.is_string() || tagged_type(value) == Some("Date"),
        FieldType::Array => value.is_array(),
        FieldType::Object | FieldType::Acl | FieldType::Relation { .. } => value.is_object(),
        FieldType::GeoPoint => tagged_type(value) == Some("GeoPoint"),
        FieldType::File => tagged_type(value) == Some("File"),
        FieldType::Bytes => tagged_type(value) == Some("Bytes"),
        FieldType::Polygon => tagged_type(value) == Some("Polygon"),
        FieldType::Pointer { target_class } => {
            tagged_type(value) == Some("Pointer")
                && value.get("className").and_then(Value::as_str) == Some(target_class.as_str())
        }
    }
}

fn infer_type(value: &Value) -> Option<FieldType> {
    Some(match value {
        Value::Null => return None,
        Value::Bool(_) => FieldType::Boolean,
        Value::Number(_) => FieldType::Number,
        Value::String(_) => FieldType::String,
        Value::Array(_) => FieldType::Array,
        Value::Object(obj) => match tagged_type(value) {
            Some("Date") => FieldType::Date,
            Some("GeoPoint") => FieldType::GeoPoint,
            Some("File") => FieldType::File,
            Some("Bytes") => FieldType::Bytes,
            Some("Polygon") => FieldType::Polygon,
            Some("Pointer") => pointer_to(obj.get("className")?.as_str()?),
            _ => FieldType::Object,
        },
    })
}

fn type_name(field_type: &FieldType) -> String {
    match field_type {
        FieldType::Pointer { target_class } => format!("*{target_class}"),
        FieldType::Relation { target_class } => format!("relation<{target_class}>"),
        FieldType::String => "String".to_owned(),
        FieldType::Number => "Number".to_owned(),
        FieldType::Boolean => "Boolean".to_owned(),
        FieldType::Date => "Date".to_owned(),
        FieldType::Object => "Object".to_owned(),
        FieldType::Array => "Array".to_owned(),
        FieldType::GeoPoint => "GeoPoint".to_owned(),
        FieldType::File => "File".to_owned(),
        FieldType::Bytes => "Bytes".to_owned(),
        FieldType::Polygon => "Polygon".to_owned(),
        FieldType::Acl => "ACL".to_owned(),
    }
}
