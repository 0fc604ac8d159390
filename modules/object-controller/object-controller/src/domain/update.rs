//! Transformation of REST create/update bodies into storage writes.

use object_controller_sdk::{
    ACL_FIELD, ClassSchema, Document, FieldUpdate, OBJECT_ID_FIELD, USER_CLASS, UpdateDocument,
    UpdateOperator,
};
use serde_json::{Map, Value, json};

use super::error::DomainError;
use super::keys::{
    field_name_is_valid, is_auth_data_id_path, is_special_update_key, root_field_name,
};
use super::sanitize::{AUTH_DATA_FIELD, AUTH_DATA_PREFIX};

/// Columns every class carries, declared or not.
const DEFAULT_FIELDS: &[&str] = &[OBJECT_ID_FIELD, "createdAt", "updatedAt", ACL_FIELD];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationChange {
    Add,
    Remove,
}

/// One relation operator lifted out of a body, applied to join collections
/// after the main write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationUpdate {
    pub key: String,
    pub change: RelationChange,
    pub related_ids: Vec<String>,
}

/// Removes relation operators (also inside `Batch`) from `body`.
///
/// # Errors
///
/// Malformed or unknown operators.
pub fn collect_relation_updates(
    mut body: Document,
) -> Result<(Document, Vec<RelationUpdate>), DomainError> {
    let mut updates = Vec::new();
    let mut lifted = Vec::new();
    for (key, value) in &body {
        let Some(op) = UpdateOperator::parse(value)? else {
            continue;
        };
        let before = updates.len();
        push_relation_ops(key, &op, &mut updates);
        if updates.len() > before {
            lifted.push(key.clone());
        }
    }
    for key in lifted {
        body.remove(&key);
    }
    Ok((body, updates))
}

fn push_relation_ops(key: &str, op: &UpdateOperator, out: &mut Vec<RelationUpdate>) {
    let change = match op {
        UpdateOperator::AddRelation { .. } => RelationChange::Add,
        UpdateOperator::RemoveRelation { .. } => RelationChange::Remove,
        UpdateOperator::Batch { ops } => {
            for inner in ops {
                push_relation_ops(key, inner, out);
            }
            return;
        }
        _ => return,
    };
    out.push(RelationUpdate {
        key: key.to_owned(),
        change,
        related_ids: op.relation_target_ids(),
    });
}

/// Moves `_User.authData.<provider>` into `_auth_data_<provider>` fields; a
/// `null` provider becomes a delete.
#[must_use]
pub fn transform_auth_data(class_name: &str, mut body: Document) -> Document {
    if class_name != USER_CLASS {
        return body;
    }
    let Some(Value::Object(providers)) = body.remove(AUTH_DATA_FIELD) else {
        return body;
    };
    for (provider, data) in providers {
        let value = if data.is_null() {
            json!({"__op": "Delete"})
        } else {
            data
        };
        body.insert(format!("{AUTH_DATA_PREFIX}{provider}"), value);
    }
    body
}

/// Resolves operators against a not-yet-existing object.
///
/// # Errors
///
/// `UnsupportedOperator` for operators with no meaning on creation.
pub fn flatten_for_create(body: Document) -> Result<Document, DomainError> {
    let mut out = Map::new();
    for (key, value) in body {
        let Some(op) = UpdateOperator::parse(&value)? else {
            out.insert(key, value);
            continue;
        };
        let flattened = match op {
            UpdateOperator::Increment { amount } => Value::Number(amount),
            UpdateOperator::Add { objects } | UpdateOperator::AddUnique { objects } => {
                Value::Array(objects)
            }
            UpdateOperator::Remove { .. } => Value::Array(Vec::new()),
            UpdateOperator::Delete => continue,
            other => {
                return Err(DomainError::UnsupportedOperator(format!(
                    "The {} operator is not supported on create.",
                    other.tag()
                )));
            }
        };
        out.insert(key, flattened);
    }
    Ok(out)
}

/// Converts a validated update body into typed field updates.
///
/// # Errors
///
/// `UnsupportedOperator` for operators left unresolved (`Batch`, relations).
pub fn to_storage_update(body: Document) -> Result<UpdateDocument, DomainError> {
    let mut update = UpdateDocument::new();
    for (key, value) in body {
        let field_update = match UpdateOperator::parse(&value)? {
            None => FieldUpdate::Set(value),
            Some(UpdateOperator::Increment { amount }) => FieldUpdate::Increment(amount),
            Some(UpdateOperator::Add { objects }) => FieldUpdate::Add(objects),
            Some(UpdateOperator::AddUnique { objects }) => FieldUpdate::AddUnique(objects),
            Some(UpdateOperator::Remove { objects }) => FieldUpdate::Remove(objects),
            Some(UpdateOperator::Delete) => FieldUpdate::Unset,
            Some(other) => {
                return Err(DomainError::UnsupportedOperator(format!(
                    "The {} operator is not supported here.",
                    other.tag()
                )));
            }
        };
        update.insert(key, field_update);
    }
    Ok(update)
}

/// Rejects update keys that may not be written.
///
/// # Errors
///
/// - `InvalidNestedKey` when an object value has a key containing `$` or `.`
/// - `InvalidKeyName` for `authData.<provider>.id` paths and invalid roots
pub fn validate_update_keys(body: &Document) -> Result<(), DomainError> {
    for (key, value) in body {
        if let Value::Object(inner) = value
            && inner.keys().any(|k| k.contains('$') || k.contains('.'))
        {
            return Err(DomainError::InvalidNestedKey(
                "Nested keys should not contain the '$' or '.' characters".to_owned(),
            ));
        }
        let root = root_field_name(key);
        if is_auth_data_id_path(key) || (!field_name_is_valid(root) && !is_special_update_key(root))
        {
            return Err(DomainError::InvalidKeyName(format!(
                "Invalid field name for update: {key}"
            )));
        }
    }
    Ok(())
}

/// Whether `body` writes a root field the class does not declare yet.
///
/// # Errors
///
/// Malformed operators.
pub fn adds_fields(class: Option<&ClassSchema>, body: &Document) -> Result<bool, DomainError> {
    let Some(class) = class else {
        return Ok(!body.is_empty());
    };
    for (key, value) in body {
        if matches!(UpdateOperator::parse(value)?, Some(UpdateOperator::Delete)) {
            continue;
        }
        let root = root_field_name(key);
        if !DEFAULT_FIELDS.contains(&root) && !class.fields.contains_key(root) {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Response for a write: the post-write value of every key changed by a
/// result-bearing operator, nested back along dotted paths.
#[must_use]
pub fn sanitize_result(original: &Document, result: &Document) -> Document {
    let mut response = Map::new();
    for (key, value) in original {
        let bearing = UpdateOperator::parse(value)
            .ok()
            .flatten()
            .is_some_and(|op| op.is_result_bearing());
        if bearing {
            expand_on_path(&mut response, key, result);
        }
    }
    response
}

fn expand_on_path(target: &mut Document, path: &str, source: &Document) {
    let Some((first, rest)) = path.split_once('.') else {
        if let Some(value) = source.get(path) {
            target.insert(path.to_owned(), value.clone());
        }
        return;
    };
    let Some(Value::Object(inner_source)) = source.get(first) else {
        return;
    };
    let slot = target
        .entry(first.to_owned())
        .or_insert_with(|| Value::Object(Map::new()));
    if let Value::Object(inner_target) = slot {
        expand_on_path(inner_target, rest, inner_source);
    }
}

/// Object id targeted by an update, from the body or a bare query constraint.
#[must_use]
pub fn target_object_id<'a>(body: &'a Document, query_id: Option<&'a str>) -> Option<&'a str> {
    body.get(OBJECT_ID_FIELD)
        .and_then(Value::as_str)
        .or(query_id)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use object_controller_sdk::FieldType;
    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn ptr(id: &str) -> Value {
        json!({"__type": "Pointer", "className": "_User", "objectId": id})
    }

    #[test]
    fn relation_ops_are_lifted_including_batches() {
        let body = doc(json!({
            "title": "x",
            "likes": {"__op": "AddRelation", "objects": [ptr("u1"), ptr("u2")]},
            "fans": {"__op": "Batch", "ops": [
                {"__op": "AddRelation", "objects": [ptr("u3")]},
                {"__op": "RemoveRelation", "objects": [ptr("u4")]}
            ]}
        }));
        let (rest, updates) = collect_relation_updates(body).unwrap();
        assert_eq!(Value::Object(rest), json!({"title": "x"}));
        assert_eq!(updates.len(), 3);
        assert!(updates.contains(&RelationUpdate {
            key: "fans".to_owned(),
            change: RelationChange::Remove,
            related_ids: vec!["u4".to_owned()],
        }));
        assert!(updates.contains(&RelationUpdate {
            key: "likes".to_owned(),
            change: RelationChange::Add,
            related_ids: vec!["u1".to_owned(), "u2".to_owned()],
        }));
    }

    #[test]
    fn auth_data_split_per_provider() {
        let body = doc(json!({"authData": {"github": {"id": "1"}, "twitter": null}}));
        let out = transform_auth_data(USER_CLASS, body.clone());
        assert_eq!(
            Value::Object(out),
            json!({"_auth_data_github": {"id": "1"}, "_auth_data_twitter": {"__op": "Delete"}})
        );
        assert_eq!(transform_auth_data("Post", body.clone()), body);
    }

    #[test]
    fn create_flattens_operators() {
        let out = flatten_for_create(doc(json!({
            "n": {"__op": "Increment", "amount": 5},
            "tags": {"__op": "AddUnique", "objects": ["a", "a", "b"]},
            "gone": {"__op": "Remove", "objects": ["z"]},
            "skip": {"__op": "Delete"},
            "plain": 1
        })))
        .unwrap();
        assert_eq!(
            Value::Object(out),
            json!({"n": 5, "tags": ["a", "a", "b"], "gone": [], "plain": 1})
        );
        let err = flatten_for_create(doc(json!({"x": {"__op": "Batch", "ops": []}}))).unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedOperator(_)));
    }

    #[test]
    fn unknown_operator_is_unsupported() {
        let err = to_storage_update(doc(json!({"x": {"__op": "Teleport"}}))).unwrap_err();
        assert!(matches!(err, DomainError::UnsupportedOperator(_)));
    }

    #[test]
    fn storage_update_is_typed() {
        let update = to_storage_update(doc(json!({
            "score": {"__op": "Increment", "amount": 2},
            "old": {"__op": "Delete"},
            "name": "n"
        })))
        .unwrap();
        assert_eq!(update["score"], FieldUpdate::Increment(2.into()));
        assert_eq!(update["old"], FieldUpdate::Unset);
        assert_eq!(update["name"], FieldUpdate::Set(json!("n")));
    }

    #[test]
    fn update_key_rules() {
        assert!(validate_update_keys(&doc(json!({"a.b": 1, "_hashed_password": "h"}))).is_ok());
        assert!(matches!(
            validate_update_keys(&doc(json!({"authData.github.id": "1"}))),
            Err(DomainError::InvalidKeyName(_))
        ));
        assert!(matches!(
            validate_update_keys(&doc(json!({"_secret": 1}))),
            Err(DomainError::InvalidKeyName(_))
        ));
        assert!(matches!(
            validate_update_keys(&doc(json!({"meta": {"$set": 1}}))),
            Err(DomainError::InvalidNestedKey(_))
        ));
    }

    #[test]
    fn detects_new_fields_ignoring_deletes() {
        let class = ClassSchema::new("Post").with_field("title", FieldType::String);
        let known = doc(json!({"title": "t", "extra": {"__op": "Delete"}}));
        assert!(!adds_fields(Some(&class), &known).unwrap());
        assert!(adds_fields(Some(&class), &doc(json!({"extra": 1}))).unwrap());
        assert!(!adds_fields(Some(&class), &doc(json!({"ACL": {}}))).unwrap());
    }

    #[test]
    fn result_keeps_only_result_bearing_keys() {
        let original = doc(json!({
            "score": {"__op": "Increment", "amount": 5},
            "stats.views": {"__op": "Increment", "amount": 1},
            "name": "n",
            "old": {"__op": "Delete"}
        }));
        let stored = doc(json!({"score": 5, "stats": {"views": 3, "likes": 9}, "name": "n"}));
        assert_eq!(
            Value::Object(sanitize_result(&original, &stored)),
            json!({"score": 5, "stats": {"views": 3}})
        );
    }
}
