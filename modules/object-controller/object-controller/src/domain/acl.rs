//! Conversion between REST `ACL` maps and stored `_rperm` / `_wperm` sets,
//! and injection of the caller's permission constraint into queries.

use object_controller_sdk::{
    ACL_FIELD, Document, Query, READ_PERMISSION_FIELD, WRITE_PERMISSION_FIELD,
};
use objgate_security::{AclGroup, PUBLIC_TOKEN};
use serde_json::{Map, Value, json};

use super::error::DomainError;

/// Replaces a REST `ACL` map with `_rperm` / `_wperm` lists.
///
/// Objects without `ACL` pass through unchanged (no permission fields).
///
/// # Errors
///
/// `InvalidJson` when `ACL` or one of its entries is not an object.
pub fn encode(mut object: Document) -> Result<Document, DomainError> {
    let Some(acl) = object.remove(ACL_FIELD) else {
        return Ok(object);
    };
    let Value::Object(entries) = acl else {
        return Err(DomainError::InvalidJson("ACL must be an object".to_owned()));
    };

    let mut read = Vec::new();
    let mut write = Vec::new();
    for (actor, perms) in entries {
        let Value::Object(perms) = perms else {
            return Err(DomainError::InvalidJson(format!(
                "ACL entry for '{actor}' must be an object"
            )));
        };
        if flag(&perms, "read") {
            read.push(Value::String(actor.clone()));
        }
        if flag(&perms, "write") {
            write.push(Value::String(actor));
        }
    }
    object.insert(READ_PERMISSION_FIELD.to_owned(), Value::Array(read));
    object.insert(WRITE_PERMISSION_FIELD.to_owned(), Value::Array(write));
    Ok(object)
}

/// Rebuilds `ACL` from stored permission lists, merging read and write
/// flags per actor. Rows without permission fields get no `ACL`.
#[must_use]
pub fn decode(mut row: Document) -> Document {
    let read = row.remove(READ_PERMISSION_FIELD);
    let write = row.remove(WRITE_PERMISSION_FIELD);
    if read.is_none() && write.is_none() {
        return row;
    }

    let mut acl = Map::new();
    for (list, perm) in [(read, "read"), (write, "write")] {
        let Some(Value::Array(actors)) = list else {
            continue;
        };
        for actor in actors.iter().filter_map(Value::as_str) {
            let entry = acl
                .entry(actor.to_owned())
                .or_insert_with(|| Value::Object(Map::new()));
            if let Value::Object(flags) = entry {
                flags.insert(perm.to_owned(), Value::Bool(true));
            }
        }
    }
    row.insert(ACL_FIELD.to_owned(), Value::Object(acl));
    row
}

fn flag(perms: &Document, name: &str) -> bool {
    perms.get(name).and_then(Value::as_bool).unwrap_or(false)
}

/// Restricts `query` to rows readable by `acl` (or public).
#[must_use]
pub fn add_read_acl(mut query: Query, acl: &AclGroup) -> Query {
    let mut tokens = vec![Value::Null, json!(PUBLIC_TOKEN)];
    tokens.extend(
        acl.tokens()
            .iter()
            .filter(|t| t.as_str() != PUBLIC_TOKEN)
            .map(|t| json!(t)),
    );
    query.insert(READ_PERMISSION_FIELD.to_owned(), json!({ "$in": tokens }));
    query
}

/// Restricts `query` to rows writable by `acl` (or without write restriction).
#[must_use]
pub fn add_write_acl(mut query: Query, acl: &AclGroup) -> Query {
    let mut tokens = vec![Value::Null];
    tokens.extend(acl.tokens().iter().map(|t| json!(t)));
    query.insert(WRITE_PERMISSION_FIELD.to_owned(), json!({ "$in": tokens }));
    query
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    #[test]
    fn encode_splits_read_and_write() {
        let out = encode(doc(json!({
            "name": "a",
            "ACL": {"u1": {"read": true, "write": true}, "*": {"read": true}, "u2": {"write": true}}
        })))
        .unwrap();
        assert!(!out.contains_key("ACL"));
        assert_eq!(out["_rperm"], json!(["*", "u1"]));
        assert_eq!(out["_wperm"], json!(["u1", "u2"]));
    }

    #[test]
    fn encode_without_acl_adds_nothing() {
        let out = encode(doc(json!({"name": "a"}))).unwrap();
        assert_eq!(Value::Object(out), json!({"name": "a"}));
    }

    #[test]
    fn encode_rejects_malformed_acl() {
        assert!(matches!(
            encode(doc(json!({"ACL": ["u1"]}))),
            Err(DomainError::InvalidJson(_))
        ));
    }

    #[test]
    fn decode_restores_acl() {
        let original = json!({"u1": {"read": true, "write": true}, "u2": {"read": true}, "u3": {"write": true}});
        let stored = encode(doc(json!({"x": 1, "ACL": original.clone()}))).unwrap();
        let back = decode(stored);
        assert_eq!(back["ACL"], original);
        assert_eq!(back["x"], json!(1));
        assert!(!back.contains_key("_rperm"));
    }

    #[test]
    fn decode_without_permission_fields_is_identity() {
        let row = doc(json!({"objectId": "a"}));
        assert_eq!(decode(row.clone()), row);
    }

    #[test]
    fn read_acl_includes_null_and_public() {
        let q = add_read_acl(Query::new(), &AclGroup::new(["*", "u1", "role:admin"]));
        assert_eq!(
            q.into_value(),
            json!({"_rperm": {"$in": [null, "*", "u1", "role:admin"]}})
        );
    }

    #[test]
    fn write_acl_includes_null_and_group() {
        let q = add_write_acl(Query::new(), &AclGroup::new(["*", "u1"]));
        assert_eq!(q.into_value(), json!({"_wperm": {"$in": [null, "*", "u1"]}}));
    }
}
