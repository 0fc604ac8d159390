//! Output filtering of fetched rows.

use object_controller_sdk::{
    ClassLevelPermissions, Document, OBJECT_ID_FIELD, Operation, USER_CLASS, USER_FIELD_PREFIX,
};
use objgate_security::{AclGroup, SecurityContext};
use serde_json::{Map, Value};

use super::protected_fields::ProtectionPlan;

pub(crate) const AUTH_DATA_FIELD: &str = "authData";
pub(crate) const AUTH_DATA_PREFIX: &str = "_auth_data_";
const HASHED_PASSWORD: &str = "_hashed_password";
const SESSION_TOKEN: &str = "sessionToken";

/// Strips fields the caller may not see from rows already ACL-decoded.
pub struct RowFilter<'a> {
    pub class_name: &'a str,
    pub op: Operation,
    pub ctx: &'a SecurityContext,
    /// `None` for master callers.
    pub acl: Option<&'a AclGroup>,
    pub clp: Option<&'a ClassLevelPermissions>,
    pub plan: Option<&'a ProtectionPlan>,
}

impl RowFilter<'_> {
    #[must_use]
    pub fn apply(&self, mut row: Document) -> Document {
        let is_user_class = self.class_name == USER_CLASS;
        let user_id = self.ctx.user_id();

        if let Some(plan) = self.plan {
            let own_user_row = is_user_class
                && user_id.is_some()
                && row.get(OBJECT_ID_FIELD).and_then(Value::as_str) == user_id;
            if !own_user_row {
                for field in self.row_protected_fields(&row, plan) {
                    row.remove(&field);
                }
            }
            for key in &plan.temporary_keys {
                row.remove(key);
            }
        }

        if is_user_class {
            fold_auth_data(&mut row);
            if let Some(hash) = row.remove(HASHED_PASSWORD) {
                row.insert("password".to_owned(), hash);
            }
            row.remove(SESSION_TOKEN);
        }

        let Some(acl) = self.acl else {
            return row;
        };
        row.retain(|key, _| !key.starts_with('_'));

        if is_user_class {
            let readable_by_owner = row
                .get(OBJECT_ID_FIELD)
                .and_then(Value::as_str)
                .is_some_and(|id| acl.contains(id));
            if !readable_by_owner {
                row.remove(AUTH_DATA_FIELD);
            }
        }
        row
    }

    /// Plan fields, replaced by pointer-keyed policies naming the caller.
    ///
    /// When several pointer policies match, only fields hidden by all of
    /// them stay hidden.
    fn row_protected_fields(&self, row: &Document, plan: &ProtectionPlan) -> Vec<String> {
        if !matches!(self.op, Operation::Get | Operation::Find) {
            return plan.fields.clone();
        }
        let (Some(clp), Some(user_id)) = (self.clp, self.ctx.user_id()) else {
            return plan.fields.clone();
        };

        let mut matched: Option<Vec<String>> = None;
        for (key, fields) in &clp.protected_fields {
            let Some(pointer_field) = key.strip_prefix(USER_FIELD_PREFIX) else {
                continue;
            };
            if !points_to(row.get(pointer_field), user_id) {
                continue;
            }
            matched = Some(match matched {
                None => fields.clone(),
                Some(mut acc) => {
                    acc.retain(|f| fields.contains(f));
                    acc
                }
            });
        }
        matched.unwrap_or_else(|| plan.fields.clone())
    }
}

/// `true` when `value` is a pointer (or array of pointers) to `user_id`.
fn points_to(value: Option<&Value>, user_id: &str) -> bool {
    let is_caller = |v: &Value| v.get(OBJECT_ID_FIELD).and_then(Value::as_str) == Some(user_id);
    match value {
        Some(Value::Array(items)) => items.iter().any(is_caller),
        Some(v) => is_caller(v),
        None => false,
    }
}

/// Gathers stored `_auth_data_<provider>` fields back under `authData`.
fn fold_auth_data(row: &mut Document) {
    let providers: Vec<(String, String)> = row
        .keys()
        .filter_map(|k| {
            k.strip_prefix(AUTH_DATA_PREFIX)
                .map(|provider| (k.clone(), provider.to_owned()))
        })
        .collect();
    if providers.is_empty() {
        return;
    }
    let mut auth_data = match row.remove(AUTH_DATA_FIELD) {
        Some(Value::Object(map)) => map,
        _ => Map::new(),
    };
    for (key, provider) in providers {
        if let Some(value) = row.remove(&key)
            && !value.is_null()
        {
            auth_data.insert(provider, value);
        }
    }
    row.insert(AUTH_DATA_FIELD.to_owned(), Value::Object(auth_data));
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn doc(v: Value) -> Document {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn user_row() -> Document {
        doc(json!({
            "objectId": "u1",
            "username": "ann",
            "_hashed_password": "$2b$hash",
            "sessionToken": "r:abc",
            "_email_verify_token": "tok",
            "_failed_login_count": 2,
            "_auth_data_github": {"id": "42"},
            "email": "ann@example.com"
        }))
    }

    #[test]
    fn master_sees_password_and_bookkeeping() {
        let ctx = SecurityContext::master();
        let filter = RowFilter {
            class_name: USER_CLASS,
            op: Operation::Find,
            ctx: &ctx,
            acl: None,
            clp: None,
            plan: None,
        };
        let out = filter.apply(user_row());
        assert_eq!(out["password"], json!("$2b$hash"));
        assert_eq!(out["authData"], json!({"github": {"id": "42"}}));
        assert!(out.contains_key("_email_verify_token"));
        assert!(!out.contains_key("sessionToken"));
        assert!(!out.contains_key("_hashed_password"));
    }

    #[test]
    fn other_user_loses_bookkeeping_and_auth_data() {
        let ctx = SecurityContext::builder().user_id("u2").build();
        let acl = ctx.acl_group().unwrap();
        let filter = RowFilter {
            class_name: USER_CLASS,
            op: Operation::Find,
            ctx: &ctx,
            acl: Some(&acl),
            clp: None,
            plan: None,
        };
        let out = filter.apply(user_row());
        assert!(!out.contains_key("_email_verify_token"));
        assert!(!out.contains_key("_failed_login_count"));
        assert!(!out.contains_key("authData"));
        assert!(!out.contains_key("sessionToken"));
        assert_eq!(out["username"], json!("ann"));
    }

    #[test]
    fn own_user_row_keeps_auth_data_and_protected_fields() {
        let ctx = SecurityContext::builder().user_id("u1").build();
        let acl = ctx.acl_group().unwrap();
        let plan = ProtectionPlan {
            fields: vec!["email".to_owned()],
            temporary_keys: Vec::new(),
        };
        let filter = RowFilter {
            class_name: USER_CLASS,
            op: Operation::Get,
            ctx: &ctx,
            acl: Some(&acl),
            clp: None,
            plan: Some(&plan),
        };
        let out = filter.apply(user_row());
        assert!(out.contains_key("authData"));
        assert_eq!(out["email"], json!("ann@example.com"));
    }

    #[test]
    fn pointer_policy_replaces_protected_set_per_row() {
        let ctx = SecurityContext::builder().user_id("u1").build();
        let acl = ctx.acl_group().unwrap();
        let clp = ClassLevelPermissions {
            protected_fields: BTreeMap::from([
                ("*".to_owned(), vec!["secret".to_owned(), "notes".to_owned()]),
                ("userField:owner".to_owned(), vec!["notes".to_owned()]),
            ]),
            ..ClassLevelPermissions::default()
        };
        let plan = ProtectionPlan {
            fields: vec!["secret".to_owned(), "notes".to_owned()],
            temporary_keys: vec!["owner".to_owned()],
        };
        let filter = RowFilter {
            class_name: "Doc",
            op: Operation::Find,
            ctx: &ctx,
            acl: Some(&acl),
            clp: Some(&clp),
            plan: Some(&plan),
        };

        let mine = filter.apply(doc(json!({
            "objectId": "d1",
            "owner": {"__type": "Pointer", "className": "_User", "objectId": "u1"},
            "secret": "s",
            "notes": "n"
        })));
        assert_eq!(Value::Object(mine), json!({"objectId": "d1", "secret": "s"}));

        let theirs = filter.apply(doc(json!({
            "objectId": "d2",
            "owner": [{"__type": "Pointer", "className": "_User", "objectId": "u9"}],
            "secret": "s",
            "notes": "n"
        })));
        assert_eq!(Value::Object(theirs), json!({"objectId": "d2"}));
    }
}
