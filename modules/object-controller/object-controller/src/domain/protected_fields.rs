//! Per-request protected-field resolution.

use object_controller_sdk::{ClassLevelPermissions, Query, USER_FIELD_PREFIX};
use objgate_security::{AclGroup, SecurityContext};

const PUBLIC_POLICY: &str = "*";
const AUTHENTICATED_POLICY: &str = "authenticated";

/// Fields to hide from one find, before per-row pointer policies apply.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProtectionPlan {
    /// Fields stripped from every row unless a pointer policy overrides them.
    pub fields: Vec<String>,
    /// Pointer fields fetched only to evaluate pointer policies; never returned.
    pub temporary_keys: Vec<String>,
}

/// Resolves the protected-field set for a non-master caller.
///
/// Returns `None` when the class has no protected-field policy or the
/// query targets the caller's own object id. Every non-pointer policy
/// contributes to the initial set; each policy applying to the caller
/// (`authenticated`, held roles, the caller's id) then narrows it.
#[must_use]
pub fn protection_plan(
    clp: Option<&ClassLevelPermissions>,
    query: &Query,
    acl: &AclGroup,
    ctx: &SecurityContext,
    keys: Option<&[String]>,
) -> Option<ProtectionPlan> {
    let policies = &clp?.protected_fields;
    if policies.is_empty() {
        return None;
    }
    if query.object_id().is_some_and(|id| acl.contains(id)) {
        return None;
    }

    let mut plan = ProtectionPlan::default();
    for (key, fields) in policies {
        if let Some(pointer_field) = key.strip_prefix(USER_FIELD_PREFIX) {
            if let Some(keys) = keys
                && !keys.iter().any(|k| k == pointer_field)
            {
                plan.temporary_keys.push(pointer_field.to_owned());
            }
            continue;
        }
        for field in fields {
            if !plan.fields.contains(field) {
                plan.fields.push(field.clone());
            }
        }
    }

    let mut applicable: Vec<&str> = Vec::new();
    if ctx.is_authenticated() {
        applicable.push(AUTHENTICATED_POLICY);
    }
    applicable.extend(ctx.user_roles().iter().map(String::as_str));
    applicable.extend(ctx.user_id());
    for key in applicable {
        if key == PUBLIC_POLICY {
            continue;
        }
        if let Some(allowed) = policies.get(key) {
            plan.fields.retain(|f| allowed.contains(f));
        }
    }

    tracing::debug!(
        protected = plan.fields.len(),
        temporary = plan.temporary_keys.len(),
        "resolved protected fields"
    );
    Some(plan)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use std::collections::BTreeMap;

    use serde_json::json;

    use super::*;

    fn clp(entries: &[(&str, &[&str])]) -> ClassLevelPermissions {
        let protected_fields: BTreeMap<String, Vec<String>> = entries
            .iter()
            .map(|(k, v)| ((*k).to_owned(), v.iter().map(|s| (*s).to_owned()).collect()))
            .collect();
        ClassLevelPermissions {
            protected_fields,
            ..ClassLevelPermissions::default()
        }
    }

    fn user(id: &str, roles: &[&str]) -> SecurityContext {
        SecurityContext::builder()
            .user_id(id)
            .roles(roles.iter().copied())
            .build()
    }

    #[test]
    fn no_policy_means_no_filtering() {
        let ctx = SecurityContext::anonymous();
        let acl = AclGroup::public();
        assert!(protection_plan(None, &Query::new(), &acl, &ctx, None).is_none());
        let empty = ClassLevelPermissions::default();
        assert!(protection_plan(Some(&empty), &Query::new(), &acl, &ctx, None).is_none());
    }

    #[test]
    fn public_policy_applies_to_everyone() {
        let perms = clp(&[("*", &["email", "phone"])]);
        let ctx = SecurityContext::anonymous();
        let plan =
            protection_plan(Some(&perms), &Query::new(), &AclGroup::public(), &ctx, None).unwrap();
        assert_eq!(plan.fields, vec!["email".to_owned(), "phone".to_owned()]);
    }

    #[test]
    fn held_role_narrows_the_set() {
        let perms = clp(&[("*", &["email", "phone"]), ("role:staff", &["phone"])]);
        let ctx = user("u1", &["staff"]);
        let acl = ctx.acl_group().unwrap();
        let plan = protection_plan(Some(&perms), &Query::new(), &acl, &ctx, None).unwrap();
        assert_eq!(plan.fields, vec!["phone".to_owned()]);
    }

    #[test]
    fn own_object_id_skips_protection() {
        let perms = clp(&[("*", &["email"])]);
        let ctx = user("u1", &[]);
        let acl = ctx.acl_group().unwrap();
        let query = Query::from_value(json!({"objectId": "u1"})).unwrap();
        assert!(protection_plan(Some(&perms), &query, &acl, &ctx, None).is_none());
    }

    #[test]
    fn pointer_policy_field_fetched_temporarily() {
        let perms = clp(&[("*", &["secret"]), ("userField:owner", &[])]);
        let ctx = user("u1", &[]);
        let acl = ctx.acl_group().unwrap();
        let keys = vec!["title".to_owned()];
        let plan = protection_plan(Some(&perms), &Query::new(), &acl, &ctx, Some(&keys)).unwrap();
        assert_eq!(plan.temporary_keys, vec!["owner".to_owned()]);
        assert_eq!(plan.fields, vec!["secret".to_owned()]);

        let keys = vec!["owner".to_owned()];
        let plan = protection_plan(Some(&perms), &Query::new(), &acl, &ctx, Some(&keys)).unwrap();
        assert!(plan.temporary_keys.is_empty());
    }
}
