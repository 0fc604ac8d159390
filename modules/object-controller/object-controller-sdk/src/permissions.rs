//! Class-level permission tables and their base-level evaluation.

use std::collections::BTreeMap;

use objgate_security::{AclGroup, PUBLIC_TOKEN};
use serde::{Deserialize, Serialize};

/// Prefix of protected-field policy keys that name a pointer field.
pub const USER_FIELD_PREFIX: &str = "userField:";

/// Operation checked against a class-level permission table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operation {
    Get,
    Find,
    Count,
    Create,
    Update,
    Delete,
    AddField,
}

impl Operation {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Find => "find",
            Self::Count => "count",
            Self::Create => "create",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::AddField => "addField",
        }
    }

    /// Read operations consult `readUserFields`, all others `writeUserFields`.
    #[must_use]
    pub fn is_read(self) -> bool {
        matches!(self, Self::Get | Self::Find | Self::Count)
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Permission entry for one operation.
///
/// Actor keys (`*`, user ids, `role:<name>`) map to `true` when allowed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OperationPermissions {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub requires_authentication: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pointer_fields: Vec<String>,
    #[serde(flatten)]
    pub actors: BTreeMap<String, bool>,
}

impl OperationPermissions {
    /// Entry allowing the given actors.
    #[must_use]
    pub fn allow<'a>(actors: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            actors: actors.into_iter().map(|a| (a.to_owned(), true)).collect(),
            ..Self::default()
        }
    }

    /// Entry allowing nobody, with pointer permissions on `fields`.
    #[must_use]
    pub fn pointer<'a>(fields: impl IntoIterator<Item = &'a str>) -> Self {
        Self {
            pointer_fields: fields.into_iter().map(str::to_owned).collect(),
            ..Self::default()
        }
    }

    fn allows(&self, token: &str) -> bool {
        self.actors.get(token).copied().unwrap_or(false)
    }
}

/// Class-level permission table.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassLevelPermissions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<OperationPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub find: Option<OperationPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<OperationPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub create: Option<OperationPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update: Option<OperationPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delete: Option<OperationPermissions>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub add_field: Option<OperationPermissions>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub read_user_fields: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub write_user_fields: Vec<String>,
    /// Policy key (`*`, `role:<name>`, `userField:<field>`) to hidden fields.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub protected_fields: BTreeMap<String, Vec<String>>,
}

impl ClassLevelPermissions {
    #[must_use]
    pub fn for_operation(&self, op: Operation) -> Option<&OperationPermissions> {
        match op {
            Operation::Get => self.get.as_ref(),
            Operation::Find => self.find.as_ref(),
            Operation::Count => self.count.as_ref(),
            Operation::Create => self.create.as_ref(),
            Operation::Update => self.update.as_ref(),
            Operation::Delete => self.delete.as_ref(),
            Operation::AddField => self.add_field.as_ref(),
        }
    }

    /// `readUserFields` for read operations, `writeUserFields` otherwise.
    #[must_use]
    pub fn user_fields(&self, op: Operation) -> &[String] {
        if op.is_read() {
            &self.read_user_fields
        } else {
            &self.write_user_fields
        }
    }

    /// Pointer-permission fields for `op`: the operation's own
    /// `pointerFields` followed by the matching user-field list, de-duplicated.
    #[must_use]
    pub fn pointer_fields(&self, op: Operation) -> Vec<String> {
        let mut fields: Vec<String> = self
            .for_operation(op)
            .map(|p| p.pointer_fields.clone())
            .unwrap_or_default();
        for field in self.user_fields(op) {
            if !fields.contains(field) {
                fields.push(field.clone());
            }
        }
        fields
    }

    /// Base-level check: passes when `op` has no entry, is public, or any
    /// token of `acl` is explicitly allowed.
    #[must_use]
    pub fn test_permissions(&self, acl: &AclGroup, op: Operation) -> bool {
        let Some(perms) = self.for_operation(op) else {
            return true;
        };
        perms.allows(PUBLIC_TOKEN) || acl.tokens().iter().any(|t| perms.allows(t))
    }

    /// Full permission check for `op`, deferring to pointer permissions where
    /// they are configured.
    ///
    /// `action` is the surrounding operation when `op` is `AddField`.
    ///
    /// # Errors
    ///
    /// Returns `PermissionDenial` when the caller may not perform `op`.
    pub fn validate_permission(
        &self,
        acl: &AclGroup,
        op: Operation,
        action: Option<Operation>,
    ) -> Result<(), PermissionDenial> {
        if self.test_permissions(acl, op) {
            return Ok(());
        }
        let Some(perms) = self.for_operation(op) else {
            return Ok(());
        };

        if perms.requires_authentication {
            if acl.is_anonymous() {
                return Err(PermissionDenial::AuthenticationRequired);
            }
            return Ok(());
        }

        if op == Operation::Create && !self.write_user_fields.is_empty() {
            return Err(PermissionDenial::Forbidden);
        }
        if !self.user_fields(op).is_empty() {
            return Ok(());
        }
        if !perms.pointer_fields.is_empty()
            && (op != Operation::AddField || action == Some(Operation::Update))
        {
            return Ok(());
        }
        Err(PermissionDenial::Forbidden)
    }

    /// Protected-field policies keyed by pointer field (`userField:<field>`).
    pub fn pointer_protected_fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.protected_fields.iter().filter_map(|(key, fields)| {
            key.strip_prefix(USER_FIELD_PREFIX)
                .map(|field| (field, fields.as_slice()))
        })
    }
}

/// Reason a base-level permission check failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PermissionDenial {
    AuthenticationRequired,
    Forbidden,
}
