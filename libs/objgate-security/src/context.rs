use secrecy::SecretString;

use crate::acl_group::{AclGroup, PUBLIC_TOKEN, ROLE_PREFIX};

/// `SecurityContext` describes the caller of an object operation.
///
/// Built by request/session resolution and passed to every controller call.
/// Role names are normalized to `role:<name>` tokens.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SecurityContext {
    /// Authenticated user id, if any.
    user_id: Option<String>,
    /// Role tokens held by the user (`role:<name>`).
    #[serde(default)]
    user_roles: Vec<String>,
    /// Unrestricted caller; bypasses every permission check.
    #[serde(default)]
    is_master: bool,
    /// Session token the caller authenticated with. Never serialized.
    #[serde(skip)]
    session_token: Option<SecretString>,
}

impl SecurityContext {
    #[must_use]
    pub fn builder() -> SecurityContextBuilder {
        SecurityContextBuilder::default()
    }

    /// Unauthenticated caller: public access only.
    #[must_use]
    pub fn anonymous() -> Self {
        SecurityContextBuilder::default().build()
    }

    /// Unrestricted caller.
    #[must_use]
    pub fn master() -> Self {
        SecurityContextBuilder::default().master(true).build()
    }

    #[must_use]
    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    #[must_use]
    pub fn user_roles(&self) -> &[String] {
        &self.user_roles
    }

    #[must_use]
    pub fn is_master(&self) -> bool {
        self.is_master
    }

    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.user_id.is_some()
    }

    #[must_use]
    pub fn session_token(&self) -> Option<&SecretString> {
        self.session_token.as_ref()
    }

    /// Actor tokens for this caller: `*`, the user id, then role tokens.
    ///
    /// Returns `None` for master callers.
    #[must_use]
    pub fn acl_group(&self) -> Option<AclGroup> {
        if self.is_master {
            return None;
        }
        let mut group = AclGroup::public();
        if let Some(id) = &self.user_id {
            group.push(id.clone());
        }
        for role in &self.user_roles {
            group.push(role.clone());
        }
        Some(group)
    }
}

#[derive(Default)]
pub struct SecurityContextBuilder {
    user_id: Option<String>,
    user_roles: Vec<String>,
    is_master: bool,
    session_token: Option<SecretString>,
}

impl SecurityContextBuilder {
    #[must_use]
    pub fn user_id(mut self, user_id: &str) -> Self {
        self.user_id = Some(user_id.to_owned());
        self
    }

    /// Adds a role; accepts either `name` or `role:name`.
    #[must_use]
    pub fn role(mut self, role: &str) -> Self {
        let token = if role.starts_with(ROLE_PREFIX) {
            role.to_owned()
        } else {
            format!("{ROLE_PREFIX}{role}")
        };
        if token != PUBLIC_TOKEN && !self.user_roles.contains(&token) {
            self.user_roles.push(token);
        }
        self
    }

    #[must_use]
    pub fn roles<'a>(self, roles: impl IntoIterator<Item = &'a str>) -> Self {
        roles.into_iter().fold(self, Self::role)
    }

    #[must_use]
    pub fn master(mut self, is_master: bool) -> Self {
        self.is_master = is_master;
        self
    }

    #[must_use]
    pub fn session_token(mut self, token: impl Into<SecretString>) -> Self {
        self.session_token = Some(token.into());
        self
    }

    #[must_use]
    pub fn build(self) -> SecurityContext {
        SecurityContext {
            user_id: self.user_id,
            user_roles: self.user_roles,
            is_master: self.is_master,
            session_token: self.session_token,
        }
    }
}
