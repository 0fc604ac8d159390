//! Actor tokens identifying a caller for permission checks.

use serde::{Deserialize, Serialize};

/// Wildcard token granting access to everyone.
pub const PUBLIC_TOKEN: &str = "*";

/// Prefix carried by role tokens (`role:<name>`).
pub const ROLE_PREFIX: &str = "role:";

/// Ordered set of actor tokens representing one caller.
///
/// An empty group means "no access". Unrestricted (master) callers are
/// represented by the absence of a group (`Option<AclGroup>::None`), never
/// by a special token.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AclGroup(Vec<String>);

impl AclGroup {
    /// Builds a group, dropping duplicate tokens while keeping first-seen order.
    #[must_use]
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut group = Self::default();
        for token in tokens {
            group.push(token);
        }
        group
    }

    /// Group holding only the public token.
    #[must_use]
    pub fn public() -> Self {
        Self(vec![PUBLIC_TOKEN.to_owned()])
    }

    pub fn push(&mut self, token: impl Into<String>) {
        let token = token.into();
        if !self.0.contains(&token) {
            self.0.push(token);
        }
    }

    #[must_use]
    pub fn tokens(&self) -> &[String] {
        &self.0
    }

    fn each(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    #[must_use]
    pub fn contains(&self, token: &str) -> bool {
        self.0.iter().any(|t| t == token)
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// `true` when the group carries no identity beyond the public token.
    #[must_use]
    pub fn is_anonymous(&self) -> bool {
        self.each().all(|t| t == PUBLIC_TOKEN)
    }

    /// Tokens that are neither roles nor the public wildcard.
    pub fn user_ids(&self) -> impl Iterator<Item = &str> {
        self.each()
            .filter(|t| *t != PUBLIC_TOKEN && !t.starts_with(ROLE_PREFIX))
    }

    /// The caller's user id when exactly one non-role, non-public token is present.
    #[must_use]
    pub fn single_user_id(&self) -> Option<&str> {
        let mut ids = self.user_ids();
        match (ids.next(), ids.next()) {
            (Some(id), None) => Some(id),
            _ => None,
        }
    }

    pub fn roles(&self) -> impl Iterator<Item = &str> {
        self.each().filter(|t| t.starts_with(ROLE_PREFIX))
    }
}

impl<S: Into<String>> FromIterator<S> for AclGroup {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self::new(iter)
    }
}
