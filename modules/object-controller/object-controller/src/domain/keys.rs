//! Class and field name rules.

use serde_json::Value;

use crate::config::KeywordRule;

use super::error::DomainError;

/// Internal keys allowed in queries despite failing the field-name pattern.
pub const SPECIAL_QUERY_KEYS: &[&str] = &[
    "$and",
    "$or",
    "$nor",
    "_rperm",
    "_wperm",
    "_perishable_token",
    "_email_verify_token",
    "_email_verify_token_expires_at",
    "_account_lockout_expires_at",
    "_failed_login_count",
];

/// Internal account bookkeeping keys allowed in update bodies.
pub const SPECIAL_UPDATE_KEYS: &[&str] = &[
    "_hashed_password",
    "_perishable_token",
    "_email_verify_token",
    "_email_verify_token_expires_at",
    "_account_lockout_expires_at",
    "_failed_login_count",
    "_perishable_token_expires_at",
    "_password_changed_at",
    "_password_history",
];

const SYSTEM_CLASSES: &[&str] = &[
    "_User",
    "_Installation",
    "_Role",
    "_Session",
    "_Product",
    "_PushStatus",
    "_JobStatus",
    "_JobSchedule",
    "_Audience",
    "_Idempotency",
    "_GlobalConfig",
    "_GraphQLConfig",
];

const INVALID_COLUMNS: &[&str] = &["length"];

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Letter followed by letters, digits, `_` or `.`.
#[must_use]
pub fn is_valid_query_key(key: &str) -> bool {
    let mut chars = key.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| is_word_char(c) || c == '.')
}

#[must_use]
pub fn is_special_query_key(key: &str) -> bool {
    SPECIAL_QUERY_KEYS.contains(&key)
}

#[must_use]
pub fn is_special_update_key(key: &str) -> bool {
    SPECIAL_UPDATE_KEYS.contains(&key)
}

/// Letter followed by letters, digits or `_`; `className` and `length` are reserved.
#[must_use]
pub fn field_name_is_valid(field: &str) -> bool {
    let mut chars = field.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(is_word_char)
        && field != "className"
        && !INVALID_COLUMNS.contains(&field)
}

/// System class, join collection, or a valid user class name.
#[must_use]
pub fn class_name_is_valid(class_name: &str) -> bool {
    if SYSTEM_CLASSES.contains(&class_name) {
        return true;
    }
    if let Some(rest) = class_name.strip_prefix("_Join:") {
        let mut parts = rest.splitn(2, ':');
        return match (parts.next(), parts.next()) {
            (Some(key), Some(owner)) => {
                !key.is_empty()
                    && !owner.is_empty()
                    && key.chars().all(is_word_char)
                    && owner.chars().all(is_word_char)
            }
            _ => false,
        };
    }
    let mut chars = class_name.chars();
    chars.next().is_some_and(|c| c.is_ascii_alphabetic()) && chars.all(is_word_char)
}

/// First segment of a dotted path.
#[must_use]
pub fn root_field_name(field: &str) -> &str {
    field.split('.').next().unwrap_or(field)
}

/// `authData.<provider>.id`, which may never be sorted on or written directly.
#[must_use]
pub fn is_auth_data_id_path(field: &str) -> bool {
    let mut parts = field.split('.');
    matches!(
        (parts.next(), parts.next(), parts.next(), parts.next()),
        (Some("authData"), Some(provider), Some("id"), None)
            if !provider.is_empty() && provider.chars().all(is_word_char)
    )
}

/// Rejects request data containing a denylisted key or value at any depth.
///
/// # Errors
///
/// `InvalidKeyName` naming the offending keyword.
pub fn check_prohibited_keywords(value: &Value, rules: &[KeywordRule]) -> Result<(), DomainError> {
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if rules.iter().any(|r| r.matches(key, inner)) {
                    return Err(DomainError::InvalidKeyName(format!(
                        "Prohibited keyword in request data: {key}"
                    )));
                }
                check_prohibited_keywords(inner, rules)?;
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter()
            .try_for_each(|v| check_prohibited_keywords(v, rules)),
        _ => Ok(()),
    }
}
