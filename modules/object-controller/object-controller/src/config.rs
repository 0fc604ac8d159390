//! Configuration for the object controller.

use serde::Deserialize;
use serde_json::Value;

/// Configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ObjectControllerConfig {
    /// Keep top-level siblings of `$or` where they are instead of pushing
    /// them into every branch.
    pub skip_or_restructuring: bool,
    /// Candidate id count above which id-set intersection switches to a
    /// hash-based algorithm.
    pub large_id_set_threshold: usize,
    /// Keys (optionally with a value) rejected anywhere inside create and
    /// update bodies.
    pub keyword_denylist: Vec<KeywordRule>,
}

impl Default for ObjectControllerConfig {
    fn default() -> Self {
        Self {
            skip_or_restructuring: false,
            large_id_set_threshold: 125,
            keyword_denylist: default_keyword_denylist(),
        }
    }
}

/// One denylist entry. With only `key`, the key is rejected whatever its
/// value; with only `value`, the value is rejected under any key.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordRule {
    #[serde(default)]
    pub key: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl KeywordRule {
    #[must_use]
    pub fn matches(&self, key: &str, value: &Value) -> bool {
        match (&self.key, &self.value) {
            (Some(k), Some(v)) => k == key && v == value,
            (Some(k), None) => k == key,
            (None, Some(v)) => v == value,
            (None, None) => false,
        }
    }
}

fn default_keyword_denylist() -> Vec<KeywordRule> {
    vec![
        KeywordRule {
            key: Some("_bsontype".to_owned()),
            value: Some(Value::String("Code".to_owned())),
        },
        KeywordRule {
            key: Some("constructor".to_owned()),
            value: None,
        },
        KeywordRule {
            key: Some("__proto__".to_owned()),
            value: None,
        },
    ]
}
