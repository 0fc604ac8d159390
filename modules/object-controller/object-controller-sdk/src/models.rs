//! Object model shared by the controller, the schema registry and storage backends.

use std::collections::BTreeMap;
use std::ops::{Deref, DerefMut};

use objgate_security::{AclGroup, SecurityContext};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::permissions::{ClassLevelPermissions, Operation};
use crate::storage_api::SessionHandle;

/// One stored or REST-facing object.
pub type Document = serde_json::Map<String, Value>;

pub const USER_CLASS: &str = "_User";
pub const ROLE_CLASS: &str = "_Role";
pub const SESSION_CLASS: &str = "_Session";

pub const OBJECT_ID_FIELD: &str = "objectId";
pub const ACL_FIELD: &str = "ACL";
/// Stored read-permission set.
pub const READ_PERMISSION_FIELD: &str = "_rperm";
/// Stored write-permission set.
pub const WRITE_PERMISSION_FIELD: &str = "_wperm";

/// Name of the join collection backing relation `key` on `owner_class`.
#[must_use]
pub fn join_table_name(owner_class: &str, key: &str) -> String {
    format!("_Join:{key}:{owner_class}")
}

/// Schema field type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    GeoPoint,
    File,
    Bytes,
    Polygon,
    #[serde(rename = "ACL")]
    Acl,
    Pointer {
        #[serde(rename = "targetClass")]
        target_class: String,
    },
    Relation {
        #[serde(rename = "targetClass")]
        target_class: String,
    },
}

impl FieldType {
    #[must_use]
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation { .. })
    }

    #[must_use]
    pub fn target_class(&self) -> Option<&str> {
        match self {
            Self::Pointer { target_class } | Self::Relation { target_class } => {
                Some(target_class)
            }
            _ => None,
        }
    }
}

/// Class structure as resolved by the schema registry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClassSchema {
    pub class_name: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldType>,
    #[serde(default)]
    pub class_level_permissions: Option<ClassLevelPermissions>,
}

impl ClassSchema {
    #[must_use]
    pub fn new(class_name: &str) -> Self {
        Self {
            class_name: class_name.to_owned(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_field(mut self, name: &str, field_type: FieldType) -> Self {
        self.fields.insert(name.to_owned(), field_type);
        self
    }

    #[must_use]
    pub fn with_permissions(mut self, permissions: ClassLevelPermissions) -> Self {
        self.class_level_permissions = Some(permissions);
        self
    }

    /// Names of all relation-typed fields.
    pub fn relation_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|(_, t)| t.is_relation())
            .map(|(name, _)| name.as_str())
    }
}

/// Query tree: field constraints plus `$and` / `$or` / `$nor` combinators.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Query(Document);

impl Query {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Wraps a JSON value; `None` when the value is not an object.
    #[must_use]
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    #[must_use]
    pub fn into_inner(self) -> Document {
        self.0
    }

    #[must_use]
    pub fn into_value(self) -> Value {
        Value::Object(self.0)
    }

    /// `objectId` when constrained by a bare string.
    #[must_use]
    pub fn object_id(&self) -> Option<&str> {
        self.0.get(OBJECT_ID_FIELD).and_then(Value::as_str)
    }
}

impl From<Document> for Query {
    fn from(map: Document) -> Self {
        Self(map)
    }
}

impl Deref for Query {
    type Target = Document;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl DerefMut for Query {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    #[must_use]
    pub fn ascending(field: &str) -> Self {
        Self {
            field: field.to_owned(),
            direction: SortDirection::Ascending,
        }
    }

    #[must_use]
    pub fn descending(field: &str) -> Self {
        Self {
            field: field.to_owned(),
            direction: SortDirection::Descending,
        }
    }

    /// Parses a REST `order` parameter such as `-createdAt,name`.
    #[must_use]
    pub fn parse_order(order: &str) -> Vec<Self> {
        order
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix('-') {
                Some(field) => Self::descending(field),
                None => Self::ascending(s),
            })
            .collect()
    }

    #[must_use]
    pub fn is_descending(&self) -> bool {
        self.direction == SortDirection::Descending
    }
}

/// Options for [`crate::ObjectControllerClient::find`].
///
/// `acl: None` means master mode; `Some(AclGroup::default())` means no access.
#[derive(Debug, Clone, Default)]
pub struct FindOptions {
    pub acl: Option<AclGroup>,
    pub skip: Option<u64>,
    pub limit: Option<u64>,
    pub sort: Vec<SortKey>,
    pub count: bool,
    pub keys: Option<Vec<String>>,
    /// Explicit operation; inferred (`get`/`find`/`count`) when absent.
    pub op: Option<Operation>,
    pub distinct: Option<String>,
    pub pipeline: Option<Vec<Value>>,
    pub read_preference: Option<String>,
}

impl FindOptions {
    #[must_use]
    pub fn master() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_acl(acl: AclGroup) -> Self {
        Self {
            acl: Some(acl),
            ..Self::default()
        }
    }

    /// Options carrying the caller's ACL group (`None` for master callers).
    #[must_use]
    pub fn for_context(ctx: &SecurityContext) -> Self {
        Self {
            acl: ctx.acl_group(),
            ..Self::default()
        }
    }
}

/// Result of a find, shaped by the requested mode.
#[derive(Debug, Clone, PartialEq)]
pub enum FindResult {
    Objects(Vec<Document>),
    Count(u64),
    Distinct(Vec<Value>),
    Aggregate(Vec<Document>),
}

impl FindResult {
    /// Empty result matching the mode requested by `options`.
    #[must_use]
    pub fn empty_for(options: &FindOptions) -> Self {
        if options.count {
            Self::Count(0)
        } else if options.distinct.is_some() {
            Self::Distinct(Vec::new())
        } else if options.pipeline.is_some() {
            Self::Aggregate(Vec::new())
        } else {
            Self::Objects(Vec::new())
        }
    }

    /// Rows of an `Objects` or `Aggregate` result; empty otherwise.
    #[must_use]
    pub fn into_objects(self) -> Vec<Document> {
        match self {
            Self::Objects(rows) | Self::Aggregate(rows) => rows,
            Self::Count(_) | Self::Distinct(_) => Vec::new(),
        }
    }

    #[must_use]
    pub fn count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct CreateOptions {
    pub acl: Option<AclGroup>,
    pub session: Option<SessionHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub acl: Option<AclGroup>,
    /// Update every matching row.
    pub many: bool,
    /// Insert when nothing matches.
    pub upsert: bool,
    /// Run permission checks and validation only; no write.
    pub validate_only: bool,
    pub session: Option<SessionHandle>,
}

#[derive(Debug, Clone, Default)]
pub struct DestroyOptions {
    pub acl: Option<AclGroup>,
    pub session: Option<SessionHandle>,
}
