//! REST update operators (`{"__op": ...}`).

use serde_json::{Number, Value};
use thiserror::Error;

use crate::models::{Document, OBJECT_ID_FIELD};

const OP_KEY: &str = "__op";

/// Closed set of update operators accepted in create/update bodies.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateOperator {
    Increment { amount: Number },
    Add { objects: Vec<Value> },
    AddUnique { objects: Vec<Value> },
    Remove { objects: Vec<Value> },
    Delete,
    /// Pointers to relate; stored as join rows.
    AddRelation { objects: Vec<Value> },
    RemoveRelation { objects: Vec<Value> },
    Batch { ops: Vec<UpdateOperator> },
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UpdateOperatorError {
    #[error("unknown update operator '{0}'")]
    Unsupported(String),

    #[error("invalid payload for {op}: {reason}")]
    InvalidPayload { op: &'static str, reason: String },
}

impl UpdateOperator {
    /// Parses `value` as an operator.
    ///
    /// Returns `Ok(None)` when `value` is not an operator object (plain assignment).
    ///
    /// # Errors
    ///
    /// `Unsupported` for an unknown `__op` tag, `InvalidPayload` when the
    /// operator's arguments have the wrong shape.
    pub fn parse(value: &Value) -> Result<Option<Self>, UpdateOperatorError> {
        let Some(obj) = value.as_object() else {
            return Ok(None);
        };
        let Some(tag) = obj.get(OP_KEY) else {
            return Ok(None);
        };
        let Some(tag) = tag.as_str() else {
            return Err(UpdateOperatorError::Unsupported(tag.to_string()));
        };

        let op = match tag {
            "Increment" => Self::Increment {
                amount: number_arg(obj, "Increment")?,
            },
            "Add" => Self::Add {
                objects: array_arg(obj, "Add", "objects")?,
            },
            "AddUnique" => Self::AddUnique {
                objects: array_arg(obj, "AddUnique", "objects")?,
            },
            "Remove" => Self::Remove {
                objects: array_arg(obj, "Remove", "objects")?,
            },
            "Delete" => Self::Delete,
            "AddRelation" => Self::AddRelation {
                objects: array_arg(obj, "AddRelation", "objects")?,
            },
            "RemoveRelation" => Self::RemoveRelation {
                objects: array_arg(obj, "RemoveRelation", "objects")?,
            },
            "Batch" => {
                let ops = array_arg(obj, "Batch", "ops")?
                    .iter()
                    .map(|v| {
                        Self::parse(v)?.ok_or_else(|| UpdateOperatorError::InvalidPayload {
                            op: "Batch",
                            reason: "every entry must be an operator".to_owned(),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Self::Batch { ops }
            }
            other => return Err(UpdateOperatorError::Unsupported(other.to_owned())),
        };
        Ok(Some(op))
    }

    #[must_use]
    pub fn tag(&self) -> &'static str {
        match self {
            Self::Increment { .. } => "Increment",
            Self::Add { .. } => "Add",
            Self::AddUnique { .. } => "AddUnique",
            Self::Remove { .. } => "Remove",
            Self::Delete => "Delete",
            Self::AddRelation { .. } => "AddRelation",
            Self::RemoveRelation { .. } => "RemoveRelation",
            Self::Batch { .. } => "Batch",
        }
    }

    /// Operators whose post-write value is echoed back to the caller.
    #[must_use]
    pub fn is_result_bearing(&self) -> bool {
        matches!(
            self,
            Self::Increment { .. } | Self::Add { .. } | Self::AddUnique { .. } | Self::Remove { .. }
        )
    }

    /// Object ids of the pointers carried by a relation operator.
    #[must_use]
    pub fn relation_target_ids(&self) -> Vec<String> {
        match self {
            Self::AddRelation { objects } | Self::RemoveRelation { objects } => objects
                .iter()
                .filter_map(|o| o.get(OBJECT_ID_FIELD).and_then(Value::as_str))
                .map(str::to_owned)
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn array_arg(
    obj: &Document,
    op: &'static str,
    key: &str,
) -> Result<Vec<Value>, UpdateOperatorError> {
    match obj.get(key) {
        Some(Value::Array(items)) => Ok(items.clone()),
        _ => Err(UpdateOperatorError::InvalidPayload {
            op,
            reason: format!("{key} must be an array"),
        }),
    }
}

fn number_arg(obj: &Document, op: &'static str) -> Result<Number, UpdateOperatorError> {
    match obj.get("amount") {
        Some(Value::Number(n)) => Ok(n.clone()),
        _ => Err(UpdateOperatorError::InvalidPayload {
            op,
            reason: "incrementing must provide a number".to_owned(),
        }),
    }
}
