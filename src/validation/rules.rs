//! Declarative validation rules for application entry payloads.

use crate::error::CoreError;
use crate::types::Address;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::EntryLookup;

/// A single rule attached to an application entry type
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum ValidationRule {
    /// String field may hold at most `max` characters
    MaxLength {
        field: String,
        max: usize,
        #[serde(default)]
        message: Option<String>,
    },
    /// Field must be present and non-null
    Required { field: String },
    /// A non-empty address in `field` must reference a live entry
    ReferenceExists {
        field: String,
        #[serde(default)]
        message: Option<String>,
    },
}

impl ValidationRule {
    pub fn max_length(field: &str, max: usize, message: &str) -> Self {
        ValidationRule::MaxLength {
            field: field.to_string(),
            max,
            message: Some(message.to_string()),
        }
    }

    pub fn required(field: &str) -> Self {
        ValidationRule::Required {
            field: field.to_string(),
        }
    }

    pub fn reference_exists(field: &str, message: &str) -> Self {
        ValidationRule::ReferenceExists {
            field: field.to_string(),
            message: Some(message.to_string()),
        }
    }

    /// Apply the rule to a payload
    pub fn check(&self, payload: &Value, lookup: &dyn EntryLookup) -> Result<(), CoreError> {
        match self {
            ValidationRule::MaxLength {
                field,
                max,
                message,
            } => match payload.get(field) {
                None | Some(Value::Null) => Ok(()),
                Some(Value::String(text)) => {
                    if text.chars().count() > *max {
                        Err(CoreError::validation_failed(message.clone().unwrap_or_else(
                            || format!("Field '{}' exceeds {} characters", field, max),
                        )))
                    } else {
                        Ok(())
                    }
                }
                Some(_) => Err(CoreError::validation_failed(format!(
                    "Field '{}' must be a string",
                    field
                ))),
            },
            ValidationRule::Required { field } => match payload.get(field) {
                None | Some(Value::Null) => Err(CoreError::validation_failed(format!(
                    "Missing field: {}",
                    field
                ))),
                Some(_) => Ok(()),
            },
            ValidationRule::ReferenceExists { field, message } => {
                let reference = match payload.get(field) {
                    Some(Value::String(text)) if !text.is_empty() => Address::from(text.as_str()),
                    _ => return Ok(()),
                };
                if lookup.lookup(&reference)?.is_some() {
                    Ok(())
                } else {
                    Err(CoreError::generic(
                        message
                            .clone()
                            .unwrap_or_else(|| "Referenced entry not found".to_string()),
                    ))
                }
            }
        }
    }
}
