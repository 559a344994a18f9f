// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Value formats a schema leaf can declare.
//!
//! A format knows how to turn an environment-style string into the native
//! JSON shape of the field ([`FormatType::coerce`]), how to turn such a value
//! back into a flat string ([`FormatType::flatten`]), and whether the field
//! may be missing altogether ([`FormatType::is_optional`]).
//!
//! | declared name                                   | variant            |
//! |-------------------------------------------------|--------------------|
//! | `String`, `string`, `email`, `url`, `string-*`  | `String`           |
//! | `["a", "b"]`                                    | `EnumeratedString` |
//! | `Array`                                         | `Array`            |
//! | `int`, `int-optional`, `Number`                 | `Int`              |
//! | `Boolean`                                       | `Boolean`          |
//! | `port`                                          | `Port`             |
//! | `*`                                             | `Any`              |


use std::fmt;

use serde_json::Value;
use thiserror::Error;

/// Errors raised while declaring, coercing or flattening a format.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FormatError {
    /// The schema names a format this crate does not know.
    #[error("unknown format {0:?}")]
    UnknownFormat(String),

    /// The `format` field has a shape that cannot describe a format.
    #[error("invalid format declaration: {0}")]
    InvalidDeclaration(String),

    /// The value is not one of the enumerated options.
    #[error("invalid value {value:?} for format [{}]", .allowed.join(","))]
    NotAllowed { value: String, allowed: Vec<String> },

    /// The value cannot be represented in the format.
    #[error("invalid value {value} for {format}: {reason}")]
    InvalidValue {
        format: String,
        value: String,
        reason: String,
    },

    /// No value was available to flatten.
    #[error("no value present for {0}")]
    Missing(String),
}

/// Format of a single configuration leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FormatType {
    /// Free-form string; `name` is the declared format, e.g. `string-optional`.
    String { name: String },
    /// String restricted to a fixed set of values.
    EnumeratedString { values: Vec<String> },
    /// Comma separated list.
    Array,
    /// Signed integer; `name` is the declared format, e.g. `int-optional`.
    Int { name: String },
    Boolean,
    Port,
    /// Wildcard, accepts anything and is always optional.
    Any,
}

impl FormatType {
    /// Look up a format by its declared name.
    pub fn from_name(name: &str) -> Result<Self, FormatError> {
        let format = match name {
            "String" | "string" | "email" | "url" | "string-file-exists" | "string-optional"
            | "string-optional-locally" => FormatType::String {
                name: name.to_string(),
            },
            "int" | "int-optional" | "Number" => FormatType::Int {
                name: name.to_string(),
            },
            "Array" => FormatType::Array,
            "Boolean" => FormatType::Boolean,
            "port" => FormatType::Port,
            "*" => FormatType::Any,
            other => return Err(FormatError::UnknownFormat(other.to_string())),
        };
        Ok(format)
    }

    /// Interpret the `format` field of a schema leaf.
    ///
    /// A missing field means [`FormatType::Any`]; an array of strings
    /// declares an enumeration.
    pub fn from_declaration(declared: Option<&Value>) -> Result<Self, FormatError> {
        match declared {
            None | Some(Value::Null) => Ok(FormatType::Any),
            Some(Value::String(name)) => Self::from_name(name),
            Some(Value::Array(items)) => {
                let values = items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Ok(s.clone()),
                        other => Err(FormatError::InvalidDeclaration(format!(
                            "enumeration entries must be strings, found {other}"
                        ))),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(FormatType::EnumeratedString { values })
            }
            Some(other) => Err(FormatError::InvalidDeclaration(format!(
                "expected a format name or a list of strings, found {other}"
            ))),
        }
    }

    /// Whether a leaf of this format may be absent.
    pub fn is_optional(&self) -> bool {
        match self {
            FormatType::String { name } | FormatType::Int { name } => name.contains("optional"),
            FormatType::Any => true,
            FormatType::EnumeratedString { .. }
            | FormatType::Array
            | FormatType::Boolean
            | FormatType::Port => false,
        }
    }

    /// Parse an environment-variable style string into the native value.
    pub fn coerce(&self, raw: &str) -> Result<Value, FormatError> {
        match self {
            FormatType::String { .. } => {
                if self.is_optional() && raw.is_empty() {
                    Ok(Value::Null)
                } else {
                    Ok(Value::String(raw.to_string()))
                }
            }
            FormatType::EnumeratedString { values } => {
                if values.iter().any(|v| v == raw) {
                    Ok(Value::String(raw.to_string()))
                } else {
                    Err(FormatError::NotAllowed {
                        value: raw.to_string(),
                        allowed: values.clone(),
                    })
                }
            }
            FormatType::Array => Ok(Value::Array(
                raw.split(',').map(|s| Value::String(s.to_string())).collect(),
            )),
            FormatType::Int { .. } => raw
                .trim()
                .parse::<i64>()
                .map(Value::from)
                .map_err(|e| self.invalid(raw, e)),
            FormatType::Port => raw
                .trim()
                .parse::<u16>()
                .map(Value::from)
                .map_err(|e| self.invalid(raw, e)),
            FormatType::Boolean => parse_bool(raw)
                .map(Value::Bool)
                .ok_or_else(|| self.invalid(raw, "not a boolean")),
            FormatType::Any => Ok(Value::String(raw.to_string())),
        }
    }

    /// Serialize a native value back into its flat string form.
    pub fn flatten(&self, value: &Value) -> Result<String, FormatError> {
        if value.is_null() {
            return match self {
                FormatType::Any => Ok(String::new()),
                _ => Err(FormatError::Missing(self.to_string())),
            };
        }
        match (self, value) {
            (_, Value::String(s)) if !matches!(self, FormatType::Boolean) => Ok(s.clone()),
            (FormatType::String { .. } | FormatType::EnumeratedString { .. }, other) => {
                Err(self.invalid(&other.to_string(), "expected a string"))
            }
            (FormatType::Array, Value::Array(items)) => Ok(items
                .iter()
                .map(|item| match item {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                })
                .collect::<Vec<_>>()
                .join(",")),
            (FormatType::Array, other) => {
                Err(self.invalid(&other.to_string(), "expected a list"))
            }
            (FormatType::Boolean, Value::Bool(b)) => Ok(b.to_string()),
            (FormatType::Boolean, Value::String(s)) => parse_bool(s)
                .map(|b| b.to_string())
                .ok_or_else(|| self.invalid(s, "not a boolean")),
            (FormatType::Boolean, other) => {
                Err(self.invalid(&other.to_string(), "expected a boolean"))
            }
            (FormatType::Int { .. } | FormatType::Port, Value::Number(n)) => Ok(n.to_string()),
            (FormatType::Int { .. } | FormatType::Port, other) => {
                Err(self.invalid(&other.to_string(), "expected a number"))
            }
            (FormatType::Any, other) => Ok(other.to_string()),
        }
    }

    fn invalid(&self, value: &str, reason: impl fmt::Display) -> FormatError {
        FormatError::InvalidValue {
            format: self.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl fmt::Display for FormatType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormatType::String { name } | FormatType::Int { name } => write!(f, "format: {name}"),
            FormatType::EnumeratedString { values } => {
                write!(f, "format: [{}]", values.join(","))
            }
            FormatType::Array => write!(f, "format: Array"),
            FormatType::Boolean => write!(f, "format: Boolean"),
            FormatType::Port => write!(f, "format: port"),
            FormatType::Any => write!(f, "format: *"),
        }
    }
}

// Spellings found in existing environment files.
fn parse_bool(raw: &str) -> Option<bool> {
    match raw {
        "1" | "t" | "T" | "true" | "TRUE" | "True" => Some(true),
        "0" | "f" | "F" | "false" | "FALSE" | "False" => Some(false),
        _ => None,
    }
}
