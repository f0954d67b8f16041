//! Column types and the type classifier.
//!
//! Column types form a chain `BOOLEAN < INTEGER < BIGINT < NUMERIC < TEXT`.
//! The derived `Ord` follows that chain, so joining two types is `max`.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::schema::RESERVED_ID_FIELD;
use crate::value::Value;

/// Relational column type inferred for a document field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnType {
    Boolean,
    Integer,
    BigInt,
    Numeric,
    Text,
}

/// A value that cannot be stored in a column without losing information.
#[derive(Error, Debug, Clone, PartialEq)]
#[error(
    "{kind} value '{value}' cannot be stored losslessly in a {column_type} column (needs {needed})"
)]
pub struct TypeConflict {
    pub column_type: ColumnType,
    pub kind: &'static str,
    pub value: String,
    /// Least column type that would hold both the existing values and this one.
    pub needed: ColumnType,
}

impl ColumnType {
    /// SQL spelling used in DDL.
    pub fn sql_name(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Integer => "INTEGER",
            ColumnType::BigInt => "BIGINT",
            ColumnType::Numeric => "NUMERIC",
            ColumnType::Text => "TEXT",
        }
    }

    /// Maps a type name reported by a database catalog back to a column type.
    ///
    /// Covers both PostgreSQL `information_schema` names and SQLite declared
    /// types. Anything unrecognized is treated as TEXT, which accepts every
    /// value through string coercion.
    pub fn from_catalog(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "boolean" | "bool" => ColumnType::Boolean,
            "integer" | "int" | "int4" | "int2" | "smallint" => ColumnType::Integer,
            "bigint" | "int8" => ColumnType::BigInt,
            "numeric" | "decimal" | "double precision" | "float8" | "real" | "float4" => {
                ColumnType::Numeric
            }
            _ => ColumnType::Text,
        }
    }

    /// Least type that can hold values of both `self` and `other`.
    pub fn join(self, other: ColumnType) -> ColumnType {
        self.max(other)
    }

    /// Column type that would hold this column's values as well as `value`.
    ///
    /// BOOLEAN does not widen into the numeric types, so mixing it with
    /// anything else lands on TEXT.
    pub fn widen_for(self, value: &Value) -> ColumnType {
        let joined = classify(value).map_or(self, |other| self.join(other));
        if joined == self || self == ColumnType::Boolean || joined == ColumnType::Boolean {
            ColumnType::Text
        } else {
            joined
        }
    }

    /// Converts a value to the representation bound for this column type.
    ///
    /// Null and the empty string become `Value::Null` for every type. TEXT
    /// accepts anything through its string form; the other types accept only
    /// values they can hold without loss.
    pub fn coerce(&self, value: &Value) -> Result<Value, TypeConflict> {
        if value.is_empty() {
            return Ok(Value::Null);
        }

        let coerced = match (self, value) {
            (ColumnType::Text, other) => other.to_text().map(Value::Text),
            (ColumnType::Boolean, Value::Bool(b)) => Some(Value::Bool(*b)),
            (ColumnType::Integer, v) => v
                .as_integral()
                .filter(|i| fits_integer(*i))
                .map(Value::Int),
            (ColumnType::BigInt, v) => v.as_integral().map(Value::Int),
            (ColumnType::Numeric, Value::Int(i)) => Some(Value::Int(*i)),
            (ColumnType::Numeric, Value::Float(f)) => Some(Value::Float(*f)),
            _ => None,
        };

        coerced.ok_or_else(|| TypeConflict {
            column_type: *self,
            kind: value.kind(),
            value: value.to_string(),
            needed: self.widen_for(value),
        })
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

fn fits_integer(i: i64) -> bool {
    i >= i64::from(i32::MIN) && i <= i64::from(i32::MAX)
}

/// Classifies one representative value.
///
/// Returns `None` for null and empty-string samples, which carry no type
/// information.
pub fn classify(value: &Value) -> Option<ColumnType> {
    match value {
        Value::Null => None,
        Value::Text(s) if s.is_empty() => None,
        Value::Bool(_) => Some(ColumnType::Boolean),
        Value::Int(_) | Value::Float(_) => Some(match value.as_integral() {
            Some(i) if fits_integer(i) => ColumnType::Integer,
            Some(_) => ColumnType::BigInt,
            None => ColumnType::Numeric,
        }),
        Value::Timestamp(_) | Value::Text(_) => Some(ColumnType::Text),
    }
}

/// Classifies a named field, applying the `id` exception.
///
/// A field literally named `id` is always TEXT so it never takes on
/// surrogate-key semantics.
pub fn classify_field(name: &str, value: &Value) -> Option<ColumnType> {
    if name == RESERVED_ID_FIELD {
        return Some(ColumnType::Text);
    }
    classify(value)
}

/// Column type to create for a field first seen with `value`.
///
/// Untyped samples fall back to TEXT, the top of the chain.
pub fn infer_column_type(name: &str, value: &Value) -> ColumnType {
    classify_field(name, value).unwrap_or(ColumnType::Text)
}
