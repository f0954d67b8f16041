//! Source values and documents.
//!
//! Every value read from the source is converted once into the closed tag set
//! of [`Value`]. Both the type classifier and the translator work on these
//! tags, never on driver-specific types.

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

/// Field holding the stable identifier of a source document.
pub const ID_FIELD: &str = "_id";

/// A primitive value read from a source document.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Timestamp(DateTime<Utc>),
}

impl Value {
    /// Returns true for values that carry no type information (null and "").
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Null => true,
            Value::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Returns the value as an integer if it is integral.
    ///
    /// Floats qualify when they are finite, have no fractional part and fit
    /// the `i64` range.
    pub fn as_integral(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.is_finite() && f.fract() == 0.0 => {
                // i64::MAX is not exactly representable; 2^63 is the first float past it.
                if *f >= -9_223_372_036_854_775_808.0 && *f < 9_223_372_036_854_775_808.0 {
                    Some(*f as i64)
                } else {
                    None
                }
            }
            _ => None,
        }
    }

    /// String form of the value, or `None` for null.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Bool(b) => Some(b.to_string()),
            Value::Int(i) => Some(i.to_string()),
            Value::Float(f) => Some(f.to_string()),
            Value::Text(s) => Some(s.clone()),
            Value::Timestamp(ts) => Some(canonical_timestamp(ts)),
        }
    }

    /// Short tag name, used in log and report messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Int(_) => "integer",
            Value::Float(_) => "float",
            Value::Text(_) => "text",
            Value::Timestamp(_) => "timestamp",
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.to_text() {
            Some(text) => write!(f, "{}", text),
            None => write!(f, "null"),
        }
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Value::Int(i),
                None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Value::Text(s),
            other => Value::Text(other.to_string()),
        }
    }
}

/// Renders a timestamp as RFC 3339 in UTC with millisecond precision.
///
/// Timestamps are stored as text in this fixed form so that re-reading a
/// synced value never changes its inferred type.
pub fn canonical_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A source document: an ordered set of named values.
///
/// Field order is the order in which the source returned the fields. Setting
/// an existing field replaces its value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Document {
    fields: Vec<(String, Value)>,
}

impl Document {
    /// Creates an empty document.
    pub fn new() -> Self {
        Self { fields: Vec::new() }
    }

    /// Builder-style setter.
    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.set(name, value);
        self
    }

    /// Sets a field, replacing any previous value.
    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        let name = name.into();
        match self.fields.iter_mut().find(|(n, _)| *n == name) {
            Some((_, slot)) => *slot = value,
            None => self.fields.push((name, value)),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| v)
    }

    /// Removes a field and returns its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let pos = self.fields.iter().position(|(n, _)| n == name)?;
        Some(self.fields.remove(pos).1)
    }

    /// Returns the stable identifier as text, if present and non-empty.
    pub fn id(&self) -> Option<String> {
        self.get(ID_FIELD)
            .filter(|v| !v.is_empty())
            .and_then(Value::to_text)
    }

    /// Removes the stable identifier field and returns it as text.
    pub fn take_id(&mut self) -> Option<String> {
        self.remove(ID_FIELD)
            .filter(|v| !v.is_empty())
            .and_then(|v| v.to_text())
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(n, v)| (n.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Builds a document from a JSON object. Returns `None` for non-objects.
    pub fn from_json(value: serde_json::Value) -> Option<Self> {
        match value {
            serde_json::Value::Object(map) => {
                let mut doc = Document::new();
                for (name, v) in map {
                    doc.set(name, Value::from(v));
                }
                Some(doc)
            }
            _ => None,
        }
    }
}

impl FromIterator<(String, Value)> for Document {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut doc = Document::new();
        for (name, value) in iter {
            doc.set(name, value);
        }
        doc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    #[test]
    fn test_empty_values() {
        assert!(Value::Null.is_empty());
        assert!(Value::Text(String::new()).is_empty());
        assert!(!Value::Text(" ".into()).is_empty());
        assert!(!Value::Bool(false).is_empty());
        assert!(!Value::Int(0).is_empty());
    }

    #[test]
    fn test_as_integral() {
        assert_eq!(Value::Int(7).as_integral(), Some(7));
        assert_eq!(Value::Float(42.0).as_integral(), Some(42));
        assert_eq!(Value::Float(42.5).as_integral(), None);
        assert_eq!(Value::Float(f64::NAN).as_integral(), None);
        assert_eq!(Value::Float(1e20).as_integral(), None);
        assert_eq!(Value::Text("42".into()).as_integral(), None);
    }

    #[test]
    fn test_canonical_timestamp() {
        let ts = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 5).unwrap();
        assert_eq!(canonical_timestamp(&ts), "2024-03-01T12:30:05.000Z");
        assert_eq!(
            Value::Timestamp(ts).to_text().as_deref(),
            Some("2024-03-01T12:30:05.000Z")
        );
    }

    #[test]
    fn test_document_set_replaces_in_place() {
        let mut doc = Document::new()
            .with_field("a", Value::Int(1))
            .with_field("b", Value::Int(2));
        doc.set("a", Value::Int(3));

        let names: Vec<&str> = doc.fields().map(|(n, _)| n).collect();
        assert_eq!(names, vec!["a", "b"]);
        assert_eq!(doc.get("a"), Some(&Value::Int(3)));
    }

    #[test]
    fn test_take_id() {
        let mut doc = Document::new()
            .with_field(ID_FIELD, Value::Text("abc123".into()))
            .with_field("total", Value::Int(42));

        assert_eq!(doc.id().as_deref(), Some("abc123"));
        assert_eq!(doc.take_id().as_deref(), Some("abc123"));
        assert!(doc.get(ID_FIELD).is_none());
        assert_eq!(doc.len(), 1);
    }

    #[test]
    fn test_take_id_rejects_empty() {
        let mut doc = Document::new().with_field(ID_FIELD, Value::Text(String::new()));
        assert_eq!(doc.take_id(), None);

        let mut numeric = Document::new().with_field(ID_FIELD, Value::Int(17));
        assert_eq!(numeric.take_id().as_deref(), Some("17"));
    }

    #[test]
    fn test_from_json() {
        let doc = Document::from_json(json!({
            "_id": "abc123",
            "total": 42,
            "ratio": 0.5,
            "paid": true,
            "tags": ["a", "b"],
            "missing": null
        }))
        .unwrap();

        assert_eq!(doc.get("total"), Some(&Value::Int(42)));
        assert_eq!(doc.get("ratio"), Some(&Value::Float(0.5)));
        assert_eq!(doc.get("paid"), Some(&Value::Bool(true)));
        assert_eq!(doc.get("tags"), Some(&Value::Text(r#"["a","b"]"#.into())));
        assert_eq!(doc.get("missing"), Some(&Value::Null));

        assert!(Document::from_json(json!([1, 2])).is_none());
    }
}
