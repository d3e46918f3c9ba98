//! The value universe: every type a document field or array element may hold.

use chrono::{DateTime, Utc};

use crate::{
    document::{Array, Document},
    object_id::ObjectId,
};

/// A regular expression kept as its source pattern and option flags.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Regex {
    /// The pattern source, without delimiters.
    pub pattern: String,
    /// Option flags such as `i` or `m`.
    pub options: String,
}

impl Regex {
    /// Creates a regex from a pattern and options.
    pub fn new(pattern: impl Into<String>, options: impl Into<String>) -> Self {
        Self { pattern: pattern.into(), options: options.into() }
    }
}

/// A dynamically typed document value.
///
/// The variant set is closed: binary, decimal128 and timestamp values exist in the wire
/// format but cannot be represented here, so decoders reject them instead of dropping them.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Present with no value.
    Null,
    /// Boolean value.
    Boolean(bool),
    /// 32-bit signed integer.
    Int32(i32),
    /// 64-bit signed integer.
    Int64(i64),
    /// 64-bit float.
    Double(f64),
    /// UTF-8 string.
    String(String),
    /// Nested document.
    Document(Document),
    /// Nested array.
    Array(Array),
    /// 12-byte object identifier.
    ObjectId(ObjectId),
    /// UTC datetime at millisecond resolution.
    DateTime(DateTime<Utc>),
    /// Regular expression.
    Regex(Regex),
}

impl Value {
    /// Returns the MongoDB type alias for this value, as used in error messages.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Boolean(_) => "bool",
            Value::Int32(_) => "int",
            Value::Int64(_) => "long",
            Value::Double(_) => "double",
            Value::String(_) => "string",
            Value::Document(_) => "object",
            Value::Array(_) => "array",
            Value::ObjectId(_) => "objectId",
            Value::DateTime(_) => "date",
            Value::Regex(_) => "regex",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_document(&self) -> Option<&Document> {
        match self {
            Value::Document(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Array> {
        match self {
            Value::Array(arr) => Some(arr),
            _ => None,
        }
    }

    /// Returns the value as an `i64` when it is a number with no fractional part.
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            Value::Int32(n) => Some(i64::from(*n)),
            Value::Int64(n) => Some(*n),
            Value::Double(f) if f.fract() == 0.0 && f.abs() < 9.2e18 => Some(*f as i64),
            _ => None,
        }
    }

    /// Interprets the value as a flag: booleans as-is, numbers as non-zero.
    ///
    /// Returns `None` for every other type.
    pub fn as_flag(&self) -> Option<bool> {
        match self {
            Value::Boolean(b) => Some(*b),
            Value::Int32(n) => Some(*n != 0),
            Value::Int64(n) => Some(*n != 0),
            Value::Double(f) => Some(*f != 0.0),
            _ => None,
        }
    }

    /// Renders the value the way the MongoDB shell prints it, e.g. in duplicate key errors.
    pub fn canonical(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Boolean(b) => b.to_string(),
            Value::Int32(n) => n.to_string(),
            Value::Int64(n) => n.to_string(),
            Value::Double(f) if f.is_finite() && f.fract() == 0.0 => format!("{f:.1}"),
            Value::Double(f) => f.to_string(),
            Value::String(s) => format!("{s:?}"),
            Value::Document(doc) if doc.is_empty() => "{}".to_string(),
            Value::Document(doc) => format!(
                "{{ {} }}",
                doc.iter()
                    .map(|(k, v)| format!("{k}: {}", v.canonical()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
            Value::Array(arr) if arr.is_empty() => "[]".to_string(),
            Value::Array(arr) => format!(
                "[ {} ]",
                arr.iter().map(Value::canonical).collect::<Vec<_>>().join(", ")
            ),
            Value::ObjectId(oid) => format!("ObjectId('{}')", oid.to_hex()),
            Value::DateTime(dt) => format!("new Date({})", dt.timestamp_millis()),
            Value::Regex(re) => format!("/{}/{}", re.pattern, re.options),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int32(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int64(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Double(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<Document> for Value {
    fn from(value: Document) -> Self {
        Value::Document(value)
    }
}

impl From<Array> for Value {
    fn from(value: Array) -> Self {
        Value::Array(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::Array(Array::from(value))
    }
}

impl From<ObjectId> for Value {
    fn from(value: ObjectId) -> Self {
        Value::ObjectId(value)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::DateTime(value)
    }
}

impl From<Regex> for Value {
    fn from(value: Regex) -> Self {
        Value::Regex(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{array, document};

    #[test]
    fn canonical_matches_shell_output() {
        let oid = ObjectId::parse_str("62ea6a943d44b10e1b6b8797").unwrap();

        assert_eq!(Value::from(oid).canonical(), "ObjectId('62ea6a943d44b10e1b6b8797')");
        assert_eq!(Value::from("abc").canonical(), "\"abc\"");
        assert_eq!(Value::from(2.0).canonical(), "2.0");
        assert_eq!(Value::from(2.5).canonical(), "2.5");
        assert_eq!(
            Value::from(document! { "a" => 1, "b" => array![1, "x"] }).canonical(),
            "{ a: 1, b: [ 1, \"x\" ] }"
        );
        assert_eq!(Value::from(Regex::new("^a", "i")).canonical(), "/^a/i");
    }

    #[test]
    fn as_integer_accepts_integral_numbers_only() {
        assert_eq!(Value::Int32(3).as_integer(), Some(3));
        assert_eq!(Value::Int64(-4).as_integer(), Some(-4));
        assert_eq!(Value::Double(5.0).as_integer(), Some(5));
        assert_eq!(Value::Double(5.5).as_integer(), None);
        assert_eq!(Value::from("5").as_integer(), None);
    }

    #[test]
    fn flags_follow_truthiness() {
        assert_eq!(Value::Boolean(false).as_flag(), Some(false));
        assert_eq!(Value::Int32(0).as_flag(), Some(false));
        assert_eq!(Value::Double(0.5).as_flag(), Some(true));
        assert_eq!(Value::Null.as_flag(), None);
    }
}
