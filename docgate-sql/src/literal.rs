//! Identifier quoting and SQL literals.
//!
//! All escaping in this crate happens here. Literals mirror the storage JSON tags so a
//! comparison against a stored field sees the same shape the store persisted.

use docgate_core::{Document, Value};

/// Member holding an int64 that would otherwise read back as an int32.
pub const LONG_TAG: &str = "$l";
/// Member holding an integral or non-finite double.
pub const DOUBLE_TAG: &str = "tf";

// Every i64 in this range converts to f64 and back without saturating.
const I64_AS_F64: std::ops::Range<f64> = -9_223_372_036_854_775_808.0..9_223_372_036_854_775_808.0;

/// Quotes an identifier as `"name"`, doubling embedded double quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quotes a string literal as `'text'`, doubling embedded single quotes.
pub fn quote_string(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// Renders a value as a SQL literal.
pub fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Boolean(b) => b.to_string(),
        Value::Int32(n) => n.to_string(),
        Value::Int64(n) if i32::try_from(*n).is_ok() => format!("{{\"{LONG_TAG}\": {n}}}"),
        Value::Int64(n) => n.to_string(),
        Value::Double(f) if f.is_finite() && f.fract() != 0.0 => f.to_string(),
        Value::Double(f) if f.is_nan() => format!("{{\"{DOUBLE_TAG}\": 'NaN'}}"),
        Value::Double(f) if f.is_infinite() => {
            let name = if f.is_sign_positive() { "Infinity" } else { "-Infinity" };
            format!("{{\"{DOUBLE_TAG}\": '{name}'}}")
        }
        Value::Double(f) => format!("{{\"{DOUBLE_TAG}\": {f:?}}}"),
        Value::String(s) => quote_string(s),
        Value::Document(doc) => document_literal(doc),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(literal).collect();
            format!("[{}]", items.join(", "))
        }
        Value::ObjectId(oid) => format!("{{\"oid\": {}}}", quote_string(&oid.to_hex())),
        Value::DateTime(dt) => format!("{{\"$d\": {}}}", dt.timestamp_millis()),
        Value::Regex(re) => format!(
            "{{\"$r\": {}, \"o\": {}}}",
            quote_string(&re.pattern),
            quote_string(&re.options)
        ),
    }
}

/// Every literal a number equal to `value` may be stored as.
///
/// Numbers compare by value across int32, int64 and double, but each width is persisted in
/// its own shape: `5` may be stored as `5`, `{"$l": 5}` or `{"tf": 5.0}`. Returns `None`
/// for values that are not finite numbers.
pub fn numeric_equivalents(value: &Value) -> Option<Vec<String>> {
    let integer = match value {
        Value::Int32(n) => i64::from(*n),
        Value::Int64(n) => *n,
        Value::Double(f) if f.is_finite() && f.fract() == 0.0 && I64_AS_F64.contains(f) => {
            *f as i64
        }
        Value::Double(f) if f.is_finite() => return Some(vec![literal(value)]),
        _ => return None,
    };

    let mut shapes = vec![integer.to_string()];
    if let Ok(small) = i32::try_from(integer) {
        shapes.push(literal(&Value::Int64(i64::from(small))));
    }
    let double = integer as f64;
    if I64_AS_F64.contains(&double) && double as i64 == integer {
        shapes.push(literal(&Value::Double(double)));
    }
    Some(shapes)
}

/// Renders a finite number as a bare SQL number, for ordering comparisons against the
/// numeric members of tagged shapes. Returns `None` for anything else.
pub fn numeric_bound(value: &Value) -> Option<String> {
    match value {
        Value::Int32(n) => Some(n.to_string()),
        Value::Int64(n) => Some(n.to_string()),
        Value::Double(f) if f.is_finite() && f.fract() == 0.0 => Some(format!("{f:?}")),
        Value::Double(f) if f.is_finite() => Some(f.to_string()),
        _ => None,
    }
}

// Same member order as the storage encoding: `_id` first.
fn document_literal(doc: &Document) -> String {
    let id = doc.get("_id").ok().map(|v| ("_id", v));
    let members: Vec<String> = id
        .into_iter()
        .chain(doc.iter().filter(|(k, _)| *k != "_id"))
        .map(|(k, v)| format!("{}: {}", quote_ident(k), literal(v)))
        .collect();

    format!("{{{}}}", members.join(", "))
}
