//! The tagged JSON dialect persisted by the document store.
//!
//! Null, booleans, strings, int32 values, documents and arrays use plain JSON. Types that
//! plain JSON cannot carry are wrapped in single-purpose tag objects:
//!
//! | Type | Stored as |
//! |---|---|
//! | int64 inside the int32 range | `{"$l": 5}` |
//! | int64 outside the int32 range | bare integer |
//! | double with a fraction | bare number |
//! | integral, infinite or NaN double | `{"tf": 2.0}`, `{"tf": "NaN"}`, `{"tf": "-Infinity"}` |
//! | ObjectId | `{"oid": "<24 hex chars>"}` |
//! | datetime | `{"$d": <millis>}` |
//! | regex | `{"$r": "<pattern>", "o": "<options>"}` |
//!
//! Bare integers decode to int32 when they fit, to int64 otherwise, and anything else
//! decodes to a double. Documents are written with `_id` first; all other keys keep their
//! order, and decoding returns keys in the order they appear in the text.
//!
//! The tags are persisted and must not change.

use std::fmt;

use chrono::DateTime;
use docgate_core::{
    Array, DecodeError, Document, GatewayError, GatewayResult, ObjectId, Regex, Value,
};
use serde::{
    Deserialize, Deserializer, Serialize, Serializer,
    de::{self, MapAccess, SeqAccess, Visitor},
    ser::{self, SerializeMap},
};

pub const OID_TAG: &str = "oid";
pub const DATE_TAG: &str = "$d";
pub const LONG_TAG: &str = "$l";
pub const DOUBLE_TAG: &str = "tf";
pub const REGEX_TAG: &str = "$r";
pub const REGEX_OPTIONS_TAG: &str = "o";

const ID_KEY: &str = "_id";

/// Encodes a document as storage JSON text.
pub fn to_storage_json(doc: &Document) -> GatewayResult<String> {
    serde_json::to_string(&StorageDocument(doc)).map_err(|e| GatewayError::BadValue(e.to_string()))
}

/// Encodes any value as storage JSON text.
pub fn value_to_storage_json(value: &Value) -> GatewayResult<String> {
    serde_json::to_string(&StorageValue(value)).map_err(|e| GatewayError::BadValue(e.to_string()))
}

/// Decodes storage JSON text that must hold exactly one document.
pub fn from_storage_json(text: &str) -> GatewayResult<Document> {
    match value_from_storage_json(text)? {
        Value::Document(doc) => Ok(doc),
        other => Err(DecodeError::Malformed(format!(
            "expected a stored document, found {}",
            other.type_name()
        ))
        .into()),
    }
}

/// Decodes storage JSON text that must hold exactly one value.
///
/// Only whitespace may follow the value; anything else is reported as
/// [`DecodeError::TrailingData`] with the number of unconsumed bytes. Text that ends inside
/// the value is reported as [`DecodeError::UnexpectedEof`].
pub fn value_from_storage_json(text: &str) -> GatewayResult<Value> {
    let mut stream = serde_json::Deserializer::from_str(text).into_iter::<StoredValue>();

    let value = match stream.next() {
        Some(Ok(decoded)) => decoded.0,
        Some(Err(err)) if err.is_eof() => return Err(truncated(text)),
        Some(Err(err)) => return Err(err.into()),
        None => return Err(truncated(text)),
    };

    let remaining = text[stream.byte_offset()..].trim_start().len();
    if remaining > 0 {
        return Err(DecodeError::TrailingData { remaining }.into());
    }

    Ok(value)
}

// The text ended inside a value; at least one more byte was needed.
fn truncated(text: &str) -> GatewayError {
    DecodeError::UnexpectedEof { needed: text.len() + 1, available: text.len() }.into()
}

/// Serializes a document with `_id` first.
pub struct StorageDocument<'a>(pub &'a Document);

impl Serialize for StorageDocument<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let doc = self.0;
        if let Some(tag) = tag_shape(doc) {
            return Err(ser::Error::custom(format!(
                "a document shaped like the {tag:?} storage tag cannot be stored"
            )));
        }

        let mut map = serializer.serialize_map(Some(doc.len()))?;
        if let Ok(id) = doc.get(ID_KEY) {
            map.serialize_entry(ID_KEY, &StorageValue(id))?;
        }
        for (key, value) in doc.iter().filter(|(key, _)| *key != ID_KEY) {
            map.serialize_entry(key, &StorageValue(value))?;
        }
        map.end()
    }
}

/// Serializes a single value in storage form.
pub struct StorageValue<'a>(pub &'a Value);

impl Serialize for StorageValue<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Value::Null => serializer.serialize_unit(),
            Value::Boolean(b) => serializer.serialize_bool(*b),
            Value::Int32(n) => serializer.serialize_i32(*n),
            Value::Int64(n) if i32::try_from(*n).is_ok() => tagged(serializer, LONG_TAG, n),
            Value::Int64(n) => serializer.serialize_i64(*n),
            Value::Double(f) if f.is_finite() && f.fract() != 0.0 => serializer.serialize_f64(*f),
            Value::Double(f) if f.is_nan() => tagged(serializer, DOUBLE_TAG, "NaN"),
            Value::Double(f) if *f == f64::INFINITY => tagged(serializer, DOUBLE_TAG, "Infinity"),
            Value::Double(f) if *f == f64::NEG_INFINITY => {
                tagged(serializer, DOUBLE_TAG, "-Infinity")
            }
            Value::Double(f) => tagged(serializer, DOUBLE_TAG, f),
            Value::String(s) => serializer.serialize_str(s),
            Value::Document(doc) => StorageDocument(doc).serialize(serializer),
            Value::Array(arr) => serializer.collect_seq(arr.iter().map(StorageValue)),
            Value::ObjectId(oid) => tagged(serializer, OID_TAG, &oid.to_hex()),
            Value::DateTime(dt) => tagged(serializer, DATE_TAG, &dt.timestamp_millis()),
            Value::Regex(re) => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry(REGEX_TAG, &re.pattern)?;
                map.serialize_entry(REGEX_OPTIONS_TAG, &re.options)?;
                map.end()
            }
        }
    }
}

fn tagged<S, T>(serializer: S, tag: &str, payload: &T) -> Result<S::Ok, S::Error>
where
    S: Serializer,
    T: Serialize + ?Sized,
{
    let mut map = serializer.serialize_map(Some(1))?;
    map.serialize_entry(tag, payload)?;
    map.end()
}

// Returns the tag a document would be mistaken for when read back.
fn tag_shape(doc: &Document) -> Option<&'static str> {
    let keys: Vec<&str> = doc.keys().iter().map(String::as_str).collect();
    match keys.as_slice() {
        [OID_TAG] => Some(OID_TAG),
        [DATE_TAG] => Some(DATE_TAG),
        [LONG_TAG] => Some(LONG_TAG),
        [DOUBLE_TAG] => Some(DOUBLE_TAG),
        [REGEX_TAG, REGEX_OPTIONS_TAG] => Some(REGEX_TAG),
        _ => None,
    }
}

/// A value decoded from storage JSON.
#[derive(Debug)]
pub struct StoredValue(pub Value);

impl<'de> Deserialize<'de> for StoredValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(StoredValueVisitor)
    }
}

struct StoredValueVisitor;

impl<'de> Visitor<'de> for StoredValueVisitor {
    type Value = StoredValue;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("a storage JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(StoredValue(Value::Null))
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(StoredValue(Value::Boolean(v)))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(StoredValue(match i32::try_from(v) {
            Ok(n) => Value::Int32(n),
            Err(_) => Value::Int64(v),
        }))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(StoredValue(match (i32::try_from(v), i64::try_from(v)) {
            (Ok(n), _) => Value::Int32(n),
            (Err(_), Ok(n)) => Value::Int64(n),
            (Err(_), Err(_)) => Value::Double(v as f64),
        }))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        Ok(StoredValue(Value::Double(v)))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(StoredValue(Value::String(v.to_owned())))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(StoredValue(Value::String(v)))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut arr = Array::new();
        while let Some(StoredValue(value)) = seq.next_element()? {
            arr.append(value);
        }
        Ok(StoredValue(Value::Array(arr)))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let mut doc = Document::new();
        while let Some(key) = map.next_key::<String>()? {
            if doc.contains_key(&key) {
                return Err(de::Error::custom(format!("duplicate key {key:?}")));
            }
            let StoredValue(value) = map.next_value()?;
            doc.set(key, value).map_err(de::Error::custom)?;
        }

        untag(doc).map(StoredValue).map_err(de::Error::custom)
    }
}

// Unwraps tag objects into the typed value they stand for.
fn untag(mut doc: Document) -> Result<Value, GatewayError> {
    let Some(tag) = tag_shape(&doc) else {
        return Ok(Value::Document(doc));
    };

    let payload = doc.remove(tag).unwrap_or(Value::Null);
    let value = match (tag, payload) {
        (OID_TAG, Value::String(hex)) => Value::ObjectId(ObjectId::parse_str(&hex)?),
        (DATE_TAG, payload) => Value::DateTime(decode_datetime(&payload)?),
        (LONG_TAG, Value::Int32(n)) => Value::Int64(i64::from(n)),
        (LONG_TAG, Value::Int64(n)) => Value::Int64(n),
        (DOUBLE_TAG, Value::Double(f)) => Value::Double(f),
        (DOUBLE_TAG, Value::Int32(n)) => Value::Double(f64::from(n)),
        (DOUBLE_TAG, Value::Int64(n)) => Value::Double(n as f64),
        (DOUBLE_TAG, Value::String(s)) => Value::Double(match s.as_str() {
            "NaN" => f64::NAN,
            "Infinity" => f64::INFINITY,
            "-Infinity" => f64::NEG_INFINITY,
            other => return Err(malformed(DOUBLE_TAG, other)),
        }),
        (REGEX_TAG, Value::String(pattern)) => match doc.remove(REGEX_OPTIONS_TAG) {
            Some(Value::String(options)) => Value::Regex(Regex::new(pattern, options)),
            other => return Err(malformed(REGEX_OPTIONS_TAG, &format!("{other:?}"))),
        },
        (tag, payload) => return Err(malformed(tag, &payload.canonical())),
    };

    Ok(value)
}

fn decode_datetime(payload: &Value) -> Result<chrono::DateTime<chrono::Utc>, GatewayError> {
    let millis = match payload {
        Value::Int32(n) => i64::from(*n),
        Value::Int64(n) => *n,
        Value::String(s) => s.parse().map_err(|_| malformed(DATE_TAG, s))?,
        other => return Err(malformed(DATE_TAG, &other.canonical())),
    };

    DateTime::from_timestamp_millis(millis).ok_or_else(|| malformed(DATE_TAG, &millis.to_string()))
}

fn malformed(tag: &str, payload: &str) -> GatewayError {
    DecodeError::Malformed(format!("invalid payload {payload} for storage tag {tag:?}")).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::{array, document};
    use proptest::prelude::*;

    #[test]
    fn id_is_written_first() {
        let doc = document! { "name" => "Ada", "_id" => 1, "age" => 36 };

        assert_eq!(to_storage_json(&doc).unwrap(), r#"{"_id":1,"name":"Ada","age":36}"#);
    }

    #[test]
    fn tagged_types_use_wrappers() {
        let oid = ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap();
        let doc = document! {
            "oid" => oid,
            "small" => 5_i64,
            "big" => 5_000_000_000_i64,
            "whole" => 2.0,
            "frac" => 2.5,
            "nan" => f64::NAN,
            "inf" => f64::NEG_INFINITY,
            "when" => DateTime::from_timestamp_millis(1_700_000_000_000).unwrap(),
            "re" => Regex::new("^a", "i"),
        };

        assert_eq!(
            to_storage_json(&doc).unwrap(),
            concat!(
                r#"{"oid":{"oid":"65a1b2c3d4e5f60718293a4b"},"small":{"$l":5},"big":5000000000,"#,
                r#""whole":{"tf":2.0},"frac":2.5,"nan":{"tf":"NaN"},"inf":{"tf":"-Infinity"},"#,
                r#""when":{"$d":1700000000000},"re":{"$r":"^a","o":"i"}}"#,
            )
        );
    }

    #[test]
    fn bare_numbers_pick_the_narrowest_type() {
        let doc = from_storage_json(r#"{"a":7,"b":-3000000000,"c":1.5,"d":20000000000000000000}"#)
            .unwrap();

        assert_eq!(doc.get("a").unwrap(), &Value::Int32(7));
        assert_eq!(doc.get("b").unwrap(), &Value::Int64(-3_000_000_000));
        assert_eq!(doc.get("c").unwrap(), &Value::Double(1.5));
        assert_eq!(doc.get("d").unwrap(), &Value::Double(2e19));
    }

    #[test]
    fn tags_decode_to_typed_values() {
        let doc = from_storage_json(concat!(
            r#"{"_id":{"oid":"65a1b2c3d4e5f60718293a4b"},"l":{"$l":5},"f":{"tf":2.0},"#,
            r#""g":{"tf":3},"n":{"tf":"NaN"},"d":{"$d":"1700000000000"},"r":{"$r":"x","o":""}}"#,
        ))
        .unwrap();

        assert_eq!(doc.get("l").unwrap(), &Value::Int64(5));
        assert_eq!(doc.get("f").unwrap(), &Value::Double(2.0));
        assert_eq!(doc.get("g").unwrap(), &Value::Double(3.0));
        assert!(matches!(doc.get("n").unwrap(), Value::Double(f) if f.is_nan()));
        assert_eq!(
            doc.get("d").unwrap(),
            &Value::DateTime(DateTime::from_timestamp_millis(1_700_000_000_000).unwrap())
        );
        assert_eq!(doc.get("r").unwrap(), &Value::Regex(Regex::new("x", "")));
        assert!(matches!(doc.get("_id").unwrap(), Value::ObjectId(_)));
    }

    #[test]
    fn short_object_id_is_rejected() {
        let err = from_storage_json(r#"{"_id":{"oid":"65a1b2"}}"#).unwrap_err();

        assert!(matches!(err, GatewayError::Decode(DecodeError::Malformed(msg)) if msg.contains("12 bytes")));
    }

    #[test]
    fn key_order_follows_the_text() {
        let doc = from_storage_json(r#"{"z":1,"a":{"y":2,"b":3},"m":[{"q":1,"c":2}]}"#).unwrap();

        assert_eq!(doc.keys(), ["z", "a", "m"]);
        assert_eq!(doc.get_path("a").and_then(Value::as_document).unwrap().keys(), ["y", "b"]);
    }

    #[test]
    fn trailing_text_is_reported() {
        assert_eq!(
            from_storage_json(r#"{"a":1} xy"#).unwrap_err(),
            GatewayError::Decode(DecodeError::TrailingData { remaining: 2 })
        );
        assert!(from_storage_json("{\"a\":1}\n  ").is_ok());
        assert_eq!(
            value_from_storage_json("   ").unwrap_err(),
            GatewayError::Decode(DecodeError::UnexpectedEof { needed: 4, available: 3 })
        );
    }

    #[test]
    fn truncated_text_is_an_unexpected_end() {
        assert_eq!(
            from_storage_json(r#"{"a":1"#).unwrap_err(),
            GatewayError::Decode(DecodeError::UnexpectedEof { needed: 7, available: 6 })
        );
        assert_eq!(
            value_from_storage_json(r#"["x", {"oid":"#).unwrap_err(),
            GatewayError::Decode(DecodeError::UnexpectedEof { needed: 14, available: 13 })
        );
        assert!(matches!(
            from_storage_json(r#"{"a":}"#),
            Err(GatewayError::Decode(DecodeError::Malformed(_)))
        ));
    }

    #[test]
    fn duplicate_and_reserved_keys_are_rejected() {
        assert!(from_storage_json(r#"{"a":1,"a":2}"#).is_err());
        assert!(from_storage_json(r#"{"$k":1}"#).is_err());
    }

    #[test]
    fn tag_shaped_documents_cannot_be_stored() {
        let doc = document! { "nested" => document! { "oid" => "abc" } };

        assert!(matches!(to_storage_json(&doc), Err(GatewayError::BadValue(_))));
        assert!(to_storage_json(&document! { "oid" => "abc", "x" => 1 }).is_ok());
    }

    #[test]
    fn scalars_round_trip() {
        for value in [
            Value::Null,
            Value::Boolean(false),
            Value::Int32(-4),
            Value::Int64(i64::MIN),
            Value::Int64(0),
            Value::Double(-0.5),
            Value::Double(1e300),
            Value::Double(f64::INFINITY),
            Value::from("quote \" and \\"),
            array![1, "two", Value::Null].into(),
        ] {
            let text = value_to_storage_json(&value).unwrap();
            assert_eq!(value_from_storage_json(&text).unwrap(), value, "{text}");
        }
    }

    fn key() -> impl Strategy<Value = String> {
        prop_oneof![Just("_id".to_string()), "k[a-z0-9_]{0,6}"]
    }

    proptest! {
        #[test]
        fn stored_keys_keep_their_order(keys in proptest::collection::vec(key(), 2..8)) {
            let mut doc = Document::new();
            for (i, k) in keys.iter().enumerate() {
                doc.set(k.clone(), i as i32).unwrap();
            }

            let decoded = from_storage_json(&to_storage_json(&doc).unwrap()).unwrap();

            let mut expected: Vec<&str> = doc.keys().iter().map(String::as_str).collect();
            if let Some(pos) = expected.iter().position(|k| *k == "_id") {
                let id = expected.remove(pos);
                expected.insert(0, id);
            }
            prop_assert_eq!(decoded.keys(), expected.as_slice());
        }
    }
}
