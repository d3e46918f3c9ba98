//! The binary document format spoken on the wire.
//!
//! Layout is little-endian throughout. A document is an `int32` total length, a run of
//! elements, and a `0x00` terminator; an element is a type byte, a NUL-terminated key and a
//! type-specific payload. Arrays are documents whose keys are `"0"`, `"1"`, ... in order.
//!
//! Every payload type implements the sealed [`WireType`] trait. Decoders check each declared
//! length against the bytes that are actually available and against the bytes the value
//! consumed, and report the difference in the error.

use chrono::{DateTime, Utc};
use docgate_core::{
    Array, DecodeError, Document, GatewayError, GatewayResult, ObjectId, Regex, Value,
};

pub const TYPE_DOUBLE: u8 = 0x01;
pub const TYPE_STRING: u8 = 0x02;
pub const TYPE_DOCUMENT: u8 = 0x03;
pub const TYPE_ARRAY: u8 = 0x04;
pub const TYPE_OBJECT_ID: u8 = 0x07;
pub const TYPE_BOOLEAN: u8 = 0x08;
pub const TYPE_DATETIME: u8 = 0x09;
pub const TYPE_NULL: u8 = 0x0A;
pub const TYPE_REGEX: u8 = 0x0B;
pub const TYPE_INT32: u8 = 0x10;
pub const TYPE_INT64: u8 = 0x12;

// Smallest document: length prefix plus terminator.
const MIN_DOCUMENT_LEN: usize = 5;

mod sealed {
    pub trait Sealed {}
}

/// A payload type of the wire format.
pub trait WireType: Sized + sealed::Sealed {
    /// The element type byte that introduces this payload.
    const ELEMENT_TYPE: u8;

    /// Appends the payload bytes to `buf`.
    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()>;

    /// Reads one payload from `reader`, consuming exactly its bytes.
    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self>;
}

/// A forward-only cursor over wire bytes.
#[derive(Debug)]
pub struct Reader<'a> {
    data: &'a [u8],
    index: usize,
}

impl<'a> Reader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, index: 0 }
    }

    /// Bytes consumed so far.
    pub fn position(&self) -> usize {
        self.index
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.index
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(&self) -> GatewayResult<()> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(DecodeError::TrailingData { remaining }.into()),
        }
    }

    fn read_exact(&mut self, len: usize) -> GatewayResult<&'a [u8]> {
        let available = self.remaining();
        if len > available {
            return Err(DecodeError::UnexpectedEof { needed: len, available }.into());
        }

        let start = self.index;
        self.index += len;
        Ok(&self.data[start..start + len])
    }

    fn read_array<const N: usize>(&mut self) -> GatewayResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_exact(N)?);
        Ok(out)
    }

    fn read_u8(&mut self) -> GatewayResult<u8> {
        Ok(self.read_exact(1)?[0])
    }

    fn read_i32(&mut self) -> GatewayResult<i32> {
        Ok(i32::from_le_bytes(self.read_array()?))
    }

    fn read_i64(&mut self) -> GatewayResult<i64> {
        Ok(i64::from_le_bytes(self.read_array()?))
    }

    fn read_length(&mut self, min: usize, what: &str) -> GatewayResult<usize> {
        let declared = self.read_i32()?;
        usize::try_from(declared)
            .ok()
            .filter(|len| *len >= min)
            .ok_or_else(|| DecodeError::Malformed(format!("invalid {what} length {declared}")).into())
    }

    fn read_cstring(&mut self, what: &'static str) -> GatewayResult<String> {
        let rest = &self.data[self.index..];
        let Some(nul) = rest.iter().position(|b| *b == 0) else {
            return Err(DecodeError::UnexpectedEof {
                needed: rest.len() + 1,
                available: rest.len(),
            }
            .into());
        };

        let bytes = self.read_exact(nul + 1)?;
        std::str::from_utf8(&bytes[..nul])
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8(what).into())
    }
}

fn write_cstring(buf: &mut Vec<u8>, s: &str, what: &str) -> GatewayResult<()> {
    if s.as_bytes().contains(&0) {
        return Err(GatewayError::BadValue(format!("{what} must not contain NUL bytes")));
    }

    buf.extend_from_slice(s.as_bytes());
    buf.push(0);
    Ok(())
}

fn write_length(buf: &mut [u8], start: usize) -> GatewayResult<()> {
    let len = i32::try_from(buf.len() - start)
        .map_err(|_| GatewayError::BadValue("document exceeds the maximum size".into()))?;
    buf[start..start + 4].copy_from_slice(&len.to_le_bytes());
    Ok(())
}

/// Encodes a wire type into a fresh buffer.
pub fn encode<T: WireType>(value: &T) -> GatewayResult<Vec<u8>> {
    let mut buf = Vec::new();
    value.encode(&mut buf)?;
    Ok(buf)
}

/// Decodes a wire type that must span all of `bytes`.
pub fn decode_exact<T: WireType>(bytes: &[u8]) -> GatewayResult<T> {
    let mut reader = Reader::new(bytes);
    let value = T::decode(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

/// Encodes a document into wire bytes.
pub fn encode_document(doc: &Document) -> GatewayResult<Vec<u8>> {
    encode(doc)
}

/// Decodes a document that must span all of `bytes`.
pub fn decode_document(bytes: &[u8]) -> GatewayResult<Document> {
    decode_exact(bytes)
}

/// Returns the element type byte used for `value`.
pub fn element_type(value: &Value) -> u8 {
    match value {
        Value::Null => TYPE_NULL,
        Value::Boolean(_) => bool::ELEMENT_TYPE,
        Value::Int32(_) => i32::ELEMENT_TYPE,
        Value::Int64(_) => i64::ELEMENT_TYPE,
        Value::Double(_) => f64::ELEMENT_TYPE,
        Value::String(_) => String::ELEMENT_TYPE,
        Value::Document(_) => Document::ELEMENT_TYPE,
        Value::Array(_) => Array::ELEMENT_TYPE,
        Value::ObjectId(_) => ObjectId::ELEMENT_TYPE,
        Value::DateTime(_) => DateTime::<Utc>::ELEMENT_TYPE,
        Value::Regex(_) => Regex::ELEMENT_TYPE,
    }
}

fn encode_payload(value: &Value, buf: &mut Vec<u8>) -> GatewayResult<()> {
    match value {
        Value::Null => Ok(()),
        Value::Boolean(b) => b.encode(buf),
        Value::Int32(n) => n.encode(buf),
        Value::Int64(n) => n.encode(buf),
        Value::Double(f) => f.encode(buf),
        Value::String(s) => s.encode(buf),
        Value::Document(doc) => doc.encode(buf),
        Value::Array(arr) => arr.encode(buf),
        Value::ObjectId(oid) => oid.encode(buf),
        Value::DateTime(dt) => dt.encode(buf),
        Value::Regex(re) => re.encode(buf),
    }
}

fn decode_payload(element_type: u8, reader: &mut Reader<'_>) -> GatewayResult<Value> {
    let value = match element_type {
        TYPE_NULL => Value::Null,
        TYPE_BOOLEAN => Value::Boolean(bool::decode(reader)?),
        TYPE_INT32 => Value::Int32(i32::decode(reader)?),
        TYPE_INT64 => Value::Int64(i64::decode(reader)?),
        TYPE_DOUBLE => Value::Double(f64::decode(reader)?),
        TYPE_STRING => Value::String(String::decode(reader)?),
        TYPE_DOCUMENT => Value::Document(Document::decode(reader)?),
        TYPE_ARRAY => Value::Array(Array::decode(reader)?),
        TYPE_OBJECT_ID => Value::ObjectId(ObjectId::decode(reader)?),
        TYPE_DATETIME => Value::DateTime(DateTime::<Utc>::decode(reader)?),
        TYPE_REGEX => Value::Regex(Regex::decode(reader)?),
        other => return Err(unsupported(other).into()),
    };

    Ok(value)
}

fn unsupported(element_type: u8) -> DecodeError {
    match element_type {
        0x05 => DecodeError::Unsupported("binary"),
        0x06 => DecodeError::Unsupported("undefined"),
        0x0C => DecodeError::Unsupported("dbpointer"),
        0x0D => DecodeError::Unsupported("javascript"),
        0x0E => DecodeError::Unsupported("symbol"),
        0x0F => DecodeError::Unsupported("javascript with scope"),
        0x11 => DecodeError::Unsupported("timestamp"),
        0x13 => DecodeError::Unsupported("decimal128"),
        0x7F => DecodeError::Unsupported("maxkey"),
        0xFF => DecodeError::Unsupported("minkey"),
        other => DecodeError::UnknownType(other),
    }
}

// Shared by documents and arrays: length prefix, elements, terminator.
fn encode_elements<'v>(
    buf: &mut Vec<u8>,
    elements: impl Iterator<Item = (String, &'v Value)>,
) -> GatewayResult<()> {
    let start = buf.len();
    buf.extend_from_slice(&[0; 4]);

    for (key, value) in elements {
        buf.push(element_type(value));
        write_cstring(buf, &key, "keys")?;
        encode_payload(value, buf)?;
    }

    buf.push(0);
    write_length(buf, start)
}

fn decode_elements(
    reader: &mut Reader<'_>,
    mut on_element: impl FnMut(String, Value) -> GatewayResult<()>,
) -> GatewayResult<()> {
    let start = reader.position();
    let declared = reader.read_length(MIN_DOCUMENT_LEN, "document")?;

    let available = reader.remaining() + 4;
    if declared > available {
        return Err(DecodeError::UnexpectedEof { needed: declared, available }.into());
    }

    loop {
        let element_type = reader.read_u8()?;
        if element_type == 0 {
            break;
        }

        let key = reader.read_cstring("element key")?;
        let value = decode_payload(element_type, reader)?;
        on_element(key, value)?;
    }

    let consumed = reader.position() - start;
    if consumed != declared {
        return Err(DecodeError::LengthMismatch { declared, consumed }.into());
    }

    Ok(())
}

impl sealed::Sealed for f64 {}
impl WireType for f64 {
    const ELEMENT_TYPE: u8 = TYPE_DOUBLE;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        Ok(f64::from_le_bytes(reader.read_array()?))
    }
}

impl sealed::Sealed for String {}
impl WireType for String {
    const ELEMENT_TYPE: u8 = TYPE_STRING;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        let len = i32::try_from(self.len() + 1)
            .map_err(|_| GatewayError::BadValue("string exceeds the maximum size".into()))?;
        buf.extend_from_slice(&len.to_le_bytes());
        buf.extend_from_slice(self.as_bytes());
        buf.push(0);
        Ok(())
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        let len = reader.read_length(1, "string")?;
        let bytes = reader.read_exact(len)?;

        let (body, terminator) = bytes.split_at(len - 1);
        if terminator != [0] {
            return Err(DecodeError::Malformed("string is not NUL-terminated".into()).into());
        }

        String::from_utf8(body.to_vec()).map_err(|_| DecodeError::InvalidUtf8("string").into())
    }
}

impl sealed::Sealed for Document {}
impl WireType for Document {
    const ELEMENT_TYPE: u8 = TYPE_DOCUMENT;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        encode_elements(buf, self.iter().map(|(k, v)| (k.to_string(), v)))
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        let mut doc = Document::new();
        decode_elements(reader, |key, value| {
            if doc.contains_key(&key) {
                return Err(DecodeError::Malformed(format!("duplicate key {key:?}")).into());
            }
            doc.set(key, value)
        })?;

        Ok(doc)
    }
}

impl sealed::Sealed for Array {}
impl WireType for Array {
    const ELEMENT_TYPE: u8 = TYPE_ARRAY;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        encode_elements(buf, self.iter().enumerate().map(|(i, v)| (i.to_string(), v)))
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        let mut arr = Array::new();
        decode_elements(reader, |key, value| {
            if key != arr.len().to_string() {
                return Err(DecodeError::Malformed(format!(
                    "array key {key:?} is out of sequence, expected \"{}\"",
                    arr.len()
                ))
                .into());
            }
            arr.append(value);
            Ok(())
        })?;

        Ok(arr)
    }
}

impl sealed::Sealed for ObjectId {}
impl WireType for ObjectId {
    const ELEMENT_TYPE: u8 = TYPE_OBJECT_ID;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        buf.extend_from_slice(&self.bytes());
        Ok(())
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        Ok(ObjectId::from_bytes(reader.read_array()?))
    }
}

impl sealed::Sealed for bool {}
impl WireType for bool {
    const ELEMENT_TYPE: u8 = TYPE_BOOLEAN;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        buf.push(u8::from(*self));
        Ok(())
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        match reader.read_u8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::Malformed(format!("invalid boolean byte {other}")).into()),
        }
    }
}

impl sealed::Sealed for DateTime<Utc> {}
impl WireType for DateTime<Utc> {
    const ELEMENT_TYPE: u8 = TYPE_DATETIME;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        buf.extend_from_slice(&self.timestamp_millis().to_le_bytes());
        Ok(())
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        let millis = reader.read_i64()?;
        DateTime::from_timestamp_millis(millis).ok_or_else(|| {
            DecodeError::Malformed(format!("datetime {millis} is out of range")).into()
        })
    }
}

impl sealed::Sealed for Regex {}
impl WireType for Regex {
    const ELEMENT_TYPE: u8 = TYPE_REGEX;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        write_cstring(buf, &self.pattern, "regex patterns")?;
        write_cstring(buf, &self.options, "regex options")
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        let pattern = reader.read_cstring("regex pattern")?;
        let options = reader.read_cstring("regex options")?;
        Ok(Regex::new(pattern, options))
    }
}

impl sealed::Sealed for i32 {}
impl WireType for i32 {
    const ELEMENT_TYPE: u8 = TYPE_INT32;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        reader.read_i32()
    }
}

impl sealed::Sealed for i64 {}
impl WireType for i64 {
    const ELEMENT_TYPE: u8 = TYPE_INT64;

    fn encode(&self, buf: &mut Vec<u8>) -> GatewayResult<()> {
        buf.extend_from_slice(&self.to_le_bytes());
        Ok(())
    }

    fn decode(reader: &mut Reader<'_>) -> GatewayResult<Self> {
        reader.read_i64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::{array, document};

    fn sample() -> Document {
        document! {
            "_id" => ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap(),
            "name" => "Ada",
            "age" => 36,
            "big" => 5_000_000_000_i64,
            "score" => 9.5,
            "active" => true,
            "nothing" => Value::Null,
            "born" => DateTime::from_timestamp_millis(1_700_000_000_123).unwrap(),
            "address" => document! { "city" => "London", "zip" => "N1" },
            "tags" => array!["x", 1, array![2.5]],
        }
    }

    fn oracle() -> bson::Document {
        bson::doc! {
            "_id": bson::oid::ObjectId::parse_str("65a1b2c3d4e5f60718293a4b").unwrap(),
            "name": "Ada",
            "age": 36,
            "big": 5_000_000_000_i64,
            "score": 9.5,
            "active": true,
            "nothing": bson::Bson::Null,
            "born": bson::DateTime::from_millis(1_700_000_000_123),
            "address": { "city": "London", "zip": "N1" },
            "tags": ["x", 1, [2.5]],
        }
    }

    #[test]
    fn encoding_matches_bson_bytes() {
        let expected = bson::serialize_to_vec(&oracle()).unwrap();

        assert_eq!(encode_document(&sample()).unwrap(), expected);
    }

    #[test]
    fn decodes_bson_bytes() {
        let bytes = bson::serialize_to_vec(&oracle()).unwrap();
        let doc = decode_document(&bytes).unwrap();

        assert_eq!(doc, sample());
        assert_eq!(doc.keys()[0], "_id");
        assert_eq!(encode_document(&doc).unwrap(), bytes);
    }

    #[test]
    fn regex_is_two_cstrings() {
        let doc = document! { "r" => Regex::new("^a", "i") };
        let bytes = encode_document(&doc).unwrap();

        assert_eq!(bytes, vec![13, 0, 0, 0, TYPE_REGEX, b'r', 0, b'^', b'a', 0, b'i', 0, 0]);
        assert_eq!(decode_document(&bytes).unwrap(), doc);
    }

    #[test]
    fn empty_document_is_five_bytes() {
        assert_eq!(encode_document(&Document::new()).unwrap(), vec![5, 0, 0, 0, 0]);
    }

    #[test]
    fn truncated_input_reports_missing_bytes() {
        let bytes = encode_document(&document! { "a" => 1 }).unwrap();

        assert_eq!(
            decode_document(&bytes[..bytes.len() - 3]).unwrap_err(),
            GatewayError::Decode(DecodeError::UnexpectedEof {
                needed: bytes.len(),
                available: bytes.len() - 3,
            })
        );
        assert_eq!(
            decode_document(&bytes[..2]).unwrap_err(),
            GatewayError::Decode(DecodeError::UnexpectedEof { needed: 4, available: 2 })
        );
    }

    #[test]
    fn trailing_bytes_are_rejected() {
        let mut bytes = encode_document(&document! { "a" => 1 }).unwrap();
        bytes.extend_from_slice(&[0xAA, 0xBB]);

        assert_eq!(
            decode_document(&bytes).unwrap_err(),
            GatewayError::Decode(DecodeError::TrailingData { remaining: 2 })
        );
    }

    #[test]
    fn declared_length_must_match_contents() {
        let mut bytes = encode_document(&document! { "a" => 1 }).unwrap();
        bytes.push(0);
        let declared = bytes.len() as i32;
        bytes[..4].copy_from_slice(&declared.to_le_bytes());

        assert_eq!(
            decode_document(&bytes).unwrap_err(),
            GatewayError::Decode(DecodeError::LengthMismatch {
                declared: bytes.len(),
                consumed: bytes.len() - 1,
            })
        );
    }

    #[test]
    fn scalar_decoders_consume_exactly() {
        assert_eq!(decode_exact::<i32>(&7_i32.to_le_bytes()).unwrap(), 7);
        assert_eq!(
            decode_exact::<i32>(&[1, 0, 0, 0, 9]).unwrap_err(),
            GatewayError::Decode(DecodeError::TrailingData { remaining: 1 })
        );
        assert_eq!(
            decode_exact::<f64>(&[0; 7]).unwrap_err(),
            GatewayError::Decode(DecodeError::UnexpectedEof { needed: 8, available: 7 })
        );
        assert_eq!(
            decode_exact::<ObjectId>(&[0; 11]).unwrap_err(),
            GatewayError::Decode(DecodeError::UnexpectedEof { needed: 12, available: 11 })
        );
        assert_eq!(decode_exact::<String>(&encode(&"hé".to_string()).unwrap()).unwrap(), "hé");
    }

    #[test]
    fn strings_must_be_terminated() {
        let bytes = [3, 0, 0, 0, b'a', b'b', b'c'];

        assert!(matches!(
            decode_exact::<String>(&bytes).unwrap_err(),
            GatewayError::Decode(DecodeError::Malformed(_))
        ));
        assert!(matches!(
            decode_exact::<String>(&[0, 0, 0, 0]).unwrap_err(),
            GatewayError::Decode(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn unsupported_types_are_rejected() {
        let theirs = bson::doc! { "ts": bson::Timestamp { time: 1, increment: 2 } };
        let bytes = bson::serialize_to_vec(&theirs).unwrap();

        assert_eq!(
            decode_document(&bytes).unwrap_err(),
            GatewayError::Decode(DecodeError::Unsupported("timestamp"))
        );

        let unknown = [8, 0, 0, 0, 0x42, b'a', 0, 0];
        assert_eq!(
            decode_document(&unknown).unwrap_err(),
            GatewayError::Decode(DecodeError::UnknownType(0x42))
        );
    }

    #[test]
    fn array_keys_must_be_sequential() {
        let mut bytes = encode(&array![1, 2]).unwrap();
        // Rename the second key from "1" to "5".
        let pos = bytes.iter().rposition(|b| *b == b'1').unwrap();
        bytes[pos] = b'5';

        assert!(matches!(
            decode_exact::<Array>(&bytes).unwrap_err(),
            GatewayError::Decode(DecodeError::Malformed(_))
        ));
    }

    #[test]
    fn nul_in_regex_pattern_cannot_be_encoded() {
        let doc = document! { "r" => Regex::new("a\0b", "") };

        assert!(matches!(encode_document(&doc), Err(GatewayError::BadValue(_))));
    }
}
