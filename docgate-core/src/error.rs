//! Error types and result types for gateway operations.
//!
//! This module provides the error taxonomy shared by the document model, the codecs,
//! the SQL compilers and the command handlers. Use [`GatewayResult<T>`] as the return
//! type for fallible operations. Only the command handlers turn a [`GatewayError`] into
//! a wire-protocol error document; everything below them propagates errors unchanged.

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Represents all possible errors that can occur while translating and executing a command.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GatewayError {
    /// A recognized but unsupported input shape. Carries the offending operator or field.
    #[error("{0} is not implemented")]
    NotImplemented(String),
    /// A structurally invalid input, such as the wrong value type for an operator.
    #[error("{0}")]
    BadValue(String),
    /// An update attempted to modify an immutable field.
    #[error("Performing an update on the path '{0}' would modify the immutable field '{0}'")]
    ImmutableField(String),
    /// Truncated or malformed wire bytes or storage JSON.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
    /// A document with the same `_id` already exists.
    /// The first argument is the namespace, the second is the canonical form of the key.
    #[error("E11000 duplicate key error collection: {0} index: _id_ dup key: {{ _id: {1} }}")]
    DuplicateKey(String, String),
    /// The requested key is not present in the document.
    #[error("key not found: {0}")]
    KeyNotFound(String),
    /// The key is empty or collides with a reserved storage token.
    #[error("invalid key: {0:?}")]
    InvalidKey(String),
    /// An array access outside of `0..len`.
    #[error("index {index} is out of bounds for array of length {len}")]
    IndexOutOfBounds {
        /// The requested index.
        index: usize,
        /// The length of the array at the time of access.
        len: usize,
    },
    /// The command name is not handled by the gateway.
    #[error("no such command: '{0}'")]
    CommandNotFound(String),
    /// An error reported by the relational store.
    #[error("backend error: {0}")]
    Backend(String),
    /// A violated internal invariant.
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// Returns the MongoDB error code reported to clients.
    pub fn code(&self) -> i32 {
        match self {
            GatewayError::Internal(_) | GatewayError::Backend(_) => 1,
            GatewayError::BadValue(_)
            | GatewayError::InvalidKey(_)
            | GatewayError::IndexOutOfBounds { .. } => 2,
            GatewayError::KeyNotFound(_) => 4,
            GatewayError::Decode(_) => 9,
            GatewayError::CommandNotFound(_) => 59,
            GatewayError::ImmutableField(_) => 66,
            GatewayError::NotImplemented(_) => 238,
            GatewayError::DuplicateKey(..) => 11000,
        }
    }

    /// Returns the MongoDB code name matching [`GatewayError::code`].
    pub fn code_name(&self) -> &'static str {
        match self.code() {
            2 => "BadValue",
            4 => "NoSuchKey",
            9 => "FailedToParse",
            59 => "CommandNotFound",
            66 => "ImmutableField",
            238 => "NotImplemented",
            11000 => "DuplicateKey",
            _ => "InternalError",
        }
    }
}

/// Errors raised by the wire and storage-JSON decoders.
///
/// Length-related variants always report how many bytes (or characters) were missing
/// or left unconsumed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// The input ended before a value was complete.
    #[error("unexpected end of input: needed {needed} bytes, {available} available")]
    UnexpectedEof {
        /// Bytes required by the value being decoded.
        needed: usize,
        /// Bytes left in the input.
        available: usize,
    },
    /// Input remained after the value was fully decoded.
    #[error("{remaining} bytes of trailing data after value")]
    TrailingData {
        /// Bytes left unconsumed.
        remaining: usize,
    },
    /// A container declared a length that differs from what its contents consumed.
    #[error("declared length {declared} does not match consumed length {consumed}")]
    LengthMismatch {
        /// Length stated in the container header.
        declared: usize,
        /// Bytes actually consumed by the container.
        consumed: usize,
    },
    /// A type tag outside of the known wire types.
    #[error("unknown element type 0x{0:02x}")]
    UnknownType(u8),
    /// A known type that cannot be represented end-to-end.
    #[error("{0} values are not supported")]
    Unsupported(&'static str),
    /// A string was not valid UTF-8.
    #[error("invalid UTF-8 in {0}")]
    InvalidUtf8(&'static str),
    /// An ObjectID did not decode to exactly 12 bytes.
    #[error("object id must be 12 bytes, got {0}")]
    InvalidObjectId(usize),
    /// Anything else that does not follow the format.
    #[error("{0}")]
    Malformed(String),
}

/// A specialized `Result` type for gateway operations.
pub type GatewayResult<T> = Result<T, GatewayError>;

impl From<BsonError> for GatewayError {
    fn from(err: BsonError) -> Self {
        GatewayError::Decode(DecodeError::Malformed(err.to_string()))
    }
}

impl From<SerdeJsonError> for GatewayError {
    fn from(err: SerdeJsonError) -> Self {
        GatewayError::Decode(DecodeError::Malformed(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_key_message_matches_mongodb() {
        let err = GatewayError::DuplicateKey("test.users".into(), "1".into());

        assert_eq!(
            err.to_string(),
            "E11000 duplicate key error collection: test.users index: _id_ dup key: { _id: 1 }"
        );
        assert_eq!(err.code(), 11000);
        assert_eq!(err.code_name(), "DuplicateKey");
    }

    #[test]
    fn immutable_field_names_the_path() {
        let err = GatewayError::ImmutableField("_id".into());

        assert_eq!(
            err.to_string(),
            "Performing an update on the path '_id' would modify the immutable field '_id'"
        );
        assert_eq!(err.code(), 66);
    }

    #[test]
    fn decode_errors_report_byte_counts() {
        let err: GatewayError = DecodeError::TrailingData { remaining: 3 }.into();

        assert_eq!(err.to_string(), "decode error: 3 bytes of trailing data after value");
        assert_eq!(err.code_name(), "FailedToParse");
    }
}
