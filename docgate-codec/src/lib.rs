//! Wire and storage codecs for docgate documents.
//!
//! - [`wire`] reads and writes the length-prefixed binary document format spoken by
//!   MongoDB clients.
//! - [`storage`] reads and writes the tagged JSON dialect persisted by the document store.
//!
//! Both families decode with exact consumption: a value must use every byte (or character)
//! it was given, and leftovers are reported as [`DecodeError::TrailingData`].
//!
//! # Example
//!
//! ```ignore
//! use docgate_codec::{storage, wire};
//!
//! let doc = wire::decode_document(&bytes)?;
//! let row = storage::to_storage_json(&doc)?;
//! ```
//!
//! [`DecodeError::TrailingData`]: docgate_core::DecodeError::TrailingData

pub mod storage;
pub mod wire;

use docgate_core::{Document, GatewayResult};

/// Converts a document into a [`bson::Document`].
///
/// The conversion goes through the wire bytes, so both sides agree on every supported type.
pub fn to_bson(doc: &Document) -> GatewayResult<bson::Document> {
    let bytes = wire::encode_document(doc)?;
    Ok(bson::deserialize_from_slice(&bytes)?)
}

/// Converts a [`bson::Document`] into a document.
///
/// Fails with [`DecodeError::Unsupported`](docgate_core::DecodeError::Unsupported) when the
/// input holds binary, decimal128, timestamp or other values docgate cannot represent.
pub fn from_bson(doc: &bson::Document) -> GatewayResult<Document> {
    let bytes = bson::serialize_to_vec(doc)?;
    wire::decode_document(&bytes)
}
