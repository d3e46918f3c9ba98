//! Core data model for a MongoDB wire-protocol gateway backed by a relational JSON document store.
//!
//! This crate is the core of the docgate project and provides:
//!
//! - **Values and documents** ([`value`], [`document`]) - The ordered document model shared by
//!   the wire codec, the storage codec and the SQL compilers
//! - **Object ids** ([`object_id`]) - 12-byte identifiers with process-unique generation
//! - **Comparison** ([`compare`]) - MongoDB-compatible scalar comparison and sort order
//! - **Filters** ([`query`]) - Filter parsing into an expression tree and the visitor used to
//!   translate it
//! - **Backend abstraction** ([`backend`]) - The seam to the SQL document store
//! - **Error handling** ([`error`]) - Error types with MongoDB error codes
//!
//! # Example
//!
//! ```ignore
//! use docgate_core::{document, query::parse_filter};
//!
//! let mut doc = document! { "_id" => 1, "name" => "Alice" };
//! doc.set_path("address.city", "Berlin")?;
//!
//! let filter = parse_filter(&document! { "name" => "Alice" })?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as docgate_core;

pub mod backend;
pub mod compare;
pub mod document;
pub mod error;
pub mod object_id;
pub mod query;
pub mod value;

pub use document::{Array, Document};
pub use error::{DecodeError, GatewayError, GatewayResult};
pub use object_id::ObjectId;
pub use value::{Regex, Value};
