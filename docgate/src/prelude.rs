//! Convenient re-exports of commonly used types from docgate.
//!
//! ```ignore
//! use docgate::prelude::*;
//! ```
//!
//! This provides access to:
//! - The document model and its macros
//! - The gateway, its builder and configuration
//! - The backend traits, and `async_trait` to implement them
//! - Filter parsing and the expression visitor
//! - Error types

pub use docgate_core::{
    array, document,
    document::{Array, Document},
    value::{Regex, Value},
    object_id::ObjectId,
    backend::{SqlBackend, SqlBackendBuilder},
    query::{Expr, FieldOp, Query, QueryBuilder, QueryVisitor, Sort, SortDirection},
    error::{DecodeError, GatewayError, GatewayResult},
};
pub use docgate_commands::{Gateway, GatewayBuilder, GatewayConfig};
pub use async_trait::async_trait;
