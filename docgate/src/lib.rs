//! Main docgate crate: a MongoDB wire-protocol gateway for relational JSON document stores.
//!
//! This crate is the entry point for users of docgate. It re-exports the document model, the
//! codecs, the SQL compilers and the command gateway from their sub-crates.
//!
//! # Features
//!
//! - **Ordered documents** - Key order and numeric widths survive every conversion
//! - **Two codecs** - The binary wire format and the store's tagged JSON
//! - **SQL compilers** - Filters, updates and projections compiled to the store's dialect
//! - **Command handlers** - `find`, `count`, `insert`, `update`, `delete` and `findAndModify`
//!
//! # Quick Start
//!
//! ```ignore
//! use docgate::prelude::*;
//!
//! #[derive(Debug)]
//! struct MyStore { /* connection pool */ }
//!
//! #[async_trait]
//! impl SqlBackend for MyStore {
//!     async fn query(&self, sql: &str) -> GatewayResult<Vec<String>> { todo!() }
//!     async fn query_count(&self, sql: &str) -> GatewayResult<u64> { todo!() }
//!     async fn execute(&self, sql: &str) -> GatewayResult<u64> { todo!() }
//! }
//!
//! #[tokio::main]
//! async fn main() -> GatewayResult<()> {
//!     let gateway = Gateway::builder(MyStore {}).default_database("app").build();
//!
//!     // Commands as decoded from the wire
//!     let reply = gateway
//!         .handle(&document! {
//!             "insert" => "users",
//!             "documents" => array![document! { "name" => "Alice", "age" => 30 }],
//!         })
//!         .await;
//!
//!     // Or straight from the bytes of an OP_MSG body
//!     let reply_bytes = gateway.handle_wire(&request_bytes).await?;
//!
//!     gateway.shutdown().await
//! }
//! ```
//!
//! # Compilers on their own
//!
//! The SQL compilers are pure functions and can be used without a gateway:
//!
//! ```ignore
//! use docgate::{prelude::*, sql::compile_filter};
//!
//! let sql = compile_filter(&document! { "name" => document! { "$gte" => "M" } })?;
//! assert_eq!(sql.as_deref(), Some(r#"("name" >= 'M')"#));
//! ```

pub mod prelude;

pub use docgate_core::{backend, compare, document, error, object_id, query, value};

/// Wire and storage codecs.
pub mod codec {
    pub use docgate_codec::{from_bson, storage, to_bson, wire};
}

/// SQL compilers.
pub mod sql {
    pub use docgate_sql::*;
}

/// Command handlers.
pub mod commands {
    pub use docgate_commands::*;
}

// Re-export BSON types for convenience
pub use bson;
