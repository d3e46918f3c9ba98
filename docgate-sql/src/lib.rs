//! SQL compilers for docgate.
//!
//! Each compiler is a pure function from a command sub-document to a SQL fragment for the
//! JSON document store:
//!
//! - [`filter`] - Filter documents to `WHERE` expressions
//! - [`update`] - `$set`/`$unset` documents to assignments plus a no-op guard
//! - [`projection`] - Projection documents to select lists, and the in-memory exclusion pass
//! - [`statement`] - Full `SELECT`/`INSERT`/`UPDATE`/`DELETE` statements
//!
//! The building blocks are shared: [`path`] compiles dotted field paths, [`literal`] renders
//! values and owns all escaping, and [`regex`] maps the supported regex subset to `LIKE`.
//!
//! # Example
//!
//! ```ignore
//! use docgate_core::document;
//! use docgate_sql::{compile_filter, statement::{self, Page, Table}};
//!
//! let filter = compile_filter(&document! { "name" => document! { "$gte" => "M" } })?;
//! let sql = statement::select(&Table::new("test", "users"), "*", filter.as_deref(), Page::default());
//!
//! assert_eq!(sql, r#"SELECT * FROM "test"."users" WHERE ("name" >= 'M')"#);
//! ```

pub mod filter;
pub mod literal;
pub mod path;
pub mod projection;
pub mod regex;
pub mod statement;
pub mod update;

pub use filter::{SqlFilterTranslator, compile_expr, compile_filter};
pub use projection::{Projection, compile_projection};
pub use update::{UpdateClause, UpdateOps, compile_update, compile_update_ops};
