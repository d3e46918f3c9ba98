//! MongoDB command handlers for docgate.
//!
//! The [`Gateway`] accepts command documents (`find`, `count`, `insert`, `update`, `delete`,
//! `findAndModify`), compiles them to SQL with `docgate-sql`, runs the statements through a
//! [`SqlBackend`](docgate_core::backend::SqlBackend) and answers with MongoDB reply
//! documents. Results always fit in a single batch, so cursor ids are 0.
//!
//! Every SQL statement is logged at `debug` level and every error reply at `warn` level with
//! `tracing`. Installing a subscriber is up to the embedding application.

mod commands;

pub mod config;
pub mod gateway;
pub mod reply;
pub mod sort;

pub use config::GatewayConfig;
pub use gateway::{Gateway, GatewayBuilder};
