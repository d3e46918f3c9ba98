//! SQL execution backend abstraction.
//!
//! The gateway never talks to a database directly. Every statement it compiles is handed to a
//! [`SqlBackend`], which runs it against the JSON document store and reports rows or counts back.
//!
//! # Overview
//!
//! Rows travel as storage-JSON text, one string per document, exactly as the store returns
//! them. Decoding them into [`Document`](crate::document::Document)s is the caller's job.
//! Implementations must be thread-safe (`Send + Sync`) since one backend serves every
//! in-flight command.
//!
//! # Traits
//!
//! - [`SqlBackend`]: The core trait for SQL backends
//! - [`SqlBackendBuilder`]: Factory trait for creating backend instances
//!
//! # Examples
//!
//! ```ignore
//! use docgate_core::backend::SqlBackend;
//!
//! let rows = backend.query(r#"SELECT * FROM "test"."users""#).await?;
//! let removed = backend.execute(r#"DELETE FROM "test"."users""#).await?;
//! ```

use async_trait::async_trait;
use std::fmt::Debug;

use crate::error::GatewayResult;

/// Abstract interface for the relational JSON document store.
///
/// # Cancellation
///
/// Dropping a returned future abandons the statement. Implementations that hold remote
/// resources should release them on drop.
///
/// # Error Handling
///
/// Failures are reported as [`GatewayError::Backend`](crate::error::GatewayError::Backend)
/// carrying the store's message.
#[async_trait]
pub trait SqlBackend: Send + Sync + Debug {
    /// Runs a `SELECT` and returns each row as a storage-JSON document string.
    ///
    /// # Arguments
    ///
    /// * `sql` - A complete `SELECT` statement, including any `LIMIT`/`OFFSET`.
    ///
    /// # Returns
    ///
    /// The matching rows in the order the store produced them. An empty vector when nothing
    /// matches.
    async fn query(&self, sql: &str) -> GatewayResult<Vec<String>>;

    /// Runs a `SELECT COUNT(*)` and returns the single count it produces.
    async fn query_count(&self, sql: &str) -> GatewayResult<u64>;

    /// Runs an `INSERT`, `UPDATE` or `DELETE` and returns the number of affected rows.
    ///
    /// For an `UPDATE` this counts only the rows the statement's `WHERE` admitted, so a
    /// guarded update reports the rows it actually changed.
    ///
    /// # Errors
    ///
    /// Constraint violations, such as a second row with the same `_id`, are failures like
    /// any other and come back as [`GatewayError::Backend`](crate::error::GatewayError::Backend).
    async fn execute(&self, sql: &str) -> GatewayResult<u64>;

    /// Releases backend resources. The default implementation is a no-op.
    async fn shutdown(self) -> GatewayResult<()>
    where
        Self: Sized,
    {
        Ok(())
    }
}

#[async_trait]
impl<B> SqlBackend for &B
where
    B: SqlBackend,
{
    async fn query(&self, sql: &str) -> GatewayResult<Vec<String>> {
        (*self).query(sql).await
    }

    async fn query_count(&self, sql: &str) -> GatewayResult<u64> {
        (*self).query_count(sql).await
    }

    async fn execute(&self, sql: &str) -> GatewayResult<u64> {
        (*self).execute(sql).await
    }
}

#[async_trait]
impl<B> SqlBackend for std::sync::Arc<B>
where
    B: SqlBackend,
{
    async fn query(&self, sql: &str) -> GatewayResult<Vec<String>> {
        (**self).query(sql).await
    }

    async fn query_count(&self, sql: &str) -> GatewayResult<u64> {
        (**self).query_count(sql).await
    }

    async fn execute(&self, sql: &str) -> GatewayResult<u64> {
        (**self).execute(sql).await
    }
}

#[async_trait]
pub trait SqlBackendBuilder {
    type Backend: SqlBackend;

    async fn build(self) -> GatewayResult<Self::Backend>;
}
