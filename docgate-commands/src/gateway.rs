//! The command gateway.
//!
//! A [`Gateway`] owns a [`SqlBackend`] and a [`GatewayConfig`]. It routes command documents
//! to their handlers by command name, runs the SQL they compile, and turns any failure into
//! an error reply. The connection must stay usable after an error, so [`Gateway::handle`]
//! never fails.
//!
//! # Example
//!
//! ```ignore
//! use docgate_commands::Gateway;
//! use docgate_core::document;
//!
//! let gateway = Gateway::builder(backend).default_database("app").build();
//!
//! let reply = gateway
//!     .handle(&document! { "find" => "users", "filter" => document! { "age" => 30 } })
//!     .await;
//! ```

use tracing::{debug, info, warn};

use docgate_codec::{storage, wire};
use docgate_core::{
    Document, GatewayError, GatewayResult, Value,
    backend::SqlBackend,
    query::{Expr, FieldOp},
};
use docgate_sql::{
    compile_expr,
    statement::{self, Page, Table},
};

use crate::{config::GatewayConfig, reply::error_reply};

/// Translates MongoDB commands into SQL against a document store.
#[derive(Debug)]
pub struct Gateway<B: SqlBackend> {
    backend: B,
    config: GatewayConfig,
}

impl<B: SqlBackend> Gateway<B> {
    /// Creates a gateway with the default configuration.
    pub fn new(backend: B) -> Self {
        Self::with_config(backend, GatewayConfig::default())
    }

    pub fn with_config(backend: B, config: GatewayConfig) -> Self {
        info!(
            default_database = %config.default_database,
            generate_ids = config.generate_ids,
            "gateway.built"
        );
        Self { backend, config }
    }

    pub fn builder(backend: B) -> GatewayBuilder<B> {
        GatewayBuilder::new(backend)
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Releases the backend.
    pub async fn shutdown(self) -> GatewayResult<()> {
        self.backend.shutdown().await
    }

    /// Handles one command document and returns its reply.
    ///
    /// # Arguments
    ///
    /// * `command` - A command document whose first key names the command.
    ///
    /// # Returns
    ///
    /// The command's reply. This never fails: errors are reported in the reply as
    /// `{ ok: 0.0, errmsg, code, codeName }`, with `CommandNotFound` for unknown commands,
    /// `BadValue` for malformed arguments, `NotImplemented` for unsupported operators and
    /// `InternalError` when the backend fails.
    pub async fn handle(&self, command: &Document) -> Document {
        let name = command.first_key().unwrap_or_default();

        match self.dispatch(name, command).await {
            Ok(reply) => reply,
            Err(err) => {
                warn!(
                    command = name,
                    code = err.code(),
                    code_name = err.code_name(),
                    error = %err,
                    "gateway.command_failed"
                );
                error_reply(&err)
            }
        }
    }

    /// Decodes a wire command, handles it and encodes the reply.
    pub async fn handle_wire(&self, bytes: &[u8]) -> GatewayResult<Vec<u8>> {
        let command = wire::decode_document(bytes)?;
        let reply = self.handle(&command).await;
        wire::encode_document(&reply)
    }

    async fn dispatch(&self, name: &str, command: &Document) -> GatewayResult<Document> {
        match name {
            "find" => self.find(command).await,
            "count" => self.count(command).await,
            "insert" => self.insert(command).await,
            "update" => self.update(command).await,
            "delete" => self.delete(command).await,
            "findAndModify" | "findandmodify" => self.find_and_modify(command).await,
            "" => Err(GatewayError::BadValue("empty command document".into())),
            other => Err(GatewayError::CommandNotFound(other.to_string())),
        }
    }

    /// The table a command addresses: its first value names the collection, `$db` the
    /// database.
    pub(crate) fn table(&self, command: &Document) -> GatewayResult<Table> {
        let collection = command
            .first_key()
            .and_then(|name| command.get(name).ok())
            .and_then(Value::as_str)
            .filter(|collection| !collection.is_empty())
            .ok_or_else(|| GatewayError::BadValue("collection name must be a non-empty string".into()))?;

        let db = match command.get("$db") {
            Ok(Value::String(db)) => db.as_str(),
            Ok(other) => {
                return Err(GatewayError::BadValue(format!(
                    "$db must be a string, got {}",
                    other.type_name()
                )));
            }
            Err(_) => self.config.default_database.as_str(),
        };

        Ok(Table::new(db, collection))
    }

    pub(crate) async fn query(&self, sql: &str) -> GatewayResult<Vec<Document>> {
        debug!(sql, "gateway.sql.query");
        self.backend
            .query(sql)
            .await?
            .iter()
            .map(|row| storage::from_storage_json(row))
            .collect()
    }

    pub(crate) async fn query_count(&self, sql: &str) -> GatewayResult<u64> {
        debug!(sql, "gateway.sql.count");
        self.backend.query_count(sql).await
    }

    pub(crate) async fn execute(&self, sql: &str) -> GatewayResult<u64> {
        debug!(sql, "gateway.sql.execute");
        self.backend.execute(sql).await
    }

    /// The `_id` of the first document matching `filter`, if any.
    pub(crate) async fn first_id(&self, table: &Table, filter: Option<&str>) -> GatewayResult<Option<Value>> {
        let sql = statement::select(
            table,
            "{\"_id\": \"_id\"}",
            filter,
            Page { limit: Some(1), offset: None },
        );

        Ok(self.query(&sql).await?.into_iter().next().and_then(|mut doc| doc.remove("_id")))
    }

    /// Inserts one document, generating its `_id` when needed.
    ///
    /// Fails with [`GatewayError::DuplicateKey`] when a document with an equal `_id` exists;
    /// numeric ids are equal across widths. Returns the `_id` the document was stored under.
    ///
    /// The check and the write are separate statements, so a concurrent insert of the same
    /// `_id` can land in between. The store then rejects the write, and the failure is
    /// reported as a duplicate once the `_id` is found taken.
    pub(crate) async fn insert_one(&self, table: &Table, doc: Document) -> GatewayResult<Value> {
        let doc = self.with_id(doc)?;
        let id = doc.get("_id")?.clone();
        let taken = statement::select_count(
            table,
            Some(&compile_expr(&Expr::field("_id", FieldOp::Eq, id.clone()))?),
        );

        if self.query_count(&taken).await? > 0 {
            return Err(GatewayError::DuplicateKey(table.namespace(), id.canonical()));
        }

        let json = storage::to_storage_json(&doc)?;
        if let Err(err) = self.execute(&statement::insert(table, &json)).await {
            return match self.query_count(&taken).await {
                Ok(n) if n > 0 => {
                    debug!(namespace = %table.namespace(), "gateway.insert.lost_race");
                    Err(GatewayError::DuplicateKey(table.namespace(), id.canonical()))
                }
                _ => Err(err),
            };
        }
        Ok(id)
    }

    // `_id` goes first, as MongoDB stores it.
    fn with_id(&self, doc: Document) -> GatewayResult<Document> {
        if doc.contains_key("_id") {
            return Ok(doc);
        }
        if !self.config.generate_ids {
            return Err(GatewayError::BadValue("document is missing an _id".into()));
        }

        let mut with_id = Document::with_capacity(doc.len() + 1);
        with_id.set("_id", docgate_core::ObjectId::new())?;
        for (key, value) in doc {
            with_id.set(key, value)?;
        }
        Ok(with_id)
    }
}

/// Builder for [`Gateway`].
#[derive(Debug)]
pub struct GatewayBuilder<B: SqlBackend> {
    backend: B,
    config: GatewayConfig,
}

impl<B: SqlBackend> GatewayBuilder<B> {
    pub fn new(backend: B) -> Self {
        Self { backend, config: GatewayConfig::default() }
    }

    /// Replaces the whole configuration.
    pub fn config(mut self, config: GatewayConfig) -> Self {
        self.config = config;
        self
    }

    pub fn default_database(mut self, db: impl Into<String>) -> Self {
        self.config.default_database = db.into();
        self
    }

    pub fn generate_ids(mut self, generate_ids: bool) -> Self {
        self.config.generate_ids = generate_ids;
        self
    }

    pub fn build(self) -> Gateway<B> {
        Gateway::with_config(self.backend, self.config)
    }
}
