use docgate_core::{Document, GatewayResult, Value, backend::SqlBackend, document};
use docgate_sql::{
    UpdateOps, compile_update_ops,
    statement::{self, Table},
};

use super::{optional_document, optional_flag, statements, upsert_seed};
use crate::{
    gateway::Gateway,
    reply::{WriteReply, count_value},
};

/// What one update statement did.
#[derive(Debug, Default, PartialEq)]
pub(crate) struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: Option<Value>,
}

impl<B: SqlBackend> Gateway<B> {
    /// `update`: runs each `{ q, u, upsert, multi }` statement.
    ///
    /// `n` counts matched documents, from a `COUNT(*)` on the filter. `nModified` counts the
    /// rows the guarded `UPDATE` touched, so rows already in the target state are matched but
    /// not modified.
    pub(crate) async fn update(&self, command: &Document) -> GatewayResult<Document> {
        let table = self.table(command)?;
        let updates = statements(command, "updates")?;
        let ordered = optional_flag(command, "ordered", true)?;

        let mut reply = WriteReply { n_modified: Some(0), ..Default::default() };
        for (index, entry) in updates.into_iter().enumerate() {
            match self.update_one_statement(&table, entry).await {
                Ok(outcome) => {
                    reply.n += outcome.matched;
                    reply.n_modified = reply.n_modified.map(|n| n + outcome.modified);
                    if let Some(id) = outcome.upserted {
                        reply.n += 1;
                        reply
                            .upserted
                            .append(document! { "index" => count_value(index as u64), "_id" => id });
                    }
                }
                Err(err) => {
                    reply.push_error(index, &err);
                    if ordered {
                        break;
                    }
                }
            }
        }

        Ok(reply.into_document())
    }

    async fn update_one_statement(&self, table: &Table, entry: &Document) -> GatewayResult<UpdateOutcome> {
        let query = optional_document(entry, "q")?.cloned().unwrap_or_default();
        let update = optional_document(entry, "u")?.cloned().unwrap_or_default();
        let upsert = optional_flag(entry, "upsert", false)?;
        let multi = optional_flag(entry, "multi", false)?;

        let ops = UpdateOps::parse(&update)?;
        self.apply_update(table, &query, &ops, upsert, multi).await
    }

    /// Applies parsed update operations to the documents matching `query`.
    ///
    /// With `multi` unset only the first match is updated. With `upsert` set and no match,
    /// a new document is built from the filter's equality fields and the operations.
    pub(crate) async fn apply_update(
        &self,
        table: &Table,
        query: &Document,
        ops: &UpdateOps,
        upsert: bool,
        multi: bool,
    ) -> GatewayResult<UpdateOutcome> {
        let filter = docgate_sql::compile_filter(query)?;
        let clause = compile_update_ops(ops)?;

        let matched = self
            .query_count(&statement::select_count(table, filter.as_deref()))
            .await?;

        if matched == 0 {
            if !upsert {
                return Ok(UpdateOutcome::default());
            }

            let mut doc = upsert_seed(query)?;
            ops.apply_to(&mut doc)?;
            let id = self.insert_one(table, doc).await?;
            return Ok(UpdateOutcome { upserted: Some(id), ..Default::default() });
        }

        let (target, matched) = if multi {
            (filter, matched)
        } else {
            match self.first_id(table, filter.as_deref()).await? {
                Some(id) => (Some(statement::id_filter(&id)), 1),
                None => return Ok(UpdateOutcome::default()),
            }
        };

        let modified = self
            .execute(&statement::update(table, target.as_deref(), &clause))
            .await?;

        Ok(UpdateOutcome { matched, modified, upserted: None })
    }
}
