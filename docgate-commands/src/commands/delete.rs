use docgate_core::{Document, GatewayError, GatewayResult, backend::SqlBackend};
use docgate_sql::statement::{self, Table};

use super::{filter_argument, optional_count, optional_flag, statements};
use crate::{gateway::Gateway, reply::WriteReply};

impl<B: SqlBackend> Gateway<B> {
    /// `delete`: runs each `{ q, limit }` statement. `limit: 1` removes only the first match,
    /// `limit: 0` every match.
    pub(crate) async fn delete(&self, command: &Document) -> GatewayResult<Document> {
        let table = self.table(command)?;
        let deletes = statements(command, "deletes")?;
        let ordered = optional_flag(command, "ordered", true)?;

        let mut reply = WriteReply::default();
        for (index, entry) in deletes.into_iter().enumerate() {
            match self.delete_one_statement(&table, entry).await {
                Ok(n) => reply.n += n,
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

    async fn delete_one_statement(&self, table: &Table, entry: &Document) -> GatewayResult<u64> {
        let filter = filter_argument(entry, "q")?;

        match optional_count(entry, "limit")?.unwrap_or(0) {
            0 => self.execute(&statement::delete(table, filter.as_deref())).await,
            1 => match self.first_id(table, filter.as_deref()).await? {
                Some(id) => {
                    self.execute(&statement::delete(table, Some(&statement::id_filter(&id))))
                        .await
                }
                None => Ok(0),
            },
            n => Err(GatewayError::BadValue(format!(
                "delete limit must be 0 or 1, got {n}"
            ))),
        }
    }
}
