use docgate_core::{Document, GatewayResult, backend::SqlBackend, document};
use docgate_sql::statement;

use super::{filter_argument, optional_count};
use crate::{gateway::Gateway, reply::count_value};

impl<B: SqlBackend> Gateway<B> {
    /// `count`: the number of documents matching `query`, after `skip` and `limit`.
    pub(crate) async fn count(&self, command: &Document) -> GatewayResult<Document> {
        let table = self.table(command)?;
        let filter = filter_argument(command, "query")?;
        let skip = optional_count(command, "skip")?.unwrap_or(0);
        let limit = optional_count(command, "limit")?.filter(|n| *n > 0);

        let total = self
            .query_count(&statement::select_count(&table, filter.as_deref()))
            .await?;

        let mut n = total.saturating_sub(skip);
        if let Some(limit) = limit {
            n = n.min(limit);
        }

        Ok(document! { "n" => count_value(n), "ok" => 1.0 })
    }
}
