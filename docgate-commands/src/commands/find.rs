use docgate_core::{
    Array, Document, GatewayResult, Value, backend::SqlBackend, document,
    query::{Query, parse_filter, parse_sort},
};
use docgate_sql::{
    Projection, compile_expr, compile_projection,
    statement::{self, Page},
};

use super::{optional_count, optional_document};
use crate::{gateway::Gateway, sort::sort_documents};

impl<B: SqlBackend> Gateway<B> {
    /// `find`: every matching document in one batch, with cursor id 0.
    ///
    /// Without a sort, `skip` and `limit` run in the store. With one, every match is loaded,
    /// sorted in memory and then windowed, and the projection runs in memory so that sort
    /// keys outside of it are still available.
    pub(crate) async fn find(&self, command: &Document) -> GatewayResult<Document> {
        let table = self.table(command)?;
        let query = parse_query(command)?;
        let projection = match optional_document(command, "projection")? {
            Some(projection) => compile_projection(projection)?,
            None => Projection::all(),
        };
        optional_count(command, "batchSize")?;

        let filter = query.filter.as_ref().map(compile_expr).transpose()?;

        let docs = if query.sort.is_empty() {
            let page = Page {
                limit: query.limit.map(|n| n as u64),
                offset: query.offset.map(|n| n as u64),
            };
            let sql = statement::select(&table, &projection.sql, filter.as_deref(), page);

            let mut docs = self.query(&sql).await?;
            for doc in &mut docs {
                projection.apply(doc);
            }
            docs
        } else {
            let sql = statement::select(&table, "*", filter.as_deref(), Page::default());

            let mut docs = self.query(&sql).await?;
            sort_documents(&mut docs, &query.sort);
            docs.into_iter()
                .skip(query.offset.unwrap_or(0))
                .take(query.limit.unwrap_or(usize::MAX))
                .map(|doc| projection.reshape(doc))
                .collect()
        };

        let batch: Array = docs.into_iter().map(Value::from).collect();
        Ok(document! {
            "cursor" => document! {
                "firstBatch" => batch,
                "id" => Value::Int64(0),
                "ns" => table.namespace(),
            },
            "ok" => 1.0,
        })
    }
}

// A zero `skip` or `limit` means no window.
fn parse_query(command: &Document) -> GatewayResult<Query> {
    let filter = match optional_document(command, "filter")? {
        Some(filter) => parse_filter(filter)?,
        None => None,
    };
    let sort = match optional_document(command, "sort")? {
        Some(sort) => parse_sort(sort)?,
        None => Vec::new(),
    };

    let mut builder = Query::builder().filter(filter).sort(sort);
    if let Some(skip) = optional_count(command, "skip")?.filter(|n| *n > 0) {
        builder = builder.offset(to_usize(skip));
    }
    if let Some(limit) = optional_count(command, "limit")?.filter(|n| *n > 0) {
        builder = builder.limit(to_usize(limit));
    }

    Ok(builder.build())
}

fn to_usize(n: u64) -> usize {
    usize::try_from(n).unwrap_or(usize::MAX)
}
