use docgate_core::{
    Document, GatewayError, GatewayResult, Value, backend::SqlBackend, document,
    query::{Sort, parse_sort},
};
use docgate_sql::{
    Projection, UpdateOps, compile_filter, compile_projection, compile_update_ops,
    statement::{self, Page, Table},
};

use super::{optional_document, optional_flag, upsert_seed};
use crate::{gateway::Gateway, sort::sort_documents};

enum Action {
    Remove,
    Update(UpdateOps),
}

impl<B: SqlBackend> Gateway<B> {
    /// `findAndModify`: updates or removes the first matching document and returns it.
    ///
    /// `value` is the document before the change, or after it when `new` is set. `fields`
    /// projects `value` in memory.
    pub(crate) async fn find_and_modify(&self, command: &Document) -> GatewayResult<Document> {
        let table = self.table(command)?;
        let query = optional_document(command, "query")?.cloned().unwrap_or_default();
        let sort = optional_document(command, "sort")?
            .map(parse_sort)
            .transpose()?
            .unwrap_or_default();
        let return_new = optional_flag(command, "new", false)?;
        let upsert = optional_flag(command, "upsert", false)?;
        let projection = match optional_document(command, "fields")? {
            Some(fields) => compile_projection(fields)?,
            None => Projection::all(),
        };
        let action = parse_action(command, return_new, upsert)?;

        let filter = compile_filter(&query)?;
        let found = self.find_first(&table, filter.as_deref(), &sort).await?;

        let (last_error, value) = match (found, action) {
            (Some(doc), Action::Remove) => {
                let by_id = statement::id_filter(doc.get("_id")?);
                self.execute(&statement::delete(&table, Some(&by_id))).await?;

                (document! { "n" => 1 }, Some(doc))
            }
            (None, Action::Remove) => (document! { "n" => 0 }, None),
            (Some(doc), Action::Update(ops)) => {
                let by_id = statement::id_filter(doc.get("_id")?);
                let clause = compile_update_ops(&ops)?;
                self.execute(&statement::update(&table, Some(&by_id), &clause)).await?;

                let value = if return_new {
                    self.find_first(&table, Some(&by_id), &[]).await?
                } else {
                    Some(doc)
                };
                (document! { "n" => 1, "updatedExisting" => true }, value)
            }
            (None, Action::Update(ops)) if upsert => {
                let mut doc = upsert_seed(&query)?;
                ops.apply_to(&mut doc)?;
                let id = self.insert_one(&table, doc).await?;

                let value = if return_new {
                    let by_id = statement::id_filter(&id);
                    self.find_first(&table, Some(&by_id), &[]).await?
                } else {
                    None
                };
                (document! { "n" => 1, "updatedExisting" => false, "upserted" => id }, value)
            }
            (None, Action::Update(_)) => (document! { "n" => 0, "updatedExisting" => false }, None),
        };

        let value = value.map_or(Value::Null, |doc| Value::from(projection.reshape(doc)));
        Ok(document! { "lastErrorObject" => last_error, "value" => value, "ok" => 1.0 })
    }

    async fn find_first(
        &self,
        table: &Table,
        filter: Option<&str>,
        sort: &[Sort],
    ) -> GatewayResult<Option<Document>> {
        if sort.is_empty() {
            let page = Page { limit: Some(1), offset: None };
            let sql = statement::select(table, "*", filter, page);
            return Ok(self.query(&sql).await?.into_iter().next());
        }

        let mut docs = self
            .query(&statement::select(table, "*", filter, Page::default()))
            .await?;
        sort_documents(&mut docs, sort);
        Ok(docs.into_iter().next())
    }
}

fn parse_action(command: &Document, return_new: bool, upsert: bool) -> GatewayResult<Action> {
    let remove = optional_flag(command, "remove", false)?;
    let update = optional_document(command, "update")?;

    match (remove, update) {
        (true, Some(_)) => Err(GatewayError::BadValue(
            "Cannot specify both an update and remove=true".into(),
        )),
        (true, None) if upsert => Err(GatewayError::BadValue(
            "Cannot specify both upsert=true and remove=true".into(),
        )),
        (true, None) if return_new => Err(GatewayError::BadValue(
            "Cannot specify both new=true and remove=true".into(),
        )),
        (true, None) => Ok(Action::Remove),
        (false, Some(update)) => Ok(Action::Update(UpdateOps::parse(update)?)),
        (false, None) => Err(GatewayError::BadValue(
            "Either an update or remove=true must be specified".into(),
        )),
    }
}
