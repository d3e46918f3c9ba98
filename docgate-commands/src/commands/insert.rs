use docgate_core::{Document, GatewayResult, backend::SqlBackend};

use super::{optional_flag, statements};
use crate::{gateway::Gateway, reply::WriteReply};

impl<B: SqlBackend> Gateway<B> {
    /// `insert`: stores each document, reporting per-document failures in `writeErrors`.
    ///
    /// Ordered inserts (the default) stop at the first failure.
    pub(crate) async fn insert(&self, command: &Document) -> GatewayResult<Document> {
        let table = self.table(command)?;
        let documents = statements(command, "documents")?;
        let ordered = optional_flag(command, "ordered", true)?;

        let mut reply = WriteReply::default();
        for (index, doc) in documents.into_iter().enumerate() {
            match self.insert_one(&table, doc.clone()).await {
                Ok(_) => reply.n += 1,
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
}
