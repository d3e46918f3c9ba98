//! Reply documents.
//!
//! Error translation happens here and nowhere else: handlers propagate [`GatewayError`]s
//! unchanged and the gateway turns them into `{ ok: 0.0, errmsg, code, codeName }`.

use tracing::warn;

use docgate_core::{Array, Document, GatewayError, Value, document};

/// A count as clients expect it: `int` when it fits, `long` otherwise.
pub fn count_value(n: u64) -> Value {
    match i32::try_from(n) {
        Ok(n) => Value::Int32(n),
        Err(_) => Value::Int64(i64::try_from(n).unwrap_or(i64::MAX)),
    }
}

/// The reply for a command that failed as a whole.
pub fn error_reply(err: &GatewayError) -> Document {
    document! {
        "ok" => 0.0,
        "errmsg" => err.to_string(),
        "code" => err.code(),
        "codeName" => err.code_name(),
    }
}

/// One `writeErrors` entry for the statement at `index`.
pub fn write_error(index: usize, err: &GatewayError) -> Document {
    document! {
        "index" => count_value(index as u64),
        "code" => err.code(),
        "errmsg" => err.to_string(),
    }
}

/// Accumulates the results of a batch write.
#[derive(Debug, Default)]
pub(crate) struct WriteReply {
    pub n: u64,
    pub n_modified: Option<u64>,
    pub upserted: Array,
    pub write_errors: Array,
}

impl WriteReply {
    pub fn push_error(&mut self, index: usize, err: &GatewayError) {
        warn!(index, code = err.code(), error = %err, "gateway.write_failed");
        self.write_errors.append(write_error(index, err));
    }

    pub fn into_document(self) -> Document {
        let mut reply = document! { "n" => count_value(self.n) };
        if let Some(n_modified) = self.n_modified {
            put(&mut reply, "nModified", count_value(n_modified));
        }
        if !self.upserted.is_empty() {
            put(&mut reply, "upserted", self.upserted);
        }
        if !self.write_errors.is_empty() {
            put(&mut reply, "writeErrors", self.write_errors);
        }
        put(&mut reply, "ok", 1.0);
        reply
    }
}

// Reply keys are fixed identifiers, which `Document::set` always accepts.
pub(crate) fn put(doc: &mut Document, key: &'static str, value: impl Into<Value>) {
    let _ = doc.set(key, value);
}

#[cfg(test)]
mod tests {
    use super::*;
    use docgate_core::array;

    #[test]
    fn errors_carry_code_and_name() {
        let reply = error_reply(&GatewayError::NotImplemented("$inc".into()));

        assert_eq!(
            reply,
            document! {
                "ok" => 0.0,
                "errmsg" => "$inc is not implemented",
                "code" => 238,
                "codeName" => "NotImplemented",
            }
        );
    }

    #[test]
    fn counts_widen_past_int32() {
        assert_eq!(count_value(3), Value::Int32(3));
        assert_eq!(count_value(1 << 40), Value::Int64(1 << 40));
    }

    #[test]
    fn write_reply_omits_empty_sections() {
        let reply = WriteReply { n: 2, ..Default::default() }.into_document();
        assert_eq!(reply, document! { "n" => 2, "ok" => 1.0 });

        let mut reply = WriteReply { n: 1, n_modified: Some(0), ..Default::default() };
        reply.upserted.append(document! { "index" => 0, "_id" => 9 });
        reply.push_error(1, &GatewayError::ImmutableField("_id".into()));

        assert_eq!(
            reply.into_document(),
            document! {
                "n" => 1,
                "nModified" => 0,
                "upserted" => array![document! { "index" => 0, "_id" => 9 }],
                "writeErrors" => array![document! {
                    "index" => 1,
                    "code" => 66,
                    "errmsg" => "Performing an update on the path '_id' would modify the immutable field '_id'",
                }],
                "ok" => 1.0,
            }
        );
    }
}
