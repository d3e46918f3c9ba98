//! Command handlers.
//!
//! Each handler is an `impl` block on [`Gateway`](crate::Gateway) that compiles the command's
//! sub-documents, runs the resulting statements and shapes the reply. Handlers propagate
//! errors unchanged. Batch writes are the exception: a failed statement becomes a
//! `writeErrors` entry so the statements before it still count.

mod count;
mod delete;
mod find;
mod find_and_modify;
mod insert;
mod update;

use docgate_core::{Array, Document, GatewayError, GatewayResult, Value};
use docgate_sql::compile_filter;

/// An optional document argument. Null counts as absent.
pub(crate) fn optional_document<'a>(
    command: &'a Document,
    key: &str,
) -> GatewayResult<Option<&'a Document>> {
    match command.get(key) {
        Err(_) | Ok(Value::Null) => Ok(None),
        Ok(Value::Document(doc)) => Ok(Some(doc)),
        Ok(other) => Err(GatewayError::BadValue(format!(
            "'{key}' must be an object, got {}",
            other.type_name()
        ))),
    }
}

/// Compiles an optional filter argument. Absent and empty filters both yield `None`.
pub(crate) fn filter_argument(command: &Document, key: &str) -> GatewayResult<Option<String>> {
    match optional_document(command, key)? {
        Some(filter) => compile_filter(filter),
        None => Ok(None),
    }
}

/// An optional non-negative integer argument. Null counts as absent.
pub(crate) fn optional_count(command: &Document, key: &str) -> GatewayResult<Option<u64>> {
    match command.get(key) {
        Err(_) | Ok(Value::Null) => Ok(None),
        Ok(value) => match value.as_integer() {
            Some(n) if n >= 0 => Ok(Some(n as u64)),
            Some(n) => Err(GatewayError::BadValue(format!("'{key}' must be non-negative, got {n}"))),
            None => Err(GatewayError::BadValue(format!(
                "'{key}' must be a number, got {}",
                value.type_name()
            ))),
        },
    }
}

/// An optional boolean argument; numbers count as flags.
pub(crate) fn optional_flag(command: &Document, key: &str, default: bool) -> GatewayResult<bool> {
    match command.get(key) {
        Err(_) | Ok(Value::Null) => Ok(default),
        Ok(value) => value.as_flag().ok_or_else(|| {
            GatewayError::BadValue(format!("'{key}' must be a boolean, got {}", value.type_name()))
        }),
    }
}

/// A required array of statement documents, such as `documents` or `updates`.
pub(crate) fn statements<'a>(command: &'a Document, key: &str) -> GatewayResult<Vec<&'a Document>> {
    let array: &Array = match command.get(key) {
        Ok(Value::Array(array)) => array,
        Ok(other) => {
            return Err(GatewayError::BadValue(format!(
                "'{key}' must be an array, got {}",
                other.type_name()
            )));
        }
        Err(_) => return Err(GatewayError::BadValue(format!("'{key}' is required"))),
    };

    array
        .iter()
        .map(|value| {
            value.as_document().ok_or_else(|| {
                GatewayError::BadValue(format!(
                    "'{key}' entries must be objects, got {}",
                    value.type_name()
                ))
            })
        })
        .collect()
}

/// The document an upsert starts from: the filter's top-level equality fields.
///
/// `{ a: 1, "b.c": 2, d: { $eq: 3 }, e: { $gt: 4 }, $or: [...] }` seeds
/// `{ a: 1, b: { c: 2 }, d: 3 }`.
pub(crate) fn upsert_seed(filter: &Document) -> GatewayResult<Document> {
    let mut seed = Document::new();

    for (field, value) in filter.iter() {
        if field.starts_with('$') {
            continue;
        }

        let value = match value {
            Value::Document(doc) if doc.first_key().is_some_and(|k| k.starts_with('$')) => {
                match doc.get("$eq") {
                    Ok(value) => value,
                    Err(_) => continue,
                }
            }
            value => value,
        };

        seed.set_path(field, value.clone())?;
    }

    Ok(seed)
}
