//! Projection documents to SQL selections.
//!
//! An inclusion projection such as `{ "a": 1 }` compiles to the store's JSON-reshape
//! syntax, `{"_id": "_id", "a": "a"}`. The store has no way to drop fields from a row, so an
//! exclusion projection selects `*` and the excluded paths are removed from each decoded
//! document with [`Projection::apply`].
//!
//! Callers that need fields outside of the projection (an in-memory sort, for example) can
//! select `*` instead and run the whole projection in memory with [`Projection::reshape`].

use docgate_core::{Array, Document, GatewayError, GatewayResult, Value};

use crate::literal::quote_ident;

const ID_FIELD: &str = "_id";

/// A compiled projection.
#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    /// The SQL select list.
    pub sql: String,
    /// Top-level fields kept by an inclusion projection, in output order.
    pub inclusions: Option<Vec<String>>,
    /// Dotted paths to remove from every returned document.
    pub exclusions: Vec<String>,
}

impl Projection {
    /// The identity projection.
    pub fn all() -> Self {
        Projection { sql: "*".to_string(), inclusions: None, exclusions: Vec::new() }
    }

    /// Removes the excluded paths from a document selected with [`Projection::sql`].
    pub fn apply(&self, doc: &mut Document) {
        for path in &self.exclusions {
            apply_exclusion(doc, path);
        }
    }

    /// Projects a full document in memory.
    pub fn reshape(&self, mut doc: Document) -> Document {
        if let Some(fields) = &self.inclusions {
            let mut kept = Document::with_capacity(fields.len());
            for field in fields {
                if let Some(value) = doc.remove(field) {
                    // Keys came out of a document, so they are already valid.
                    let _ = kept.set(field.as_str(), value);
                }
            }
            doc = kept;
        }

        self.apply(&mut doc);
        doc
    }
}

/// Compiles a projection document.
///
/// # Returns
///
/// A [`Projection`] whose `sql` is the select list. Exclusions are not part of the SQL and
/// must be applied to each row with [`Projection::apply`].
///
/// # Errors
///
/// Returns [`GatewayError::NotImplemented`] when inclusions and exclusions are mixed (other
/// than for `_id`), for dotted inclusion paths and for projection operators, and
/// [`GatewayError::BadValue`] for values that are neither flags nor numbers.
pub fn compile_projection(projection: &Document) -> GatewayResult<Projection> {
    let mut include_id = None;
    let mut inclusions = Vec::new();
    let mut exclusions = Vec::new();

    for (field, value) in projection.iter() {
        let flag = match value.as_flag() {
            Some(flag) => flag,
            None if is_operator_document(value) => {
                return Err(GatewayError::NotImplemented(format!(
                    "projection operator on '{field}'"
                )));
            }
            None => {
                return Err(GatewayError::BadValue(format!(
                    "projection of '{field}' must be a boolean or a number, got {}",
                    value.type_name()
                )));
            }
        };

        match (field, flag) {
            (ID_FIELD, flag) => include_id = Some(flag),
            (field, true) => inclusions.push(field),
            (field, false) => exclusions.push(field.to_string()),
        }
    }

    if !inclusions.is_empty() && !exclusions.is_empty() {
        return Err(GatewayError::NotImplemented(
            "projection mixing inclusion and exclusion".into(),
        ));
    }

    if !inclusions.is_empty() || include_id == Some(true) && exclusions.is_empty() {
        return compile_inclusion(include_id != Some(false), &inclusions);
    }

    if include_id == Some(false) {
        exclusions.push(ID_FIELD.to_string());
    }

    Ok(Projection { sql: "*".to_string(), inclusions: None, exclusions })
}

fn is_operator_document(value: &Value) -> bool {
    value
        .as_document()
        .and_then(Document::first_key)
        .is_some_and(|key| key.starts_with('$'))
}

fn compile_inclusion(include_id: bool, fields: &[&str]) -> GatewayResult<Projection> {
    let mut kept = Vec::with_capacity(fields.len() + 1);
    if include_id {
        kept.push(ID_FIELD.to_string());
    }

    for field in fields {
        if field.contains('.') {
            return Err(GatewayError::NotImplemented(format!(
                "inclusion projection of the nested field '{field}'"
            )));
        }
        kept.push(field.to_string());
    }

    let members: Vec<String> = kept.iter().map(|field| reshape_member(field)).collect();
    Ok(Projection {
        sql: format!("{{{}}}", members.join(", ")),
        inclusions: Some(kept),
        exclusions: Vec::new(),
    })
}

fn reshape_member(field: &str) -> String {
    let ident = quote_ident(field);
    format!("{ident}: {ident}")
}

/// Removes a dotted path from a document.
///
/// Numeric segments index into arrays. A non-numeric segment applied to an array descends
/// into every document element. Missing paths are ignored.
pub fn apply_exclusion(doc: &mut Document, path: &str) {
    let segments: Vec<&str> = path.split('.').collect();
    remove_from_document(doc, &segments);
}

fn remove_from_document(doc: &mut Document, segments: &[&str]) {
    match segments {
        [] => {}
        [last] => {
            doc.remove(last);
        }
        [head, rest @ ..] => {
            if let Ok(child) = doc.get_mut(head) {
                remove_from_value(child, rest);
            }
        }
    }
}

fn remove_from_value(value: &mut Value, segments: &[&str]) {
    match value {
        Value::Document(doc) => remove_from_document(doc, segments),
        Value::Array(arr) => remove_from_array(arr, segments),
        _ => {}
    }
}

fn remove_from_array(arr: &mut Array, segments: &[&str]) {
    let [head, rest @ ..] = segments else {
        return;
    };

    match head.parse::<usize>() {
        Ok(index) if rest.is_empty() => {
            let _ = arr.delete(index);
        }
        Ok(index) => {
            if let Ok(elem) = arr.get_mut(index) {
                remove_from_value(elem, rest);
            }
        }
        Err(_) => {
            for elem in arr.iter_mut() {
                if let Value::Document(doc) = elem {
                    remove_from_document(doc, segments);
                }
            }
        }
    }
}
