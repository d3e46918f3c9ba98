//! Update documents to `SET`/`UNSET` clauses.
//!
//! Only `$set` and `$unset` are supported. Each compiled update carries a guard expression
//! that is true when a row does not already look like the update's result, so callers can
//! skip no-op writes and tell matched rows from modified ones. The guard compares stored
//! shapes exactly: replacing an int64 `5` with an int32 `5` is a modification.
//!
//! # Example
//!
//! ```ignore
//! let update = compile_update(&document! {
//!     "$set" => document! { "a" => 5 },
//!     "$unset" => document! { "d" => "" },
//! })?;
//!
//! assert_eq!(update.assignments, r#"SET "a" = 5 UNSET "d""#);
//! assert_eq!(update.guard, r#"(("a" <> 5 OR "a" IS NULL OR "a" IS UNSET) OR ("d" IS SET))"#);
//! ```

use docgate_core::{Document, GatewayError, GatewayResult, Value};

use crate::{literal::literal, path::compile_path};

const ID_FIELD: &str = "_id";

/// The field changes requested by an update document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOps {
    /// `$set` entries in document order.
    pub set: Vec<(String, Value)>,
    /// `$unset` paths in document order.
    pub unset: Vec<String>,
}

impl UpdateOps {
    /// Validates an update document and collects its operations.
    pub fn parse(update: &Document) -> GatewayResult<Self> {
        if update.is_empty() {
            return Err(GatewayError::BadValue("update document is empty".into()));
        }

        let mut ops = UpdateOps::default();
        for (op, fields) in update.iter() {
            match op {
                "$set" => {
                    for (path, value) in operator_fields(op, fields)?.iter() {
                        ops.set.push((path.to_string(), value.clone()));
                    }
                }
                "$unset" => {
                    for (path, _) in operator_fields(op, fields)?.iter() {
                        ops.unset.push(path.to_string());
                    }
                }
                op if op.starts_with('$') => {
                    return Err(GatewayError::NotImplemented(op.to_string()));
                }
                field => {
                    return Err(GatewayError::NotImplemented(format!(
                        "replacement-style update of '{field}'"
                    )));
                }
            }
        }

        ops.check_paths()?;
        Ok(ops)
    }

    fn paths(&self) -> impl Iterator<Item = &str> {
        self.set.iter().map(|(path, _)| path.as_str()).chain(self.unset.iter().map(String::as_str))
    }

    fn check_paths(&self) -> GatewayResult<()> {
        let paths: Vec<&str> = self.paths().collect();

        for (i, path) in paths.iter().enumerate() {
            if *path == ID_FIELD || path.starts_with("_id.") {
                return Err(GatewayError::ImmutableField(path.to_string()));
            }

            if let Some(other) = paths[i + 1..].iter().find(|other| overlaps(path, other)) {
                return Err(GatewayError::BadValue(format!(
                    "Updating the path '{other}' would create a conflict at '{path}'"
                )));
            }
        }

        Ok(())
    }

    /// Applies the operations to a document in memory.
    ///
    /// Used to build the document inserted by an upsert.
    pub fn apply_to(&self, doc: &mut Document) -> GatewayResult<()> {
        for (path, value) in &self.set {
            doc.set_path(path, value.clone())?;
        }
        for path in &self.unset {
            doc.unset_path(path);
        }
        Ok(())
    }
}

fn operator_fields<'a>(op: &str, fields: &'a Value) -> GatewayResult<&'a Document> {
    let doc = fields.as_document().ok_or_else(|| {
        GatewayError::BadValue(format!(
            "Modifiers operate on fields but we found type {} instead",
            fields.type_name()
        ))
    })?;

    if doc.is_empty() {
        return Err(GatewayError::BadValue(format!(
            "'{op}' is empty. You must specify a field like so: {{{op}: {{<field>: ...}}}}"
        )));
    }

    Ok(doc)
}

// Two paths overlap when they are equal or one is a prefix of the other.
fn overlaps(a: &str, b: &str) -> bool {
    let (short, long) = if a.len() <= b.len() { (a, b) } else { (b, a) };
    long.strip_prefix(short)
        .is_some_and(|rest| rest.is_empty() || rest.starts_with('.'))
}

/// A compiled update.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateClause {
    /// `SET ... [UNSET ...]`, or `UNSET ...` alone.
    pub assignments: String,
    /// True for rows the update would change.
    pub guard: String,
}

/// Compiles an update document.
///
/// # Errors
///
/// Returns [`GatewayError::ImmutableField`] for updates touching `_id`,
/// [`GatewayError::NotImplemented`] for operators other than `$set` and `$unset`, and
/// [`GatewayError::BadValue`] for malformed or conflicting paths.
pub fn compile_update(update: &Document) -> GatewayResult<UpdateClause> {
    compile_update_ops(&UpdateOps::parse(update)?)
}

/// Compiles already parsed update operations.
///
/// A `$set` guard holds when the stored value differs from the new one, including when it is
/// null or missing; a `$set` of null holds unless the field is already null. An `$unset`
/// guard holds while the field is present.
///
/// # Arguments
///
/// * `ops` - Operations produced by [`UpdateOps::parse`].
///
/// # Errors
///
/// Returns [`GatewayError::NotImplemented`] when a path indexes a nested array or uses a
/// negative index, and [`GatewayError::BadValue`] for a path the store cannot address.
pub fn compile_update_ops(ops: &UpdateOps) -> GatewayResult<UpdateClause> {
    let mut assignments = Vec::with_capacity(ops.set.len());
    let mut guards = Vec::with_capacity(ops.set.len() + ops.unset.len());

    for (path, value) in &ops.set {
        let path = compile_path(path)?;
        let lit = literal(value);

        guards.push(match value {
            Value::Null => format!("({path} IS NOT NULL OR {path} IS UNSET)"),
            _ => format!("({path} <> {lit} OR {path} IS NULL OR {path} IS UNSET)"),
        });
        assignments.push(format!("{path} = {lit}"));
    }

    let mut removals = Vec::with_capacity(ops.unset.len());
    for path in &ops.unset {
        let path = compile_path(path)?;
        guards.push(format!("({path} IS SET)"));
        removals.push(path);
    }

    let mut clause = Vec::new();
    if !assignments.is_empty() {
        clause.push(format!("SET {}", assignments.join(", ")));
    }
    if !removals.is_empty() {
        clause.push(format!("UNSET {}", removals.join(", ")));
    }

    Ok(UpdateClause {
        assignments: clause.join(" "),
        guard: format!("({})", guards.join(" OR ")),
    })
}
