//! Filter documents, their expression tree, and the visitor used to translate them.
//!
//! A MongoDB filter [`Document`] is parsed once into an [`Expr`] tree by [`parse_filter`].
//! Backends translate the tree by implementing [`QueryVisitor`]; the SQL translator in
//! `docgate-sql` is one such visitor.
//!
//! # Filter grammar
//!
//! - Top-level keys are combined with AND.
//! - `{ "$and" | "$or": [filter, filter, ...] }` needs at least two filters,
//!   `{ "$nor": [filter, ...] }` at least one.
//! - `{ "field": value }` is equality; a regex value is a pattern match.
//! - `{ "field": { "$op": value, ... } }` applies each operator from
//!   `$eq $ne $gt $gte $lt $lte $exists $size $all $elemMatch $not $regex`.
//!
//! Inside `$elemMatch` field paths are relative to the array element, and the empty
//! path `""` names the element itself.
//!
//! # Example
//!
//! ```ignore
//! use docgate_core::{document, query::{parse_filter, Expr}};
//!
//! let expr = parse_filter(&document! { "age": document! { "$gt" => 18 } })?;
//! ```

use crate::{
    document::{Array, Document},
    error::{GatewayError, GatewayResult},
    value::{Regex, Value},
};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (`1`).
    Asc,
    /// Descending order (`-1`).
    Desc,
}

/// One key of a sort specification.
#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    /// The dotted field path to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

/// Field comparison operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldOp {
    /// Equal to.
    Eq,
    /// Not equal to; also true when the field is absent.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// Pattern match; the value is always a [`Value::Regex`].
    Regex,
}

impl FieldOp {
    fn from_operator(op: &str) -> Option<Self> {
        match op {
            "$eq" => Some(FieldOp::Eq),
            "$ne" => Some(FieldOp::Ne),
            "$gt" => Some(FieldOp::Gt),
            "$gte" => Some(FieldOp::Gte),
            "$lt" => Some(FieldOp::Lt),
            "$lte" => Some(FieldOp::Lte),
            _ => None,
        }
    }
}

/// A parsed filter expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// All expressions must match.
    And(Vec<Expr>),
    /// Any expression must match.
    Or(Vec<Expr>),
    /// No expression may match.
    Nor(Vec<Expr>),
    /// Negation of operator expressions on one field; also true when the field is absent.
    Not {
        /// The field the negated operators apply to.
        field: String,
        /// The negated expression.
        expr: Box<Expr>,
    },
    /// The field is present (`true`) or absent (`false`).
    Exists(String, bool),
    /// Field comparison.
    Field {
        /// The dotted field path.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Value,
    },
    /// The array field has exactly this many elements.
    Size(String, i64),
    /// Some element of the array field satisfies the predicate.
    ElemMatch {
        /// The array field.
        field: String,
        /// A predicate whose paths are relative to the element.
        predicate: Box<Expr>,
    },
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: impl Into<String>, op: FieldOp, value: Value) -> Self {
        Expr::Field { field: field.into(), op, value }
    }

    // Equality, or a pattern match when the value is a regex.
    fn equality(field: &str, value: &Value) -> Self {
        match value {
            Value::Regex(_) => Expr::field(field, FieldOp::Regex, value.clone()),
            _ => Expr::field(field, FieldOp::Eq, value.clone()),
        }
    }

    fn all_of(mut exprs: Vec<Expr>) -> Self {
        if exprs.len() == 1 {
            exprs.remove(0)
        } else {
            Expr::And(exprs)
        }
    }
}

/// A structured find query.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Sort keys in priority order.
    pub sort: Vec<Sort>,
    /// Maximum number of documents to return.
    pub limit: Option<usize>,
    /// Number of documents to skip.
    pub offset: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new query builder for fluent construction.
    pub fn builder() -> QueryBuilder {
        QueryBuilder::new()
    }
}

#[derive(Debug, Clone, Default)]
pub struct QueryBuilder {
    query: Query,
}

impl QueryBuilder {
    pub fn new() -> Self {
        QueryBuilder { query: Query::default() }
    }

    /// Sets the filter expression.
    pub fn filter(mut self, filter: Option<Expr>) -> Self {
        self.query.filter = filter;
        self
    }

    /// Sets the maximum number of documents to return.
    pub fn limit(mut self, limit: usize) -> Self {
        self.query.limit = Some(limit);
        self
    }

    /// Sets the number of documents to skip.
    pub fn offset(mut self, offset: usize) -> Self {
        self.query.offset = Some(offset);
        self
    }

    /// Appends sort keys.
    pub fn sort(mut self, sort: impl IntoIterator<Item = Sort>) -> Self {
        self.query.sort.extend(sort);
        self
    }

    pub fn build(self) -> Query {
        self.query
    }
}

/// Translates an [`Expr`] tree into a backend-specific form.
pub trait QueryVisitor {
    type Output;
    type Error: Into<GatewayError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_nor(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, field: &str, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_size(&mut self, field: &str, size: i64) -> Result<Self::Output, Self::Error>;
    fn visit_elem_match(
        &mut self,
        field: &str,
        predicate: &Expr,
    ) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Nor(exprs) => self.visit_nor(exprs),
            Expr::Not { field, expr } => self.visit_not(field, expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, *op, value),
            Expr::Size(field, size) => self.visit_size(field, *size),
            Expr::ElemMatch { field, predicate } => self.visit_elem_match(field, predicate),
        }
    }
}

/// Parses a filter document. An empty filter matches everything and yields `None`.
///
/// # Errors
///
/// Returns [`GatewayError::BadValue`] for malformed operator arguments and
/// [`GatewayError::NotImplemented`] for operators outside the supported set.
pub fn parse_filter(filter: &Document) -> GatewayResult<Option<Expr>> {
    if filter.is_empty() {
        return Ok(None);
    }

    parse_filter_document(filter).map(Some)
}

fn parse_filter_document(filter: &Document) -> GatewayResult<Expr> {
    let mut children = Vec::with_capacity(filter.len());

    for (key, value) in filter.iter() {
        match key {
            "$and" => children.push(Expr::And(parse_logical(key, value, 2)?)),
            "$or" => children.push(Expr::Or(parse_logical(key, value, 2)?)),
            "$nor" => children.push(Expr::Nor(parse_logical(key, value, 1)?)),
            k if k.starts_with('$') => return Err(GatewayError::NotImplemented(k.to_string())),
            _ => children.push(parse_field_condition(key, value)?),
        }
    }

    Ok(Expr::all_of(children))
}

fn parse_logical(op: &str, value: &Value, min: usize) -> GatewayResult<Vec<Expr>> {
    let arr = value
        .as_array()
        .ok_or_else(|| GatewayError::BadValue(format!("{op} must be an array")))?;

    if arr.len() < min {
        return Err(GatewayError::BadValue(format!(
            "{op} must be an array of at least {min} expressions"
        )));
    }

    arr.iter()
        .map(|elem| match elem {
            Value::Document(doc) if doc.is_empty() => Ok(Expr::And(Vec::new())),
            Value::Document(doc) => parse_filter_document(doc),
            _ => Err(GatewayError::BadValue(format!(
                "{op} argument's entries must be objects"
            ))),
        })
        .collect()
}

fn is_operator_document(value: &Value) -> Option<&Document> {
    value
        .as_document()
        .filter(|doc| doc.first_key().is_some_and(|k| k.starts_with('$')))
}

fn parse_field_condition(field: &str, value: &Value) -> GatewayResult<Expr> {
    match is_operator_document(value) {
        Some(ops) => parse_operator_document(field, ops),
        None => Ok(Expr::equality(field, value)),
    }
}

fn parse_operator_document(field: &str, ops: &Document) -> GatewayResult<Expr> {
    if ops.contains_key("$options") {
        return Err(GatewayError::NotImplemented("$options".into()));
    }

    let mut conditions = Vec::with_capacity(ops.len());

    for (op, value) in ops.iter() {
        let expr = match op {
            "$exists" => match value {
                Value::Boolean(b) => Expr::Exists(field.to_string(), *b),
                _ => {
                    return Err(GatewayError::NotImplemented(
                        "$exists with a non-boolean value".into(),
                    ));
                }
            },
            "$size" => Expr::Size(field.to_string(), parse_size(value)?),
            "$all" => parse_all(field, value)?,
            "$elemMatch" => parse_elem_match(field, value)?,
            "$not" => parse_not(field, value)?,
            "$regex" => parse_regex(field, value)?,
            _ => match FieldOp::from_operator(op) {
                Some(field_op) => Expr::field(field, field_op, value.clone()),
                None if op.starts_with('$') => {
                    return Err(GatewayError::NotImplemented(op.to_string()));
                }
                None => return Err(GatewayError::BadValue(format!("unknown operator: {op}"))),
            },
        };
        conditions.push(expr);
    }

    Ok(Expr::all_of(conditions))
}

fn parse_size(value: &Value) -> GatewayResult<i64> {
    match value.as_integer() {
        Some(n) if n >= 0 => Ok(n),
        Some(_) => Err(GatewayError::BadValue("$size may not be negative".into())),
        None => Err(GatewayError::BadValue(format!(
            "$size needs a number, got {}",
            value.type_name()
        ))),
    }
}

fn parse_all(field: &str, value: &Value) -> GatewayResult<Expr> {
    let items: &Array = value
        .as_array()
        .ok_or_else(|| GatewayError::BadValue("$all needs an array".into()))?;

    if items.is_empty() {
        return Err(GatewayError::BadValue("$all needs a non-empty array".into()));
    }

    let matches = items
        .iter()
        .map(|item| match is_operator_document(item) {
            Some(doc) if doc.first_key() == Some("$elemMatch") && doc.len() == 1 => {
                parse_elem_match(field, doc.get("$elemMatch")?)
            }
            Some(_) => Err(GatewayError::BadValue(
                "no $ expressions allowed in $all except $elemMatch".into(),
            )),
            None => Ok(Expr::ElemMatch {
                field: field.to_string(),
                predicate: Box::new(Expr::equality("", item)),
            }),
        })
        .collect::<GatewayResult<Vec<_>>>()?;

    Ok(Expr::all_of(matches))
}

fn parse_elem_match(field: &str, value: &Value) -> GatewayResult<Expr> {
    let doc = value
        .as_document()
        .ok_or_else(|| GatewayError::BadValue("$elemMatch needs an Object".into()))?;

    if doc.is_empty() {
        return Err(GatewayError::BadValue("$elemMatch needs a non-empty Object".into()));
    }

    let predicate = match doc.first_key() {
        Some(k) if k.starts_with('$') && !matches!(k, "$and" | "$or" | "$nor") => {
            parse_operator_document("", doc)?
        }
        _ => parse_filter_document(doc)?,
    };

    Ok(Expr::ElemMatch {
        field: field.to_string(),
        predicate: Box::new(predicate),
    })
}

fn parse_not(field: &str, value: &Value) -> GatewayResult<Expr> {
    let expr = match value {
        Value::Regex(_) => parse_regex(field, value)?,
        Value::Document(doc) if doc.is_empty() => {
            return Err(GatewayError::BadValue("$not cannot be empty".into()));
        }
        Value::Document(doc) => match is_operator_document(value) {
            Some(_) => parse_operator_document(field, doc)?,
            None => {
                return Err(GatewayError::BadValue(
                    "$not needs a regex or a document of operators".into(),
                ));
            }
        },
        _ => return Err(GatewayError::BadValue("$not needs a regex or a document".into())),
    };

    Ok(Expr::Not {
        field: field.to_string(),
        expr: Box::new(expr),
    })
}

fn parse_regex(field: &str, value: &Value) -> GatewayResult<Expr> {
    let regex = match value {
        Value::String(pattern) => Regex::new(pattern.clone(), ""),
        Value::Regex(re) if re.options.is_empty() => re.clone(),
        Value::Regex(_) => return Err(GatewayError::NotImplemented("regex options".into())),
        _ => return Err(GatewayError::BadValue("$regex has to be a string".into())),
    };

    Ok(Expr::field(field, FieldOp::Regex, Value::Regex(regex)))
}

/// Parses a sort specification such as `{ "a": 1, "b": -1 }`.
pub fn parse_sort(sort: &Document) -> GatewayResult<Vec<Sort>> {
    sort.iter()
        .map(|(field, value)| {
            let direction = match value.as_integer() {
                Some(1) => SortDirection::Asc,
                Some(-1) => SortDirection::Desc,
                _ => {
                    return Err(GatewayError::BadValue(format!(
                        "sort key ordering for '{field}' must be 1 or -1"
                    )));
                }
            };

            Ok(Sort { field: field.to_string(), direction })
        })
        .collect()
}
