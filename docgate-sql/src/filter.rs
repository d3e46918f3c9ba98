//! Filter expressions to SQL boolean expressions.
//!
//! This module translates docgate's filter expression tree into a `WHERE` fragment for the
//! JSON document store. Absence is a state of its own in the store (`IS UNSET`), distinct
//! from null, and the translation keeps MongoDB's treatment of missing and null fields:
//!
//! - `$ne` and `$not` also match documents where the field is missing or null.
//! - Inside `$nor`, comparisons additionally require the field to be set and non-null, so
//!   that such a field satisfies the negation instead of yielding an unknown result.
//!
//! Numbers compare by value across widths. Since each width is stored in its own shape,
//! numeric comparisons test every shape the value may have been stored as.
//!
//! Translation state lives on the translator instance, so concurrent compilations never
//! share it.

use docgate_core::{
    Document, GatewayError, GatewayResult, Value,
    query::{Expr, FieldOp, QueryVisitor, parse_filter},
};

use crate::{
    literal::{DOUBLE_TAG, LONG_TAG, literal, numeric_bound, numeric_equivalents, quote_ident},
    path::{compile_path, compile_path_under},
    regex::regex_to_like,
};

/// Compiles a filter document into a SQL boolean expression.
///
/// Returns `None` for the empty filter, which matches every document.
///
/// # Errors
///
/// Returns [`GatewayError::BadValue`] for malformed filters and
/// [`GatewayError::NotImplemented`] for operators, regex features and field paths the store
/// cannot express.
pub fn compile_filter(filter: &Document) -> GatewayResult<Option<String>> {
    parse_filter(filter)?.as_ref().map(compile_expr).transpose()
}

/// Compiles an already parsed filter expression.
pub fn compile_expr(expr: &Expr) -> GatewayResult<String> {
    SqlFilterTranslator::new().visit_expr(expr)
}

/// Translates filter expressions into SQL.
#[derive(Debug, Default)]
pub struct SqlFilterTranslator {
    // Number of enclosing `$nor` scopes.
    nor_depth: usize,
    // Number of enclosing `FOR ANY` quantifiers.
    quantifier_depth: usize,
    // Alias of the innermost quantifier; relative paths resolve against it.
    scope: Option<String>,
}

impl SqlFilterTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    fn path(&self, field: &str) -> GatewayResult<String> {
        match &self.scope {
            Some(alias) => compile_path_under(Some(alias.as_str()), field),
            None => compile_path(field),
        }
    }

    // Parenthesizes a comparison that is unknown on null. Inside `$nor` it also requires a
    // value to be present. `grouped` marks a disjunction that needs its own parentheses there.
    fn comparison(&self, path: &str, clause: String, grouped: bool) -> String {
        match (self.nor_depth > 0, grouped) {
            (true, true) => format!("({path} IS SET AND {path} IS NOT NULL AND ({clause}))"),
            (true, false) => format!("({path} IS SET AND {path} IS NOT NULL AND {clause})"),
            (false, _) => format!("({clause})"),
        }
    }

    // Parenthesizes a clause that is never unknown, requiring presence inside `$nor`.
    fn presence(&self, path: &str, clause: String) -> String {
        if self.nor_depth > 0 {
            format!("({path} IS SET AND {clause})")
        } else {
            format!("({clause})")
        }
    }

    fn join(
        &mut self,
        exprs: &[Expr],
        separator: &str,
        empty: &str,
    ) -> GatewayResult<String> {
        if exprs.is_empty() {
            return Ok(empty.to_string());
        }

        let clauses = exprs
            .iter()
            .map(|expr| self.visit_expr(expr))
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(format!("({})", clauses.join(separator)))
    }
}

// Literals a value equal to `value` may be stored as.
fn stored_shapes(value: &Value) -> Vec<String> {
    numeric_equivalents(value).unwrap_or_else(|| vec![literal(value)])
}

// `path = value` for every stored shape of the value. The flag is set when the clause is a
// disjunction.
fn equality(path: &str, value: &Value) -> (String, bool) {
    let shapes = stored_shapes(value);
    let alternatives: Vec<String> = shapes.iter().map(|shape| format!("{path} = {shape}")).collect();

    (alternatives.join(" OR "), alternatives.len() > 1)
}

// Negated equality; unknown when the field is null.
fn inequality(path: &str, value: &Value) -> String {
    match stored_shapes(value).as_slice() {
        [shape] => format!("{path} <> {shape}"),
        _ => format!("NOT ({})", equality(path, value).0),
    }
}

// Orders a number against bare numbers and against the numeric members of the int64 and
// double tags. Members are tested only when set, so a bare field never turns them unknown.
fn ordering(path: &str, operator: &str, value: &Value) -> (String, bool) {
    let Some(bound) = numeric_bound(value) else {
        return (format!("{path} {operator} {}", literal(value)), false);
    };

    let mut alternatives = vec![format!("{path} {operator} {bound}")];
    for tag in [LONG_TAG, DOUBLE_TAG] {
        let member = format!("{path}.{}", quote_ident(tag));
        alternatives.push(format!("({member} IS SET AND {member} {operator} {bound})"));
    }
    (alternatives.join(" OR "), true)
}

// Whether an expression holds for a field stored as null.
fn matches_null(expr: &Expr) -> bool {
    match expr {
        Expr::And(exprs) => exprs.iter().all(matches_null),
        Expr::Or(exprs) => exprs.iter().any(matches_null),
        Expr::Nor(exprs) => !exprs.iter().any(matches_null),
        Expr::Not { expr, .. } => !matches_null(expr),
        Expr::Exists(_, should_exist) => *should_exist,
        Expr::Field { op: FieldOp::Ne, value, .. } => !matches!(value, Value::Null),
        Expr::Field { op: FieldOp::Eq | FieldOp::Gte | FieldOp::Lte, value: Value::Null, .. } => true,
        Expr::Field { .. } | Expr::Size(..) | Expr::ElemMatch { .. } => false,
    }
}

impl QueryVisitor for SqlFilterTranslator {
    type Output = String;
    type Error = GatewayError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        self.join(exprs, " AND ", "(1 = 1)")
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        self.join(exprs, " OR ", "(1 = 0)")
    }

    fn visit_nor(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok("(1 = 1)".to_string());
        }

        self.nor_depth += 1;
        let clauses = exprs
            .iter()
            .map(|expr| self.visit_expr(expr).map(|clause| format!("NOT {clause}")))
            .collect::<GatewayResult<Vec<_>>>();
        self.nor_depth -= 1;

        Ok(format!("({})", clauses?.join(" AND ")))
    }

    fn visit_not(&mut self, field: &str, expr: &Expr) -> Result<Self::Output, Self::Error> {
        let path = self.path(field)?;
        let inner = self.visit_expr(expr)?;

        if matches_null(expr) {
            Ok(format!("(NOT {inner} OR {path} IS UNSET)"))
        } else {
            Ok(format!("(NOT {inner} OR {path} IS NULL OR {path} IS UNSET)"))
        }
    }

    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error> {
        let path = self.path(field)?;
        let state = if should_exist { "IS SET" } else { "IS UNSET" };

        Ok(format!("({path} {state})"))
    }

    fn visit_field(
        &mut self,
        field: &str,
        op: FieldOp,
        value: &Value,
    ) -> Result<Self::Output, Self::Error> {
        let path = self.path(field)?;

        let (clause, grouped) = match (op, value) {
            (FieldOp::Ne, Value::Null) => return Ok(format!("({path} IS NOT NULL)")),
            (FieldOp::Ne, _) => {
                let negated = inequality(&path, value);
                return Ok(format!("({negated} OR {path} IS NULL OR {path} IS UNSET)"));
            }
            (FieldOp::Eq | FieldOp::Gte | FieldOp::Lte, Value::Null) => {
                return Ok(self.presence(&path, format!("{path} IS NULL")));
            }
            (FieldOp::Gt | FieldOp::Lt, Value::Null) => {
                return Ok(self.presence(&path, "1 = 0".to_string()));
            }
            (FieldOp::Eq | FieldOp::Regex, Value::Regex(re)) => {
                if !re.options.is_empty() {
                    return Err(GatewayError::NotImplemented("regex options".into()));
                }
                (format!("{path} LIKE {}", regex_to_like(&re.pattern)?), false)
            }
            (FieldOp::Regex, other) => {
                return Err(GatewayError::BadValue(format!(
                    "$regex needs a regex, got {}",
                    other.type_name()
                )));
            }
            (FieldOp::Eq, _) => equality(&path, value),
            (FieldOp::Gt, _) => ordering(&path, ">", value),
            (FieldOp::Gte, _) => ordering(&path, ">=", value),
            (FieldOp::Lt, _) => ordering(&path, "<", value),
            (FieldOp::Lte, _) => ordering(&path, "<=", value),
        };

        Ok(self.comparison(&path, clause, grouped))
    }

    fn visit_size(&mut self, field: &str, size: i64) -> Result<Self::Output, Self::Error> {
        let path = self.path(field)?;

        Ok(self.comparison(&path, format!("CARDINALITY({path}) = {size}"), false))
    }

    fn visit_elem_match(
        &mut self,
        field: &str,
        predicate: &Expr,
    ) -> Result<Self::Output, Self::Error> {
        let path = self.path(field)?;
        let alias = format!("elem{}", self.quantifier_depth);

        let outer_scope = self.scope.replace(alias.clone());
        self.quantifier_depth += 1;
        let inner = self.visit_expr(predicate);
        self.quantifier_depth -= 1;
        self.scope = outer_scope;

        Ok(format!("(FOR ANY \"{alias}\" IN {path} SATISFIES {} END)", inner?))
    }
}
