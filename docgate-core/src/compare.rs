//! MongoDB-compatible value comparison.
//!
//! [`compare_scalars`] yields a four-valued [`CompareResult`]: values from different type
//! families are never ordered against each other and report [`CompareResult::NotEqual`]
//! instead of an error. Numbers compare by value across int32, int64 and double.

use std::cmp::Ordering;

use crate::value::Value;

/// Outcome of comparing two values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareResult {
    Equal,
    Less,
    Greater,
    /// The values are not equal and have no defined order.
    NotEqual,
}

impl CompareResult {
    /// Swaps `Less` and `Greater`; `Equal` and `NotEqual` map to themselves.
    pub fn inverse(self) -> Self {
        match self {
            CompareResult::Less => CompareResult::Greater,
            CompareResult::Greater => CompareResult::Less,
            other => other,
        }
    }

    fn from_ordering(ordering: Ordering) -> Self {
        match ordering {
            Ordering::Less => CompareResult::Less,
            Ordering::Equal => CompareResult::Equal,
            Ordering::Greater => CompareResult::Greater,
        }
    }
}

/// Numeric view shared by int32, int64 and double.
#[derive(Debug, Clone, Copy)]
enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    fn of(value: &Value) -> Option<Number> {
        match value {
            Value::Int32(n) => Some(Number::Int(i64::from(*n))),
            Value::Int64(n) => Some(Number::Int(*n)),
            Value::Double(f) => Some(Number::Float(*f)),
            _ => None,
        }
    }
}

/// Compares two non-null values.
///
/// # Panics
///
/// Panics if either operand is [`Value::Null`]; callers handle null as its own case.
pub fn compare_scalars(a: &Value, b: &Value) -> CompareResult {
    assert!(
        !a.is_null() && !b.is_null(),
        "compare_scalars called with a null operand"
    );

    if let (Some(x), Some(y)) = (Number::of(a), Number::of(b)) {
        return compare_numbers(x, y);
    }

    match (a, b) {
        (Value::String(x), Value::String(y)) => {
            CompareResult::from_ordering(x.as_bytes().cmp(y.as_bytes()))
        }
        (Value::ObjectId(x), Value::ObjectId(y)) => CompareResult::from_ordering(x.cmp(y)),
        (Value::DateTime(x), Value::DateTime(y)) => CompareResult::from_ordering(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => compare_bools(*x, *y),
        _ => CompareResult::NotEqual,
    }
}

// `true` orders before `false`. Filter and sort paths rely on this order.
fn compare_bools(a: bool, b: bool) -> CompareResult {
    match (a, b) {
        (true, false) => CompareResult::Less,
        (false, true) => CompareResult::Greater,
        _ => CompareResult::Equal,
    }
}

fn compare_numbers(a: Number, b: Number) -> CompareResult {
    match (a, b) {
        (Number::Int(x), Number::Int(y)) => CompareResult::from_ordering(x.cmp(&y)),
        (Number::Float(x), Number::Float(y)) => compare_floats(x, y),
        (Number::Int(x), Number::Float(y)) => compare_int_float(x, y),
        (Number::Float(x), Number::Int(y)) => compare_int_float(y, x).inverse(),
    }
}

// NaN equals NaN and orders below every other number.
fn compare_floats(a: f64, b: f64) -> CompareResult {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => CompareResult::Equal,
        (true, false) => CompareResult::Less,
        (false, true) => CompareResult::Greater,
        (false, false) => a
            .partial_cmp(&b)
            .map(CompareResult::from_ordering)
            .unwrap_or(CompareResult::NotEqual),
    }
}

fn compare_int_float(int: i64, float: f64) -> CompareResult {
    const TWO_POW_63: f64 = 9_223_372_036_854_775_808.0;

    if float.is_nan() {
        return CompareResult::Greater;
    }
    if float >= TWO_POW_63 {
        return CompareResult::Less;
    }
    if float < -TWO_POW_63 {
        return CompareResult::Greater;
    }

    let truncated = float.trunc() as i64;
    match int.cmp(&truncated) {
        Ordering::Equal => 0.0_f64
            .partial_cmp(&float.fract())
            .map(CompareResult::from_ordering)
            .unwrap_or(CompareResult::NotEqual),
        ordering => CompareResult::from_ordering(ordering),
    }
}

/// Structural equality with numeric coercion.
///
/// Documents match when keys are equal in the same order and values match; arrays
/// match element-wise. Regexes never match anything.
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Document(x), Value::Document(y)) => {
            x.len() == y.len()
                && x.iter()
                    .zip(y.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
        }
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y.iter()).all(|(va, vb)| values_equal(va, vb))
        }
        (Value::Document(_) | Value::Array(_), _) | (_, Value::Document(_) | Value::Array(_)) => {
            false
        }
        _ => compare_scalars(a, b) == CompareResult::Equal,
    }
}

// Cross-family order used when sorting: numbers, strings, documents, arrays,
// object ids, booleans, dates, regexes.
fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Int32(_) | Value::Int64(_) | Value::Double(_) => 1,
        Value::String(_) => 2,
        Value::Document(_) => 3,
        Value::Array(_) => 4,
        Value::ObjectId(_) => 5,
        Value::Boolean(_) => 6,
        Value::DateTime(_) => 7,
        Value::Regex(_) => 8,
    }
}

/// Total order for sorting field values, where `None` is a missing field.
///
/// Missing sorts before null, null before everything else; other families follow
/// the type ranking. Values without a defined order compare as equal so that a stable
/// sort keeps their input order.
pub fn sort_order(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    let (a, b) = match (a, b) {
        (None, None) => return Ordering::Equal,
        (None, Some(_)) => return Ordering::Less,
        (Some(_), None) => return Ordering::Greater,
        (Some(a), Some(b)) => (a, b),
    };

    let (rank_a, rank_b) = (type_rank(a), type_rank(b));
    if rank_a != rank_b {
        return rank_a.cmp(&rank_b);
    }
    if rank_a == 0 {
        return Ordering::Equal;
    }

    match compare_scalars(a, b) {
        CompareResult::Less => Ordering::Less,
        CompareResult::Greater => Ordering::Greater,
        CompareResult::Equal | CompareResult::NotEqual => Ordering::Equal,
    }
}
