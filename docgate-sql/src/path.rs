//! Dotted field paths to store paths.
//!
//! `a.b` becomes `"a"."b"`. A non-negative integer segment after the first indexes an array;
//! the store counts from 1, so `a.0` becomes `"a"[1]`. The first segment is always a field
//! name, even when it looks like a number.

use docgate_core::{GatewayError, GatewayResult};

use crate::literal::quote_ident;

/// Compiles a dotted path rooted at the document.
pub fn compile_path(path: &str) -> GatewayResult<String> {
    compile_path_under(None, path)
}

/// Compiles a dotted path rooted at `base`, a quantifier alias such as `elem0`.
///
/// With a base, the empty path names the base itself.
pub fn compile_path_under(base: Option<&str>, path: &str) -> GatewayResult<String> {
    let mut out = base.map(quote_ident).unwrap_or_default();

    if path.is_empty() {
        return match base {
            Some(_) => Ok(out),
            None => Err(GatewayError::BadValue("field path must not be empty".into())),
        };
    }

    let mut previous_was_index = false;
    for segment in path.split('.') {
        if segment.is_empty() {
            return Err(GatewayError::BadValue(format!(
                "field path '{path}' has an empty component"
            )));
        }

        if out.is_empty() {
            out.push_str(&quote_ident(segment));
            continue;
        }

        match parse_index(segment) {
            Some(Ok(index)) => {
                if previous_was_index {
                    return Err(GatewayError::NotImplemented(format!(
                        "nested array index in field path '{path}'"
                    )));
                }
                let position = index.checked_add(1).ok_or_else(|| {
                    GatewayError::BadValue(format!("array index out of range in field path '{path}'"))
                })?;
                out.push_str(&format!("[{position}]"));
                previous_was_index = true;
            }
            Some(Err(())) => {
                return Err(GatewayError::NotImplemented(format!(
                    "negative array index in field path '{path}'"
                )));
            }
            None => {
                out.push('.');
                out.push_str(&quote_ident(segment));
                previous_was_index = false;
            }
        }
    }

    Ok(out)
}

// `Some(Ok(n))` for an index, `Some(Err(()))` for a negative index, `None` for a name.
fn parse_index(segment: &str) -> Option<Result<u64, ()>> {
    let (negative, digits) = match segment.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, segment),
    };

    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    if negative {
        return Some(Err(()));
    }

    digits.parse::<u64>().ok().map(Ok)
}
