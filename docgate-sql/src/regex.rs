//! Regular expressions to `LIKE` patterns.
//!
//! Only a small regex subset has a `LIKE` equivalent: literal characters, a leading `^`, a
//! trailing `$`, `.` and `.*`. A backslash makes a punctuation character literal. Literal
//! `%`, `_` and `^` are escaped with `^`, which adds an `ESCAPE '^'` clause. Everything
//! else is rejected rather than approximated.

use docgate_core::{GatewayError, GatewayResult};

use crate::literal::quote_string;

const ESCAPE: char = '^';

struct LikeBuilder {
    out: String,
    escaped: bool,
    trailing_wildcard: bool,
}

impl LikeBuilder {
    fn new() -> Self {
        Self { out: String::new(), escaped: false, trailing_wildcard: false }
    }

    fn wildcard(&mut self) {
        if !self.trailing_wildcard {
            self.out.push('%');
            self.trailing_wildcard = true;
        }
    }

    fn any_char(&mut self) {
        self.out.push('_');
        self.trailing_wildcard = false;
    }

    fn literal(&mut self, c: char) {
        if matches!(c, '%' | '_' | ESCAPE) {
            self.out.push(ESCAPE);
            self.escaped = true;
        }
        self.out.push(c);
        self.trailing_wildcard = false;
    }

    fn finish(self) -> String {
        let pattern = quote_string(&self.out);
        if self.escaped {
            format!("{pattern} ESCAPE '{ESCAPE}'")
        } else {
            pattern
        }
    }
}

/// Translates a regex pattern into a quoted `LIKE` pattern, plus `ESCAPE '^'` when needed.
pub fn regex_to_like(pattern: &str) -> GatewayResult<String> {
    if pattern.starts_with("(?i)") || pattern.starts_with("(?-i)") {
        let flag = if pattern.starts_with("(?i)") { "(?i)" } else { "(?-i)" };
        return Err(GatewayError::NotImplemented(format!("regex flag {flag}")));
    }

    let chars: Vec<char> = pattern.chars().collect();
    let (anchored_start, body) = match chars.split_first() {
        Some(('^', rest)) => (true, rest),
        _ => (false, chars.as_slice()),
    };
    let (anchored_end, body) = match body.split_last() {
        Some(('$', rest)) if !ends_with_escape(rest) => (true, rest),
        _ => (false, body),
    };

    let mut like = LikeBuilder::new();
    if !anchored_start {
        like.wildcard();
    }

    let mut i = 0;
    while i < body.len() {
        match body[i] {
            '\\' => {
                let Some(&next) = body.get(i + 1) else {
                    return Err(GatewayError::BadValue(format!(
                        "regex '{pattern}' ends with a lone backslash"
                    )));
                };
                if next.is_alphanumeric() {
                    return Err(GatewayError::NotImplemented(format!(
                        "regex escape \\{next}"
                    )));
                }
                like.literal(next);
                i += 2;
            }
            '.' if body.get(i + 1) == Some(&'*') => {
                like.wildcard();
                i += 2;
            }
            '.' => {
                like.any_char();
                i += 1;
            }
            c @ ('*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$') => {
                return Err(GatewayError::NotImplemented(format!("regex metacharacter '{c}'")));
            }
            c => {
                like.literal(c);
                i += 1;
            }
        }
    }

    if !anchored_end {
        like.wildcard();
    }

    Ok(like.finish())
}

// True when the slice ends in an odd run of backslashes.
fn ends_with_escape(chars: &[char]) -> bool {
    chars.iter().rev().take_while(|c| **c == '\\').count() % 2 == 1
}
