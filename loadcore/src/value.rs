//! Primitive column values and the coercion rules applied when reading a
//! tabular source.
use std::fmt;

use serde::{Deserialize, Serialize};

/// A single cell value, coerced from text at load time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    /// A boolean literal (`true`/`false`, case-insensitive in the source).
    Bool(bool),
    /// An integer literal.
    Int(i64),
    /// A floating point literal.
    Real(f64),
    /// Anything that didn't parse as a bool, int, or real.
    Text(String),
}

impl Value {
    /// Coerce a raw source field into the most specific type it matches,
    /// trying bool, then integer, then real, falling back to text.
    pub fn coerce(raw: &str) -> Self {
        if raw.eq_ignore_ascii_case("true") {
            return Value::Bool(true);
        }
        if raw.eq_ignore_ascii_case("false") {
            return Value::Bool(false);
        }
        if let Ok(i) = raw.parse::<i64>() {
            return Value::Int(i);
        }
        if let Ok(f) = raw.parse::<f64>() {
            return Value::Real(f);
        }
        Value::Text(raw.to_string())
    }

    /// This value rendered as text, for filter comparisons and templating.
    pub fn as_text(&self) -> std::borrow::Cow<'_, str> {
        match self {
            Value::Bool(b) => std::borrow::Cow::Borrowed(if *b { "true" } else { "false" }),
            Value::Int(i) => std::borrow::Cow::Owned(i.to_string()),
            Value::Real(r) => std::borrow::Cow::Owned(r.to_string()),
            Value::Text(s) => std::borrow::Cow::Borrowed(s),
        }
    }

    /// This value as `f64`, if it is numeric (int or real).
    pub fn as_numeric(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerces_bool_int_real_text() {
        assert_eq!(Value::coerce("true"), Value::Bool(true));
        assert_eq!(Value::coerce("FALSE"), Value::Bool(false));
        assert_eq!(Value::coerce("42"), Value::Int(42));
        assert_eq!(Value::coerce("-7"), Value::Int(-7));
        assert_eq!(Value::coerce("2.5"), Value::Real(2.5));
        assert_eq!(Value::coerce("hello"), Value::Text("hello".into()));
    }

    #[test]
    fn empty_string_is_text() {
        assert_eq!(Value::coerce(""), Value::Text("".into()));
    }
}
