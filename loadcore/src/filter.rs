//! The minimal `column OP literal` filter grammar (spec §4.1.4). Richer
//! expression filtering is explicitly out of scope; parse failures downgrade
//! to "no filtering" with a warning rather than failing `load()`.
use crate::row::Row;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Eq,
    Ne,
    Gt,
    Lt,
    Ge,
    Le,
}

/// A parsed `column OP literal` comparison.
#[derive(Debug, Clone)]
pub struct Filter {
    column: String,
    op: Op,
    literal: Literal,
}

#[derive(Debug, Clone)]
enum Literal {
    Numeric(f64),
    Text(String),
}

impl Filter {
    /// Parse a filter expression, returning `None` (and logging a warning)
    /// if the grammar doesn't match — never an error.
    pub fn parse(expr: &str) -> Option<Filter> {
        const OPS: &[(&str, Op)] = &[
            (">=", Op::Ge),
            ("<=", Op::Le),
            ("!=", Op::Ne),
            ("=", Op::Eq),
            (">", Op::Gt),
            ("<", Op::Lt),
        ];

        let trimmed = expr.trim();
        let (column, op, literal_raw) = OPS.iter().find_map(|(token, op)| {
            trimmed
                .split_once(token)
                .map(|(lhs, rhs)| (lhs.trim(), *op, rhs.trim()))
        })?;

        if column.is_empty() || literal_raw.is_empty() {
            tracing::warn!(
                expr,
                "filter expression missing column or literal; ignoring filter"
            );
            return None;
        }

        let (quoted, unquoted) = strip_quotes(literal_raw);
        let literal = if !quoted {
            match unquoted.parse::<f64>() {
                Ok(n) => Literal::Numeric(n),
                Err(_) => Literal::Text(unquoted.to_string()),
            }
        } else {
            Literal::Text(unquoted.to_string())
        };

        Some(Filter {
            column: column.to_string(),
            op,
            literal,
        })
    }

    /// Whether `row` satisfies this filter. Rows missing the column never
    /// match.
    pub fn matches(&self, row: &Row) -> bool {
        let Some(value) = row.get(&self.column) else {
            return false;
        };
        match &self.literal {
            Literal::Numeric(n) => match value.as_numeric() {
                Some(v) => compare(v.partial_cmp(n), self.op),
                None => false,
            },
            Literal::Text(t) => {
                let v = value.as_text();
                match self.op {
                    Op::Eq => v.as_ref() == t,
                    Op::Ne => v.as_ref() != t,
                    // Ordering comparisons against text literals aren't part
                    // of the grammar's semantics; treat as non-match.
                    _ => false,
                }
            }
        }
    }
}

fn compare(ordering: Option<std::cmp::Ordering>, op: Op) -> bool {
    use std::cmp::Ordering::*;
    match (ordering, op) {
        (Some(Equal), Op::Eq | Op::Ge | Op::Le) => true,
        (Some(Equal), Op::Ne) => false,
        (Some(Less), Op::Lt | Op::Le | Op::Ne) => true,
        (Some(Greater), Op::Gt | Op::Ge | Op::Ne) => true,
        _ => false,
    }
}

/// Strip a matching pair of quotes, if present, returning whether it was
/// quoted.
fn strip_quotes(s: &str) -> (bool, &str) {
    if s.len() >= 2 {
        let bytes = s.as_bytes();
        let first = bytes[0];
        let last = bytes[bytes.len() - 1];
        if (first == b'"' || first == b'\'') && first == last {
            return (true, &s[1..s.len() - 1]);
        }
    }
    (false, s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    fn row_with(col: &str, val: Value) -> Row {
        Row::from_pairs([(col.to_string(), val)])
    }

    #[test]
    fn numeric_literal_compares_numerically() {
        let filter = Filter::parse("age > 30").unwrap();
        assert!(filter.matches(&row_with("age", Value::Int(31))));
        assert!(!filter.matches(&row_with("age", Value::Int(29))));
    }

    #[test]
    fn quoted_literal_compares_as_text() {
        let filter = Filter::parse(r#"name = "30""#).unwrap();
        assert!(filter.matches(&row_with("name", Value::Text("30".into()))));
    }

    #[test]
    fn non_numeric_literal_compares_as_text_equality() {
        let filter = Filter::parse("city = Boston").unwrap();
        assert!(filter.matches(&row_with("city", Value::Text("Boston".into()))));
        assert!(!filter.matches(&row_with("city", Value::Text("Seattle".into()))));
    }

    #[test]
    fn malformed_expression_fails_to_parse() {
        assert!(Filter::parse("not an expression").is_none());
        assert!(Filter::parse("=5").is_none());
    }

    #[test]
    fn missing_column_never_matches() {
        let filter = Filter::parse("age > 30").unwrap();
        assert!(!filter.matches(&row_with("name", Value::Text("x".into()))));
    }
}
