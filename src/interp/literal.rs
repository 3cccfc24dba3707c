//! Quote-aware splitting and literal parsing over case-preserved query text.

use super::QueryError;
use crate::store::Value;

/// Splits `s` on `sep` where it appears outside quotes and parentheses.
/// Pieces are trimmed; an all-blank input yields no pieces.
pub fn split_top_level(s: &str, sep: char) -> Vec<&str> {
    if s.trim().is_empty() {
        return Vec::new();
    }

    let mut parts = Vec::new();
    let mut quote: Option<char> = None;
    let mut depth = 0usize;
    let mut start = 0;

    for (i, ch) in s.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => depth = depth.saturating_sub(1),
            (None, c) if c == sep && depth == 0 => {
                parts.push(s[start..i].trim());
                start = i + c.len_utf8();
            }
            _ => {}
        }
    }
    parts.push(s[start..].trim());
    parts
}

/// Finds the first occurrence of `needle` outside quotes.
pub fn find_unquoted(s: &str, needle: &str) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (i, ch) in s.char_indices() {
        match quote {
            Some(q) if ch == q => quote = None,
            Some(_) => {}
            None if ch == '\'' || ch == '"' => quote = Some(ch),
            None if s[i..].starts_with(needle) => return Some(i),
            None => {}
        }
    }
    None
}

/// Splits a leading `( ... )` group off `s`, returning its contents and the
/// text after the closing parenthesis.
pub fn parenthesized(s: &str) -> Option<(&str, &str)> {
    let s = s.trim_start();
    let body = s.strip_prefix('(')?;

    let mut quote: Option<char> = None;
    let mut depth = 1usize;
    for (i, ch) in body.char_indices() {
        match (quote, ch) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '\'' | '"') => quote = Some(ch),
            (None, '(') => depth += 1,
            (None, ')') => {
                depth -= 1;
                if depth == 0 {
                    return Some((&body[..i], &body[i + 1..]));
                }
            }
            _ => {}
        }
    }
    None
}

/// Parses a SQL literal: `'text'` (with `''` escapes), integers, floats,
/// `true`/`false` and `null`. A trailing `::type` cast is ignored.
pub fn parse_literal(s: &str) -> Result<Value, QueryError> {
    let mut s = s.trim();
    if let Some(cast) = find_unquoted(s, "::") {
        s = s[..cast].trim_end();
    }
    if s.is_empty() {
        return Err(QueryError::malformed("missing value"));
    }

    if let Some(rest) = s.strip_prefix('\'') {
        let Some(inner) = rest.strip_suffix('\'') else {
            return Err(QueryError::malformed(format!("unterminated string {s}")));
        };
        return Ok(Value::String(inner.replace("''", "'")));
    }

    match s.to_ascii_lowercase().as_str() {
        "null" => return Ok(Value::Null),
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }

    let numeric = s
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_digit() || matches!(c, '-' | '+' | '.'));
    if numeric {
        if let Ok(i) = s.parse::<i64>() {
            return Ok(Value::Int(i));
        }
        if let Ok(f) = s.parse::<f64>() {
            return Ok(Value::Float(f));
        }
    }

    Err(QueryError::malformed(format!("unrecognized value {s}")))
}

/// Parses a possibly qualified, possibly quoted identifier and returns its
/// last component: `public.users` is `users`, `"User"` is `User`.
pub fn parse_identifier(s: &str) -> Result<String, QueryError> {
    let parts = split_top_level(s, '.');
    let Some(last) = parts.last() else {
        return Err(QueryError::malformed("missing identifier"));
    };

    if let Some(rest) = last.strip_prefix('"') {
        let Some(inner) = rest.strip_suffix('"') else {
            return Err(QueryError::malformed(format!("unterminated identifier {last}")));
        };
        return Ok(inner.replace("\"\"", "\""));
    }

    if last.is_empty() || !last.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '$') {
        return Err(QueryError::malformed(format!("invalid identifier {s}")));
    }
    Ok(last.to_string())
}

/// Parses `column = literal`, as found in WHERE and SET clauses.
pub fn parse_equality(s: &str) -> Result<(String, Value), QueryError> {
    let Some(eq) = find_unquoted(s, "=") else {
        return Err(QueryError::Unsupported(format!(
            "only equality conditions are supported: {}",
            s.trim()
        )));
    };
    let (lhs, rhs) = (&s[..eq], &s[eq + 1..]);
    if lhs.ends_with(['!', '<', '>']) || rhs.starts_with(['<', '>']) {
        return Err(QueryError::Unsupported(format!(
            "only equality conditions are supported: {}",
            s.trim()
        )));
    }
    Ok((parse_identifier(lhs)?, parse_literal(rhs)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_top_level_respects_quotes_and_parens() {
        let parts = split_top_level("'a,b', 2, coalesce(x, y), \"c,d\"", ',');
        assert_eq!(parts, vec!["'a,b'", "2", "coalesce(x, y)", "\"c,d\""]);
        assert!(split_top_level("  ", ',').is_empty());
    }

    #[test]
    fn test_parenthesized() {
        let (inner, rest) = parenthesized(" ('a)', (1)) , (2)").unwrap();
        assert_eq!(inner, "'a)', (1)");
        assert_eq!(rest, " , (2)");
        assert!(parenthesized("(unclosed").is_none());
        assert!(parenthesized("no parens").is_none());
    }

    #[test]
    fn test_parse_literal_kinds() {
        assert_eq!(parse_literal("'O''Brien'").unwrap(), Value::from("O'Brien"));
        assert_eq!(parse_literal(" 42 ").unwrap(), Value::Int(42));
        assert_eq!(parse_literal("-1.5").unwrap(), Value::Float(-1.5));
        assert_eq!(parse_literal("TRUE").unwrap(), Value::Bool(true));
        assert_eq!(parse_literal("null").unwrap(), Value::Null);
        assert_eq!(parse_literal("'abc'::text").unwrap(), Value::from("abc"));
    }

    #[test]
    fn test_parse_literal_rejects_garbage() {
        assert!(parse_literal("'open").is_err());
        assert!(parse_literal("name").is_err());
        assert!(parse_literal("inf").is_err());
        assert!(parse_literal("").is_err());
    }

    #[test]
    fn test_parse_identifier() {
        assert_eq!(parse_identifier("users").unwrap(), "users");
        assert_eq!(parse_identifier("public.users").unwrap(), "users");
        assert_eq!(parse_identifier("\"Users\"").unwrap(), "Users");
        assert_eq!(parse_identifier("users.id").unwrap(), "id");
        assert!(parse_identifier("a b").is_err());
    }

    #[test]
    fn test_parse_equality() {
        let (col, value) = parse_equality("users.name = 'A = B'").unwrap();
        assert_eq!(col, "name");
        assert_eq!(value, Value::from("A = B"));

        assert!(matches!(parse_equality("age > 3"), Err(QueryError::Unsupported(_))));
        assert!(matches!(parse_equality("age >= 3"), Err(QueryError::Unsupported(_))));
        assert!(matches!(parse_equality("age != 3"), Err(QueryError::Unsupported(_))));
    }
}
