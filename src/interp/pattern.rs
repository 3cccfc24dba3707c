//! User-supplied wildcard query templates.

use regex::Regex;

use super::literal::parse_equality;
use super::recognize::{Predicate, Recognizer, Select, Statement};
use super::{NormalizedQuery, QueryError};

/// A template such as `select * from users where name = *` bound to a table
/// and an optional WHERE template like `name = '${2}'`.
///
/// Every `*` in the template is a capture, numbered from 1 in order of
/// appearance. Matching is case-insensitive; captured text is taken from the
/// case-preserving query with one layer of surrounding quotes removed.
#[derive(Debug, Clone)]
pub struct CustomPattern {
    template: String,
    regex: Regex,
    table: String,
    where_template: Option<String>,
}

impl CustomPattern {
    pub fn new(
        template: &str,
        table: impl Into<String>,
        where_template: Option<String>,
    ) -> Result<Self, regex::Error> {
        let normalized = NormalizedQuery::new(template);
        let body = normalized
            .lowered()
            .split('*')
            .map(regex::escape)
            .collect::<Vec<_>>()
            .join("(.*?)");
        let regex = Regex::new(&format!("^{body}$"))?;

        Ok(Self {
            template: normalized.lowered().to_string(),
            regex,
            table: table.into(),
            where_template: where_template.filter(|w| !w.trim().is_empty()),
        })
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    /// Returns the captured values when `query` matches this template.
    pub fn captures(&self, query: &NormalizedQuery) -> Option<Vec<String>> {
        let caps = self.regex.captures(query.lowered())?;
        let preserved = query.preserved();
        Some(
            caps.iter()
                .skip(1)
                .map(|m| {
                    m.map_or_else(String::new, |m| {
                        strip_quotes(&preserved[m.range()]).to_string()
                    })
                })
                .collect(),
        )
    }
}

impl Recognizer for CustomPattern {
    fn recognize(&self, query: &NormalizedQuery) -> Result<Option<Statement>, QueryError> {
        let Some(captures) = self.captures(query) else {
            return Ok(None);
        };

        let filter = match &self.where_template {
            Some(template) => {
                let clause = substitute(template, &captures);
                let clause = strip_where(&clause);
                let (column, value) = parse_equality(clause)?;
                Some(Predicate { column, value })
            }
            None => None,
        };

        Ok(Some(Statement::Select(Select {
            filter,
            ..Select::all(self.table.clone())
        })))
    }
}

fn strip_quotes(s: &str) -> &str {
    let s = s.trim();
    for q in ['\'', '"'] {
        if s.len() >= 2
            && let Some(inner) = s.strip_prefix(q).and_then(|r| r.strip_suffix(q))
        {
            return inner;
        }
    }
    s
}

fn strip_where(clause: &str) -> &str {
    let clause = clause.trim();
    match clause.get(..6) {
        Some(head) if head.eq_ignore_ascii_case("where ") => &clause[6..],
        _ => clause,
    }
}

/// Replaces `${n}` with the n-th capture, doubling single quotes so the
/// capture can sit inside a quoted literal. Unknown indexes become empty.
fn substitute(template: &str, captures: &[String]) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            out.push_str(&rest[start..]);
            return out;
        };
        match after[..end].parse::<usize>() {
            Ok(n) if n >= 1 => {
                if let Some(capture) = captures.get(n - 1) {
                    out.push_str(&capture.replace('\'', "''"));
                }
            }
            _ => out.push_str(&rest[start..start + 2 + end + 1]),
        }
        rest = &after[end + 1..];
    }
    out.push_str(rest);
    out
}
