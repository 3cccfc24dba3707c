//! Statement shapes and the built-in recognizer.
//!
//! Recognition is deliberately shallow: the leading keyword picks a shape and
//! clause keywords are located with quote-aware searches. There is no grammar.

use std::fmt::Debug;

use super::literal::{
    find_unquoted, parenthesized, parse_equality, parse_identifier, parse_literal, split_top_level,
};
use super::{NormalizedQuery, QueryError};
use crate::store::Value;

/// Turns normalized query text into a [`Statement`].
///
/// `Ok(None)` means the text is not of a shape this recognizer handles and
/// the next one should be tried.
pub trait Recognizer: Send + Sync + Debug {
    fn recognize(&self, query: &NormalizedQuery) -> Result<Option<Statement>, QueryError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// Blank query text.
    Empty,
    /// `SELECT <expr>` without a FROM clause.
    Scalar(ScalarExpr),
    /// A read against a system catalog; always empty.
    Catalog,
    Select(Select),
    Insert(Insert),
    Update(Update),
    Delete(Delete),
    Show(String),
    /// Accepted and ignored; carries the command tag.
    NoOp(&'static str),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ScalarExpr {
    Version,
    CurrentDatabase,
    CurrentUser,
    CurrentSchema,
    /// Anything else, echoed back as written.
    Echo(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Projection {
    All,
    Columns(Vec<String>),
    Count,
}

/// `column = value`
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    pub column: String,
    pub value: Value,
}

impl Predicate {
    fn parse(s: &str) -> Result<Self, QueryError> {
        let (column, value) = parse_equality(s)?;
        Ok(Self { column, value })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub column: String,
    pub descending: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub projection: Projection,
    pub filter: Option<Predicate>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl Select {
    /// `SELECT * FROM table` with no clauses.
    pub fn all(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            projection: Projection::All,
            filter: None,
            order_by: None,
            limit: None,
            offset: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    /// `None` when the statement omits the column list.
    pub columns: Option<Vec<String>>,
    pub rows: Vec<Vec<Value>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub assignments: Vec<(String, Value)>,
    pub filter: Predicate,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub filter: Predicate,
}

/// Recognizes the statement shapes every client driver needs.
#[derive(Debug, Default, Clone, Copy)]
pub struct BuiltinRecognizer;

impl Recognizer for BuiltinRecognizer {
    fn recognize(&self, query: &NormalizedQuery) -> Result<Option<Statement>, QueryError> {
        if query.is_empty() {
            return Ok(Some(Statement::Empty));
        }

        let statement = match query.first_word() {
            "select" => recognize_select(query)?,
            "insert" => recognize_insert(query)?,
            "update" => recognize_update(query)?,
            "delete" => recognize_delete(query)?,
            "show" => recognize_show(query)?,
            word => match no_op_tag(query, word) {
                Some(tag) => Statement::NoOp(tag),
                None => return Ok(None),
            },
        };
        Ok(Some(statement))
    }
}

fn no_op_tag(query: &NormalizedQuery, word: &str) -> Option<&'static str> {
    let tag = match word {
        "set" => "SET",
        "begin" | "start" => "BEGIN",
        "commit" | "end" => "COMMIT",
        "rollback" | "abort" => "ROLLBACK",
        "discard" => "DISCARD ALL",
        "reset" => "RESET",
        "close" => "CLOSE CURSOR",
        "deallocate" if query.find_keyword("all", 0).is_some() => "DEALLOCATE ALL",
        "deallocate" => "DEALLOCATE",
        _ => return None,
    };
    Some(tag)
}

const SELECT_CLAUSES: [&str; 4] = ["where", "order by", "limit", "offset"];

fn recognize_select(query: &NormalizedQuery) -> Result<Statement, QueryError> {
    let text = query.preserved();
    let body = "select".len();

    let Some(from) = query.find_keyword("from", body) else {
        return recognize_scalar(text[body..].trim());
    };

    let after_from = from + "from".len();
    let mut clauses: Vec<(usize, &str)> = SELECT_CLAUSES
        .iter()
        .filter_map(|kw| query.find_keyword(kw, after_from).map(|at| (at, *kw)))
        .collect();
    clauses.sort_unstable();

    let table_end = clauses.first().map_or(text.len(), |(at, _)| *at);
    let source = text[after_from..table_end].trim();
    let mut words = source.split_whitespace();
    let Some(first) = words.next() else {
        return Err(QueryError::malformed("missing table name after FROM"));
    };

    let lowered = first.to_ascii_lowercase();
    if lowered.starts_with("pg_") || lowered.starts_with("information_schema") {
        return Ok(Statement::Catalog);
    }
    if first.starts_with('(') || source.contains(',') {
        return Err(QueryError::Unsupported("subqueries and multi-table reads".into()));
    }

    let table = parse_identifier(first)?;
    if parse_identifier(&lowered)?.starts_with("pg_") {
        return Ok(Statement::Catalog);
    }
    // an optional alias is all that may follow the table name
    match (words.next(), words.next(), words.next()) {
        (None, _, _) => {}
        (Some(alias), None, _) if !alias.eq_ignore_ascii_case("join") => {}
        (Some(kw), Some(_), None) if kw.eq_ignore_ascii_case("as") => {}
        _ => return Err(QueryError::Unsupported(format!("FROM {source}"))),
    }

    let mut select = Select {
        projection: recognize_projection(text[body..from].trim())?,
        ..Select::all(table)
    };

    for (i, &(at, keyword)) in clauses.iter().enumerate() {
        let end = clauses.get(i + 1).map_or(text.len(), |(next, _)| *next);
        let clause = text[at + keyword.len()..end].trim();
        match keyword {
            "where" => select.filter = Some(Predicate::parse(clause)?),
            "order by" => select.order_by = Some(recognize_order_by(clause)?),
            "limit" => select.limit = parse_count(clause, "LIMIT")?,
            _ => select.offset = parse_count(clause, "OFFSET")?,
        }
    }

    Ok(Statement::Select(select))
}

fn recognize_scalar(expr: &str) -> Result<Statement, QueryError> {
    if expr.is_empty() {
        return Err(QueryError::malformed("SELECT without an expression"));
    }
    let scalar = match expr.to_ascii_lowercase().as_str() {
        "version()" => ScalarExpr::Version,
        "current_database()" => ScalarExpr::CurrentDatabase,
        "current_user" | "session_user" | "user" => ScalarExpr::CurrentUser,
        "current_schema" | "current_schema()" => ScalarExpr::CurrentSchema,
        _ => ScalarExpr::Echo(expr.to_string()),
    };
    Ok(Statement::Scalar(scalar))
}

fn recognize_projection(columns: &str) -> Result<Projection, QueryError> {
    if columns == "*" {
        return Ok(Projection::All);
    }
    let lowered = columns.to_ascii_lowercase().replace(' ', "");
    if lowered == "count(*)" || lowered == "count(1)" {
        return Ok(Projection::Count);
    }

    let parts = split_top_level(columns, ',');
    if parts.is_empty() {
        return Err(QueryError::malformed("SELECT without columns"));
    }
    if parts.iter().any(|p| *p == "*" || p.ends_with(".*")) {
        return Ok(Projection::All);
    }
    let names = parts
        .into_iter()
        .map(parse_identifier)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Projection::Columns(names))
}

fn recognize_order_by(clause: &str) -> Result<OrderBy, QueryError> {
    if clause.contains(',') {
        return Err(QueryError::Unsupported("ORDER BY on more than one column".into()));
    }
    let mut words = clause.split_whitespace();
    let column = parse_identifier(words.next().unwrap_or_default())?;
    let descending = match words.next().map(str::to_ascii_lowercase).as_deref() {
        None | Some("asc") => false,
        Some("desc") => true,
        Some(other) => return Err(QueryError::malformed(format!("ORDER BY ... {other}"))),
    };
    Ok(OrderBy { column, descending })
}

fn parse_count(clause: &str, keyword: &str) -> Result<Option<usize>, QueryError> {
    if clause.eq_ignore_ascii_case("all") {
        return Ok(None);
    }
    clause
        .parse::<usize>()
        .map(Some)
        .map_err(|_| {
            QueryError::malformed(format!(
                "{keyword} expects a non-negative integer, got {clause}"
            ))
        })
}

fn recognize_insert(query: &NormalizedQuery) -> Result<Statement, QueryError> {
    let text = query.preserved();
    let Some(into) = query.find_keyword("into", 0) else {
        return Err(QueryError::malformed("INSERT without INTO"));
    };
    let Some(values) = query.find_keyword("values", into) else {
        return Err(QueryError::Unsupported("INSERT without VALUES".into()));
    };

    let target = text[into + "into".len()..values].trim();
    let (table, columns) = match find_unquoted(target, "(") {
        Some(open) => {
            let Some((list, rest)) = parenthesized(&target[open..]) else {
                return Err(QueryError::malformed("unbalanced column list"));
            };
            if !rest.trim().is_empty() {
                return Err(QueryError::malformed(format!("unexpected {}", rest.trim())));
            }
            let columns = split_top_level(list, ',')
                .into_iter()
                .map(parse_identifier)
                .collect::<Result<Vec<_>, _>>()?;
            (parse_identifier(target[..open].trim())?, Some(columns))
        }
        None => (parse_identifier(target)?, None),
    };

    let mut rows = Vec::new();
    let mut rest = &text[values + "values".len()..];
    loop {
        let Some((list, after)) = parenthesized(rest) else {
            return Err(QueryError::malformed("expected a parenthesized value list"));
        };
        let row = split_top_level(list, ',')
            .into_iter()
            .map(parse_literal)
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(columns) = &columns
            && columns.len() != row.len()
        {
            return Err(QueryError::malformed(format!(
                "INSERT has {} columns but {} values",
                columns.len(),
                row.len()
            )));
        }
        rows.push(row);

        let after = after.trim_start();
        if after.is_empty() {
            break;
        }
        match after.strip_prefix(',') {
            Some(next) => rest = next,
            None => return Err(QueryError::Unsupported(format!("INSERT ... {after}"))),
        }
    }

    Ok(Statement::Insert(Insert {
        table,
        columns,
        rows,
    }))
}

fn recognize_update(query: &NormalizedQuery) -> Result<Statement, QueryError> {
    let text = query.preserved();
    let Some(set) = query.find_keyword("set", 0) else {
        return Err(QueryError::malformed("UPDATE without SET"));
    };
    let Some(filter) = query.find_keyword("where", set) else {
        return Err(QueryError::MissingWhere("UPDATE"));
    };

    let table = parse_identifier(text["update".len()..set].trim())?;
    let assignments = split_top_level(&text[set + "set".len()..filter], ',')
        .into_iter()
        .map(parse_equality)
        .collect::<Result<Vec<_>, _>>()?;
    if assignments.is_empty() {
        return Err(QueryError::malformed("UPDATE without assignments"));
    }

    Ok(Statement::Update(Update {
        table,
        assignments,
        filter: Predicate::parse(&text[filter + "where".len()..])?,
    }))
}

fn recognize_delete(query: &NormalizedQuery) -> Result<Statement, QueryError> {
    let text = query.preserved();
    let Some(from) = query.find_keyword("from", 0) else {
        return Err(QueryError::malformed("DELETE without FROM"));
    };
    let Some(filter) = query.find_keyword("where", from) else {
        return Err(QueryError::MissingWhere("DELETE"));
    };

    Ok(Statement::Delete(Delete {
        table: parse_identifier(text[from + "from".len()..filter].trim())?,
        filter: Predicate::parse(&text[filter + "where".len()..])?,
    }))
}

fn recognize_show(query: &NormalizedQuery) -> Result<Statement, QueryError> {
    let name = query.lowered()["show".len()..].trim();
    if name.is_empty() {
        return Err(QueryError::malformed("SHOW without a parameter"));
    }
    Ok(Statement::Show(name.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recognize(sql: &str) -> Result<Option<Statement>, QueryError> {
        BuiltinRecognizer.recognize(&NormalizedQuery::new(sql))
    }

    fn statement(sql: &str) -> Statement {
        recognize(sql).unwrap().unwrap()
    }

    #[test]
    fn test_select_with_clauses() {
        let Statement::Select(select) =
            statement("SELECT id, Name FROM public.users WHERE users.name = 'Alice' ORDER BY id DESC LIMIT 10 OFFSET 2")
        else {
            panic!("expected select");
        };
        assert_eq!(select.table, "users");
        assert_eq!(
            select.projection,
            Projection::Columns(vec!["id".to_string(), "Name".to_string()])
        );
        assert_eq!(
            select.filter,
            Some(Predicate {
                column: "name".to_string(),
                value: Value::from("Alice"),
            })
        );
        assert_eq!(
            select.order_by,
            Some(OrderBy {
                column: "id".to_string(),
                descending: true,
            })
        );
        assert_eq!(select.limit, Some(10));
        assert_eq!(select.offset, Some(2));
    }

    #[test]
    fn test_select_keyword_inside_literal() {
        let Statement::Select(select) = statement("select * from notes where body = 'limit 5 from here'")
        else {
            panic!("expected select");
        };
        assert_eq!(select.filter.unwrap().value, Value::from("limit 5 from here"));
        assert_eq!(select.limit, None);
    }

    #[test]
    fn test_select_count_and_alias() {
        let Statement::Select(select) = statement("select count(*) from users u") else {
            panic!("expected select");
        };
        assert_eq!(select.projection, Projection::Count);
        assert_eq!(select.table, "users");
    }

    #[test]
    fn test_catalog_reads_are_no_ops() {
        assert_eq!(statement("SELECT * FROM pg_catalog.pg_type"), Statement::Catalog);
        assert_eq!(
            statement("select table_name from information_schema.tables where table_schema = 'public'"),
            Statement::Catalog
        );
        assert_eq!(
            statement("select n.nspname from pg_namespace n join pg_class c on true"),
            Statement::Catalog
        );
    }

    #[test]
    fn test_scalar_selects() {
        assert_eq!(statement("SELECT version()"), Statement::Scalar(ScalarExpr::Version));
        assert_eq!(
            statement("select current_database()"),
            Statement::Scalar(ScalarExpr::CurrentDatabase)
        );
        assert_eq!(statement("select current_user"), Statement::Scalar(ScalarExpr::CurrentUser));
        assert_eq!(
            statement("SELECT 1"),
            Statement::Scalar(ScalarExpr::Echo("1".to_string()))
        );
    }

    #[test]
    fn test_insert_shapes() {
        let Statement::Insert(insert) =
            statement("INSERT INTO users (id, name) VALUES ('abc-123', 'Alice'), ('def-456', 'Bob')")
        else {
            panic!("expected insert");
        };
        assert_eq!(insert.table, "users");
        assert_eq!(insert.columns, Some(vec!["id".to_string(), "name".to_string()]));
        assert_eq!(insert.rows.len(), 2);
        assert_eq!(insert.rows[1][1], Value::from("Bob"));

        let Statement::Insert(insert) = statement("insert into users values ('x', 'Y')") else {
            panic!("expected insert");
        };
        assert_eq!(insert.columns, None);
        assert_eq!(insert.rows, vec![vec![Value::from("x"), Value::from("Y")]]);
    }

    #[test]
    fn test_insert_length_mismatch() {
        let result = recognize("insert into users (id, name) values ('x')");
        assert!(matches!(result, Err(QueryError::Malformed(_))));
    }

    #[test]
    fn test_update_and_delete_require_where() {
        assert!(matches!(
            recognize("update users set name = 'x'"),
            Err(QueryError::MissingWhere("UPDATE"))
        ));
        assert!(matches!(recognize("delete from users"), Err(QueryError::MissingWhere("DELETE"))));

        let Statement::Update(update) = statement("UPDATE users SET name = 'Z', age = 3 WHERE id = 'a'")
        else {
            panic!("expected update");
        };
        assert_eq!(
            update.assignments,
            vec![
                ("name".to_string(), Value::from("Z")),
                ("age".to_string(), Value::Int(3)),
            ]
        );
        assert_eq!(update.filter.column, "id");

        let Statement::Delete(delete) = statement("delete from users where id = 'a'") else {
            panic!("expected delete");
        };
        assert_eq!(delete.table, "users");
    }

    #[test]
    fn test_no_ops_show_and_unknown() {
        assert_eq!(statement("BEGIN"), Statement::NoOp("BEGIN"));
        assert_eq!(statement("start transaction"), Statement::NoOp("BEGIN"));
        assert_eq!(statement("end"), Statement::NoOp("COMMIT"));
        assert_eq!(statement("SET client_encoding = 'UTF8'"), Statement::NoOp("SET"));
        assert_eq!(statement("DISCARD ALL"), Statement::NoOp("DISCARD ALL"));
        assert_eq!(statement("deallocate all"), Statement::NoOp("DEALLOCATE ALL"));
        assert_eq!(
            statement("SHOW TRANSACTION ISOLATION LEVEL"),
            Statement::Show("transaction isolation level".to_string())
        );
        assert_eq!(statement(";"), Statement::Empty);
        assert_eq!(recognize("vacuum users").unwrap(), None);
    }
}
