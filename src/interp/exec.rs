use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, trace};

use super::inflect::{EnglishInflector, Inflector};
use super::literal::parse_literal;
use super::pattern::CustomPattern;
use super::recognize::{
    BuiltinRecognizer, Delete, Insert, Predicate, Projection, Recognizer, ScalarExpr, Select,
    Statement, Update,
};
use super::{NormalizedQuery, QueryError};
use crate::protocol::type_oid;
use crate::store::{FieldType, Row, Schema, Store, Value};

/// Reported by `SELECT version()` and `SHOW server_version`.
pub const SERVER_VERSION: &str = "14.0";

/// Identity of the connection a query runs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionInfo {
    pub user: String,
    pub database: String,
}

impl SessionInfo {
    pub fn new(user: impl Into<String>, database: impl Into<String>) -> Self {
        Self {
            user: user.into(),
            database: database.into(),
        }
    }
}

/// Column metadata reported in RowDescription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDescriptor {
    pub name: String,
    pub type_oid: i32,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, type_oid: i32) -> Self {
        Self {
            name: name.into(),
            type_oid,
        }
    }
}

/// The outcome of one statement, ready to be encoded.
///
/// `columns` is empty for statements that return no rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryResult {
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Vec<Option<String>>>,
    pub tag: String,
}

impl QueryResult {
    /// A result with a command tag only.
    pub fn command(tag: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            tag: tag.into(),
        }
    }

    fn single(column: &str, type_oid: i32, value: Option<String>) -> Self {
        Self {
            columns: vec![ColumnDescriptor::new(column, type_oid)],
            rows: vec![vec![value]],
            tag: "SELECT 1".to_string(),
        }
    }

    pub fn returns_rows(&self) -> bool {
        !self.columns.is_empty()
    }
}

/// Answers query text against a [`Store`].
///
/// Custom patterns are tried in registration order, then the built-in
/// recognizer.
#[derive(Debug)]
pub struct Interpreter {
    store: Arc<Store>,
    patterns: Vec<CustomPattern>,
    builtin: BuiltinRecognizer,
    inflector: Box<dyn Inflector>,
    /// table -> column -> OID, for columns whose configured type is more
    /// specific than the store's field type
    column_types: HashMap<String, HashMap<String, i32>>,
}

impl Interpreter {
    pub fn new(store: Arc<Store>) -> Self {
        Self {
            store,
            patterns: Vec::new(),
            builtin: BuiltinRecognizer,
            inflector: Box::new(EnglishInflector),
            column_types: HashMap::new(),
        }
    }

    pub fn with_inflector(mut self, inflector: Box<dyn Inflector>) -> Self {
        self.inflector = inflector;
        self
    }

    pub fn add_pattern(&mut self, pattern: CustomPattern) {
        self.patterns.push(pattern);
    }

    /// Reports `column` of `table` with `oid` instead of the OID implied by
    /// its field type.
    pub fn set_column_type(&mut self, table: &str, column: &str, oid: i32) {
        self.column_types
            .entry(table.to_string())
            .or_default()
            .insert(column.to_string(), oid);
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    /// Recognizes and runs one query. `Ok(None)` means the text was empty.
    pub fn execute(
        &self,
        sql: &str,
        session: &SessionInfo,
    ) -> Result<Option<QueryResult>, QueryError> {
        let query = NormalizedQuery::new(sql);
        let statement = self.recognize(&query)?;
        trace!(?statement, "recognized");

        let result = match statement {
            Statement::Empty => return Ok(None),
            Statement::Scalar(expr) => scalar(expr, session),
            Statement::Catalog => QueryResult::command("SELECT 0"),
            Statement::Select(select) => self.select(select)?,
            Statement::Insert(insert) => self.insert(insert)?,
            Statement::Update(update) => self.update(update)?,
            Statement::Delete(delete) => self.delete(delete)?,
            Statement::Show(name) => show(&name),
            Statement::NoOp(tag) => QueryResult::command(tag),
        };
        debug!(tag = %result.tag, rows = result.rows.len(), "executed");
        Ok(Some(result))
    }

    fn recognize(&self, query: &NormalizedQuery) -> Result<Statement, QueryError> {
        for pattern in &self.patterns {
            if let Some(statement) = pattern.recognize(query)? {
                trace!(template = pattern.template(), "custom pattern matched");
                return Ok(statement);
            }
        }
        self.builtin
            .recognize(query)?
            .ok_or_else(|| QueryError::Unsupported(query.preserved().to_string()))
    }

    /// Resolves a table name as written, then its singular and plural forms.
    /// Names are compared ignoring ASCII case.
    fn resolve_table(&self, name: &str) -> Result<Schema, QueryError> {
        let tables = self.store.table_names();
        let candidates = [
            name.to_string(),
            self.inflector.singular(name),
            self.inflector.plural(name),
        ];
        let table = candidates
            .iter()
            .find_map(|candidate| tables.iter().find(|t| t.eq_ignore_ascii_case(candidate)))
            .ok_or_else(|| QueryError::UnknownTable(name.to_string()))?;
        Ok(self.store.schema(table)?)
    }

    fn column_oid(&self, schema: &Schema, column: &str) -> i32 {
        if let Some(oid) = self
            .column_types
            .get(schema.name())
            .and_then(|columns| columns.get(column))
        {
            return *oid;
        }
        match schema.field(column).map(|f| f.ty) {
            Some(FieldType::Int) => type_oid::INT4,
            Some(FieldType::Bool) => type_oid::BOOL,
            Some(FieldType::Float) => type_oid::FLOAT8,
            _ => type_oid::TEXT,
        }
    }

    /// Returns the canonical field name and the literal coerced to its type.
    fn bind(
        &self,
        schema: &Schema,
        column: &str,
        value: Value,
    ) -> Result<(String, Value), QueryError> {
        let field = schema
            .field_ignore_case(column)
            .ok_or_else(|| QueryError::UnknownColumn {
                table: schema.name().to_string(),
                column: column.to_string(),
            })?;
        Ok((field.name.clone(), field.ty.coerce(value)))
    }

    fn matching_rows(
        &self,
        schema: &Schema,
        filter: Option<Predicate>,
    ) -> Result<Vec<Row>, QueryError> {
        let rows = match filter {
            Some(Predicate { column, value }) => {
                let (field, value) = self.bind(schema, &column, value)?;
                self.store.where_eq(schema.name(), &field, &value)?
            }
            None => self.store.list(schema.name())?,
        };
        Ok(rows)
    }

    fn select(&self, select: Select) -> Result<QueryResult, QueryError> {
        let schema = self.resolve_table(&select.table)?;
        let mut rows = self.matching_rows(&schema, select.filter)?;

        let columns: Vec<String> = match select.projection {
            // count(*) aggregates every matching row; OFFSET and LIMIT then
            // apply to the single result row.
            Projection::Count => {
                let mut result =
                    QueryResult::single("count", type_oid::INT8, Some(rows.len().to_string()));
                if select.offset.unwrap_or(0) > 0 || select.limit == Some(0) {
                    result.rows.clear();
                    result.tag = "SELECT 0".to_string();
                }
                return Ok(result);
            }
            Projection::All => schema.fields().iter().map(|f| f.name.clone()).collect(),
            Projection::Columns(names) => names
                .iter()
                .map(|name| self.bind(&schema, name, Value::Null).map(|(field, _)| field))
                .collect::<Result<_, _>>()?,
        };

        if let Some(order) = select.order_by {
            let (field, _) = self.bind(&schema, &order.column, Value::Null)?;
            rows.sort_by(|a, b| {
                let ordering = a
                    .get(&field)
                    .unwrap_or(&Value::Null)
                    .sort_cmp(b.get(&field).unwrap_or(&Value::Null));
                if order.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        let rows: Vec<Row> = rows
            .into_iter()
            .skip(select.offset.unwrap_or(0))
            .take(select.limit.unwrap_or(usize::MAX))
            .collect();

        let data = rows
            .iter()
            .map(|row| {
                columns
                    .iter()
                    .map(|c| row.get(c).and_then(Value::to_text))
                    .collect()
            })
            .collect::<Vec<_>>();

        Ok(QueryResult {
            columns: columns
                .iter()
                .map(|c| ColumnDescriptor::new(c.as_str(), self.column_oid(&schema, c)))
                .collect(),
            tag: format!("SELECT {}", data.len()),
            rows: data,
        })
    }

    fn insert(&self, insert: Insert) -> Result<QueryResult, QueryError> {
        let schema = self.resolve_table(&insert.table)?;
        let columns: Vec<String> = match insert.columns {
            Some(columns) => columns,
            None => schema.fields().iter().map(|f| f.name.clone()).collect(),
        };

        let mut rows = Vec::with_capacity(insert.rows.len());
        for values in insert.rows {
            if values.len() != columns.len() {
                return Err(QueryError::malformed(format!(
                    "INSERT has {} columns but {} values",
                    columns.len(),
                    values.len()
                )));
            }
            let row = columns
                .iter()
                .zip(values)
                .map(|(column, value)| self.bind(&schema, column, value))
                .collect::<Result<Row, _>>()?;
            rows.push(row);
        }

        let count = rows.len();
        self.store.insert_all(schema.name(), rows)?;
        Ok(QueryResult::command(format!("INSERT 0 {count}")))
    }

    fn update(&self, update: Update) -> Result<QueryResult, QueryError> {
        let schema = self.resolve_table(&update.table)?;
        let changes = update
            .assignments
            .into_iter()
            .map(|(column, value)| self.bind(&schema, &column, value))
            .collect::<Result<Row, _>>()?;

        let pk = &schema.primary_key().name;
        let targets = self.matching_rows(&schema, Some(update.filter))?;
        let mut count = 0;
        for row in targets {
            let Some(id) = row.get(pk) else { continue };
            self.store.update(schema.name(), id, changes.clone())?;
            count += 1;
        }
        Ok(QueryResult::command(format!("UPDATE {count}")))
    }

    fn delete(&self, delete: Delete) -> Result<QueryResult, QueryError> {
        let schema = self.resolve_table(&delete.table)?;
        let pk = &schema.primary_key().name;
        let targets = self.matching_rows(&schema, Some(delete.filter))?;
        let mut count = 0;
        for row in targets {
            let Some(id) = row.get(pk) else { continue };
            self.store.delete(schema.name(), id)?;
            count += 1;
        }
        Ok(QueryResult::command(format!("DELETE {count}")))
    }
}

fn scalar(expr: ScalarExpr, session: &SessionInfo) -> QueryResult {
    match expr {
        ScalarExpr::Version => QueryResult::single(
            "version",
            type_oid::TEXT,
            Some(format!("PostgreSQL {SERVER_VERSION} (mirage)")),
        ),
        ScalarExpr::CurrentDatabase => {
            QueryResult::single("current_database", type_oid::TEXT, Some(session.database.clone()))
        }
        ScalarExpr::CurrentUser => {
            QueryResult::single("current_user", type_oid::TEXT, Some(session.user.clone()))
        }
        ScalarExpr::CurrentSchema => {
            QueryResult::single("current_schema", type_oid::TEXT, Some("public".to_string()))
        }
        ScalarExpr::Echo(text) => {
            let value = match parse_literal(&text) {
                Ok(value) => value.to_text(),
                Err(_) => Some(text),
            };
            QueryResult::single("?column?", type_oid::TEXT, value)
        }
    }
}

fn show(name: &str) -> QueryResult {
    let value = match name {
        "server_version" => SERVER_VERSION,
        "server_encoding" | "client_encoding" => "UTF8",
        "transaction isolation level"
        | "transaction_isolation"
        | "default_transaction_isolation" => {
            "read committed"
        }
        "datestyle" => "ISO, MDY",
        "timezone" => "UTC",
        "search_path" => "\"$user\", public",
        "max_identifier_length" => "63",
        "standard_conforming_strings" | "integer_datetimes" => "on",
        _ => "on",
    };
    let column = name.replace(' ', "_");
    QueryResult::single(&column, type_oid::TEXT, Some(value.to_string()))
}
