//! Schema-driven, indexed in-memory record store.
//!
//! ## Architecture
//!
//! ```text
//! +------------------------------------------+
//! |                  Store                   |
//! |  RwLock<HashMap<name, Arc<RwLock<Table>>>> |
//! +------------------------------------------+
//!        |  shared: row CRUD      ^ exclusive: create_table
//!        v                        | (rebuilds every table)
//! +-------------+   +-------------+
//! | Table       |   | Table       |   <- per-table RwLock serializes writers
//! |  slots      |   |  slots      |
//! |  by_key     |   |  by_key     |
//! |  indexes    |   |  indexes    |
//! +-------------+   +-------------+
//! ```
//!
//! ## Locking
//!
//! The outer lock guards the set of tables and their schemas. Creating a
//! table takes it exclusively and rebuilds the whole structure, which is only
//! expected at service start. Row operations hold the outer lock shared and
//! take the table's own lock, exclusively for mutations, so concurrent
//! writers to the same table never race.

mod error;
mod index;
mod schema;
mod table;
mod value;

pub use error::StoreError;
pub use index::{CaseInsensitiveIndexer, FieldIndexer, NormalizedIndexer};
pub use schema::{Field, FieldType, Schema};
pub use value::{Row, Value, row};

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;

use table::Table;

/// Thread-safe collection of named tables.
#[derive(Debug, Default)]
pub struct Store {
    tables: RwLock<HashMap<String, Arc<RwLock<Table>>>>,
}

impl Store {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new table.
    ///
    /// Rebuilds every table's indexes under the exclusive lock, preserving
    /// rows inserted so far.
    pub fn create_table(&self, schema: Schema) -> Result<(), StoreError> {
        let mut tables = self.tables.write();
        if tables.contains_key(schema.name()) {
            return Err(StoreError::TableExists {
                name: schema.name().to_string(),
            });
        }

        let mut rebuilt: HashMap<String, Arc<RwLock<Table>>> = tables
            .iter()
            .map(|(name, table)| (name.clone(), Arc::new(RwLock::new(table.read().rebuilt()))))
            .collect();
        rebuilt.insert(
            schema.name().to_string(),
            Arc::new(RwLock::new(Table::new(schema))),
        );

        *tables = rebuilt;
        Ok(())
    }

    pub fn contains(&self, table: &str) -> bool {
        self.tables.read().contains_key(table)
    }

    /// Returns the registered table names, sorted.
    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.read().keys().cloned().collect();
        names.sort();
        names
    }

    pub fn schema(&self, table: &str) -> Result<Schema, StoreError> {
        self.with_table(table, |t| t.read().schema().clone())
    }

    /// Returns the number of rows in a table.
    pub fn len(&self, table: &str) -> Result<usize, StoreError> {
        self.with_table(table, |t| t.read().len())
    }

    /// Inserts a row. The primary-key field must be present.
    pub fn insert(&self, table: &str, row: Row) -> Result<(), StoreError> {
        self.with_table(table, |t| t.write().insert(row))?
    }

    /// Inserts a batch under one write lock. When any row lacks a primary
    /// key nothing is stored.
    pub fn insert_all(&self, table: &str, rows: Vec<Row>) -> Result<(), StoreError> {
        self.with_table(table, |t| t.write().insert_all(rows))?
    }

    pub fn get(&self, table: &str, id: &Value) -> Result<Row, StoreError> {
        self.with_table(table, |t| {
            t.read()
                .get(id)
                .cloned()
                .ok_or_else(|| StoreError::RowNotFound {
                    table: table.to_string(),
                    id: id.normalized(),
                })
        })?
    }

    /// Returns all rows in insertion order.
    pub fn list(&self, table: &str) -> Result<Vec<Row>, StoreError> {
        self.with_table(table, |t| t.read().rows().cloned().collect())
    }

    /// Returns rows whose `field` equals `value`, compared on normalized strings.
    pub fn where_eq(
        &self,
        table: &str,
        field: &str,
        value: &Value,
    ) -> Result<Vec<Row>, StoreError> {
        self.with_table(table, |t| t.read().where_eq(field, value))
    }

    /// Merges `row` into the stored row `id`; the primary key keeps its value.
    pub fn update(&self, table: &str, id: &Value, row: Row) -> Result<(), StoreError> {
        self.with_table(table, |t| t.write().update(id, row))?
    }

    pub fn delete(&self, table: &str, id: &Value) -> Result<(), StoreError> {
        self.with_table(table, |t| t.write().delete(id))?
    }

    fn with_table<T>(
        &self,
        name: &str,
        f: impl FnOnce(&RwLock<Table>) -> T,
    ) -> Result<T, StoreError> {
        let tables = self.tables.read();
        let table = tables.get(name).ok_or_else(|| StoreError::TableNotFound {
            name: name.to_string(),
        })?;
        Ok(f(table))
    }
}
