//! Record store errors.

use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// A table with this name is already registered.
    #[error("table \"{name}\" already exists")]
    TableExists { name: String },

    #[error("table \"{name}\" does not exist")]
    TableNotFound { name: String },

    /// The schema declares no primary-key field.
    #[error("table \"{table}\" has no primary key field")]
    NoPrimaryKey { table: String },

    #[error("table \"{table}\" declares more than one primary key field")]
    MultiplePrimaryKeys { table: String },

    /// The row lacks a value for the primary-key field.
    #[error("row for \"{table}\" is missing primary key field \"{field}\"")]
    MissingPrimaryKey { table: String, field: String },

    #[error("not found")]
    RowNotFound { table: String, id: String },
}
