use thiserror::Error;

use crate::protocol::sql_state;
use crate::store::StoreError;

/// Errors from recognizing or executing a query.
///
/// None of these are fatal to the connection: the client gets an
/// ErrorResponse and may keep issuing queries.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("relation \"{0}\" does not exist")]
    UnknownTable(String),

    #[error("column \"{column}\" of relation \"{table}\" does not exist")]
    UnknownColumn { table: String, column: String },

    #[error("malformed query: {0}")]
    Malformed(String),

    #[error("unsupported query: {0}")]
    Unsupported(String),

    #[error("{0} requires a WHERE clause")]
    MissingWhere(&'static str),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl QueryError {
    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        QueryError::Malformed(msg.into())
    }

    /// SQLSTATE reported for this error. Every query failure is reported as a
    /// syntax error.
    pub fn sql_state(&self) -> &'static str {
        sql_state::SYNTAX_ERROR
    }
}
