//! Query interpretation over the record store.
//!
//! ```text
//! query text --> NormalizedQuery --> [CustomPattern..., BuiltinRecognizer]
//!                                              |
//!                                          Statement --> Interpreter --> Store
//!                                                             |
//!                                                        QueryResult
//! ```

mod error;
mod exec;
pub mod inflect;
pub mod literal;
mod normalize;
pub mod pattern;
pub mod recognize;

pub use error::QueryError;
pub use exec::{ColumnDescriptor, Interpreter, QueryResult, SERVER_VERSION, SessionInfo};
pub use inflect::{EnglishInflector, Inflector};
pub use normalize::NormalizedQuery;
pub use pattern::CustomPattern;
pub use recognize::{BuiltinRecognizer, Recognizer, Statement};
