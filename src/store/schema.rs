//! Table schema definitions.

use std::sync::Arc;

use super::index::{FieldIndexer, NormalizedIndexer};
use super::{StoreError, Value};

/// Logical type of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FieldType {
    String,
    Int,
    Bool,
    Float,
    /// Values are stored as given.
    #[default]
    Any,
}

impl FieldType {
    /// Maps a configured column type name onto a logical field type.
    ///
    /// Names such as `uuid`, `email` or `timestamp` are all strings to the
    /// store; they only differ in the type OID reported to clients.
    pub fn from_type_name(name: &str) -> Self {
        match name.to_ascii_lowercase().as_str() {
            "int" | "integer" | "int4" | "int8" | "bigint" | "smallint" | "serial" => {
                FieldType::Int
            }
            "bool" | "boolean" => FieldType::Bool,
            "float" | "float8" | "double" | "real" | "numeric" | "decimal" => FieldType::Float,
            "any" => FieldType::Any,
            _ => FieldType::String,
        }
    }

    /// Converts a parsed literal into this type when the conversion is lossless
    /// enough to be unsurprising; otherwise the value is kept as-is.
    pub fn coerce(self, value: Value) -> Value {
        match (self, value) {
            (_, Value::Null) => Value::Null,
            (FieldType::String, Value::String(s)) => Value::String(s),
            (FieldType::String, other) => Value::String(other.normalized()),
            (FieldType::Int, Value::String(s)) => match s.parse::<i64>() {
                Ok(i) => Value::Int(i),
                Err(_) => Value::String(s),
            },
            (FieldType::Float, Value::String(s)) => match s.parse::<f64>() {
                Ok(f) => Value::Float(f),
                Err(_) => Value::String(s),
            },
            (FieldType::Float, Value::Int(i)) => Value::Float(i as f64),
            (FieldType::Bool, Value::String(s)) => match s.to_ascii_lowercase().as_str() {
                "t" | "true" | "1" | "yes" | "on" => Value::Bool(true),
                "f" | "false" | "0" | "no" | "off" => Value::Bool(false),
                _ => Value::String(s),
            },
            (_, other) => other,
        }
    }
}

/// A single field definition.
#[derive(Debug, Clone)]
pub struct Field {
    pub name: String,
    pub ty: FieldType,
    pub primary_key: bool,
    pub indexed: bool,
    indexer: Arc<dyn FieldIndexer>,
}

impl Field {
    pub fn new(name: impl Into<String>, ty: FieldType) -> Self {
        Self {
            name: name.into(),
            ty,
            primary_key: false,
            indexed: false,
            indexer: Arc::new(NormalizedIndexer),
        }
    }

    /// Marks this field as the table's primary key.
    pub fn primary_key(mut self) -> Self {
        self.primary_key = true;
        self
    }

    /// Maintains a secondary index on this field.
    pub fn indexed(mut self) -> Self {
        self.indexed = true;
        self
    }

    /// Indexes this field with a custom key strategy.
    pub fn with_indexer(mut self, indexer: Arc<dyn FieldIndexer>) -> Self {
        self.indexed = true;
        self.indexer = indexer;
        self
    }

    /// Returns the key strategy used for this field's index.
    pub fn indexer(&self) -> &dyn FieldIndexer {
        self.indexer.as_ref()
    }
}

/// A table name plus its ordered field definitions.
#[derive(Debug, Clone)]
pub struct Schema {
    name: String,
    fields: Vec<Field>,
    primary_key: usize,
}

impl Schema {
    /// Creates a schema. Exactly one field must be the primary key.
    pub fn new(name: impl Into<String>, fields: Vec<Field>) -> Result<Self, StoreError> {
        let name = name.into();
        let mut keys = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.primary_key)
            .map(|(i, _)| i);

        let primary_key = match (keys.next(), keys.next()) {
            (Some(i), None) => i,
            (None, _) => return Err(StoreError::NoPrimaryKey { table: name }),
            (Some(_), Some(_)) => return Err(StoreError::MultiplePrimaryKeys { table: name }),
        };

        Ok(Self {
            name,
            fields,
            primary_key,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn primary_key(&self) -> &Field {
        &self.fields[self.primary_key]
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Looks up a field ignoring ASCII case, as unquoted SQL identifiers do.
    pub fn field_ignore_case(&self, name: &str) -> Option<&Field> {
        self.field(name)
            .or_else(|| self.fields.iter().find(|f| f.name.eq_ignore_ascii_case(name)))
    }
}
