//! Seeded synthetic rows for configured tables.

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use uuid::Builder;

use crate::config::{ColumnConfig, TableConfig};
use crate::store::{FieldType, Row, Value};

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Produces the initial rows of a table.
pub trait RowGenerator: Send + Sync {
    fn generate(&self, table: &TableConfig) -> Vec<Row>;
}

/// Deterministic generator: the same table config always yields the same rows.
///
/// Integer primary keys are sequential from `min` (default 1) so they never
/// collide; other key types rely on the generated values being distinct.
/// A `values` list is ignored for the primary key.
#[derive(Debug, Default, Clone, Copy)]
pub struct SeededGenerator;

impl RowGenerator for SeededGenerator {
    fn generate(&self, table: &TableConfig) -> Vec<Row> {
        let mut rng = StdRng::seed_from_u64(table.seed);
        let pk = table.primary_key_index();

        (0..table.row_count)
            .map(|i| {
                table
                    .columns
                    .iter()
                    .enumerate()
                    .map(|(c, column)| {
                        let value = generate_value(column, i, c == pk, &mut rng);
                        (column.name.clone(), value)
                    })
                    .collect()
            })
            .collect()
    }
}

fn generate_value(
    column: &ColumnConfig,
    index: usize,
    primary_key: bool,
    rng: &mut StdRng,
) -> Value {
    let ty = column.ty.to_ascii_lowercase();
    let field_type = FieldType::from_type_name(&ty);

    // a key drawn from a short list would repeat and overwrite earlier rows
    if !primary_key && let Some(choice) = column.values.choose(rng) {
        return field_type.coerce(Value::String(choice.clone()));
    }

    match (field_type, ty.as_str()) {
        (FieldType::Int, _) => {
            let min = column.min.map_or(if primary_key { 1 } else { 0 }, |m| m as i64);
            if primary_key {
                return Value::Int(min + index as i64);
            }
            let max = column.max.map_or(min + 1000, |m| m as i64).max(min);
            Value::Int(rng.random_range(min..=max))
        }
        (FieldType::Float, _) => {
            let min = column.min.unwrap_or(0.0);
            let max = column.max.unwrap_or(min + 1000.0);
            let value = if max > min { rng.random_range(min..max) } else { min };
            Value::Float((value * 100.0).round() / 100.0)
        }
        (FieldType::Bool, _) => Value::Bool(rng.random_bool(0.5)),
        (_, "uuid") => Value::String(random_uuid(rng)),
        (_, "timestamp" | "datetime") => {
            Value::String(random_instant(rng).format(TIMESTAMP_FORMAT).to_string())
        }
        (_, "date") => Value::String(random_instant(rng).format("%Y-%m-%d").to_string()),
        (_, "email") => Value::String(format!("user{}@example.com", index + 1)),
        _ => Value::String(format!("{}-{}", column.name, index + 1)),
    }
}

/// Random version 4 UUID drawn from the table's generator.
fn random_uuid(rng: &mut StdRng) -> String {
    Builder::from_random_bytes(rng.random())
        .into_uuid()
        .hyphenated()
        .to_string()
}

/// Random instant between 2020-01-01 and the end of 2024, whole seconds.
fn random_instant(rng: &mut StdRng) -> DateTime<Utc> {
    const START: i64 = 1_577_836_800; // 2020-01-01T00:00:00Z
    const END: i64 = 1_735_689_600; // 2025-01-01T00:00:00Z

    DateTime::from_timestamp(rng.random_range(START..END), 0).unwrap_or_default()
}
