//! Row storage and index maintenance for a single table.

use std::collections::{BTreeSet, HashMap};

use super::{Row, Schema, StoreError, Value};

/// Deleted slots are compacted once they outnumber live rows past this size.
const COMPACT_THRESHOLD: usize = 64;

/// Rows of one table plus their primary-key and secondary indexes.
///
/// Rows live in insertion-ordered slots; deleting leaves a hole until the
/// next compaction so that slot ids inside the indexes stay valid.
///
/// NOTE: No internal synchronization. The store wraps each table in its own
/// lock and takes it exclusively for every mutation.
#[derive(Debug)]
pub(crate) struct Table {
    schema: Schema,
    slots: Vec<Option<Row>>,
    live: usize,
    /// primary key -> slot
    by_key: HashMap<String, usize>,
    /// field -> index key -> slots (ordered, so lookups keep insertion order)
    indexes: HashMap<String, HashMap<String, BTreeSet<usize>>>,
}

impl Table {
    pub fn new(schema: Schema) -> Self {
        let indexes = schema
            .fields()
            .iter()
            .filter(|f| f.indexed && !f.primary_key)
            .map(|f| (f.name.clone(), HashMap::new()))
            .collect();

        Self {
            schema,
            slots: Vec::new(),
            live: 0,
            by_key: HashMap::new(),
            indexes,
        }
    }

    /// Builds a fresh table with the same schema and rows, re-deriving every index.
    pub fn rebuilt(&self) -> Self {
        let mut table = Table::new(self.schema.clone());
        for row in self.rows() {
            // Every stored row already passed primary-key validation.
            let _ = table.insert(row.clone());
        }
        table
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn len(&self) -> usize {
        self.live
    }

    /// Derives the primary-key lookup key for an id value.
    pub fn key_of(&self, id: &Value) -> Option<String> {
        self.schema.primary_key().indexer().key(id)
    }

    /// Inserts a row, replacing any existing row with the same primary key.
    pub fn insert(&mut self, row: Row) -> Result<(), StoreError> {
        let key = self.row_key(&row)?;

        if let Some(&slot) = self.by_key.get(&key) {
            self.replace(slot, row);
            return Ok(());
        }

        let slot = self.slots.len();
        self.index(slot, &row);
        self.slots.push(Some(row));
        self.by_key.insert(key, slot);
        self.live += 1;
        Ok(())
    }

    /// Inserts every row or none of them.
    pub fn insert_all(&mut self, rows: Vec<Row>) -> Result<(), StoreError> {
        for row in &rows {
            self.row_key(row)?;
        }
        for row in rows {
            self.insert(row)?;
        }
        Ok(())
    }

    fn row_key(&self, row: &Row) -> Result<String, StoreError> {
        let pk = self.schema.primary_key();
        row.get(&pk.name)
            .and_then(|v| pk.indexer().key(v))
            .ok_or_else(|| StoreError::MissingPrimaryKey {
                table: self.schema.name().to_string(),
                field: pk.name.clone(),
            })
    }

    pub fn get(&self, id: &Value) -> Option<&Row> {
        let key = self.key_of(id)?;
        let slot = *self.by_key.get(&key)?;
        self.slots[slot].as_ref()
    }

    /// Iterates live rows in insertion order.
    pub fn rows(&self) -> impl Iterator<Item = &Row> {
        self.slots.iter().filter_map(Option::as_ref)
    }

    /// Returns rows whose `field` equals `value`.
    ///
    /// Uses the primary-key map or the field's index when one exists, otherwise
    /// scans and compares normalized strings.
    pub fn where_eq(&self, field: &str, value: &Value) -> Vec<Row> {
        if self.schema.primary_key().name == field {
            return self.get(value).cloned().into_iter().collect();
        }

        if let Some(index) = self.indexes.get(field) {
            let Some(key) = self.schema.field(field).and_then(|f| f.indexer().key(value)) else {
                return Vec::new();
            };
            return index
                .get(&key)
                .into_iter()
                .flatten()
                .filter_map(|&slot| self.slots[slot].clone())
                .collect();
        }

        let wanted = value.normalized();
        self.rows()
            .filter(|row| row.get(field).is_some_and(|v| v.normalized() == wanted))
            .cloned()
            .collect()
    }

    /// Merges `changes` into the row identified by `id`.
    ///
    /// The primary-key field is forced back to `id` regardless of `changes`.
    pub fn update(&mut self, id: &Value, changes: Row) -> Result<(), StoreError> {
        let slot = self.slot_of(id)?;
        let pk_name = self.schema.primary_key().name.clone();

        let mut merged = self.slots[slot].clone().unwrap_or_default();
        merged.extend(changes);
        if let Some(stored_id) = self.slots[slot].as_ref().and_then(|r| r.get(&pk_name)) {
            merged.insert(pk_name, stored_id.clone());
        }

        self.replace(slot, merged);
        Ok(())
    }

    pub fn delete(&mut self, id: &Value) -> Result<(), StoreError> {
        let slot = self.slot_of(id)?;
        if let Some(row) = self.slots[slot].take() {
            self.unindex(slot, &row);
        }
        if let Some(key) = self.key_of(id) {
            self.by_key.remove(&key);
        }
        self.live -= 1;

        if self.slots.len() > COMPACT_THRESHOLD && self.live * 2 < self.slots.len() {
            *self = self.rebuilt();
        }
        Ok(())
    }

    fn slot_of(&self, id: &Value) -> Result<usize, StoreError> {
        self.key_of(id)
            .and_then(|key| self.by_key.get(&key).copied())
            .ok_or_else(|| StoreError::RowNotFound {
                table: self.schema.name().to_string(),
                id: id.normalized(),
            })
    }

    fn replace(&mut self, slot: usize, row: Row) {
        if let Some(old) = self.slots[slot].take() {
            self.unindex(slot, &old);
        }
        self.index(slot, &row);
        self.slots[slot] = Some(row);
    }

    fn index(&mut self, slot: usize, row: &Row) {
        for field in self.schema.fields() {
            let Some(index) = self.indexes.get_mut(&field.name) else {
                continue;
            };
            if let Some(key) = row.get(&field.name).and_then(|v| field.indexer().key(v)) {
                index.entry(key).or_default().insert(slot);
            }
        }
    }

    fn unindex(&mut self, slot: usize, row: &Row) {
        for field in self.schema.fields() {
            let Some(index) = self.indexes.get_mut(&field.name) else {
                continue;
            };
            let Some(key) = row.get(&field.name).and_then(|v| field.indexer().key(v)) else {
                continue;
            };
            if let Some(slots) = index.get_mut(&key) {
                slots.remove(&slot);
                if slots.is_empty() {
                    index.remove(&key);
                }
            }
        }
    }
}
