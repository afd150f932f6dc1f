use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use num_bigint::BigUint;

use crate::{Alphabet, Checkpoint, CoreError, HashStore, Record, TableName};

struct MemoryTable {
    charset: String,
    algorithm: String,
    next_index: BigUint,
    records: Vec<Record>,
    texts: HashSet<String>,
}

/// Simple in-memory store for tests and dry runs. Every record is kept, so it
/// is only suitable for small ranges.
pub struct InMemoryStore {
    tables: Mutex<BTreeMap<String, MemoryTable>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            tables: Mutex::new(BTreeMap::new()),
        }
    }

    /// Records of `table` in insertion order.
    pub fn records(&self, table: &TableName) -> Result<Vec<Record>, CoreError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| CoreError::Store("mutex poisoned".into()))?;
        Ok(tables
            .get(table.as_str())
            .map(|t| t.records.clone())
            .unwrap_or_default())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn missing(table: &TableName) -> CoreError {
    CoreError::Store(format!("no such table: {}", table.as_str()))
}

impl HashStore for InMemoryStore {
    fn table_exists(&self, table: &TableName) -> Result<bool, CoreError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| CoreError::Store("mutex poisoned".into()))?;
        Ok(tables.contains_key(table.as_str()))
    }

    fn ensure_schema(
        &self,
        table: &TableName,
        alphabet: &Alphabet,
        algorithm: &str,
    ) -> Result<(), CoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| CoreError::Store("mutex poisoned".into()))?;
        tables.insert(
            table.as_str().to_string(),
            MemoryTable {
                charset: alphabet.as_string(),
                algorithm: algorithm.to_string(),
                next_index: BigUint::default(),
                records: Vec::new(),
                texts: HashSet::new(),
            },
        );
        Ok(())
    }

    fn last_checkpoint(&self, table: &TableName) -> Result<Checkpoint, CoreError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| CoreError::Store("mutex poisoned".into()))?;
        let Some(t) = tables.get(table.as_str()) else {
            return Ok(Checkpoint::default());
        };
        // Rows are appended in ascending index order; the last one bounds the
        // checkpoint from below even if the stored value lags.
        let after_last = t
            .records
            .last()
            .map(|r| &r.index + 1u32)
            .unwrap_or_default();
        Ok(Checkpoint {
            next_index: after_last.max(t.next_index.clone()),
            charset: Some(t.charset.clone()),
            algorithm: Some(t.algorithm.clone()),
        })
    }

    fn append(&self, table: &TableName, record: &Record) -> Result<(), CoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| CoreError::Store("mutex poisoned".into()))?;
        let t = tables.get_mut(table.as_str()).ok_or_else(|| missing(table))?;
        if !t.texts.insert(record.text.clone()) {
            return Err(CoreError::AlreadyExists);
        }
        t.records.push(record.clone());
        Ok(())
    }

    fn update_checkpoint(&self, table: &TableName, next_index: &BigUint) -> Result<(), CoreError> {
        let mut tables = self
            .tables
            .lock()
            .map_err(|_| CoreError::Store("mutex poisoned".into()))?;
        let t = tables.get_mut(table.as_str()).ok_or_else(|| missing(table))?;
        t.next_index = next_index.clone();
        Ok(())
    }

    fn count(&self, table: &TableName) -> Result<u64, CoreError> {
        let tables = self
            .tables
            .lock()
            .map_err(|_| CoreError::Store("mutex poisoned".into()))?;
        Ok(tables
            .get(table.as_str())
            .map(|t| t.records.len() as u64)
            .unwrap_or(0))
    }
}
