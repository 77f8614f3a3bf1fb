//! Reference-data handle: named lookup tables and scalar parameters
//!
//! The engine never reads reference data itself; formulas receive an opaque
//! [`RefData`] handle and go through the [`RefTable`] lookup contract. Two
//! handles are distinguishable only by identity (a monotonically assigned
//! id), never by content, so large tables are never hashed into cache keys.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use thiserror::Error;

/// Errors raised by reference-data lookups
#[derive(Debug, Clone, Error)]
pub enum LookupError {
    #[error("no table named `{0}` in the reference data")]
    UnknownTable(String),

    #[error("no value named `{0}` in the reference data")]
    UnknownValue(String),

    #[error("not all index columns specified: {0}")]
    MissingIndexColumns(String),

    #[error("no column named `{0}` in the table")]
    UnknownColumn(String),

    #[error("no row for index ({0})")]
    NoRow(String),
}

/// Lookup contract for an indexed reference table
///
/// `lookup` validates that every index column is supplied and then delegates
/// to `retrieve`; implementations only provide the raw retrieval.
pub trait RefTable: fmt::Debug + Send + Sync {
    /// Names of the index columns, in index order
    fn index_cols(&self) -> &[String];

    /// Fetch the value at the given index coordinates. Called with a fully
    /// specified index.
    fn retrieve(&self, index_values: &[(&str, i64)], return_col: &str) -> Result<f64, LookupError>;

    /// Validated lookup: every index column must be present in `index_values`
    fn lookup(&self, index_values: &[(&str, i64)], return_col: &str) -> Result<f64, LookupError> {
        let missing: Vec<&str> = self
            .index_cols()
            .iter()
            .filter(|col| !index_values.iter().any(|(name, _)| name == &col.as_str()))
            .map(|col| col.as_str())
            .collect();
        if !missing.is_empty() {
            return Err(LookupError::MissingIndexColumns(missing.join(", ")));
        }
        self.retrieve(index_values, return_col)
    }
}

/// In-memory reference table with integer index columns and named value
/// columns. Loading from files is the caller's concern; this type only holds
/// rows already in memory.
#[derive(Debug, Clone)]
pub struct MemoryTable {
    index_cols: Vec<String>,
    value_cols: Vec<String>,
    rows: HashMap<Vec<i64>, Vec<f64>>,
}

impl MemoryTable {
    pub fn new(
        index_cols: impl IntoIterator<Item = impl Into<String>>,
        value_cols: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        MemoryTable {
            index_cols: index_cols.into_iter().map(Into::into).collect(),
            value_cols: value_cols.into_iter().map(Into::into).collect(),
            rows: HashMap::new(),
        }
    }

    /// Add one row. `index` and `values` follow the column orders given at
    /// construction.
    pub fn push_row(
        mut self,
        index: impl IntoIterator<Item = i64>,
        values: impl IntoIterator<Item = f64>,
    ) -> Self {
        let index: Vec<i64> = index.into_iter().collect();
        let values: Vec<f64> = values.into_iter().collect();
        assert_eq!(index.len(), self.index_cols.len(), "index arity mismatch");
        assert_eq!(values.len(), self.value_cols.len(), "value arity mismatch");
        self.rows.insert(index, values);
        self
    }

    pub fn num_rows(&self) -> usize {
        self.rows.len()
    }
}

impl RefTable for MemoryTable {
    fn index_cols(&self) -> &[String] {
        &self.index_cols
    }

    fn retrieve(&self, index_values: &[(&str, i64)], return_col: &str) -> Result<f64, LookupError> {
        let col = self
            .value_cols
            .iter()
            .position(|c| c == return_col)
            .ok_or_else(|| LookupError::UnknownColumn(return_col.to_owned()))?;

        // Reorder the supplied values into index-column order; lookup() has
        // already checked that every index column is present.
        let key: Vec<i64> = self
            .index_cols
            .iter()
            .map(|col| {
                index_values
                    .iter()
                    .find(|(name, _)| name == &col.as_str())
                    .map(|(_, value)| *value)
                    .unwrap_or_default()
            })
            .collect();

        let row = self.rows.get(&key).ok_or_else(|| {
            let shown: Vec<String> = self
                .index_cols
                .iter()
                .zip(&key)
                .map(|(col, value)| format!("{col}={value}"))
                .collect();
            LookupError::NoRow(shown.join(", "))
        })?;

        Ok(row[col])
    }
}

static NEXT_HANDLE_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque read-only bundle of lookup tables and scalar parameters
///
/// Passed by reference into formulas. Identity (not content) participates in
/// memoization cache keys, so results computed against one handle are never
/// served for another even if their contents happen to match.
#[derive(Debug)]
pub struct RefData {
    id: u64,
    tables: HashMap<String, Box<dyn RefTable>>,
    values: HashMap<String, f64>,
}

impl RefData {
    pub fn builder() -> RefDataBuilder {
        RefDataBuilder {
            tables: HashMap::new(),
            values: HashMap::new(),
        }
    }

    /// Identity of this handle, assigned at build time
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn table(&self, name: &str) -> Result<&dyn RefTable, LookupError> {
        self.tables
            .get(name)
            .map(|t| t.as_ref())
            .ok_or_else(|| LookupError::UnknownTable(name.to_owned()))
    }

    pub fn value(&self, name: &str) -> Result<f64, LookupError> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| LookupError::UnknownValue(name.to_owned()))
    }
}

impl PartialEq for RefData {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RefData {}

impl std::hash::Hash for RefData {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

/// Builder for [`RefData`]
pub struct RefDataBuilder {
    tables: HashMap<String, Box<dyn RefTable>>,
    values: HashMap<String, f64>,
}

impl RefDataBuilder {
    pub fn table(mut self, name: impl Into<String>, table: impl RefTable + 'static) -> Self {
        self.tables.insert(name.into(), Box::new(table));
        self
    }

    pub fn value(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    pub fn build(self) -> RefData {
        RefData {
            id: NEXT_HANDLE_ID.fetch_add(1, Ordering::Relaxed),
            tables: self.tables,
            values: self.values,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mort_table() -> MemoryTable {
        MemoryTable::new(["age"], ["q_x"])
            .push_row([65], [0.012])
            .push_row([66], [0.013])
    }

    #[test]
    fn test_lookup_by_index() {
        let table = mort_table();
        let rate = table.lookup(&[("age", 65)], "q_x").unwrap();
        assert_eq!(rate, 0.012);
    }

    #[test]
    fn test_lookup_missing_index_column() {
        let table = MemoryTable::new(["age", "duration"], ["q_x"]).push_row([65, 1], [0.012]);
        let err = table.lookup(&[("age", 65)], "q_x").unwrap_err();
        assert!(matches!(err, LookupError::MissingIndexColumns(cols) if cols == "duration"));
    }

    #[test]
    fn test_lookup_unknown_column_and_row() {
        let table = mort_table();
        assert!(matches!(
            table.lookup(&[("age", 65)], "lapse"),
            Err(LookupError::UnknownColumn(_))
        ));
        assert!(matches!(
            table.lookup(&[("age", 99)], "q_x"),
            Err(LookupError::NoRow(_))
        ));
    }

    #[test]
    fn test_handles_are_identity_keyed() {
        let a = RefData::builder().value("init_age", 65.0).build();
        let b = RefData::builder().value("init_age", 65.0).build();

        // Same contents, distinct handles
        assert_ne!(a.id(), b.id());
        assert!(a != b);
        assert_eq!(a, a);
    }

    #[test]
    fn test_missing_table_and_value() {
        let data = RefData::builder().build();
        assert!(matches!(data.table("mort"), Err(LookupError::UnknownTable(_))));
        assert!(matches!(data.value("rate"), Err(LookupError::UnknownValue(_))));
    }
}
