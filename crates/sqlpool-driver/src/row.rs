//! Tabular query results.
//!
//! Rows share their column metadata through an `Arc<[Column]>`, so a result
//! set with many rows carries the column list once.

use std::sync::Arc;

use crate::value::SqlValue;

/// Column metadata describing a result set column.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct Column {
    /// Column name.
    pub name: String,
    /// Column index (0-based).
    pub index: usize,
    /// Type name as reported by the backing store.
    pub type_name: String,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, index: usize, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            index,
            type_name: type_name.into(),
        }
    }
}

/// A single row of a result set.
#[derive(Debug, Clone)]
pub struct Row {
    columns: Arc<[Column]>,
    values: Vec<SqlValue>,
}

impl Row {
    /// Get a value by column index.
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&SqlValue> {
        self.values.get(index)
    }

    /// Get a value by column name (case-insensitive).
    #[must_use]
    pub fn get_by_name(&self, name: &str) -> Option<&SqlValue> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
            .and_then(|c| self.values.get(c.index))
    }

    /// Column metadata for this row.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// All values in column order.
    #[must_use]
    pub fn values(&self) -> &[SqlValue] {
        &self.values
    }

    /// Number of values in the row.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Check if the row has no values.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Consume the row, returning its values.
    #[must_use]
    pub fn into_values(self) -> Vec<SqlValue> {
        self.values
    }
}

/// A fully materialized result set.
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    columns: Arc<[Column]>,
    rows: Vec<Row>,
}

impl ResultSet {
    /// Build a result set from column metadata and row values.
    ///
    /// Rows are taken as given; a driver is expected to produce one value per
    /// column.
    pub fn new(columns: Vec<Column>, rows: Vec<Vec<SqlValue>>) -> Self {
        let columns: Arc<[Column]> = columns.into();
        let rows = rows
            .into_iter()
            .map(|values| Row {
                columns: Arc::clone(&columns),
                values,
            })
            .collect();
        Self { columns, rows }
    }

    /// An empty result set with no columns.
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Column metadata.
    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// The rows.
    #[must_use]
    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    /// Number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if there are no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// First column of the first row, if any.
    #[must_use]
    pub fn into_scalar(self) -> Option<SqlValue> {
        self.rows
            .into_iter()
            .next()
            .and_then(|row| row.values.into_iter().next())
    }
}

impl IntoIterator for ResultSet {
    type Item = Row;
    type IntoIter = std::vec::IntoIter<Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.into_iter()
    }
}

impl<'a> IntoIterator for &'a ResultSet {
    type Item = &'a Row;
    type IntoIter = std::slice::Iter<'a, Row>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn sample() -> ResultSet {
        ResultSet::new(
            vec![Column::new("id", 0, "INT"), Column::new("Name", 1, "TEXT")],
            vec![
                vec![SqlValue::Int(1), SqlValue::from("alice")],
                vec![SqlValue::Int(2), SqlValue::from("bob")],
            ],
        )
    }

    #[test]
    fn test_row_access_by_index_and_name() {
        let rs = sample();
        assert_eq!(rs.len(), 2);
        let row = &rs.rows()[1];
        assert_eq!(row.get(0), Some(&SqlValue::Int(2)));
        assert_eq!(row.get_by_name("name").and_then(SqlValue::as_str), Some("bob"));
        assert!(row.get_by_name("missing").is_none());
        assert_eq!(row.columns().len(), 2);
    }

    #[test]
    fn test_into_scalar() {
        assert_eq!(sample().into_scalar(), Some(SqlValue::Int(1)));
        assert_eq!(ResultSet::empty().into_scalar(), None);
    }

    #[test]
    fn test_iteration() {
        let ids: Vec<i64> = sample()
            .into_iter()
            .map(|row| row.get(0).and_then(SqlValue::as_i64).unwrap())
            .collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
