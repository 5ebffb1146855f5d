//! In-memory table: named, typed columns of uniform length.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::error::{TableError, TableResult};

// =============================================================================
// Cells
// =============================================================================

/// A single typed cell.
///
/// Serializes untagged: numbers as JSON numbers, text as strings and
/// missing cells as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Missing,
}

impl CellValue {
    pub fn is_missing(&self) -> bool {
        matches!(self, CellValue::Missing)
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            CellValue::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Hashable identity of the cell, used for row comparison.
    pub(crate) fn key(&self) -> CellKey<'_> {
        match self {
            // -0.0 + 0.0 == +0.0, so both zeros share a key
            CellValue::Number(n) => CellKey::Number((n + 0.0).to_bits()),
            CellValue::Text(s) => CellKey::Text(s),
            CellValue::Missing => CellKey::Missing,
        }
    }
}

impl fmt::Display for CellValue {
    /// Integral numbers print without a fractional part; missing prints empty.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    write!(f, "{}", *n as i64)
                } else {
                    write!(f, "{}", n)
                }
            }
            CellValue::Text(s) => f.write_str(s),
            CellValue::Missing => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) enum CellKey<'a> {
    Number(u64),
    Text(&'a str),
    Missing,
}

// =============================================================================
// Columns
// =============================================================================

/// Declared type of a column, fixed by type detection at parse time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    Numeric,
    Text,
}

/// A named, typed column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
    pub values: Vec<CellValue>,
}

impl Column {
    pub fn new(name: impl Into<String>, kind: ColumnKind, values: Vec<CellValue>) -> Self {
        Self {
            name: name.into(),
            kind,
            values,
        }
    }

    /// Build a column from raw cells and detect its kind.
    ///
    /// The column is numeric when every non-missing cell is a number (an
    /// all-missing column counts as numeric). Otherwise numbers are turned
    /// back into text so the column holds a single type.
    pub fn detect(name: impl Into<String>, values: Vec<CellValue>) -> Self {
        let numeric = values
            .iter()
            .all(|v| matches!(v, CellValue::Number(_) | CellValue::Missing));

        if numeric {
            return Self::new(name, ColumnKind::Numeric, values);
        }

        let values = values
            .into_iter()
            .map(|v| match v {
                CellValue::Number(_) => CellValue::Text(v.to_string()),
                other => other,
            })
            .collect();
        Self::new(name, ColumnKind::Text, values)
    }

    pub fn is_numeric(&self) -> bool {
        self.kind == ColumnKind::Numeric
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn missing_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_missing()).count()
    }
}

// =============================================================================
// Table
// =============================================================================

/// Ordered sequence of uniquely named columns with a uniform row count.
///
/// The row count is stored so that a table keeps its rows even when a
/// projection leaves it without columns.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    columns: Vec<Column>,
    row_count: usize,
}

impl Table {
    /// Build a table, checking name uniqueness and uniform length.
    pub fn new(columns: Vec<Column>) -> TableResult<Self> {
        let rows = columns.first().map(Column::len).unwrap_or(0);
        Self::with_row_count(columns, rows)
    }

    /// Build a table with an explicit row count that every column must match.
    pub fn with_row_count(columns: Vec<Column>, rows: usize) -> TableResult<Self> {
        let mut seen = HashSet::new();
        let expected = rows;

        for column in &columns {
            if !seen.insert(column.name.as_str()) {
                return Err(TableError::DuplicateColumn(column.name.clone()));
            }
            if column.len() != expected {
                return Err(TableError::LengthMismatch {
                    column: column.name.clone(),
                    expected,
                    found: column.len(),
                });
            }
        }

        Ok(Self {
            columns,
            row_count: rows,
        })
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub(crate) fn columns_mut(&mut self) -> &mut [Column] {
        &mut self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }

    pub fn is_empty(&self) -> bool {
        self.row_count() == 0
    }

    /// Iterate over rows, each as a vector of cell references.
    pub fn rows(&self) -> impl Iterator<Item = Vec<&CellValue>> + '_ {
        (0..self.row_count()).map(move |i| self.columns.iter().map(|c| &c.values[i]).collect())
    }

    /// First `n` rows as a new table (the preview shown after upload).
    pub fn head(&self, n: usize) -> Table {
        let n = n.min(self.row_count());
        let columns = self
            .columns
            .iter()
            .map(|c| Column::new(c.name.clone(), c.kind, c.values[..n].to_vec()))
            .collect();
        Table {
            columns,
            row_count: n,
        }
    }

    /// Keep only the rows whose index is flagged in `keep`.
    pub(crate) fn retain_rows(&mut self, keep: &[bool]) {
        for column in &mut self.columns {
            let mut flags = keep.iter();
            column.values.retain(|_| flags.next().copied().unwrap_or(false));
        }
        self.row_count = keep.iter().take(self.row_count).filter(|k| **k).count();
    }

    /// Numeric columns in column order.
    pub fn numeric_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.is_numeric())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Table {
        Table::new(vec![
            Column::detect(
                "name",
                vec![CellValue::Text("A".into()), CellValue::Text("B".into())],
            ),
            Column::detect("age", vec![CellValue::Number(30.0), CellValue::Missing]),
        ])
        .unwrap()
    }

    #[test]
    fn test_detect_numeric_column() {
        let table = sample();
        assert_eq!(table.column("age").unwrap().kind, ColumnKind::Numeric);
        assert_eq!(table.column("name").unwrap().kind, ColumnKind::Text);
    }

    #[test]
    fn test_detect_mixed_column_becomes_text() {
        let col = Column::detect(
            "code",
            vec![CellValue::Number(12.0), CellValue::Text("X1".into())],
        );
        assert_eq!(col.kind, ColumnKind::Text);
        assert_eq!(col.values[0], CellValue::Text("12".into()));
    }

    #[test]
    fn test_all_missing_column_is_numeric() {
        let col = Column::detect("empty", vec![CellValue::Missing, CellValue::Missing]);
        assert!(col.is_numeric());
    }

    #[test]
    fn test_duplicate_column_rejected() {
        let result = Table::new(vec![
            Column::detect("a", vec![CellValue::Missing]),
            Column::detect("a", vec![CellValue::Missing]),
        ]);
        assert_eq!(result, Err(TableError::DuplicateColumn("a".into())));
    }

    #[test]
    fn test_length_mismatch_rejected() {
        let result = Table::new(vec![
            Column::detect("a", vec![CellValue::Missing]),
            Column::detect("b", vec![]),
        ]);
        assert!(matches!(result, Err(TableError::LengthMismatch { .. })));
    }

    #[test]
    fn test_rows_and_head() {
        let table = sample();
        assert_eq!(table.row_count(), 2);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows[1][0], &CellValue::Text("B".into()));
        assert_eq!(table.head(1).row_count(), 1);
        assert_eq!(table.head(10).row_count(), 2);
    }

    #[test]
    fn test_number_display() {
        assert_eq!(CellValue::Number(30.0).to_string(), "30");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
        assert_eq!(CellValue::Missing.to_string(), "");
    }

    #[test]
    fn test_cell_json_shape() {
        let json = serde_json::to_value(vec![
            CellValue::Number(1.5),
            CellValue::Text("x".into()),
            CellValue::Missing,
        ])
        .unwrap();
        assert_eq!(json, serde_json::json!([1.5, "x", null]));
    }
}
