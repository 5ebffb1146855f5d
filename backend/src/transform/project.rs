//! Column projection.

use std::collections::HashSet;

use crate::error::{TableError, TableResult};
use crate::models::Table;

/// Keep only `selected` columns, in the order given.
///
/// Every name must exist in `table`; the row count is unchanged. Selecting
/// all columns in their original order returns an identical table.
pub fn project<S: AsRef<str>>(table: &Table, selected: &[S]) -> TableResult<Table> {
    let mut seen = HashSet::with_capacity(selected.len());
    let mut columns = Vec::with_capacity(selected.len());

    for name in selected {
        let name = name.as_ref();
        if !seen.insert(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        let column = table
            .column(name)
            .ok_or_else(|| TableError::ColumnNotFound(name.to_string()))?;
        columns.push(column.clone());
    }

    Table::with_row_count(columns, table.row_count())
}

/// Check that every name in `selected` exists, without building a table.
pub fn validate_selection<S: AsRef<str>>(table: &Table, selected: &[S]) -> TableResult<()> {
    let mut seen = HashSet::with_capacity(selected.len());
    for name in selected {
        let name = name.as_ref();
        if !seen.insert(name) {
            return Err(TableError::DuplicateColumn(name.to_string()));
        }
        if table.column(name).is_none() {
            return Err(TableError::ColumnNotFound(name.to_string()));
        }
    }
    Ok(())
}
