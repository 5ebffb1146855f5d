//! Table cleaning: duplicate-row removal and mean imputation.
//!
//! Both operations work in place, keep the column set unchanged, and are
//! idempotent: running either one again (in any order) changes nothing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::models::{CellKey, CellValue, Table};

/// Cleaning steps to apply, each opt-in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningOptions {
    #[serde(default)]
    pub remove_duplicates: bool,
    #[serde(default)]
    pub fill_missing: bool,
}

impl CleaningOptions {
    pub fn is_noop(&self) -> bool {
        !self.remove_duplicates && !self.fill_missing
    }
}

/// A cleaning step that was applied to a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CleaningStep {
    RemoveDuplicates,
    FillMissing,
}

/// What [`apply_cleaning`] did.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleaningReport {
    pub steps: Vec<CleaningStep>,
    pub duplicates_removed: usize,
    pub cells_filled: usize,
    pub rows_before: usize,
    pub rows_after: usize,
}

/// Apply the opted-in steps: duplicates first, then missing values.
pub fn apply_cleaning(table: &mut Table, options: CleaningOptions) -> CleaningReport {
    let mut report = CleaningReport {
        rows_before: table.row_count(),
        ..Default::default()
    };

    if options.remove_duplicates {
        report.duplicates_removed = remove_duplicates(table);
        report.steps.push(CleaningStep::RemoveDuplicates);
    }
    if options.fill_missing {
        report.cells_filled = fill_missing_numeric(table);
        report.steps.push(CleaningStep::FillMissing);
    }

    report.rows_after = table.row_count();
    report
}

/// Remove rows that exactly repeat an earlier row across all columns.
///
/// The first occurrence is kept and the remaining rows keep their relative
/// order. Returns the number of rows removed.
pub fn remove_duplicates(table: &mut Table) -> usize {
    let rows = table.row_count();
    let keep: Vec<bool> = {
        let mut seen: HashSet<Vec<CellKey<'_>>> = HashSet::with_capacity(rows);
        let mut keep = Vec::with_capacity(rows);
        for i in 0..rows {
            let key = table.columns().iter().map(|c| c.values[i].key()).collect();
            keep.push(seen.insert(key));
        }
        keep
    };

    let removed = keep.iter().filter(|k| !**k).count();
    if removed > 0 {
        table.retain_rows(&keep);
    }
    removed
}

/// Replace missing cells of every numeric column with that column's mean.
///
/// The mean is taken over the cells present before this call. A numeric
/// column without any value is left as is, and text columns are untouched.
/// Returns the number of cells filled.
pub fn fill_missing_numeric(table: &mut Table) -> usize {
    let mut filled = 0;

    for column in table.columns_mut().iter_mut().filter(|c| c.is_numeric()) {
        let Some(avg) = mean(&column.values) else {
            continue;
        };

        for value in column.values.iter_mut().filter(|v| v.is_missing()) {
            *value = CellValue::Number(avg);
            filled += 1;
        }
    }

    filled
}

/// Arithmetic mean of the numbers in `values`, `None` when there are none.
pub fn mean(values: &[CellValue]) -> Option<f64> {
    let (sum, count) = values
        .iter()
        .filter_map(CellValue::as_number)
        .fold((0.0, 0usize), |(sum, count), n| (sum + n, count + 1));

    (count > 0).then(|| sum / count as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Column, ColumnKind};
    use crate::parser::parse_csv_str;

    fn text(s: &str) -> CellValue {
        CellValue::Text(s.into())
    }

    fn num(n: f64) -> CellValue {
        CellValue::Number(n)
    }

    #[test]
    fn test_remove_duplicates_keeps_first() {
        let mut table = parse_csv_str("k,v\na,1\nb,2\na,1\nc,3\nb,2", b',').unwrap();
        let removed = remove_duplicates(&mut table);

        assert_eq!(removed, 2);
        assert_eq!(table.column("k").unwrap().values, vec![text("a"), text("b"), text("c")]);
        assert_eq!(table.column("v").unwrap().values, vec![num(1.0), num(2.0), num(3.0)]);
    }

    #[test]
    fn test_rows_differing_in_one_column_are_kept() {
        let mut table = parse_csv_str("k,v\na,1\na,2", b',').unwrap();
        assert_eq!(remove_duplicates(&mut table), 0);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_missing_cells_compare_equal() {
        let mut table = parse_csv_str("k,v\na,\na,", b',').unwrap();
        assert_eq!(remove_duplicates(&mut table), 1);
    }

    #[test]
    fn test_remove_duplicates_idempotent() {
        let mut table = parse_csv_str("a,b\n1,x\n1,x\n2,y\n1,x\n2,z", b',').unwrap();
        remove_duplicates(&mut table);
        let once = table.clone();

        assert_eq!(remove_duplicates(&mut table), 0);
        assert_eq!(table, once);
    }

    #[test]
    fn test_fill_uses_mean_before_replacement() {
        let mut table = Table::new(vec![Column::new(
            "v",
            ColumnKind::Numeric,
            vec![num(1.0), CellValue::Missing, num(3.0), CellValue::Missing],
        )])
        .unwrap();

        let filled = fill_missing_numeric(&mut table);

        assert_eq!(filled, 2);
        assert_eq!(table.column("v").unwrap().values, vec![num(1.0), num(2.0), num(3.0), num(2.0)]);
    }

    #[test]
    fn test_fill_skips_text_and_empty_columns() {
        let mut table = Table::new(vec![
            Column::detect("name", vec![text("a"), CellValue::Missing]),
            Column::detect("blank", vec![CellValue::Missing, CellValue::Missing]),
        ])
        .unwrap();

        assert_eq!(fill_missing_numeric(&mut table), 0);
        assert_eq!(table.column("name").unwrap().values[1], CellValue::Missing);
        assert_eq!(table.column("blank").unwrap().missing_count(), 2);
    }

    #[test]
    fn test_fill_leaves_no_missing_numeric_cells() {
        let mut table = parse_csv_str("a,b,c\n1,,x\n,4,\n3,,y", b',').unwrap();
        fill_missing_numeric(&mut table);

        for column in table.numeric_columns() {
            assert_eq!(column.missing_count(), 0, "column {}", column.name);
        }
        assert_eq!(table.column("c").unwrap().missing_count(), 1);
    }

    #[test]
    fn test_operations_keep_columns() {
        let mut table = parse_csv_str("a,b\n1,\n1,\n2,5", b',').unwrap();
        let names = table.column_names();

        fill_missing_numeric(&mut table);
        remove_duplicates(&mut table);
        fill_missing_numeric(&mut table);

        assert_eq!(table.column_names(), names);
    }

    #[test]
    fn test_dedupe_then_fill_scenario() {
        let mut table = parse_csv_str("name,age\nA,30\nA,30\nB,", b',').unwrap();
        let report = apply_cleaning(
            &mut table,
            CleaningOptions {
                remove_duplicates: true,
                fill_missing: true,
            },
        );

        assert_eq!(report.rows_before, 3);
        assert_eq!(report.rows_after, 2);
        assert_eq!(report.duplicates_removed, 1);
        assert_eq!(report.cells_filled, 1);
        assert_eq!(table.column("name").unwrap().values, vec![text("A"), text("B")]);
        assert_eq!(table.column("age").unwrap().values, vec![num(30.0), num(30.0)]);
    }

    #[test]
    fn test_noop_options() {
        let mut table = parse_csv_str("a\n1\n1", b',').unwrap();
        let report = apply_cleaning(&mut table, CleaningOptions::default());

        assert!(CleaningOptions::default().is_noop());
        assert!(report.steps.is_empty());
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_mean() {
        assert_eq!(mean(&[num(1.0), CellValue::Missing, num(2.0)]), Some(1.5));
        assert_eq!(mean(&[CellValue::Missing]), None);
    }
}
