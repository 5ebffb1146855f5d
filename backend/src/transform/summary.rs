//! Chart data: the first numeric columns as series over the row index.

use serde::Serialize;

use crate::models::Table;

/// Maximum number of series in a chart.
pub const MAX_SERIES: usize = 2;

/// One plotted column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Series {
    pub name: String,
    /// One value per row; `None` for missing cells.
    pub values: Vec<Option<f64>>,
}

/// Parallel series plotted against the row index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartSeries {
    pub index: Vec<usize>,
    pub series: Vec<Series>,
}

/// Summarize `table` for charting.
///
/// Takes at most the first [`MAX_SERIES`] numeric columns in column order.
/// Returns `None` when the table has no numeric column, in which case there
/// is nothing to visualize.
pub fn summarize(table: &Table) -> Option<ChartSeries> {
    let series: Vec<Series> = table
        .numeric_columns()
        .take(MAX_SERIES)
        .map(|column| Series {
            name: column.name.clone(),
            values: column.values.iter().map(|v| v.as_number()).collect(),
        })
        .collect();

    if series.is_empty() {
        return None;
    }

    Some(ChartSeries {
        index: (0..table.row_count()).collect(),
        series,
    })
}
