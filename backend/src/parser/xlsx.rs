//! Excel 2007+ (`.xlsx`) reading via calamine.
//!
//! Only the first worksheet is read. Its first row is the header; the
//! remaining rows become records, with column types detected afterwards.

use calamine::{Data, Reader, Xlsx};
use std::io::Cursor;

use super::{is_missing_marker, unique_headers};
use crate::error::{ParseError, ParseResult};
use crate::models::{CellValue, Column, Table};

/// Parse the first worksheet of an xlsx workbook.
///
/// An empty worksheet yields an empty table, not an error.
pub fn parse_xlsx_bytes(bytes: &[u8]) -> ParseResult<Table> {
    let mut workbook: Xlsx<_> = Xlsx::new(Cursor::new(bytes))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or(ParseError::NoWorksheet)??;

    let mut rows = range.rows();
    let header = match rows.next() {
        Some(header) => header,
        None => return Ok(Table::default()),
    };

    let headers = unique_headers(header.iter().map(header_text).collect());
    let mut cells: Vec<Vec<CellValue>> = vec![Vec::new(); headers.len()];

    for row in rows {
        let values: Vec<CellValue> = row.iter().map(cell_value).collect();
        if values.iter().all(CellValue::is_missing) {
            continue;
        }
        for (column, value) in cells.iter_mut().zip(values) {
            column.push(value);
        }
    }

    let columns = headers
        .into_iter()
        .zip(cells)
        .map(|(name, values)| Column::detect(name, values))
        .collect();

    Ok(Table::new(columns)?)
}

fn header_text(cell: &Data) -> String {
    match cell_value(cell) {
        CellValue::Missing => String::new(),
        value => value.to_string(),
    }
}

/// Convert a calamine cell into a table cell.
fn cell_value(cell: &Data) -> CellValue {
    match cell {
        Data::Int(i) => CellValue::Number(*i as f64),
        Data::Float(f) if f.is_finite() => CellValue::Number(*f),
        Data::String(s) if is_missing_marker(s) => CellValue::Missing,
        Data::String(s) => CellValue::Text(s.clone()),
        Data::Bool(b) => CellValue::Text(if *b { "True" } else { "False" }.to_string()),
        Data::DateTime(dt) => match dt.as_datetime() {
            Some(value) => CellValue::Text(value.format("%Y-%m-%d %H:%M:%S").to_string()),
            None => CellValue::Number(dt.as_f64()),
        },
        Data::DateTimeIso(s) | Data::DurationIso(s) => CellValue::Text(s.clone()),
        _ => CellValue::Missing,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ColumnKind;

    #[test]
    fn test_garbage_bytes_rejected() {
        let err = parse_xlsx_bytes(b"definitely not a zip archive").unwrap_err();
        assert!(matches!(err, ParseError::Xlsx(_)));
    }

    #[test]
    fn test_cell_conversion() {
        assert_eq!(cell_value(&Data::Int(3)), CellValue::Number(3.0));
        assert_eq!(cell_value(&Data::Float(2.5)), CellValue::Number(2.5));
        assert_eq!(cell_value(&Data::String("NA".into())), CellValue::Missing);
        assert_eq!(cell_value(&Data::Bool(true)), CellValue::Text("True".into()));
        assert_eq!(cell_value(&Data::Empty), CellValue::Missing);
    }

    #[test]
    fn test_reads_written_workbook() {
        let table = Table::new(vec![
            Column::detect(
                "city",
                vec![CellValue::Text("Paris".into()), CellValue::Text("Lyon".into())],
            ),
            Column::detect("pop", vec![CellValue::Number(2.1), CellValue::Missing]),
        ])
        .unwrap();

        let bytes = crate::export::xlsx::write_xlsx(&table).unwrap();
        let parsed = parse_xlsx_bytes(&bytes).unwrap();

        assert_eq!(parsed.column_names(), vec!["city", "pop"]);
        assert_eq!(parsed.row_count(), 2);
        assert_eq!(parsed.column("pop").unwrap().kind, ColumnKind::Numeric);
        assert_eq!(parsed.column("pop").unwrap().values[1], CellValue::Missing);
        assert_eq!(parsed.column("city").unwrap().values[1], CellValue::Text("Lyon".into()));
    }
}
