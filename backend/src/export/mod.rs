//! Table serialization to CSV and XLSX.
//!
//! [`serialize`] turns a table into bytes; [`convert`] wraps those bytes
//! with the download file name and MIME type.

use crate::error::{SerializeError, SerializeResult};
use crate::models::{ConversionResult, OutputFormat, Table};

pub mod xlsx;

pub use xlsx::{with_workbook, write_xlsx, WorkbookWriter};

/// Serialize `table` in the requested format.
pub fn serialize(table: &Table, format: OutputFormat) -> SerializeResult<Vec<u8>> {
    match format {
        OutputFormat::Csv => write_csv(table),
        OutputFormat::Xlsx => write_xlsx(table),
    }
}

/// Serialize `table` and name the output after `source_name`.
///
/// `report.csv` converted to XLSX becomes `report.xlsx`.
pub fn convert(
    table: &Table,
    source_name: &str,
    format: OutputFormat,
) -> SerializeResult<ConversionResult> {
    let bytes = serialize(table, format)?;
    Ok(ConversionResult {
        bytes,
        filename: format.file_name_for(source_name),
        mime_type: format.mime_type().to_string(),
    })
}

/// UTF-8, comma-separated, header row first, no index column.
pub fn write_csv(table: &Table) -> SerializeResult<Vec<u8>> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    writer.write_record(table.columns().iter().map(|c| c.name.as_str()))?;
    for row in table.rows() {
        writer.write_record(row.iter().map(|cell| cell.to_string()))?;
    }

    writer
        .into_inner()
        .map_err(|e| SerializeError::Io(e.into_error()))
}
