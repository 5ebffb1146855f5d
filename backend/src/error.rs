//! Error types for the DataFlex table pipeline.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`ParseError`] - reading uploaded bytes into a table
//! - [`TableError`] - structural table operations (projection, construction)
//! - [`SerializeError`] - writing a table back out as CSV or XLSX
//! - [`PipelineError`] - per-file orchestration errors
//! - [`ServerError`] - HTTP layer errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.

use thiserror::Error;

// =============================================================================
// Parsing Errors
// =============================================================================

/// Errors while turning uploaded bytes into a [`crate::models::Table`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file extension is neither `.csv` nor `.xlsx`.
    #[error("Unsupported file type: {extension}")]
    UnsupportedFormat { extension: String },

    /// The CSV reader rejected the content.
    #[error("Invalid CSV content: {0}")]
    Csv(#[from] csv::Error),

    /// The workbook could not be opened or read.
    #[error("Invalid xlsx content: {0}")]
    Xlsx(#[from] calamine::XlsxError),

    /// No header row could be found.
    #[error("No columns to parse from file")]
    NoHeaders,

    /// A record carries more fields than the header.
    #[error("Expected {expected} fields in line {line}, saw {found}")]
    RaggedRow {
        line: u64,
        expected: usize,
        found: usize,
    },

    /// The workbook has no worksheet.
    #[error("Workbook contains no worksheet")]
    NoWorksheet,

    /// The parsed cells do not form a valid table.
    #[error("Invalid table: {0}")]
    Table(#[from] TableError),
}

// =============================================================================
// Table Errors
// =============================================================================

/// Errors from structural table operations.
#[derive(Debug, Error, PartialEq)]
pub enum TableError {
    /// A referenced column does not exist.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// A column name appears twice.
    #[error("Duplicate column: {0}")]
    DuplicateColumn(String),

    /// Columns of different lengths were combined.
    #[error("Column '{column}' has {found} rows, expected {expected}")]
    LengthMismatch {
        column: String,
        expected: usize,
        found: usize,
    },
}

// =============================================================================
// Serialization Errors
// =============================================================================

/// Errors while serializing a table.
#[derive(Debug, Error)]
pub enum SerializeError {
    /// CSV writer error.
    #[error("CSV writer error: {0}")]
    Csv(#[from] csv::Error),

    /// Archive writer error.
    #[error("Workbook archive error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// IO error while writing into the output buffer.
    #[error("Write error: {0}")]
    Io(#[from] std::io::Error),

    /// The table could not be laid out (e.g. too many columns for a sheet).
    #[error("Cannot write table: {0}")]
    Layout(String),
}

// =============================================================================
// Pipeline Errors (per file)
// =============================================================================

/// Errors of a single file's pipeline run.
///
/// Every variant is recovered at the file boundary: the file is reported and
/// skipped, sibling files keep going.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Unrecognized extension.
    #[error("Unsupported file type: {extension}")]
    UnsupportedFormat { extension: String },

    /// The bytes do not match the declared format.
    #[error("Error reading file {file}: {source}")]
    ParseFailure {
        file: String,
        #[source]
        source: ParseError,
    },

    /// The file parsed but holds zero rows.
    #[error("File {0} is empty or unreadable")]
    EmptyTable(String),

    /// Projection referenced a column that does not exist.
    #[error("Column not found: {0}")]
    ColumnNotFound(String),

    /// Other structural table error.
    #[error("Table error: {0}")]
    Table(TableError),

    /// The writer engine failed.
    #[error("Error in file conversion: {0}")]
    SerializeFailure(#[from] SerializeError),
}

impl PipelineError {
    /// Wrap a parse error for `file`, lifting unsupported formats to their
    /// own variant.
    pub fn from_parse(file: impl Into<String>, error: ParseError) -> Self {
        match error {
            ParseError::UnsupportedFormat { extension } => {
                PipelineError::UnsupportedFormat { extension }
            }
            source => PipelineError::ParseFailure {
                file: file.into(),
                source,
            },
        }
    }

    /// `true` for conditions that are reported as a warning, not an error.
    pub fn is_warning(&self) -> bool {
        matches!(self, PipelineError::EmptyTable(_))
    }
}

impl From<TableError> for PipelineError {
    fn from(error: TableError) -> Self {
        match error {
            TableError::ColumnNotFound(name) => PipelineError::ColumnNotFound(name),
            other => PipelineError::Table(other),
        }
    }
}

// =============================================================================
// Server Errors
// =============================================================================

/// HTTP server errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// Pipeline error.
    #[error("{0}")]
    Pipeline(#[from] PipelineError),

    /// Invalid request.
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Unknown file session.
    #[error("File session not found: {0}")]
    NotFound(String),
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for parsing.
pub type ParseResult<T> = Result<T, ParseError>;

/// Result type for table operations.
pub type TableResult<T> = Result<T, TableError>;

/// Result type for serialization.
pub type SerializeResult<T> = Result<T, SerializeError>;

/// Result type for pipeline operations.
pub type PipelineResult<T> = Result<T, PipelineError>;

/// Result type for server operations.
pub type ServerResult<T> = Result<T, ServerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unsupported_format_is_lifted() {
        let err = PipelineError::from_parse(
            "notes.txt",
            ParseError::UnsupportedFormat {
                extension: ".txt".into(),
            },
        );
        assert!(matches!(err, PipelineError::UnsupportedFormat { ref extension } if extension == ".txt"));
        assert!(err.to_string().contains(".txt"));
    }

    #[test]
    fn test_parse_failure_keeps_cause() {
        let err = PipelineError::from_parse("data.csv", ParseError::NoHeaders);
        let msg = err.to_string();
        assert!(msg.contains("data.csv"));
        assert!(msg.contains("No columns"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_column_not_found_conversion() {
        let err: PipelineError = TableError::ColumnNotFound("age".into()).into();
        assert!(matches!(err, PipelineError::ColumnNotFound(ref c) if c == "age"));
    }

    #[test]
    fn test_empty_table_is_warning() {
        assert!(PipelineError::EmptyTable("a.csv".into()).is_warning());
        assert!(!PipelineError::ColumnNotFound("x".into()).is_warning());
    }
}
