//! Domain models for the DataFlex pipeline.
//!
//! This module contains the core data structures used throughout the pipeline:
//!
//! - [`UploadedFile`] - A named byte buffer received from an upload
//! - [`Table`] - Named, typed columns of uniform length
//! - [`SourceFormat`] - Formats the parser understands
//! - [`OutputFormat`] - Formats the serializer produces
//! - [`ConversionResult`] - Serialized bytes plus filename and MIME type

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

mod table;

pub use table::{CellValue, Column, ColumnKind, Table};
pub(crate) use table::CellKey;

// =============================================================================
// Uploaded File
// =============================================================================

/// A file received from the upload collaborator.
///
/// Immutable once received; it lives as long as the pipeline run for it.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    /// Original file name, including the extension.
    pub name: String,
    /// Size reported by the upload, in bytes.
    pub size_bytes: u64,
    /// Raw content.
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            size_bytes: bytes.len() as u64,
            bytes,
        }
    }

    /// Lowercased extension with its leading dot (`".csv"`), or `""`.
    pub fn extension(&self) -> String {
        Path::new(&self.name)
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| format!(".{}", e.to_lowercase()))
            .unwrap_or_default()
    }

    /// Size in kilobytes, as shown next to the file name.
    pub fn size_kb(&self) -> f64 {
        self.size_bytes as f64 / 1024.0
    }
}

/// Strip the last extension from a file name.
pub fn base_name(name: &str) -> &str {
    match Path::new(name).extension() {
        Some(ext) => &name[..name.len() - ext.len() - 1],
        None => name,
    }
}

// =============================================================================
// Formats
// =============================================================================

/// Input formats recognized by the parser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    Csv,
    Xlsx,
}

impl SourceFormat {
    /// Detect the format from a file name (case-insensitive extension).
    pub fn from_file_name(name: &str) -> Option<Self> {
        let ext = Path::new(name).extension()?.to_str()?.to_lowercase();
        match ext.as_str() {
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Xlsx),
            _ => None,
        }
    }
}

/// Target format of a conversion request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Csv,
    Xlsx,
}

impl OutputFormat {
    pub const XLSX_MIME: &'static str =
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet";

    /// Extension without the dot.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Xlsx => "xlsx",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            Self::Csv => "text/csv",
            Self::Xlsx => Self::XLSX_MIME,
        }
    }

    /// Output file name for a source file: base name plus the new extension.
    pub fn file_name_for(&self, source_name: &str) -> String {
        format!("{}.{}", base_name(source_name), self.extension())
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Csv => f.write_str("CSV"),
            Self::Xlsx => f.write_str("Excel"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "xlsx" | "excel" => Ok(Self::Xlsx),
            other => Err(format!("Unknown output format '{}' (expected csv or xlsx)", other)),
        }
    }
}

// =============================================================================
// Conversion Result
// =============================================================================

/// Serialized table ready for the download collaborator.
#[derive(Debug, Clone)]
pub struct ConversionResult {
    pub bytes: Vec<u8>,
    pub filename: String,
    pub mime_type: String,
}

impl ConversionResult {
    /// Write the bytes into `dir` under [`Self::filename`] and return the path.
    pub fn save_to(&self, dir: &Path) -> std::io::Result<std::path::PathBuf> {
        std::fs::create_dir_all(dir)?;
        let path = dir.join(&self.filename);
        std::fs::write(&path, &self.bytes)?;
        Ok(path)
    }
}

// =============================================================================
// Tests
// =============================================================================
