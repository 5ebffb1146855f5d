//! # DataFlex - upload, clean, chart and convert tabular files
//!
//! DataFlex reads CSV and Excel (XLSX) files, optionally removes duplicate
//! rows and fills missing numeric cells, lets the caller pick columns, builds
//! chart series from numeric columns and converts between CSV and XLSX.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────┐     ┌─────────────┐     ┌─────────────┐     ┌─────────────┐
//! │ CSV / XLSX  │────▶│   Parser    │────▶│  Transform  │────▶│  Serializer │
//! │   upload    │     │ (auto-enc)  │     │ clean/select│     │  CSV / XLSX │
//! └─────────────┘     └─────────────┘     └──────┬──────┘     └─────────────┘
//!                                                ▼
//!                                         ┌─────────────┐
//!                                         │ Chart series│
//!                                         └─────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use dataflex::{run_file, CleaningOptions, OutputFormat, PipelineOptions, UploadedFile};
//!
//! let file = UploadedFile::new("sales.csv", std::fs::read("sales.csv")?);
//! let options = PipelineOptions {
//!     cleaning: CleaningOptions { remove_duplicates: true, fill_missing: true },
//!     convert: Some(OutputFormat::Xlsx),
//!     ..Default::default()
//! };
//! let report = run_file(&file, &options)?;
//! report.conversion.unwrap().save_to("out".as_ref())?;
//! ```
//!
//! ## Modules
//!
//! - [`error`] - Hierarchical error types
//! - [`models`] - Domain models (Table, Column, CellValue, formats)
//! - [`parser`] - CSV/XLSX parsing with auto-detection
//! - [`transform`] - Cleaning, projection, chart summary and pipeline
//! - [`export`] - CSV and XLSX writers
//! - [`session`] - Per-file sessions held between requests
//! - [`api`] - HTTP API server

// Core modules
pub mod error;
pub mod models;

// Parsing
pub mod parser;

// Transformation
pub mod transform;

// Serialization
pub mod export;

// Per-file state
pub mod session;

// HTTP API
pub mod api;

// =============================================================================
// Re-exports - Error types
// =============================================================================

pub use error::{
    ParseError, PipelineError, PipelineResult, SerializeError, ServerError, TableError,
};

// =============================================================================
// Re-exports - Models
// =============================================================================

pub use models::{
    CellValue, Column, ColumnKind, ConversionResult, OutputFormat, SourceFormat, Table,
    UploadedFile,
};

// =============================================================================
// Re-exports - Parser
// =============================================================================

pub use parser::{parse, parse_file, ParseOptions, ParsedFile};

// =============================================================================
// Re-exports - Transform
// =============================================================================

pub use transform::{
    apply_cleaning, project, run_batch, run_file, summarize, BatchReport, ChartSeries,
    CleaningOptions, CleaningReport, FileReport, PipelineOptions,
};

// =============================================================================
// Re-exports - Export, sessions, API
// =============================================================================

pub use export::{convert, serialize};
pub use session::{FileSession, SessionInfo, SessionLimits, SessionStore};
pub use api::{start_server, ServerConfig};
