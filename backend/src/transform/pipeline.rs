//! High-level pipeline API: parse, clean, project, summarize, convert.
//!
//! Each uploaded file runs through its own pipeline with no state shared
//! between files. A failure stops that file only: [`run_batch`] logs it,
//! records it and moves on to the next file.
//!
//! # Example
//!
//! ```rust,ignore
//! use dataflex::{run_file, OutputFormat, PipelineOptions, UploadedFile};
//!
//! let file = UploadedFile::new("people.csv", std::fs::read("people.csv")?);
//! let options = PipelineOptions {
//!     convert: Some(OutputFormat::Xlsx),
//!     ..Default::default()
//! };
//! let report = run_file(&file, &options)?;
//! println!("{} rows -> {}", report.table.row_count(), report.conversion.unwrap().filename);
//! ```

use serde::Serialize;

use super::clean::{apply_cleaning, CleaningOptions, CleaningReport};
use super::project::project;
use super::summary::{summarize, ChartSeries};
use crate::api::logs::{log_error, log_info, log_info_indent, log_success, log_warning};
use crate::error::{PipelineError, PipelineResult};
use crate::export::convert;
use crate::models::{ConversionResult, OutputFormat, SourceFormat, Table, UploadedFile};
use crate::parser::{parse_file, ParseOptions, ParsedFile};

/// Options for the pipeline
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// How to read the uploaded bytes
    pub parse: ParseOptions,

    /// Cleaning steps to apply
    pub cleaning: CleaningOptions,

    /// Columns to keep, in order (`None` keeps all)
    pub columns: Option<Vec<String>>,

    /// Build chart series from the projected table
    pub summarize: bool,

    /// Serialize the projected table to this format
    pub convert: Option<OutputFormat>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            parse: ParseOptions::default(),
            cleaning: CleaningOptions::default(),
            columns: None,
            summarize: false,
            convert: None,
        }
    }
}

/// Result of one file's pipeline run
#[derive(Debug, Clone)]
pub struct FileReport {
    pub file_name: String,
    pub size_bytes: u64,
    pub format: SourceFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    /// What cleaning did
    pub cleaning: CleaningReport,
    /// Cleaned and projected table
    pub table: Table,
    /// Chart series, when requested and the table has numeric columns
    pub chart: Option<ChartSeries>,
    /// Converted output, when requested
    pub conversion: Option<ConversionResult>,
}

/// Outcome of one file within a batch
#[derive(Debug)]
pub struct FileOutcome {
    pub file_name: String,
    pub result: PipelineResult<FileReport>,
}

/// Outcomes of a batch, in upload order
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<FileOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> usize {
        self.outcomes.iter().filter(|o| o.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.succeeded()
    }

    pub fn reports(&self) -> impl Iterator<Item = &FileReport> {
        self.outcomes.iter().filter_map(|o| o.result.as_ref().ok())
    }
}

/// Summary of a batch run, sent to API clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSummary {
    pub processed: usize,
    pub succeeded: usize,
    pub failed: usize,
}

impl From<&BatchReport> for BatchSummary {
    fn from(report: &BatchReport) -> Self {
        Self {
            processed: report.outcomes.len(),
            succeeded: report.succeeded(),
            failed: report.failed(),
        }
    }
}

/// Parse an uploaded file and reject empty results.
pub fn load(file: &UploadedFile, options: &ParseOptions) -> PipelineResult<ParsedFile> {
    log_info(format!("📖 Reading {} ({:.2} KB)...", file.name, file.size_kb()));

    let parsed = parse_file(file, options).map_err(|e| PipelineError::from_parse(&file.name, e))?;

    if let Some(ref encoding) = parsed.encoding {
        log_success(format!("Detected encoding: {}", encoding));
    }
    if let Some(delimiter) = parsed.delimiter {
        log_success(format!("Using separator: '{}'", format_delimiter(delimiter)));
    }

    if parsed.table.is_empty() {
        return Err(PipelineError::EmptyTable(file.name.clone()));
    }

    log_success(format!(
        "Read {} rows, {} columns",
        parsed.table.row_count(),
        parsed.table.column_count()
    ));
    for (i, column) in parsed.table.columns().iter().enumerate() {
        log_info_indent(format!("[{:2}] {} ({:?})", i + 1, column.name, column.kind), 1);
    }

    Ok(parsed)
}

/// Run the whole pipeline for one file.
///
/// Parse → empty check → clean → project → summarize → convert.
pub fn run_file(file: &UploadedFile, options: &PipelineOptions) -> PipelineResult<FileReport> {
    let parsed = load(file, &options.parse)?;
    let mut table = parsed.table;

    // Step 1: Cleaning
    let cleaning = apply_cleaning(&mut table, options.cleaning);
    if cleaning.steps.is_empty() {
        log_info("🛠️  No cleaning requested");
    } else {
        if options.cleaning.remove_duplicates {
            log_success(format!("Duplicates removed: {}", cleaning.duplicates_removed));
        }
        if options.cleaning.fill_missing {
            log_success(format!("Missing values filled: {}", cleaning.cells_filled));
        }
    }

    // Step 2: Column selection
    if let Some(ref columns) = options.columns {
        table = project(&table, columns)?;
        log_success(format!("📌 Selected columns: {}", columns.join(", ")));
    }

    // Step 3: Chart data
    let chart = if options.summarize {
        let chart = summarize(&table);
        match chart {
            Some(ref c) => log_success(format!("📊 Chart series: {}", series_names(c))),
            None => log_warning("No numeric data available for visualization"),
        }
        chart
    } else {
        None
    };

    // Step 4: Conversion
    let conversion = match options.convert {
        Some(format) => {
            log_info(format!("📥 Converting {} to {}...", file.name, format));
            let result = convert(&table, &file.name, format)?;
            log_success(format!("{} ready ({} bytes)", result.filename, result.bytes.len()));
            Some(result)
        }
        None => None,
    };

    Ok(FileReport {
        file_name: file.name.clone(),
        size_bytes: file.size_bytes,
        format: parsed.format,
        encoding: parsed.encoding,
        delimiter: parsed.delimiter,
        cleaning,
        table,
        chart,
        conversion,
    })
}

/// Run every file independently; one file's failure never stops the others.
pub fn run_batch(files: &[UploadedFile], options: &PipelineOptions) -> BatchReport {
    let mut report = BatchReport::default();

    for file in files {
        let result = run_file(file, options);
        if let Err(ref e) = result {
            if e.is_warning() {
                log_warning(format!("⚠ {}", e));
            } else {
                log_error(format!("❌ {}", e));
            }
        }
        report.outcomes.push(FileOutcome {
            file_name: file.name.clone(),
            result,
        });
    }

    log_info(format!(
        "🎉 Processed {} file(s): {} succeeded, {} skipped",
        report.outcomes.len(),
        report.succeeded(),
        report.failed()
    ));
    report
}

/// Format delimiter for display
fn format_delimiter(d: char) -> &'static str {
    match d {
        ';' => ";",
        ',' => ",",
        '\t' => "TAB",
        '|' => "|",
        _ => "?",
    }
}

fn series_names(chart: &ChartSeries) -> String {
    chart
        .series
        .iter()
        .map(|s| s.name.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
