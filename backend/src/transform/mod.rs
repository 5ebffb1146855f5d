//! Table transformation module.
//!
//! - Clean: duplicate-row removal and mean imputation
//! - Project: ordered column selection
//! - Summary: chart series from numeric columns
//! - Pipeline: per-file orchestration of all of the above

pub mod clean;
pub mod pipeline;
pub mod project;
pub mod summary;

pub use clean::{apply_cleaning, CleaningOptions, CleaningReport, CleaningStep};
pub use pipeline::*;
pub use project::{project, validate_selection};
pub use summary::{summarize, ChartSeries, Series, MAX_SERIES};
