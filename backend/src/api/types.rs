//! REST API types for clients.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::PipelineError;
use crate::models::{OutputFormat, Table};
use crate::session::SessionInfo;
use crate::transform::{BatchSummary, ChartSeries, CleaningOptions, CleaningReport};

/// Message returned when a view has no numeric column.
pub const NOTHING_TO_VISUALIZE: &str = "No numeric data available for visualization";

/// Response sent after a multipart upload: one outcome per file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResponse {
    /// Unique upload identifier
    pub job_id: String,

    /// "ready" when every file opened, "warning" when some were skipped,
    /// "error" when none did
    pub status: String,

    pub files: Vec<FileOutcomeResponse>,

    pub summary: BatchSummary,
}

impl UploadResponse {
    pub fn new(files: Vec<FileOutcomeResponse>) -> Self {
        let succeeded = files.iter().filter(|f| f.session.is_some()).count();
        let failed = files.len() - succeeded;
        let status = if failed == 0 {
            "ready"
        } else if succeeded > 0 {
            "warning"
        } else {
            "error"
        };

        Self {
            job_id: Uuid::new_v4().to_string(),
            status: status.to_string(),
            summary: BatchSummary {
                processed: files.len(),
                succeeded,
                failed,
            },
            files,
        }
    }
}

/// Per-file result of an upload
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileOutcomeResponse {
    pub file_name: String,

    /// "ready", "warning" (empty file) or "error"
    pub status: String,

    /// Opened session, when the file was read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<SessionInfo>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub preview: Option<Table>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl FileOutcomeResponse {
    pub fn opened(session: SessionInfo, preview: Table) -> Self {
        Self {
            file_name: session.name.clone(),
            status: "ready".to_string(),
            session: Some(session),
            preview: Some(preview),
            error: None,
        }
    }

    pub fn failed(file_name: impl Into<String>, error: &PipelineError) -> Self {
        Self {
            file_name: file_name.into(),
            status: if error.is_warning() { "warning" } else { "error" }.to_string(),
            session: None,
            preview: None,
            error: Some(error.to_string()),
        }
    }
}

/// Session details plus the first rows of its current view
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileDetails {
    pub session: SessionInfo,
    pub preview: Table,
}

/// Body of `POST /api/files/{id}/clean`
pub type CleanRequest = CleaningOptions;

/// Response of `POST /api/files/{id}/clean`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CleanResponse {
    pub report: CleaningReport,
    pub session: SessionInfo,
    pub preview: Table,
}

/// Body of `PUT /api/files/{id}/columns`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnsRequest {
    pub columns: Vec<String>,
}

/// Response of `GET /api/files/{id}/chart`
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartResponse {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chart: Option<ChartSeries>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl From<Option<ChartSeries>> for ChartResponse {
    fn from(chart: Option<ChartSeries>) -> Self {
        let message = chart.is_none().then(|| NOTHING_TO_VISUALIZE.to_string());
        Self { chart, message }
    }
}

/// Query of `GET /api/files/{id}/convert`
#[derive(Debug, Clone, Deserialize)]
pub struct ConvertQuery {
    pub format: OutputFormat,
}

/// Create an error response
pub fn error_response(error: &str) -> Value {
    json!({
        "status": "error",
        "error": error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_upload_status() {
        let failed = FileOutcomeResponse::failed(
            "notes.txt",
            &PipelineError::UnsupportedFormat {
                extension: ".txt".into(),
            },
        );
        let empty = FileOutcomeResponse::failed("e.csv", &PipelineError::EmptyTable("e.csv".into()));

        assert_eq!(failed.status, "error");
        assert_eq!(empty.status, "warning");

        let response = UploadResponse::new(vec![failed, empty]);
        assert_eq!(response.status, "error");
        assert_eq!(response.summary.failed, 2);
    }

    #[test]
    fn test_chart_response_message() {
        let json = serde_json::to_value(ChartResponse::from(None)).unwrap();
        assert_eq!(json["message"], NOTHING_TO_VISUALIZE);
        assert!(json.get("chart").is_none());
    }

    #[test]
    fn test_convert_query_format() {
        let q: ConvertQuery = serde_json::from_value(json!({ "format": "xlsx" })).unwrap();
        assert_eq!(q.format, OutputFormat::Xlsx);
    }

    #[test]
    fn test_clean_request_defaults() {
        let req: CleanRequest = serde_json::from_value(json!({ "fillMissing": true })).unwrap();
        assert!(!req.remove_duplicates);
        assert!(req.fill_missing);
    }
}
