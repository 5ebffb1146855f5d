//! Per-file sessions - hold a parsed table between requests
//!
//! Each uploaded file gets its own [`FileSession`], keyed by a fresh `Uuid`.
//! A session owns its table and never shares it: cleaning mutates the held
//! table, column selection is stored and applied when the table is viewed,
//! charted or converted.

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::api::logs::{log_info, log_success, log_warning};
use crate::error::{PipelineError, ServerError, ServerResult};
use crate::export::convert;
use crate::models::{ColumnKind, ConversionResult, OutputFormat, SourceFormat, Table, UploadedFile};
use crate::parser::{ParseOptions, ParsedFile};
use crate::transform::{
    apply_cleaning, load, project, summarize, validate_selection, ChartSeries, CleaningOptions,
    CleaningReport, CleaningStep,
};

/// One uploaded file and what has been done to it
#[derive(Debug, Clone)]
pub struct FileSession {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub format: SourceFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    table: Table,
    selected: Vec<String>,
    applied: Vec<CleaningStep>,
}

impl FileSession {
    pub fn new(file: &UploadedFile, parsed: ParsedFile) -> Self {
        let selected = parsed.table.column_names();
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: file.name.clone(),
            size_bytes: file.size_bytes,
            format: parsed.format,
            encoding: parsed.encoding,
            delimiter: parsed.delimiter,
            created_at: now,
            last_used: now,
            table: parsed.table,
            selected,
            applied: Vec::new(),
        }
    }

    fn touch(&mut self) {
        self.last_used = Utc::now();
    }

    fn is_expired(&self, now: DateTime<Utc>, idle_ttl: Duration) -> bool {
        now - self.last_used > idle_ttl
    }

    pub fn selected(&self) -> &[String] {
        &self.selected
    }

    pub fn applied(&self) -> &[CleaningStep] {
        &self.applied
    }

    /// The held table restricted to the selected columns.
    pub fn view(&self) -> ServerResult<Table> {
        project(&self.table, &self.selected).map_err(|e| PipelineError::from(e).into())
    }

    /// First `rows` rows of the current view.
    pub fn preview(&self, rows: usize) -> ServerResult<Table> {
        Ok(self.view()?.head(rows))
    }

    /// Clean the held table in place. Columns are unchanged, so the
    /// selection stays valid.
    pub fn clean(&mut self, options: CleaningOptions) -> CleaningReport {
        let report = apply_cleaning(&mut self.table, options);
        for step in &report.steps {
            if !self.applied.contains(step) {
                self.applied.push(*step);
            }
        }
        report
    }

    /// Replace the selection; every name must exist in the held table.
    pub fn select_columns(&mut self, names: Vec<String>) -> ServerResult<()> {
        validate_selection(&self.table, &names).map_err(PipelineError::from)?;
        self.selected = names;
        Ok(())
    }

    pub fn chart(&self) -> ServerResult<Option<ChartSeries>> {
        Ok(summarize(&self.view()?))
    }

    pub fn convert(&self, format: OutputFormat) -> ServerResult<ConversionResult> {
        let result = convert(&self.view()?, &self.name, format).map_err(PipelineError::from)?;
        Ok(result)
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            id: self.id,
            name: self.name.clone(),
            size_bytes: self.size_bytes,
            format: self.format,
            encoding: self.encoding.clone(),
            delimiter: self.delimiter,
            created_at: self.created_at,
            last_used: self.last_used,
            row_count: self.table.row_count(),
            columns: self
                .table
                .columns()
                .iter()
                .map(|c| ColumnInfo {
                    name: c.name.clone(),
                    kind: c.kind,
                    missing: c.missing_count(),
                })
                .collect(),
            selected: self.selected.clone(),
            applied: self.applied.clone(),
        }
    }
}

/// Column metadata shown to clients
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub name: String,
    pub kind: ColumnKind,
    pub missing: usize,
}

/// Serializable snapshot of a session
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Uuid,
    pub name: String,
    pub size_bytes: u64,
    pub format: SourceFormat,
    pub encoding: Option<String>,
    pub delimiter: Option<char>,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub row_count: usize,
    pub columns: Vec<ColumnInfo>,
    pub selected: Vec<String>,
    pub applied: Vec<CleaningStep>,
}

/// Bounds on how many sessions are held and for how long
#[derive(Debug, Clone, Copy)]
pub struct SessionLimits {
    /// Sessions held at once; opening one more evicts the least recently used
    pub max_sessions: usize,
    /// Sessions idle longer than this are dropped on the next open
    pub idle_ttl: Duration,
}

pub const DEFAULT_MAX_SESSIONS: usize = 64;
pub const DEFAULT_SESSION_TTL_MINUTES: i64 = 30;

impl Default for SessionLimits {
    fn default() -> Self {
        Self {
            max_sessions: DEFAULT_MAX_SESSIONS,
            idle_ttl: Duration::minutes(DEFAULT_SESSION_TTL_MINUTES),
        }
    }
}

/// Open sessions, shared between request handlers
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    sessions: Arc<RwLock<HashMap<Uuid, FileSession>>>,
    limits: SessionLimits,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limits(limits: SessionLimits) -> Self {
        Self {
            sessions: Arc::default(),
            limits,
        }
    }

    pub fn limits(&self) -> SessionLimits {
        self.limits
    }

    /// Parse `file` and open a session for it. Empty tables are rejected.
    ///
    /// Returns the session snapshot with its first `preview_rows` rows, taken
    /// before the session becomes visible to other requests.
    pub async fn open(
        &self,
        file: &UploadedFile,
        options: &ParseOptions,
        preview_rows: usize,
    ) -> Result<(SessionInfo, Table), PipelineError> {
        let parsed = load(file, options)?;
        let session = FileSession::new(file, parsed);
        let info = session.info();
        let preview = session.table.head(preview_rows);

        let mut sessions = self.sessions.write().await;
        self.evict(&mut sessions);
        sessions.insert(session.id, session);
        drop(sessions);

        log_success(format!("Session opened for {} ({})", info.name, info.id));
        Ok((info, preview))
    }

    /// Drop idle sessions, then the least recently used ones until there is
    /// room for one more.
    fn evict(&self, sessions: &mut HashMap<Uuid, FileSession>) {
        let now = Utc::now();
        let expired: Vec<Uuid> = sessions
            .values()
            .filter(|s| s.is_expired(now, self.limits.idle_ttl))
            .map(|s| s.id)
            .collect();
        for id in expired {
            if let Some(session) = sessions.remove(&id) {
                log_info(format!("Session expired for {} ({})", session.name, id));
            }
        }

        while !sessions.is_empty() && sessions.len() >= self.limits.max_sessions {
            let oldest = sessions
                .values()
                .min_by_key(|s| s.last_used)
                .map(|s| s.id);
            let Some(id) = oldest else { break };
            if let Some(session) = sessions.remove(&id) {
                log_warning(format!(
                    "Session limit ({}) reached, closed {} ({})",
                    self.limits.max_sessions, session.name, id
                ));
            }
        }
    }

    pub async fn get(&self, id: Uuid) -> ServerResult<SessionInfo> {
        self.read(id, |s| Ok(s.info())).await
    }

    /// All sessions, oldest first.
    pub async fn list(&self) -> Vec<SessionInfo> {
        let sessions = self.sessions.read().await;
        let mut infos: Vec<SessionInfo> = sessions.values().map(FileSession::info).collect();
        infos.sort_by_key(|i| i.created_at);
        infos
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    pub async fn remove(&self, id: Uuid) -> ServerResult<SessionInfo> {
        let session = self
            .sessions
            .write()
            .await
            .remove(&id)
            .ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        log_info(format!("Session closed for {}", session.name));
        Ok(session.info())
    }

    pub async fn clean(&self, id: Uuid, options: CleaningOptions) -> ServerResult<CleaningReport> {
        self.write(id, |s| Ok(s.clean(options))).await
    }

    pub async fn select_columns(&self, id: Uuid, names: Vec<String>) -> ServerResult<SessionInfo> {
        self.write(id, |s| {
            s.select_columns(names)?;
            Ok(s.info())
        })
        .await
    }

    pub async fn preview(&self, id: Uuid, rows: usize) -> ServerResult<Table> {
        self.read(id, |s| s.preview(rows)).await
    }

    pub async fn chart(&self, id: Uuid) -> ServerResult<Option<ChartSeries>> {
        self.read(id, FileSession::chart).await
    }

    pub async fn convert(&self, id: Uuid, format: OutputFormat) -> ServerResult<ConversionResult> {
        self.read(id, |s| s.convert(format)).await
    }

    /// Looking at a session counts as using it, so this takes the write lock
    /// to refresh `last_used`.
    async fn read<T>(&self, id: Uuid, f: impl FnOnce(&FileSession) -> ServerResult<T>) -> ServerResult<T> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        session.touch();
        f(session)
    }

    async fn write<T>(
        &self,
        id: Uuid,
        f: impl FnOnce(&mut FileSession) -> ServerResult<T>,
    ) -> ServerResult<T> {
        let mut sessions = self.sessions.write().await;
        let session = sessions
            .get_mut(&id)
            .ok_or_else(|| ServerError::NotFound(id.to_string()))?;
        session.touch();
        f(session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CellValue;

    fn csv(name: &str, content: &str) -> UploadedFile {
        UploadedFile::new(name, content.as_bytes().to_vec())
    }

    async fn open(store: &SessionStore, content: &str) -> Uuid {
        store
            .open(&csv("people.csv", content), &ParseOptions::default(), 5)
            .await
            .unwrap()
            .0
            .id
    }

    #[tokio::test]
    async fn test_open_and_get() {
        let store = SessionStore::new();
        let id = open(&store, "name,age\nA,30\nB,").await;

        let info = store.get(id).await.unwrap();
        assert_eq!(info.name, "people.csv");
        assert_eq!(info.row_count, 2);
        assert_eq!(info.selected, vec!["name", "age"]);
        assert_eq!(info.columns[1].kind, ColumnKind::Numeric);
        assert_eq!(info.columns[1].missing, 1);
    }

    #[tokio::test]
    async fn test_open_rejects_empty_and_unsupported() {
        let store = SessionStore::new();
        let opts = ParseOptions::default();

        let err = store.open(&csv("empty.csv", "a,b\n"), &opts, 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::EmptyTable(_)));

        let err = store.open(&csv("notes.txt", "hi"), &opts, 5).await.unwrap_err();
        assert!(matches!(err, PipelineError::UnsupportedFormat { .. }));

        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_open_returns_preview() {
        let store = SessionStore::new();
        let (info, preview) = store
            .open(&csv("people.csv", "name,age\nA,30\nB,40\nC,50"), &ParseOptions::default(), 2)
            .await
            .unwrap();

        assert_eq!(info.row_count, 3);
        assert_eq!(preview.column_names(), vec!["name", "age"]);
        assert_eq!(preview.row_count(), 2);
    }

    #[tokio::test]
    async fn test_session_cap_evicts_least_recently_used() {
        let store = SessionStore::with_limits(SessionLimits {
            max_sessions: 2,
            ..Default::default()
        });
        let first = open(&store, "a\n1").await;
        let second = open(&store, "a\n2").await;

        // Using the first session makes the second the eviction candidate.
        store.get(first).await.unwrap();
        let third = open(&store, "a\n3").await;

        assert_eq!(store.len().await, 2);
        assert!(store.get(first).await.is_ok());
        assert!(matches!(store.get(second).await, Err(ServerError::NotFound(_))));
        assert!(store.get(third).await.is_ok());
    }

    #[tokio::test]
    async fn test_idle_sessions_expire_on_open() {
        let store = SessionStore::new();
        let stale = open(&store, "a\n1").await;
        let fresh = open(&store, "a\n2").await;

        {
            let mut sessions = store.sessions.write().await;
            let session = sessions.get_mut(&stale).unwrap();
            session.last_used = Utc::now() - Duration::hours(2);
        }
        let newest = open(&store, "a\n3").await;

        assert_eq!(store.len().await, 2);
        assert!(matches!(store.get(stale).await, Err(ServerError::NotFound(_))));
        assert!(store.get(fresh).await.is_ok());
        assert!(store.get(newest).await.is_ok());
    }

    #[tokio::test]
    async fn test_sessions_are_independent() {
        let store = SessionStore::new();
        let a = open(&store, "v\n1\n1").await;
        let b = open(&store, "v\n1\n1").await;

        store
            .clean(
                a,
                CleaningOptions {
                    remove_duplicates: true,
                    fill_missing: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(store.get(a).await.unwrap().row_count, 1);
        assert_eq!(store.get(b).await.unwrap().row_count, 2);
        assert_eq!(store.list().await.len(), 2);
    }

    #[tokio::test]
    async fn test_repeated_fill_is_stable() {
        let store = SessionStore::new();
        let id = open(&store, "x,y\n1,a\n,b\n3,c").await;
        let fill = CleaningOptions {
            remove_duplicates: false,
            fill_missing: true,
        };

        let first = store.clean(id, fill).await.unwrap();
        let second = store.clean(id, fill).await.unwrap();

        assert_eq!(first.cells_filled, 1);
        assert_eq!(second.cells_filled, 0);
        let info = store.get(id).await.unwrap();
        assert_eq!(info.applied, vec![CleaningStep::FillMissing]);
    }

    #[tokio::test]
    async fn test_selection_applies_to_views() {
        let store = SessionStore::new();
        let id = open(&store, "id,name,score\na,x,1\nb,y,2").await;

        store
            .select_columns(id, vec!["score".into(), "id".into()])
            .await
            .unwrap();

        let preview = store.preview(id, 1).await.unwrap();
        assert_eq!(preview.column_names(), vec!["score", "id"]);
        assert_eq!(preview.row_count(), 1);

        let chart = store.chart(id).await.unwrap().unwrap();
        assert_eq!(chart.series[0].name, "score");

        let download = store.convert(id, OutputFormat::Csv).await.unwrap();
        assert_eq!(String::from_utf8(download.bytes).unwrap(), "score,id\n1,a\n2,b\n");
    }

    #[tokio::test]
    async fn test_unknown_selection_keeps_previous() {
        let store = SessionStore::new();
        let id = open(&store, "a,b\n1,2").await;

        let err = store.select_columns(id, vec!["c".into()]).await.unwrap_err();
        assert!(matches!(
            err,
            ServerError::Pipeline(PipelineError::ColumnNotFound(ref c)) if c == "c"
        ));
        assert_eq!(store.get(id).await.unwrap().selected, vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_unknown_id_and_remove() {
        let store = SessionStore::new();
        let id = open(&store, "a\n1").await;

        assert!(matches!(store.get(Uuid::new_v4()).await, Err(ServerError::NotFound(_))));

        store.remove(id).await.unwrap();
        assert!(matches!(store.remove(id).await, Err(ServerError::NotFound(_))));
    }

    #[test]
    fn test_clean_then_view() {
        let file = csv("people.csv", "name,age\nA,30\nA,30\nB,");
        let parsed = crate::parser::parse_file(&file, &ParseOptions::default()).unwrap();
        let mut session = FileSession::new(&file, parsed);

        session.clean(CleaningOptions {
            remove_duplicates: true,
            fill_missing: true,
        });

        let view = session.view().unwrap();
        assert_eq!(view.column("age").unwrap().values, vec![CellValue::Number(30.0); 2]);
        assert_eq!(
            session.applied(),
            &[CleaningStep::RemoveDuplicates, CleaningStep::FillMissing]
        );
    }
}
