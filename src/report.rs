//! Frozen, serializable snapshot of a finished scan session.
use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::classify::{filter, Category, Summary};
use crate::dictionary::DictOp;
use crate::error::SessionError;
use crate::session::{ScanSession, SessionState};
use crate::types::{Finding, FindingStatus, OrderedMap, Source};

const NO_NOTE: &str = "No specific note.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DictionarySettings {
    pub use_baseline: bool,
    pub operations: Vec<DictOp>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportMetadata {
    pub targets: Vec<String>,
    pub mode: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub start_time: String,
    pub end_time: String,
    pub duration_seconds: f64,
    pub max_depth: u32,
    pub respect_robots_txt: bool,
    pub credentials_provided: bool,
    pub exclusions: Vec<String>,
    pub dictionary_settings: DictionarySettings,
    pub server_information: OrderedMap<Value>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    pub targets_scanned: usize,
    pub paths_attempted: usize,
    pub directories_found: usize,
    pub api_endpoints_found: usize,
}

/// One exported finding. The attempted-paths list carries the status as
/// text (`"200"`, `"EXCLUDED"`), the found lists keep the wire value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRow<S = FindingStatus> {
    pub url: String,
    pub status_code: S,
    pub content_length: u64,
    pub directory_listing: bool,
    pub source: Source,
    pub note: String,
}

pub type AttemptedRow = ReportRow<String>;

impl<S> ReportRow<S> {
    fn with_status(f: &Finding, status_code: S) -> Self {
        Self {
            url: f.url.clone(),
            status_code,
            content_length: f.content_length,
            directory_listing: f.listing_exposed,
            source: f.source,
            note: f.note.clone().unwrap_or_else(|| NO_NOTE.to_string()),
        }
    }
}

impl From<&Finding> for ReportRow {
    fn from(f: &Finding) -> Self {
        Self::with_status(f, f.status)
    }
}

impl From<&Finding> for AttemptedRow {
    fn from(f: &Finding) -> Self {
        Self::with_status(f, f.status.to_string())
    }
}

/// Export document. Owns copies of everything it shows.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportDocument {
    pub scan_metadata: ReportMetadata,
    pub summary: ReportSummary,
    pub all_attempted_paths: Vec<AttemptedRow>,
    pub successful_directories: Vec<ReportRow>,
    pub responsive_api_endpoints: Vec<ReportRow>,
}

impl ReportDocument {
    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// `scan_report_<YYYY-MM-DD>.json`, dated by the scan's end time.
    pub fn suggested_file_name(&self) -> String {
        let date = self.scan_metadata.end_time.get(..10).unwrap_or("undated");
        format!("scan_report_{date}.json")
    }
}

/// Snapshot `session`. Fails until the session has an end time.
pub fn build(session: &ScanSession) -> Result<ReportDocument, SessionError> {
    let meta = session.metadata.as_ref().ok_or(SessionError::IncompleteSession)?;
    let ended_at = meta.ended_at.ok_or(SessionError::IncompleteSession)?;
    let summary = Summary::from_session(session).ok_or(SessionError::IncompleteSession)?;
    let request = &meta.request;

    let rows = |category: Category| -> Vec<ReportRow> {
        filter(&session.findings, category).into_iter().map(<ReportRow>::from).collect()
    };
    let attempted: Vec<AttemptedRow> =
        filter(&session.findings, Category::All).into_iter().map(AttemptedRow::from).collect();

    let error = match &session.state {
        SessionState::Failed(msg) => Some(msg.clone()),
        _ => None,
    };

    Ok(ReportDocument {
        scan_metadata: ReportMetadata {
            targets: request.targets.clone(),
            mode: request.mode.as_str().to_string(),
            status: session.state.as_str().to_string(),
            error,
            start_time: rfc3339(meta.started_at),
            end_time: rfc3339(ended_at),
            duration_seconds: summary.duration_seconds,
            max_depth: request.max_depth,
            respect_robots_txt: request.respect_robots,
            credentials_provided: request.credentials.is_some(),
            exclusions: request.exclusions.iter().cloned().collect(),
            dictionary_settings: DictionarySettings {
                use_baseline: request.use_baseline,
                operations: request.operations.clone(),
            },
            server_information: meta.server_info.clone(),
        },
        summary: ReportSummary {
            targets_scanned: summary.targets,
            paths_attempted: summary.total_paths,
            directories_found: summary.successful_paths,
            api_endpoints_found: summary.api_endpoints_found,
        },
        all_attempted_paths: attempted,
        successful_directories: rows(Category::Directories),
        responsive_api_endpoints: rows(Category::ApiEndpoints),
    })
}

pub(crate) fn rfc3339(t: OffsetDateTime) -> String {
    t.format(&Rfc3339)
        .unwrap_or_else(|_| String::from("1970-01-01T00:00:00Z"))
}
