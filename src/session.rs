use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use time::OffsetDateTime;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::aggregate::{merge, FindingSet};
use crate::backend::{BackendFailure, ScanBackend};
use crate::classify::Summary;
use crate::dictionary::Dictionary;
use crate::error::SessionError;
use crate::report::{self, ReportDocument};
use crate::types::{Credentials, OrderedMap, RawPayload, ScanMode, ScanRequest};

pub const CANCELLED_MESSAGE: &str = "cancelled";

/// Everything a user configures before pressing "scan".
///
/// The dictionary is moved in: its edit state belongs to this one submission.
#[derive(Debug, Clone)]
pub struct ScanInput {
    pub targets: Vec<String>,
    pub mode: ScanMode,
    pub exclusions: Vec<String>,
    pub max_depth: u32,
    pub respect_robots: bool,
    pub credentials: Option<Credentials>,
    pub dictionary: Dictionary,
}

impl Default for ScanInput {
    fn default() -> Self {
        Self {
            targets: Vec::new(),
            mode: ScanMode::Standard,
            exclusions: Vec::new(),
            max_depth: 2,
            respect_robots: true,
            credentials: None,
            dictionary: Dictionary::default(),
        }
    }
}

impl ScanInput {
    /// Build from free text, one target per line.
    pub fn from_text(targets: &str) -> Self {
        Self { targets: vec![targets.to_string()], ..Self::default() }
    }
}

/// Split every entry on newlines, trim, drop blanks.
pub fn normalize_targets(raw: &[String]) -> Vec<String> {
    raw.iter()
        .flat_map(|t| t.lines())
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Failed(String),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Completed | SessionState::Failed(_))
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Running => "running",
            SessionState::Completed => "completed",
            SessionState::Failed(_) => "failed",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanMetadata {
    pub request: ScanRequest,
    pub started_at: OffsetDateTime,
    pub ended_at: Option<OffsetDateTime>,
    pub server_info: OrderedMap<Value>,
}

impl ScanMetadata {
    /// Elapsed milliseconds. `None` until the scan ends.
    pub fn duration_millis(&self) -> Option<i128> {
        self.ended_at.map(|end| (end - self.started_at).whole_milliseconds())
    }

    pub fn duration_seconds(&self) -> Option<f64> {
        self.duration_millis().map(|ms| ms as f64 / 1000.0)
    }
}

/// One scan's request, timing, state and merged findings.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanSession {
    pub id: u64,
    pub state: SessionState,
    pub metadata: Option<ScanMetadata>,
    pub findings: FindingSet,
}

impl ScanSession {
    fn idle() -> Self {
        Self { id: 0, state: SessionState::Idle, metadata: None, findings: FindingSet::new() }
    }

    /// Set once the session reached a terminal state.
    pub fn ended_at(&self) -> Option<OffsetDateTime> {
        self.metadata.as_ref().and_then(|m| m.ended_at)
    }

    pub fn is_reportable(&self) -> bool {
        self.ended_at().is_some()
    }

    /// `Err(Backend)` when the scan failed, `Ok` otherwise.
    pub fn outcome(&self) -> Result<(), SessionError> {
        match &self.state {
            SessionState::Failed(msg) => Err(SessionError::Backend(msg.clone())),
            _ => Ok(()),
        }
    }
}

/// Handle for a submitted scan. Pass it back to [`ScanController::complete`].
#[derive(Debug, Clone)]
pub struct ScanTicket {
    pub id: u64,
    pub request: ScanRequest,
}

pub type Clock = Arc<dyn Fn() -> OffsetDateTime + Send + Sync>;

/// Owns the single live scan session and drives its state machine.
pub struct ScanController {
    session: ScanSession,
    next_id: u64,
    clock: Clock,
}

impl fmt::Debug for ScanController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanController")
            .field("session", &self.session)
            .field("next_id", &self.next_id)
            .finish_non_exhaustive()
    }
}

impl Default for ScanController {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanController {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(OffsetDateTime::now_utc))
    }

    pub fn with_clock(clock: Clock) -> Self {
        Self { session: ScanSession::idle(), next_id: 1, clock }
    }

    pub fn session(&self) -> &ScanSession {
        &self.session
    }

    pub fn state(&self) -> &SessionState {
        &self.session.state
    }

    pub fn findings(&self) -> &FindingSet {
        &self.session.findings
    }

    pub fn metadata(&self) -> Option<&ScanMetadata> {
        self.session.metadata.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.session.state == SessionState::Running
    }

    /// Validate the input and move to `Running`, discarding the previous session.
    pub fn begin(&mut self, input: ScanInput) -> Result<ScanTicket, SessionError> {
        if self.is_running() {
            return Err(SessionError::StateConflict);
        }
        let targets = normalize_targets(&input.targets);
        if targets.is_empty() {
            return Err(SessionError::Validation("at least one target is required".into()));
        }

        let dictionary = input.dictionary;
        let request = ScanRequest {
            targets,
            mode: input.mode,
            exclusions: input
                .exclusions
                .iter()
                .map(|e| e.trim())
                .filter(|e| !e.is_empty())
                .map(str::to_string)
                .collect::<BTreeSet<_>>(),
            max_depth: input.max_depth,
            respect_robots: input.respect_robots,
            use_baseline: dictionary.use_baseline(),
            operations: dictionary.operations().to_vec(),
            dictionary: dictionary.paths().to_vec(),
            credentials: input.credentials,
        };

        let id = self.next_id;
        self.next_id += 1;
        self.session = ScanSession {
            id,
            state: SessionState::Running,
            metadata: Some(ScanMetadata {
                request: request.clone(),
                started_at: (self.clock)(),
                ended_at: None,
                server_info: OrderedMap::new(),
            }),
            findings: FindingSet::new(),
        };
        info!(
            scan_id = id,
            targets = request.targets.len(),
            paths = request.dictionary.len(),
            mode = request.mode.as_str(),
            "scan started"
        );
        Ok(ScanTicket { id, request })
    }

    /// Record the backend outcome. Returns `false` for a stale or already finished ticket.
    pub fn complete(&mut self, ticket: &ScanTicket, outcome: Result<RawPayload, BackendFailure>) -> bool {
        if ticket.id != self.session.id || !self.is_running() {
            warn!(scan_id = ticket.id, "ignoring outcome for a scan that is no longer running");
            return false;
        }
        match outcome {
            Ok(payload) => {
                let merged = merge(&payload);
                info!(scan_id = ticket.id, findings = merged.findings.len(), "scan completed");
                self.session.findings = merged.findings;
                if let Some(meta) = self.session.metadata.as_mut() {
                    meta.server_info = merged.server_info;
                }
                self.finish(SessionState::Completed);
            }
            Err(failure) => {
                let message = failure.message();
                warn!(scan_id = ticket.id, error = %message, "scan failed");
                self.finish(SessionState::Failed(message));
            }
        }
        true
    }

    /// Abandon the running scan. The session ends as `Failed("cancelled")`.
    pub fn cancel(&mut self) -> bool {
        if !self.is_running() {
            return false;
        }
        warn!(scan_id = self.session.id, "scan cancelled");
        self.finish(SessionState::Failed(CANCELLED_MESSAGE.to_string()));
        true
    }

    fn finish(&mut self, state: SessionState) {
        let now = (self.clock)();
        if let Some(meta) = self.session.metadata.as_mut() {
            if meta.ended_at.is_none() {
                meta.ended_at = Some(now);
            }
        }
        self.session.state = state;
    }

    /// Run one scan end to end. Backend failures end up in the session state,
    /// only local rejections are returned as errors.
    pub async fn start(&mut self, input: ScanInput, backend: &dyn ScanBackend) -> Result<(), SessionError> {
        let ticket = self.begin(input)?;
        let outcome = backend.scan(&ticket.request).await;
        self.complete(&ticket, outcome);
        Ok(())
    }

    /// Like [`start`](Self::start) but gives up when `cancel` fires first.
    pub async fn start_with_cancel(
        &mut self,
        input: ScanInput,
        backend: &dyn ScanBackend,
        cancel: CancellationToken,
    ) -> Result<(), SessionError> {
        let ticket = self.begin(input)?;
        tokio::select! {
            outcome = backend.scan(&ticket.request) => {
                self.complete(&ticket, outcome);
            }
            _ = cancel.cancelled() => {
                self.cancel();
            }
        }
        Ok(())
    }

    /// `None` until the session has an end time.
    pub fn summary(&self) -> Option<Summary> {
        Summary::from_session(&self.session)
    }

    pub fn report(&self) -> Result<ReportDocument, SessionError> {
        report::build(&self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FindingStatus, RawFinding, RawTargetResult, Source};
    use std::sync::atomic::{AtomicI64, Ordering};

    fn stepping_clock() -> Clock {
        let tick = Arc::new(AtomicI64::new(0));
        Arc::new(move || {
            let n = tick.fetch_add(1, Ordering::SeqCst);
            OffsetDateTime::UNIX_EPOCH + time::Duration::milliseconds(n * 1500)
        })
    }

    fn payload() -> RawPayload {
        let mut p = RawPayload::new();
        p.insert(
            "http://a.test".to_string(),
            RawTargetResult {
                directories: [(
                    "http://a.test/admin/".to_string(),
                    RawFinding {
                        status_code: FindingStatus::Code(200),
                        content_length: Some(10),
                        directory_listing: true,
                        source: Source::InitialProbe,
                        note: None,
                    },
                )]
                .into_iter()
                .collect(),
                server_info: None,
            },
        );
        p
    }

    #[test]
    fn blank_targets_are_rejected_before_running() {
        let mut c = ScanController::new();
        let err = c.begin(ScanInput::from_text("\n   \n")).unwrap_err();
        assert!(matches!(err, SessionError::Validation(_)));
        assert_eq!(c.state(), &SessionState::Idle);
    }

    #[test]
    fn begin_while_running_conflicts() {
        let mut c = ScanController::new();
        c.begin(ScanInput::from_text("http://a.test")).unwrap();
        assert_eq!(c.begin(ScanInput::from_text("http://b.test")).unwrap_err(), SessionError::StateConflict);
        assert_eq!(c.metadata().unwrap().request.targets, vec!["http://a.test"]);
    }

    #[test]
    fn stale_ticket_is_ignored() {
        let mut c = ScanController::with_clock(stepping_clock());
        let first = c.begin(ScanInput::from_text("http://a.test")).unwrap();
        assert!(c.cancel());
        let second = c.begin(ScanInput::from_text("http://b.test")).unwrap();
        assert!(!c.complete(&first, Ok(payload())));
        assert!(c.is_running());
        assert!(c.complete(&second, Ok(payload())));
        assert_eq!(c.state(), &SessionState::Completed);
    }

    #[test]
    fn end_time_is_set_once() {
        let mut c = ScanController::with_clock(stepping_clock());
        let t = c.begin(ScanInput::from_text("http://a.test")).unwrap();
        c.complete(&t, Ok(payload()));
        let ended = c.session().ended_at();
        assert!(!c.cancel());
        assert!(!c.complete(&t, Err(BackendFailure::Message("late".into()))));
        assert_eq!(c.session().ended_at(), ended);
        assert_eq!(c.metadata().unwrap().duration_seconds(), Some(1.5));
    }
}
