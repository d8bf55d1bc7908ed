use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::dictionary::{DictOp, PathEntry};

/// String-keyed map that keeps document order on both read and write.
///
/// Backend payloads are JSON objects whose key order matters: targets are
/// merged in the order the backend reported them. Re-inserting a key keeps
/// its original position.
pub type OrderedMap<V> = IndexMap<String, V>;

/// HTTP outcome of one attempted path, or the reason there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "WireStatus", into = "WireStatus")]
pub enum FindingStatus {
    Code(u16),
    Excluded,
    NoResponse,
    TaskError,
}

const EXCLUDED_TAG: &str = "EXCLUDED";
const NO_RESPONSE_TAG: &str = "NO_RESPONSE_OR_ERROR";
const TASK_ERROR_TAG: &str = "SCANNER_TASK_ERROR";

impl FindingStatus {
    /// 200 and 403 both mean "something lives here".
    pub fn is_success(self) -> bool {
        matches!(self, FindingStatus::Code(200) | FindingStatus::Code(403))
    }

    pub fn is_sentinel(self) -> bool {
        !matches!(self, FindingStatus::Code(_))
    }
}

impl fmt::Display for FindingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FindingStatus::Code(c) => write!(f, "{c}"),
            FindingStatus::Excluded => f.write_str(EXCLUDED_TAG),
            FindingStatus::NoResponse => f.write_str(NO_RESPONSE_TAG),
            FindingStatus::TaskError => f.write_str(TASK_ERROR_TAG),
        }
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum WireStatus {
    Code(u16),
    Tag(String),
}

impl TryFrom<WireStatus> for FindingStatus {
    type Error = String;

    fn try_from(w: WireStatus) -> Result<Self, Self::Error> {
        Ok(match w {
            WireStatus::Code(c) => FindingStatus::Code(c),
            WireStatus::Tag(tag) => match tag.trim() {
                EXCLUDED_TAG => FindingStatus::Excluded,
                NO_RESPONSE_TAG => FindingStatus::NoResponse,
                TASK_ERROR_TAG => FindingStatus::TaskError,
                other => match other.parse::<u16>() {
                    Ok(c) => FindingStatus::Code(c),
                    Err(_) => {
                        tracing::debug!(status = other, "unrecognised status tag, treating as task error");
                        FindingStatus::TaskError
                    }
                },
            },
        })
    }
}

impl From<FindingStatus> for WireStatus {
    fn from(s: FindingStatus) -> Self {
        match s {
            FindingStatus::Code(c) => WireStatus::Code(c),
            other => WireStatus::Tag(other.to_string()),
        }
    }
}

/// How a finding was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "&'static str")]
pub enum Source {
    InitialProbe,
    CrawledPage,
    DiscoveredApiPath,
    DiscoveredApiBase,
    TargetBaseUrl,
    #[default]
    Unknown,
}

impl From<String> for Source {
    fn from(tag: String) -> Self {
        match tag.as_str() {
            "initial" => Source::InitialProbe,
            "crawl" => Source::CrawledPage,
            "js_api" => Source::DiscoveredApiPath,
            "js_api_base" => Source::DiscoveredApiBase,
            "target_base" => Source::TargetBaseUrl,
            _ => Source::Unknown,
        }
    }
}

impl From<Source> for &'static str {
    fn from(s: Source) -> Self {
        s.wire_tag()
    }
}

impl Source {
    pub fn wire_tag(self) -> &'static str {
        match self {
            Source::InitialProbe => "initial",
            Source::CrawledPage => "crawl",
            Source::DiscoveredApiPath => "js_api",
            Source::DiscoveredApiBase => "js_api_base",
            Source::TargetBaseUrl => "target_base",
            Source::Unknown => "unknown",
        }
    }

    pub fn is_api(self) -> bool {
        matches!(self, Source::DiscoveredApiPath | Source::DiscoveredApiBase)
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Source::InitialProbe => "Initial Scan",
            Source::CrawledPage => "Crawled Page",
            Source::DiscoveredApiPath => "API Path",
            Source::DiscoveredApiBase => "API Base",
            Source::TargetBaseUrl => "Target Base",
            Source::Unknown => "Unknown",
        }
    }
}

/// One discovered or attempted path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub url: String,
    #[serde(rename = "status_code")]
    pub status: FindingStatus,
    pub content_length: u64,
    #[serde(rename = "directory_listing")]
    pub listing_exposed: bool,
    pub source: Source,
    pub note: Option<String>,
}

impl Finding {
    /// Length used for ordering: sentinel statuses count as zero.
    pub fn effective_length(&self) -> u64 {
        if self.status.is_sentinel() {
            0
        } else {
            self.content_length
        }
    }
}

/// Finding as reported by the backend, keyed by URL in its parent map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawFinding {
    pub status_code: FindingStatus,
    #[serde(default)]
    pub content_length: Option<u64>,
    #[serde(default)]
    pub directory_listing: bool,
    #[serde(default)]
    pub source: Source,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl RawFinding {
    pub fn into_finding(self, url: &str) -> Finding {
        Finding {
            url: url.to_string(),
            status: self.status_code,
            content_length: self.content_length.unwrap_or(0),
            listing_exposed: self.directory_listing,
            source: self.source,
            note: self.note,
        }
    }
}

/// Per-target block of the backend response.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RawTargetResult {
    #[serde(default)]
    pub directories: OrderedMap<RawFinding>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub server_info: Option<Value>,
}

/// Whole backend response: target -> results, in backend order.
pub type RawPayload = OrderedMap<RawTargetResult>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ScanMode {
    #[default]
    #[serde(rename = "normal")]
    Standard,
    /// Requests are routed through the backend's Tor proxy.
    #[serde(rename = "darkweb")]
    OnionProxied,
}

impl ScanMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ScanMode::Standard => "normal",
            ScanMode::OnionProxied => "darkweb",
        }
    }
}

impl FromStr for ScanMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "normal" | "standard" => Ok(ScanMode::Standard),
            "darkweb" | "onion" | "tor" => Ok(ScanMode::OnionProxied),
            other => Err(format!("unknown scan mode: {other}")),
        }
    }
}

#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    Basic { username: String, password: String },
    SessionCookie(String),
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Credentials::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Credentials::SessionCookie(_) => f.write_str("SessionCookie(<redacted>)"),
        }
    }
}

impl Credentials {
    /// A non-empty cookie string wins over a username.
    pub fn from_parts(
        username: Option<String>,
        password: Option<String>,
        cookies: Option<String>,
    ) -> Option<Credentials> {
        if let Some(c) = cookies.filter(|c| !c.trim().is_empty()) {
            return Some(Credentials::SessionCookie(c.trim().to_string()));
        }
        let username = username.filter(|u| !u.trim().is_empty())?;
        Some(Credentials::Basic { username, password: password.unwrap_or_default() })
    }
}

/// Immutable description of one scan submission.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub targets: Vec<String>,
    pub mode: ScanMode,
    pub exclusions: BTreeSet<String>,
    pub max_depth: u32,
    pub respect_robots: bool,
    pub use_baseline: bool,
    pub operations: Vec<DictOp>,
    pub dictionary: Vec<PathEntry>,
    pub credentials: Option<Credentials>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accepts_codes_and_sentinels() {
        let v: Vec<FindingStatus> =
            serde_json::from_str(r#"[200, "EXCLUDED", "NO_RESPONSE_OR_ERROR", "SCANNER_TASK_ERROR", "404"]"#)
                .unwrap();
        assert_eq!(
            v,
            vec![
                FindingStatus::Code(200),
                FindingStatus::Excluded,
                FindingStatus::NoResponse,
                FindingStatus::TaskError,
                FindingStatus::Code(404),
            ]
        );
        assert_eq!(serde_json::to_string(&FindingStatus::Excluded).unwrap(), r#""EXCLUDED""#);
        assert_eq!(serde_json::to_string(&FindingStatus::Code(403)).unwrap(), "403");
    }

    #[test]
    fn unknown_source_tag_falls_back() {
        let raw: RawFinding =
            serde_json::from_str(r#"{"status_code":200,"content_length":null,"source":"sitemap"}"#).unwrap();
        assert_eq!(raw.source, Source::Unknown);
        assert_eq!(raw.content_length, None);
        assert!(!raw.directory_listing);
    }

    #[test]
    fn ordered_map_keeps_document_order() {
        let m: OrderedMap<u8> = serde_json::from_str(r#"{"z":1,"a":2,"m":3}"#).unwrap();
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["z", "a", "m"]);
        assert_eq!(serde_json::to_string(&m).unwrap(), r#"{"z":1,"a":2,"m":3}"#);
    }

    #[test]
    fn ordered_map_replace_keeps_position() {
        let mut m: OrderedMap<u8> = serde_json::from_str(r#"{"z":1,"a":2,"z":3}"#).unwrap();
        assert_eq!(m.keys().collect::<Vec<_>>(), vec!["z", "a"]);
        assert_eq!(m["z"], 3);
        m.insert("a".to_string(), 9);
        assert_eq!(m.iter().map(|(k, v)| (k.as_str(), *v)).collect::<Vec<_>>(), vec![("z", 3), ("a", 9)]);
    }

    #[test]
    fn cookie_string_takes_precedence() {
        let c = Credentials::from_parts(Some("bob".into()), Some("pw".into()), Some(" sid=1 ".into()));
        assert_eq!(c, Some(Credentials::SessionCookie("sid=1".into())));
        assert_eq!(Credentials::from_parts(Some("  ".into()), None, Some("".into())), None);
    }

    #[test]
    fn credentials_debug_hides_secret() {
        let c = Credentials::Basic { username: "bob".into(), password: "hunter2".into() };
        assert!(!format!("{c:?}").contains("hunter2"));
    }
}
