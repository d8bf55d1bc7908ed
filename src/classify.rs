//! Named result categories, orderings and the summary block.
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::aggregate::FindingSet;
use crate::session::ScanSession;
use crate::types::{Finding, FindingStatus};

/// A named view over the merged findings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    /// 200/403 from any source.
    #[default]
    Successful,
    /// 200/403 from JS-discovered API paths or bases.
    ApiEndpoints,
    /// 200/403 from everything that is not API discovery.
    Directories,
    All,
    Excluded,
    Errors,
}

impl Category {
    pub fn matches(self, f: &Finding) -> bool {
        match self {
            Category::Successful => f.status.is_success(),
            Category::ApiEndpoints => f.status.is_success() && f.source.is_api(),
            Category::Directories => f.status.is_success() && !f.source.is_api(),
            Category::All => true,
            Category::Excluded => f.status == FindingStatus::Excluded,
            Category::Errors => matches!(f.status, FindingStatus::NoResponse | FindingStatus::TaskError),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Successful => "successful",
            Category::ApiEndpoints => "api",
            Category::Directories => "directories",
            Category::All => "all",
            Category::Excluded => "excluded",
            Category::Errors => "errors",
        }
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "successful" | "success" => Ok(Category::Successful),
            "api" | "api_endpoints" => Ok(Category::ApiEndpoints),
            "directories" | "dirs" => Ok(Category::Directories),
            "all" => Ok(Category::All),
            "excluded" => Ok(Category::Excluded),
            "errors" | "error" => Ok(Category::Errors),
            other => Err(format!("unknown filter: {other}")),
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    #[default]
    Url,
    Status,
    Length,
    Listing,
    Source,
}

impl FromStr for SortKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "url" => Ok(SortKey::Url),
            "status" | "status_code" => Ok(SortKey::Status),
            "length" | "content_length" => Ok(SortKey::Length),
            "listing" | "directory_listing" => Ok(SortKey::Listing),
            "source" => Ok(SortKey::Source),
            other => Err(format!("unknown sort key: {other}")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

impl SortDirection {
    pub fn flipped(self) -> Self {
        match self {
            SortDirection::Ascending => SortDirection::Descending,
            SortDirection::Descending => SortDirection::Ascending,
        }
    }
}

impl FromStr for SortDirection {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortDirection::Ascending),
            "desc" | "descending" => Ok(SortDirection::Descending),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Column-header style sort selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SortState {
    pub key: SortKey,
    pub direction: SortDirection,
}

impl SortState {
    /// Same key flips direction; a new key starts ascending.
    pub fn select(&mut self, key: SortKey) {
        if self.key == key {
            self.direction = self.direction.flipped();
        } else {
            self.key = key;
            self.direction = SortDirection::Ascending;
        }
    }
}

/// Ascending comparison for `key`.
///
/// For `Listing`, API-sourced rows group ahead of everything else before the
/// flag itself is compared.
pub fn compare(key: SortKey, a: &Finding, b: &Finding) -> Ordering {
    match key {
        SortKey::Url => a.url.cmp(&b.url),
        SortKey::Status => a.status.to_string().cmp(&b.status.to_string()),
        SortKey::Length => a.effective_length().cmp(&b.effective_length()),
        SortKey::Listing => (!a.source.is_api(), a.listing_exposed).cmp(&(!b.source.is_api(), b.listing_exposed)),
        SortKey::Source => a.source.display_name().cmp(b.source.display_name()),
    }
}

/// Stable sort; equal keys keep their existing relative order.
pub fn sort_findings(rows: &mut [&Finding], sort: SortState) {
    rows.sort_by(|a, b| {
        let ord = compare(sort.key, a, b);
        match sort.direction {
            SortDirection::Ascending => ord,
            SortDirection::Descending => ord.reverse(),
        }
    });
}

pub fn filter(set: &FindingSet, category: Category) -> Vec<&Finding> {
    set.iter().filter(|f| category.matches(f)).collect()
}

/// Filtered and optionally sorted rows, ready to display.
pub fn view(set: &FindingSet, category: Category, sort: Option<SortState>) -> Vec<&Finding> {
    let mut rows = filter(set, category);
    if let Some(sort) = sort {
        sort_findings(&mut rows, sort);
    }
    rows
}

/// Headline numbers for a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub targets: usize,
    pub total_paths: usize,
    pub successful_paths: usize,
    pub api_endpoints_found: usize,
    pub duration_seconds: f64,
}

impl Summary {
    /// `None` while the session has no end time.
    pub fn from_session(session: &ScanSession) -> Option<Summary> {
        let meta = session.metadata.as_ref()?;
        let millis = meta.duration_millis()?;
        Some(Summary {
            targets: meta.request.targets.len(),
            total_paths: session.findings.len(),
            successful_paths: filter(&session.findings, Category::Directories).len(),
            api_endpoints_found: filter(&session.findings, Category::ApiEndpoints).len(),
            // Round half up to hundredths on the integer value.
            duration_seconds: (millis + 5).div_euclid(10) as f64 / 100.0,
        })
    }

    /// Duration with two decimals, e.g. `"3.40"`.
    pub fn duration_display(&self) -> String {
        format!("{:.2}", self.duration_seconds)
    }
}
