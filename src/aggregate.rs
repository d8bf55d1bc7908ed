use std::collections::HashMap;

use serde_json::Value;

use crate::types::{Finding, OrderedMap, RawPayload};

/// Findings keyed by URL, iterated in first-insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindingSet {
    entries: Vec<Finding>,
    index: HashMap<String, usize>,
}

impl FindingSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a finding; an existing entry for the same URL is replaced whole.
    /// Returns the finding that was replaced, if any.
    pub fn insert(&mut self, finding: Finding) -> Option<Finding> {
        match self.index.get(&finding.url) {
            Some(&i) => Some(std::mem::replace(&mut self.entries[i], finding)),
            None => {
                self.index.insert(finding.url.clone(), self.entries.len());
                self.entries.push(finding);
                None
            }
        }
    }

    pub fn get(&self, url: &str) -> Option<&Finding> {
        self.index.get(url).map(|&i| &self.entries[i])
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Finding> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a FindingSet {
    type Item = &'a Finding;
    type IntoIter = std::slice::Iter<'a, Finding>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Output of [`merge`]: unified findings plus server info kept per target.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Merged {
    pub findings: FindingSet,
    pub server_info: OrderedMap<Value>,
}

/// Fold every target's directory map into one set, in target order.
///
/// A URL reported by more than one target keeps the entry from the last
/// target that reported it.
pub fn merge(payload: &RawPayload) -> Merged {
    let mut merged = Merged::default();
    for (target, result) in payload.iter() {
        for (url, raw) in result.directories.iter() {
            if merged.findings.insert(raw.clone().into_finding(url)).is_some() {
                tracing::debug!(host = %target, url = %url, "url reported by several targets, keeping the later one");
            }
        }
        if let Some(info) = &result.server_info {
            merged.server_info.insert(target.clone(), info.clone());
        }
    }
    merged
}
