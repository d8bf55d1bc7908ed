use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;
use thiserror::Error;

/// One candidate path, always ending with `/`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PathEntry(String);

impl PathEntry {
    /// Trim and append a trailing `/` if missing. Blank input yields `None`.
    pub fn normalize(raw: &str) -> Option<PathEntry> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return None;
        }
        if trimmed.ends_with('/') {
            Some(PathEntry(trimmed.to_string()))
        } else {
            Some(PathEntry(format!("{trimmed}/")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PathEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One recorded user edit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum DictOp {
    Add { paths: Vec<PathEntry> },
    Remove { paths: Vec<PathEntry> },
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum DictionaryError {
    #[error("path is empty")]
    EmptyPath,
    #[error("{0} already exists in the dictionary")]
    Duplicate(PathEntry),
}

/// Baseline plus an ordered edit log, with the resulting effective list kept
/// in insertion order.
#[derive(Debug, Clone, PartialEq)]
pub struct Dictionary {
    baseline: Vec<PathEntry>,
    log: Vec<DictOp>,
    use_baseline: bool,
    current: Vec<PathEntry>,
}

impl Dictionary {
    /// Start from `baseline`, in use, with an empty edit log.
    pub fn new(baseline: Vec<PathEntry>) -> Self {
        let mut seen = HashSet::new();
        let baseline: Vec<PathEntry> = baseline.into_iter().filter(|p| seen.insert(p.clone())).collect();
        Self {
            current: baseline.clone(),
            baseline,
            log: Vec::new(),
            use_baseline: true,
        }
    }

    pub fn use_baseline(&self) -> bool {
        self.use_baseline
    }

    pub fn baseline(&self) -> &[PathEntry] {
        &self.baseline
    }

    pub fn operations(&self) -> &[DictOp] {
        &self.log
    }

    /// Effective paths in the order they became members.
    pub fn paths(&self) -> &[PathEntry] {
        &self.current
    }

    pub fn contains(&self, path: &PathEntry) -> bool {
        self.current.contains(path)
    }

    /// Toggling resets the edit log either way: on gives the baseline, off gives nothing.
    pub fn set_use_baseline(&mut self, on: bool) {
        self.use_baseline = on;
        self.log.clear();
        self.current = if on { self.baseline.clone() } else { Vec::new() };
    }

    pub fn add_path(&mut self, raw: &str) -> Result<PathEntry, DictionaryError> {
        let path = PathEntry::normalize(raw).ok_or(DictionaryError::EmptyPath)?;
        if self.contains(&path) {
            return Err(DictionaryError::Duplicate(path));
        }
        self.log.push(DictOp::Add { paths: vec![path.clone()] });
        self.current.push(path.clone());
        Ok(path)
    }

    /// Returns whether anything was removed. Absent paths leave the log untouched.
    pub fn remove_path(&mut self, raw: &str) -> bool {
        let Some(path) = PathEntry::normalize(raw) else {
            return false;
        };
        let Some(pos) = self.current.iter().position(|p| *p == path) else {
            return false;
        };
        self.current.remove(pos);
        self.log.push(DictOp::Remove { paths: vec![path] });
        true
    }

    /// Recompute membership from the baseline flag and the edit log alone.
    pub fn effective_set(&self) -> BTreeSet<PathEntry> {
        replay(
            if self.use_baseline { self.baseline.as_slice() } else { &[] },
            &self.log,
        )
    }
}

impl Default for Dictionary {
    fn default() -> Self {
        Self::new(default_paths())
    }
}

/// Apply `ops` in order over `start`. Adds and removes are idempotent.
pub fn replay(start: &[PathEntry], ops: &[DictOp]) -> BTreeSet<PathEntry> {
    let mut set: BTreeSet<PathEntry> = start.iter().cloned().collect();
    for op in ops {
        match op {
            DictOp::Add { paths } => set.extend(paths.iter().cloned()),
            DictOp::Remove { paths } => {
                for p in paths {
                    set.remove(p);
                }
            }
        }
    }
    set
}

/// Parse dictionary file content into a deduplicated, normalized path list.
///
/// Supported formats per line:
/// - a single path: `admin` or `admin/`
/// - comments: everything after `#` is ignored
/// - whitespace and blank lines are ignored
pub fn parse_paths_str(s: &str) -> Vec<PathEntry> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    for raw_line in s.lines() {
        let line = raw_line.split('#').next().unwrap_or("");
        if let Some(p) = PathEntry::normalize(line) {
            if seen.insert(p.clone()) {
                out.push(p);
            }
        }
    }

    out
}

/// Load a dictionary from a file path. Errors if the file cannot be read.
pub fn load_paths_from_path(path: impl AsRef<Path>) -> Result<Vec<PathEntry>> {
    let content = fs::read_to_string(path.as_ref())
        .with_context(|| format!("failed to read dictionary file: {}", path.as_ref().display()))?;
    Ok(parse_paths_str(&content))
}

/// Small built-in directory list used when nothing else is configured.
pub fn default_paths() -> Vec<PathEntry> {
    const DEFAULT: &[&str] = &["admin", "backup", "config", "logs", "test", "phpmyadmin", "wp-admin"];
    DEFAULT.iter().filter_map(|p| PathEntry::normalize(p)).collect()
}
