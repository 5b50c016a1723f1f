//! Error taxonomy for the audit engine.
//!
//! Per-record failures (a bad adapter line, an unparseable version, a
//! malformed feed entry) are recovered where they happen and only counted.
//! The types here let callers see *why* something was skipped without any
//! of them aborting a scan. Only [`AuditError`] is a hard failure.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use crate::version::Scheme;

/// A single line of package-manager output that could not be turned into
/// a package record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}: {reason} ({content:?})")]
pub struct AdapterParseError {
    /// 1-based line number (or entry index for JSON documents).
    pub line: usize,
    pub content: String,
    pub reason: String,
}

impl AdapterParseError {
    pub fn new(line: usize, content: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            line,
            content: content.into(),
            reason: reason.into(),
        }
    }
}

/// Running a package manager's listing command failed.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error("failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: String,
        stderr: String,
    },
}

/// Why two versions could not be ordered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompareError {
    #[error("cannot compare {left} version with {right} version")]
    SchemeMismatch { left: Scheme, right: Scheme },

    #[error("{version:?} is not a valid {scheme} version")]
    UnknownScheme { version: String, scheme: Scheme },

    #[error("{version:?} is not an orderable version")]
    Unresolvable { version: String },
}

/// A whole feed batch was rejected. The store is left untouched.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("feed request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("feed returned HTTP {status} for {url}")]
    Status { status: u16, url: String },

    #[error("feed fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("feed document is not usable: {0}")]
    Envelope(String),

    #[error("failed to read feed file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A single feed entry that could not be mapped to a vulnerability record.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("invalid CVE identifier {0:?}")]
    InvalidId(String),

    #[error("{cve_id}: missing field `{field}`")]
    MissingField { cve_id: String, field: &'static str },

    #[error("{cve_id}: invalid published date {value:?}")]
    InvalidDate { cve_id: String, value: String },

    #[error("{cve_id}: invalid affected range: {reason}")]
    InvalidRange { cve_id: String, reason: String },

    #[error("entry {index} is not a CVE object: {reason}")]
    Shape { index: usize, reason: String },
}

/// Loading or persisting the corpus failed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("corpus file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("corpus file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("corpus format {found} is not compatible with {expected}")]
    IncompatibleFormat {
        found: semver::Version,
        expected: semver::Version,
    },
}

/// The only failures that abort an audit run.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuditError {
    #[error("no packages were collected from any package manager")]
    EmptyInventory,

    #[error("the vulnerability corpus is empty; run `pkgaudit update` or import a feed")]
    EmptyCorpus,
}
