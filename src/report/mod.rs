//! Severity filtering and presentation of match results.
//!
//! [`filter`] decides *which* results are reported; [`Verbosity`] only
//! decides how much of each one is shown.
//!
//! # Example
//!
//! ```
//! use pkgaudit::report::{filter, exit_code, ReportEntry, Verbosity};
//! use pkgaudit::{MatchResult, Severity};
//!
//! let results: Vec<MatchResult> = Vec::new();
//! let kept = filter(&results, Severity::High);
//! let entries: Vec<ReportEntry> = kept.iter().map(|r| ReportEntry::from_match(r, Verbosity::Brief)).collect();
//! assert_eq!(exit_code(&entries, Some(Severity::Low)), 0);
//! ```

mod json;
mod table;

pub use json::print_json;
pub use table::print_table;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::model::{MatchResult, RepositoryKind, Severity};

/// Exit codes for CI integration
pub mod exit_codes {
    pub const SUCCESS: u8 = 0;
    pub const ERROR: u8 = 1;
    pub const CRITICAL_VULN: u8 = 2;
    pub const HIGH_VULN: u8 = 3;
    pub const MEDIUM_VULN: u8 = 4;
    pub const LOW_VULN: u8 = 5;
}

/// Keeps results whose CVE severity is at least `min_severity`.
///
/// `Unknown` severities are always kept.
pub fn filter<'a>(results: &[MatchResult<'a>], min_severity: Severity) -> Vec<MatchResult<'a>> {
    results
        .iter()
        .filter(|result| result.cve.severity.meets(min_severity))
        .copied()
        .collect()
}

/// How much detail each reported finding carries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verbosity {
    /// CVE id and severity with the affected package.
    #[default]
    Brief,
    /// Adds the matched version range.
    Ranges,
    /// Adds description, CVSS score and references.
    Full,
}

impl Verbosity {
    /// Maps a `-v` count: 0 is brief, 1 adds ranges, 2 or more is full.
    pub fn from_level(level: u8) -> Self {
        match level {
            0 => Verbosity::Brief,
            1 => Verbosity::Ranges,
            _ => Verbosity::Full,
        }
    }

    pub fn level(&self) -> u8 {
        match self {
            Verbosity::Brief => 0,
            Verbosity::Ranges => 1,
            Verbosity::Full => 2,
        }
    }
}

/// One reported finding, detached from the inventory and corpus.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportEntry {
    pub cve_id: String,
    pub severity: Severity,
    pub package: String,
    pub version: String,
    pub repository_kind: RepositoryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched_range: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl ReportEntry {
    pub fn from_match(result: &MatchResult<'_>, verbosity: Verbosity) -> Self {
        let full = verbosity >= Verbosity::Full;
        Self {
            cve_id: result.cve.cve_id.clone(),
            severity: result.cve.severity,
            package: result.package.name.clone(),
            version: result.package.version.clone(),
            repository_kind: result.package.repository_kind,
            matched_range: (verbosity >= Verbosity::Ranges).then(|| result.matched_range.describe()),
            description: full.then(|| result.cve.description.clone()),
            cvss_score: if full { result.cve.cvss_score } else { None },
            references: if full {
                result.cve.references.clone()
            } else {
                Vec::new()
            },
        }
    }
}

/// Findings per severity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SeverityCounts {
    pub critical: usize,
    pub high: usize,
    pub medium: usize,
    pub low: usize,
    pub unknown: usize,
}

impl SeverityCounts {
    pub fn from_entries(entries: &[ReportEntry]) -> Self {
        let mut counts = Self::default();
        for entry in entries {
            match entry.severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
                Severity::Unknown => counts.unknown += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> usize {
        self.critical + self.high + self.medium + self.low + self.unknown
    }
}

/// Run-level facts shown next to the findings.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ReportSummary {
    pub packages_scanned: usize,
    pub packages_by_kind: BTreeMap<RepositoryKind, usize>,
    pub skipped_lines: usize,
    pub failed_adapters: Vec<String>,
    pub corpus_records: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub corpus_updated_at: Option<DateTime<Utc>>,
    /// Findings before the severity filter and ignore rules.
    pub total_matches: usize,
    /// Findings dropped by the vulnerability ignore list.
    pub ignored: usize,
    /// Packages dropped by the package ignore list before matching.
    pub ignored_packages: usize,
    pub unresolved_comparisons: usize,
    pub severity_counts: SeverityCounts,
}

/// The complete output of one audit run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditReport {
    pub generated_at: DateTime<Utc>,
    pub min_severity: Severity,
    pub verbosity: Verbosity,
    pub summary: ReportSummary,
    pub entries: Vec<ReportEntry>,
}

impl AuditReport {
    pub fn new(
        entries: Vec<ReportEntry>,
        mut summary: ReportSummary,
        min_severity: Severity,
        verbosity: Verbosity,
    ) -> Self {
        summary.severity_counts = SeverityCounts::from_entries(&entries);
        Self {
            generated_at: Utc::now(),
            min_severity,
            verbosity,
            summary,
            entries,
        }
    }
}

/// Output format for audit reports
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    /// Human-readable table format
    Table,
    /// JSON format for programmatic use
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "table" => Ok(OutputFormat::Table),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!("Unknown format: {}. Use 'table' or 'json'", s)),
        }
    }
}

pub fn print_report(report: &AuditReport, format: OutputFormat) -> Result<()> {
    match format {
        OutputFormat::Table => {
            print_table(report);
            Ok(())
        }
        OutputFormat::Json => print_json(report),
    }
}

/// Renders a report for file output. Tables are written as JSON.
pub fn format_report_to_string(report: &AuditReport, format: OutputFormat) -> Result<String> {
    match format {
        OutputFormat::Json | OutputFormat::Table => Ok(serde_json::to_string_pretty(report)?),
    }
}

/// Exit code for `--fail-on`: the code of the most severe reported finding
/// when it reaches `fail_on`, success otherwise. Unknown severities never
/// fail a run.
pub fn exit_code(entries: &[ReportEntry], fail_on: Option<Severity>) -> u8 {
    let Some(threshold) = fail_on.and_then(|s| s.rank()) else {
        return exit_codes::SUCCESS;
    };

    let worst = entries
        .iter()
        .filter_map(|e| e.severity.rank().map(|rank| (rank, e.severity)))
        .max_by_key(|(rank, _)| *rank);

    match worst {
        Some((rank, severity)) if rank >= threshold => match severity {
            Severity::Critical => exit_codes::CRITICAL_VULN,
            Severity::High => exit_codes::HIGH_VULN,
            Severity::Medium => exit_codes::MEDIUM_VULN,
            Severity::Low => exit_codes::LOW_VULN,
            Severity::Unknown => exit_codes::SUCCESS,
        },
        _ => exit_codes::SUCCESS,
    }
}
