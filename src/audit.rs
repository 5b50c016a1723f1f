//! One audit run: inventory in, filtered report out.
//!
//! Per-record problems (unparseable listing lines, failed adapters,
//! undecidable version comparisons) are counted in the report summary.
//! Only an empty inventory or an empty corpus fails the run.

use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info};

use crate::config::{Config, IgnoreConfig};
use crate::corpus::CorpusSnapshot;
use crate::error::AuditError;
use crate::inventory::{Inventory, InventorySummary};
use crate::matcher::match_inventory;
use crate::model::{MatchResult, Severity};
use crate::report::{self, AuditReport, ReportEntry, ReportSummary, Verbosity};
use crate::scanner::Adapter;

/// What to report and what to leave out.
#[derive(Debug, Clone, PartialEq)]
pub struct AuditOptions {
    pub min_severity: Severity,
    pub verbosity: Verbosity,
    pub ignore: IgnoreConfig,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            min_severity: Severity::Low,
            verbosity: Verbosity::Brief,
            ignore: IgnoreConfig::default(),
        }
    }
}

impl AuditOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            min_severity: config.min_severity,
            verbosity: Verbosity::from_level(config.verbosity),
            ignore: config.ignore.clone(),
        }
    }
}

/// Collects packages with `adapters`, then audits them against `corpus`.
pub async fn collect_and_audit(
    adapters: &[Adapter],
    adapter_timeout: Duration,
    corpus: &CorpusSnapshot,
    options: &AuditOptions,
) -> Result<AuditReport, AuditError> {
    let (inventory, summary) = Inventory::collect(adapters, adapter_timeout).await;
    audit(inventory, &summary, corpus, options)
}

/// Matches an assembled inventory against `corpus` and builds the report.
///
/// # Errors
///
/// [`AuditError::EmptyInventory`] when no package was collected at all,
/// [`AuditError::EmptyCorpus`] when the corpus holds no records.
pub fn audit(
    mut inventory: Inventory,
    inventory_summary: &InventorySummary,
    corpus: &CorpusSnapshot,
    options: &AuditOptions,
) -> Result<AuditReport, AuditError> {
    if inventory.is_empty() {
        return Err(AuditError::EmptyInventory);
    }
    if corpus.is_empty() {
        return Err(AuditError::EmptyCorpus);
    }

    let collected = inventory.len();
    if !options.ignore.packages.is_empty() {
        inventory.retain(|package| !options.ignore.should_ignore_package(package));
    }
    let ignored_packages = collected - inventory.len();
    if ignored_packages > 0 {
        debug!("Ignoring {} packages", ignored_packages);
    }

    let outcome = match_inventory(&inventory, corpus);
    let total_matches = outcome.results.len();

    let reportable: Vec<MatchResult<'_>> = outcome
        .results
        .into_iter()
        .filter(|result| !options.ignore.should_ignore_vulnerability(result.cve_id()))
        .collect();
    let ignored = total_matches - reportable.len();

    let entries: Vec<ReportEntry> = report::filter(&reportable, options.min_severity)
        .iter()
        .map(|result| ReportEntry::from_match(result, options.verbosity))
        .collect();

    let mut packages_by_kind = BTreeMap::new();
    for package in inventory.packages() {
        *packages_by_kind.entry(package.repository_kind).or_insert(0) += 1;
    }

    let summary = ReportSummary {
        packages_scanned: inventory.len(),
        packages_by_kind,
        skipped_lines: inventory_summary.skipped_lines,
        failed_adapters: inventory_summary
            .failed_adapters
            .iter()
            .map(|(kind, reason)| format!("{}: {}", kind.display_name(), reason))
            .collect(),
        corpus_records: corpus.len(),
        corpus_updated_at: corpus.updated_at(),
        total_matches,
        ignored,
        ignored_packages,
        unresolved_comparisons: outcome.stats.unresolved_comparisons,
        ..ReportSummary::default()
    };

    info!(
        packages = summary.packages_scanned,
        matches = total_matches,
        reported = entries.len(),
        "Audit finished"
    );

    Ok(AuditReport::new(
        entries,
        summary,
        options.min_severity,
        options.verbosity,
    ))
}
