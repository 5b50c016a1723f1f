//! Joins an inventory against a corpus snapshot.

use rayon::prelude::*;
use serde::Serialize;
use std::ops::AddAssign;
use tracing::{debug, trace};

use crate::corpus::CorpusSnapshot;
use crate::inventory::Inventory;
use crate::model::{MatchResult, PackageRecord};
use crate::version::{check_range, RangeCheck, Scheme};

/// Counters from one matching pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MatchStats {
    pub packages_checked: usize,
    /// CVE records returned by product lookups, summed over packages.
    pub candidate_records: usize,
    pub ranges_tested: usize,
    /// Range tests that could not be decided (unparseable or unorderable
    /// versions) and so did not match.
    pub unresolved_comparisons: usize,
}

impl AddAssign for MatchStats {
    fn add_assign(&mut self, other: Self) {
        self.packages_checked += other.packages_checked;
        self.candidate_records += other.candidate_records;
        self.ranges_tested += other.ranges_tested;
        self.unresolved_comparisons += other.unresolved_comparisons;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MatchOutcome<'a> {
    pub results: Vec<MatchResult<'a>>,
    pub stats: MatchStats,
}

/// Matches every package of `inventory` against `corpus`.
///
/// One result is produced per matching range, so a package can appear
/// several times for the same CVE. Results are ordered by CVE id, package
/// name, repository kind, then range position. Neither input is modified
/// and the same inputs always give the same outcome.
pub fn match_inventory<'a>(inventory: &'a Inventory, corpus: &'a CorpusSnapshot) -> MatchOutcome<'a> {
    let packages: Vec<&PackageRecord> = inventory.packages().collect();

    let (mut results, stats) = packages
        .into_par_iter()
        .map(|package| match_package(package, corpus))
        .reduce(
            || (Vec::new(), MatchStats::default()),
            |(mut results, mut stats), (more, more_stats)| {
                results.extend(more);
                stats += more_stats;
                (results, stats)
            },
        );

    results.sort_by(|a, b| {
        a.cve_id()
            .cmp(b.cve_id())
            .then_with(|| a.package.name.cmp(&b.package.name))
            .then_with(|| a.package.repository_kind.cmp(&b.package.repository_kind))
            .then_with(|| a.range_index.cmp(&b.range_index))
    });

    debug!(
        packages = stats.packages_checked,
        candidates = stats.candidate_records,
        ranges = stats.ranges_tested,
        unresolved = stats.unresolved_comparisons,
        matches = results.len(),
        "Matching finished"
    );

    MatchOutcome { results, stats }
}

/// Matches a single package.
pub fn match_package<'a>(
    package: &'a PackageRecord,
    corpus: &'a CorpusSnapshot,
) -> (Vec<MatchResult<'a>>, MatchStats) {
    let scheme = Scheme::for_kind(package.repository_kind);
    let mut stats = MatchStats {
        packages_checked: 1,
        ..MatchStats::default()
    };
    let mut results = Vec::new();

    let candidates = corpus.lookup(&package.name, package.repository_kind);
    stats.candidate_records = candidates.len();

    for cve in candidates {
        for (range_index, range) in corpus.ranges_for(cve, &package.name, package.repository_kind) {
            stats.ranges_tested += 1;
            match check_range(&package.version, range, scheme) {
                RangeCheck::Inside => results.push(MatchResult {
                    package,
                    cve,
                    matched_range: range,
                    range_index,
                }),
                RangeCheck::Outside => {}
                RangeCheck::Unresolved(reason) => {
                    stats.unresolved_comparisons += 1;
                    trace!(
                        "{} {} vs {} range {}: {}",
                        package.name,
                        package.version,
                        cve.cve_id,
                        range.describe(),
                        reason
                    );
                }
            }
        }
    }

    (results, stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::corpus::CorpusStore;
    use crate::model::{ProductRange, RepositoryKind, Severity, VulnerabilityRecord};
    use chrono::{TimeZone, Utc};

    fn cve(id: &str, severity: Severity) -> VulnerabilityRecord {
        VulnerabilityRecord::new(
            id,
            severity,
            "test vulnerability",
            Utc.with_ymd_and_hms(2021, 1, 1, 0, 0, 0).unwrap(),
        )
    }

    fn openssl_inventory() -> Inventory {
        vec![PackageRecord::new("openssl", "1.1.1-1ubuntu2.1", RepositoryKind::DebianApt)]
            .into_iter()
            .collect()
    }

    #[test]
    fn test_openssl_scenario_matches_once() {
        let store = CorpusStore::new();
        store
            .upsert(cve("CVE-2021-3449", Severity::Critical).with_range(
                ProductRange::new("openssl")
                    .start_including("1.1.1")
                    .end_excluding("1.1.1-1ubuntu2.2"),
            ))
            .unwrap();
        let snapshot = store.snapshot();
        let inventory = openssl_inventory();

        let outcome = match_inventory(&inventory, &snapshot);

        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].cve_id(), "CVE-2021-3449");
        assert_eq!(outcome.results[0].cve.severity, Severity::Critical);
        assert_eq!(outcome.stats.ranges_tested, 1);
    }

    #[test]
    fn test_range_below_installed_version_does_not_match() {
        let store = CorpusStore::new();
        store
            .upsert(
                cve("CVE-2020-1967", Severity::High)
                    .with_range(ProductRange::new("openssl").end_excluding("1.1.1")),
            )
            .unwrap();
        let snapshot = store.snapshot();
        let inventory = openssl_inventory();

        let outcome = match_inventory(&inventory, &snapshot);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats.candidate_records, 1);
    }

    #[test]
    fn test_docker_latest_never_matches_bounded_range() {
        let store = CorpusStore::new();
        for (i, severity) in [Severity::Low, Severity::Critical].into_iter().enumerate() {
            store
                .upsert(
                    cve(&format!("CVE-2023-000{}", i + 1), severity)
                        .with_range(ProductRange::new("nginx").start_including("1.0").end_excluding("99.0")),
                )
                .unwrap();
        }
        let snapshot = store.snapshot();
        let inventory: Inventory = vec![PackageRecord::new("nginx", "latest", RepositoryKind::Docker)]
            .into_iter()
            .collect();

        let outcome = match_inventory(&inventory, &snapshot);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats.unresolved_comparisons, 2);
    }

    #[test]
    fn test_overlapping_ranges_are_all_reported() {
        let store = CorpusStore::new();
        store
            .upsert(
                cve("CVE-2022-1234", Severity::Medium)
                    .with_range(ProductRange::new("requests").end_excluding("2.32.0"))
                    .with_range(ProductRange::new("requests").start_including("2.0").end_including("2.31.0"))
                    .with_range(ProductRange::new("urllib3").end_excluding("2.0")),
            )
            .unwrap();
        let snapshot = store.snapshot();
        let inventory: Inventory = vec![PackageRecord::new("requests", "2.31.0", RepositoryKind::PythonPip)]
            .into_iter()
            .collect();

        let outcome = match_inventory(&inventory, &snapshot);
        let indexes: Vec<usize> = outcome.results.iter().map(|r| r.range_index).collect();
        assert_eq!(indexes, vec![0, 1]);
    }

    #[test]
    fn test_matching_is_idempotent_and_ordered() {
        let store = CorpusStore::new();
        store
            .upsert(cve("CVE-2022-0002", Severity::High).with_range(ProductRange::new("curl")))
            .unwrap();
        store
            .upsert(cve("CVE-2022-0001", Severity::Low).with_range(ProductRange::new("curl")))
            .unwrap();
        store
            .upsert(cve("CVE-2022-0003", Severity::Unknown).with_range(ProductRange::new("bash").exact("5.0")))
            .unwrap();
        let snapshot = store.snapshot();
        let inventory: Inventory = vec![
            PackageRecord::new("curl", "7.68.0-1ubuntu2", RepositoryKind::DebianApt),
            PackageRecord::new("curl", "8.4.0", RepositoryKind::Homebrew),
            PackageRecord::new("bash", "5.0", RepositoryKind::Homebrew),
        ]
        .into_iter()
        .collect();

        let first = match_inventory(&inventory, &snapshot);
        let second = match_inventory(&inventory, &snapshot);
        assert_eq!(first, second);

        let keys: Vec<(&str, RepositoryKind)> = first
            .results
            .iter()
            .map(|r| (r.cve_id(), r.package.repository_kind))
            .collect();
        assert_eq!(
            keys,
            vec![
                ("CVE-2022-0001", RepositoryKind::DebianApt),
                ("CVE-2022-0001", RepositoryKind::Homebrew),
                ("CVE-2022-0002", RepositoryKind::DebianApt),
                ("CVE-2022-0002", RepositoryKind::Homebrew),
                ("CVE-2022-0003", RepositoryKind::Homebrew),
            ]
        );
    }

    #[test]
    fn test_unparseable_version_still_matches_exact_string() {
        let store = CorpusStore::new();
        store
            .upsert(
                cve("CVE-2019-0001", Severity::High)
                    .with_range(ProductRange::new("weird").exact("build-2019"))
                    .with_range(ProductRange::new("weird").end_excluding("2.0")),
            )
            .unwrap();
        let snapshot = store.snapshot();
        let inventory: Inventory = vec![PackageRecord::new("weird", "build-2019", RepositoryKind::Homebrew)]
            .into_iter()
            .collect();

        let outcome = match_inventory(&inventory, &snapshot);
        assert_eq!(outcome.results.len(), 1);
        assert_eq!(outcome.results[0].range_index, 0);
        assert_eq!(outcome.stats.unresolved_comparisons, 1);
    }

    #[test]
    fn test_empty_inputs() {
        let store = CorpusStore::new();
        let snapshot = store.snapshot();
        let inventory = Inventory::new();
        let outcome = match_inventory(&inventory, &snapshot);
        assert!(outcome.results.is_empty());
        assert_eq!(outcome.stats, MatchStats::default());
    }
}
