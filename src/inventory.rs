//! The deduplicated set of installed packages for one audit run.

use futures::future::join_all;
use serde::Serialize;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::model::{PackageRecord, RepositoryKind};
use crate::scanner::{Adapter, AdapterOutput};

/// Installed packages keyed by `(repository_kind, name)`.
///
/// Inserting a package that is already present replaces it: the last
/// version seen wins. Iteration order is by kind, then name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Inventory {
    packages: BTreeMap<(RepositoryKind, String), PackageRecord>,
}

/// What happened while assembling an inventory.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InventorySummary {
    pub packages_by_kind: BTreeMap<RepositoryKind, usize>,
    pub skipped_lines: usize,
    pub duplicates: usize,
    /// Adapters whose listing command failed, with the reason.
    pub failed_adapters: Vec<(RepositoryKind, String)>,
}

impl InventorySummary {
    pub fn total_packages(&self) -> usize {
        self.packages_by_kind.values().sum()
    }
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds an inventory from parsed adapter outputs, in order.
    pub fn from_outputs(outputs: impl IntoIterator<Item = AdapterOutput>) -> (Self, InventorySummary) {
        let mut inventory = Inventory::new();
        let mut summary = InventorySummary::default();
        for output in outputs {
            inventory.absorb(output, &mut summary);
        }
        summary.packages_by_kind = inventory.count_by_kind();
        (inventory, summary)
    }

    /// Runs the given adapters concurrently and assembles their records.
    ///
    /// An adapter that fails is logged and recorded in the summary; the
    /// others still contribute.
    pub async fn collect(adapters: &[Adapter], timeout: Duration) -> (Self, InventorySummary) {
        let runs = adapters.iter().map(|adapter| async move {
            let result = adapter.collect(timeout).await;
            (*adapter, result)
        });
        let results = join_all(runs).await;

        let mut inventory = Inventory::new();
        let mut summary = InventorySummary::default();
        for (adapter, result) in results {
            match result {
                Ok(output) => {
                    tracing::debug!(
                        adapter = adapter.name(),
                        records = output.records.len(),
                        skipped = output.skipped_count(),
                        "adapter finished"
                    );
                    inventory.absorb(output, &mut summary);
                }
                Err(e) => {
                    tracing::warn!("{} failed: {}", adapter.name(), e);
                    summary.failed_adapters.push((adapter.kind(), e.to_string()));
                }
            }
        }
        summary.packages_by_kind = inventory.count_by_kind();
        (inventory, summary)
    }

    fn absorb(&mut self, output: AdapterOutput, summary: &mut InventorySummary) {
        for skipped in &output.skipped {
            tracing::trace!(kind = %output.kind, "skipped {}", skipped);
        }
        summary.skipped_lines += output.skipped.len();
        for record in output.records {
            if self.insert(record).is_some() {
                summary.duplicates += 1;
            }
        }
    }

    /// Adds a package, returning the record it replaced, if any.
    pub fn insert(&mut self, record: PackageRecord) -> Option<PackageRecord> {
        let key = (record.repository_kind, record.name.clone());
        self.packages.insert(key, record)
    }

    pub fn get(&self, name: &str, kind: RepositoryKind) -> Option<&PackageRecord> {
        self.packages.get(&(kind, name.to_string()))
    }

    pub fn packages(&self) -> impl Iterator<Item = &PackageRecord> {
        self.packages.values()
    }

    /// Drops packages for which `keep` returns false.
    pub fn retain(&mut self, mut keep: impl FnMut(&PackageRecord) -> bool) {
        self.packages.retain(|_, record| keep(record));
    }

    pub fn len(&self) -> usize {
        self.packages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty()
    }

    fn count_by_kind(&self) -> BTreeMap<RepositoryKind, usize> {
        let mut counts = BTreeMap::new();
        for (kind, _) in self.packages.keys() {
            *counts.entry(*kind).or_insert(0) += 1;
        }
        counts
    }
}

impl FromIterator<PackageRecord> for Inventory {
    fn from_iter<I: IntoIterator<Item = PackageRecord>>(iter: I) -> Self {
        let mut inventory = Inventory::new();
        for record in iter {
            inventory.insert(record);
        }
        inventory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_seen_version_wins() {
        let inventory: Inventory = vec![
            PackageRecord::new("openssl", "1.1.1f-1", RepositoryKind::DebianApt),
            PackageRecord::new("openssl", "1.1.1f-2", RepositoryKind::DebianApt),
            PackageRecord::new("openssl", "3.1.4-1", RepositoryKind::ArchPacman),
        ]
        .into_iter()
        .collect();

        assert_eq!(inventory.len(), 2);
        assert_eq!(
            inventory.get("openssl", RepositoryKind::DebianApt).unwrap().version,
            "1.1.1f-2"
        );
    }

    #[test]
    fn test_from_outputs_summarizes() {
        let apt = Adapter::Apt.parse(
            "openssl\t1.1.1f-1\tamd64\tinstall ok installed\n\
             broken line\n\
             openssl\t1.1.1f-3\tamd64\tinstall ok installed\n",
        );
        let pip = Adapter::Pip.parse(r#"[{"name": "requests", "version": "2.31.0"}]"#);

        let (inventory, summary) = Inventory::from_outputs(vec![apt, pip]);

        assert_eq!(inventory.len(), 2);
        assert_eq!(summary.skipped_lines, 1);
        assert_eq!(summary.duplicates, 1);
        assert_eq!(summary.total_packages(), 2);
        assert_eq!(summary.packages_by_kind[&RepositoryKind::PythonPip], 1);
    }

    #[test]
    fn test_iteration_is_ordered() {
        let inventory: Inventory = vec![
            PackageRecord::new("zlib", "1.3", RepositoryKind::Homebrew),
            PackageRecord::new("bash", "5.2", RepositoryKind::Homebrew),
            PackageRecord::new("curl", "7.68.0-1", RepositoryKind::DebianApt),
        ]
        .into_iter()
        .collect();

        let names: Vec<&str> = inventory.packages().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["curl", "bash", "zlib"]);
    }

    #[tokio::test]
    async fn test_collect_with_no_adapters() {
        let (inventory, summary) = Inventory::collect(&[], Duration::from_secs(1)).await;
        assert!(inventory.is_empty());
        assert!(summary.failed_adapters.is_empty());
    }
}
