//! The vulnerability corpus: an indexed, persisted set of CVE records.
//!
//! Readers take an immutable [`CorpusSnapshot`]; writers build a new
//! snapshot and swap it in, so a lookup running during ingestion sees the
//! corpus as it was before the batch and never a half-applied one.
//!
//! # Example
//!
//! ```
//! use pkgaudit::corpus::CorpusStore;
//! use pkgaudit::RepositoryKind;
//!
//! let store = CorpusStore::new();
//! let report = store.ingest(r#"[{
//!     "cve_id": "CVE-2022-0778",
//!     "severity": "HIGH",
//!     "affected_products": [{"product": "openssl", "version_end_excluding": "1.1.1n"}],
//!     "description": "Infinite loop in BN_mod_sqrt()",
//!     "published_at": "2022-03-15T17:15:08Z"
//! }]"#);
//!
//! assert_eq!(report.merged, 1);
//! let hits = store.lookup_by_product("libssl1.1", RepositoryKind::DebianApt);
//! assert_eq!(hits[0].cve_id, "CVE-2022-0778");
//! ```

mod aliases;
mod cpe;
mod feed;
mod sync;

pub use aliases::{normalize_name, AliasTable};
pub use cpe::CpeName;
pub use feed::{parse_document, FeedBatch};
pub use sync::{FeedSource, FileFeed, NvdApiFeed, MAX_RESULTS_PER_PAGE, MAX_WINDOW_DAYS, NVD_API_URL};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::error::{EntryError, IngestError, StoreError};
use crate::model::{ProductRange, RepositoryKind, VulnerabilityRecord};

/// Version of the persisted corpus layout. Files with a different major
/// version are refused.
pub const FORMAT_VERSION: &str = "1.0.0";

/// Outcome of one ingestion batch.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    /// Valid entries written to the store.
    pub merged: usize,
    /// Of `merged`, entries that replaced an existing CVE id.
    pub replaced: usize,
    /// Entries rejected individually.
    pub skipped: usize,
    #[serde(skip)]
    pub entry_errors: Vec<EntryError>,
    /// Why the whole batch was rejected, if it was.
    pub failure: Option<String>,
}

impl IngestReport {
    fn failed(reason: impl ToString) -> Self {
        Self {
            failure: Some(reason.to_string()),
            ..Self::default()
        }
    }

    pub fn is_failure(&self) -> bool {
        self.failure.is_some()
    }
}

/// An immutable, indexed view of the corpus.
#[derive(Debug, Clone, Default)]
pub struct CorpusSnapshot {
    records: BTreeMap<String, Arc<VulnerabilityRecord>>,
    /// Canonical product key -> CVE ids naming it.
    index: BTreeMap<String, BTreeSet<String>>,
    aliases: Arc<AliasTable>,
    updated_at: Option<DateTime<Utc>>,
}

impl CorpusSnapshot {
    fn with_aliases(aliases: AliasTable) -> Self {
        Self {
            aliases: Arc::new(aliases),
            ..Self::default()
        }
    }

    fn product_keys(&self, record: &VulnerabilityRecord) -> BTreeSet<String> {
        record
            .affected_products
            .iter()
            .map(|range| self.aliases.product_key(&range.product))
            .collect()
    }

    /// Inserts or replaces by CVE id, returning whether a record was replaced.
    fn upsert(&mut self, record: VulnerabilityRecord) -> bool {
        let previous = self.records.remove(&record.cve_id);
        if let Some(old) = &previous {
            for key in self.product_keys(old) {
                if let Some(ids) = self.index.get_mut(&key) {
                    ids.remove(&old.cve_id);
                    if ids.is_empty() {
                        self.index.remove(&key);
                    }
                }
            }
        }

        for key in self.product_keys(&record) {
            self.index
                .entry(key)
                .or_default()
                .insert(record.cve_id.clone());
        }
        self.records.insert(record.cve_id.clone(), Arc::new(record));
        previous.is_some()
    }

    /// Records with at least one range naming `name` (directly or through
    /// an alias) that applies to `kind`, ordered by CVE id.
    pub fn lookup(&self, name: &str, kind: RepositoryKind) -> Vec<&VulnerabilityRecord> {
        self.lookup_in(name, Some(kind))
    }

    /// Like [`lookup`](Self::lookup), but `None` ignores repository hints
    /// and returns records for every kind.
    pub fn lookup_in(&self, name: &str, kind: Option<RepositoryKind>) -> Vec<&VulnerabilityRecord> {
        let key = self.aliases.canonical(name);
        let Some(ids) = self.index.get(&key) else {
            return Vec::new();
        };
        ids.iter()
            .filter_map(|id| self.records.get(id))
            .map(|record| record.as_ref())
            .filter(|record| !self.ranges_in(record, name, kind).is_empty())
            .collect()
    }

    /// The ranges of `record` that name `name` and apply to `kind`, with
    /// their positions.
    pub fn ranges_for<'r>(
        &self,
        record: &'r VulnerabilityRecord,
        name: &str,
        kind: RepositoryKind,
    ) -> Vec<(usize, &'r ProductRange)> {
        self.ranges_in(record, name, Some(kind))
    }

    /// The ranges of `record` that name `name`, restricted to `kind` when
    /// one is given.
    pub fn ranges_in<'r>(
        &self,
        record: &'r VulnerabilityRecord,
        name: &str,
        kind: Option<RepositoryKind>,
    ) -> Vec<(usize, &'r ProductRange)> {
        let key = self.aliases.canonical(name);
        record
            .affected_products
            .iter()
            .enumerate()
            .filter(|(_, range)| kind.map_or(true, |kind| range.applies_to(kind)))
            .filter(|(_, range)| self.aliases.product_key(&range.product) == key)
            .collect()
    }

    pub fn get(&self, cve_id: &str) -> Option<&VulnerabilityRecord> {
        self.records.get(cve_id).map(|r| r.as_ref())
    }

    /// All records, ordered by CVE id.
    pub fn records(&self) -> impl Iterator<Item = &VulnerabilityRecord> {
        self.records.values().map(|r| r.as_ref())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Total `(product, CVE)` pairs in the lookup index.
    pub fn index_entries(&self) -> usize {
        self.index.values().map(BTreeSet::len).sum()
    }

    /// CVE ids indexed under the canonical key of `product`.
    pub fn index_entries_for(&self, product: &str) -> usize {
        self.index
            .get(&self.aliases.product_key(product))
            .map_or(0, BTreeSet::len)
    }

    pub fn aliases(&self) -> &AliasTable {
        &self.aliases
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Latest modification (or publication) time of any record; the
    /// starting point of an incremental refresh.
    pub fn latest_modification(&self) -> Option<DateTime<Utc>> {
        self.records()
            .map(|r| r.last_modified.unwrap_or(r.published_at))
            .max()
    }
}

#[derive(Serialize)]
struct PersistedRef<'a> {
    format_version: &'a str,
    updated_at: Option<DateTime<Utc>>,
    records: Vec<&'a VulnerabilityRecord>,
}

#[derive(Deserialize)]
struct Persisted {
    format_version: semver::Version,
    updated_at: Option<DateTime<Utc>>,
    records: Vec<serde_json::Value>,
}

/// The corpus store: a current snapshot plus a writer lock.
#[derive(Debug)]
pub struct CorpusStore {
    current: RwLock<Arc<CorpusSnapshot>>,
    writer: Mutex<()>,
}

impl CorpusStore {
    /// An empty store using the built-in alias table.
    pub fn new() -> Self {
        Self::with_aliases(AliasTable::with_defaults())
    }

    pub fn with_aliases(aliases: AliasTable) -> Self {
        Self {
            current: RwLock::new(Arc::new(CorpusSnapshot::with_aliases(aliases))),
            writer: Mutex::new(()),
        }
    }

    /// A consistent view of the corpus as of now.
    pub fn snapshot(&self) -> Arc<CorpusSnapshot> {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Applies `change` to a copy of the current snapshot and swaps it in.
    fn write<T>(&self, change: impl FnOnce(&mut CorpusSnapshot) -> T) -> T {
        let _guard = self.writer.lock().unwrap_or_else(PoisonError::into_inner);
        let mut next = self.snapshot().as_ref().clone();
        let result = change(&mut next);
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = Arc::new(next);
        result
    }

    /// Inserts or replaces one record by CVE id.
    ///
    /// Returns whether an existing record was replaced.
    ///
    /// # Errors
    ///
    /// Returns an error if the record fails validation; the store is
    /// unchanged.
    pub fn upsert(&self, record: VulnerabilityRecord) -> Result<bool, EntryError> {
        record.validate()?;
        Ok(self.write(|snapshot| {
            snapshot.updated_at = Some(Utc::now());
            snapshot.upsert(record)
        }))
    }

    /// Records affecting `name` as installed from `kind`, ordered by CVE id.
    pub fn lookup_by_product(&self, name: &str, kind: RepositoryKind) -> Vec<VulnerabilityRecord> {
        self.snapshot()
            .lookup(name, kind)
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.snapshot().is_empty()
    }

    /// Parses a feed document and merges its valid entries in one step.
    pub fn ingest(&self, payload: &str) -> IngestReport {
        match parse_document(payload) {
            Ok(batch) => self.ingest_batch(batch),
            Err(e) => {
                warn!("Rejected feed batch: {}", e);
                IngestReport::failed(e)
            }
        }
    }

    /// Merges every valid entry of `batch` atomically; invalid entries are
    /// counted and skipped.
    pub fn ingest_batch(&self, batch: FeedBatch) -> IngestReport {
        let mut report = IngestReport::default();
        let mut valid = Vec::with_capacity(batch.entries.len());
        for entry in batch.entries {
            match entry.and_then(|record| record.validate().map(|_| record)) {
                Ok(record) => valid.push(record),
                Err(e) => {
                    debug!("Skipping feed entry: {}", e);
                    report.skipped += 1;
                    report.entry_errors.push(e);
                }
            }
        }

        if !valid.is_empty() {
            let (merged, replaced) = self.write(|snapshot| {
                let mut replaced = 0;
                let merged = valid.len();
                for record in valid {
                    if snapshot.upsert(record) {
                        replaced += 1;
                    }
                }
                snapshot.updated_at = Some(Utc::now());
                (merged, replaced)
            });
            report.merged = merged;
            report.replaced = replaced;
        }

        info!(
            merged = report.merged,
            replaced = report.replaced,
            skipped = report.skipped,
            "Ingested feed batch"
        );
        report
    }

    /// Fetches a batch from `source` and merges it.
    ///
    /// A fetch that fails or exceeds `timeout` leaves the store untouched
    /// and is reported with `merged == 0` and the reason.
    pub async fn ingest_from(&self, source: &dyn FeedSource, timeout: Duration) -> IngestReport {
        info!("Fetching vulnerability feed from {}", source.describe());
        let fetched = match tokio::time::timeout(timeout, source.fetch()).await {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout(timeout)),
        };

        match fetched {
            Ok(batch) => self.ingest_batch(batch),
            Err(e) => {
                warn!("Feed fetch from {} failed: {}", source.describe(), e);
                IngestReport::failed(e)
            }
        }
    }

    /// Loads a persisted corpus, rebuilding the index with `aliases`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not a corpus file,
    /// or was written by an incompatible format version.
    pub fn load(path: &Path, aliases: AliasTable) -> Result<Self, StoreError> {
        let raw = std::fs::read_to_string(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let persisted: Persisted = serde_json::from_str(&raw)?;

        let expected = current_format();
        if persisted.format_version.major != expected.major {
            return Err(StoreError::IncompatibleFormat {
                found: persisted.format_version,
                expected,
            });
        }

        let mut snapshot = CorpusSnapshot::with_aliases(aliases);
        for (index, value) in persisted.records.iter().enumerate() {
            match feed::native_entry(value, index) {
                Ok(record) => {
                    snapshot.upsert(record);
                }
                Err(e) => warn!("Dropping unreadable corpus entry: {}", e),
            }
        }
        snapshot.updated_at = persisted.updated_at;

        debug!("Loaded {} CVE records from {}", snapshot.len(), path.display());
        Ok(Self {
            current: RwLock::new(Arc::new(snapshot)),
            writer: Mutex::new(()),
        })
    }

    /// Writes the current snapshot to `path` via a temporary file and a
    /// rename, so readers never see a partial file.
    pub fn persist(&self, path: &Path) -> Result<(), StoreError> {
        let snapshot = self.snapshot();
        let document = PersistedRef {
            format_version: FORMAT_VERSION,
            updated_at: snapshot.updated_at,
            records: snapshot.records().collect(),
        };
        let json = serde_json::to_vec(&document)?;

        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)?;

        debug!("Persisted {} CVE records to {}", snapshot.len(), path.display());
        Ok(())
    }
}

impl Default for CorpusStore {
    fn default() -> Self {
        Self::new()
    }
}

fn current_format() -> semver::Version {
    semver::Version::new(1, 0, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Severity;
    use async_trait::async_trait;
    use chrono::TimeZone;

    fn record(id: &str, product: &str) -> VulnerabilityRecord {
        VulnerabilityRecord::new(
            id,
            Severity::High,
            format!("{} issue", product),
            Utc.with_ymd_and_hms(2022, 3, 15, 0, 0, 0).unwrap(),
        )
        .with_range(ProductRange::new(product).end_excluding("2.0"))
    }

    fn batch_json(entries: &[(&str, &str)]) -> String {
        let items: Vec<String> = entries
            .iter()
            .map(|(id, product)| {
                format!(
                    r#"{{"cve_id": "{}", "severity": "MEDIUM", "affected_products": [{{"product": "{}"}}], "description": "d", "published_at": "2022-01-01T00:00:00Z"}}"#,
                    id, product
                )
            })
            .collect();
        format!("[{}]", items.join(","))
    }

    #[test]
    fn test_upsert_replaces_without_duplicates() {
        let store = CorpusStore::new();
        assert!(!store.upsert(record("CVE-2022-0001", "curl")).unwrap());
        assert!(store.upsert(record("CVE-2022-0001", "wget")).unwrap());

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.index_entries(), 1);
        assert_eq!(snapshot.index_entries_for("curl"), 0);
        assert_eq!(snapshot.index_entries_for("wget"), 1);
        assert!(store.lookup_by_product("curl", RepositoryKind::DebianApt).is_empty());
    }

    #[test]
    fn test_upsert_rejects_invalid_record() {
        let store = CorpusStore::new();
        assert!(store.upsert(record("CVE-22-1", "curl")).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn test_lookup_is_case_insensitive_and_aliased() {
        let store = CorpusStore::new();
        store.upsert(record("CVE-2022-0778", "OpenSSL")).unwrap();
        store.upsert(record("CVE-2022-0001", "openssl")).unwrap();

        let hits = store.lookup_by_product("libssl1.1", RepositoryKind::DebianApt);
        let ids: Vec<&str> = hits.iter().map(|r| r.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2022-0001", "CVE-2022-0778"]);
        assert_eq!(store.lookup_by_product("OPENSSL", RepositoryKind::Homebrew).len(), 2);
    }

    #[test]
    fn test_prefixed_product_from_other_vendor_is_not_openssl() {
        let store = CorpusStore::new();
        let foreign = VulnerabilityRecord::new(
            "CVE-2023-1111",
            Severity::High,
            "wrapper issue",
            Utc.with_ymd_and_hms(2023, 1, 10, 0, 0, 0).unwrap(),
        )
        .with_range(ProductRange::new("libssl-wrapper").with_vendor("acme").end_excluding("2.0"));
        store.upsert(foreign).unwrap();
        store.upsert(record("CVE-2022-0778", "openssl")).unwrap();

        let hits = store.lookup_by_product("libssl3", RepositoryKind::DebianApt);
        let ids: Vec<&str> = hits.iter().map(|r| r.cve_id.as_str()).collect();
        assert_eq!(ids, vec!["CVE-2022-0778"]);
        assert!(store.lookup_by_product("openssl", RepositoryKind::Homebrew)
            .iter()
            .all(|r| r.cve_id != "CVE-2023-1111"));
        assert_eq!(store.snapshot().index_entries_for("libssl-wrapper"), 1);
    }

    #[test]
    fn test_repository_hint_limits_lookup() {
        let store = CorpusStore::new();
        let hinted = VulnerabilityRecord::new(
            "CVE-2023-5752",
            Severity::Low,
            "pip mercurial injection",
            Utc.with_ymd_and_hms(2023, 10, 25, 0, 0, 0).unwrap(),
        )
        .with_range(ProductRange::new("pip").with_hint(RepositoryKind::PythonPip).end_excluding("23.3"));
        store.upsert(hinted).unwrap();

        assert_eq!(store.lookup_by_product("pip", RepositoryKind::PythonPip).len(), 1);
        assert!(store.lookup_by_product("pip", RepositoryKind::DebianApt).is_empty());
    }

    #[test]
    fn test_lookup_without_kind_spans_hints() {
        let store = CorpusStore::new();
        let record = VulnerabilityRecord::new(
            "CVE-2023-5752",
            Severity::Low,
            "pip mercurial injection",
            Utc.with_ymd_and_hms(2023, 10, 25, 0, 0, 0).unwrap(),
        )
        .with_range(ProductRange::new("pip").with_hint(RepositoryKind::PythonPip).end_excluding("23.3"))
        .with_range(ProductRange::new("pip").with_hint(RepositoryKind::Homebrew).end_excluding("23.3"));
        store.upsert(record).unwrap();

        let snapshot = store.snapshot();
        assert!(snapshot.lookup("pip", RepositoryKind::Unknown).is_empty());

        let hits = snapshot.lookup_in("pip", None);
        assert_eq!(hits.len(), 1);
        assert_eq!(snapshot.ranges_in(hits[0], "pip", None).len(), 2);
        assert_eq!(snapshot.ranges_in(hits[0], "pip", Some(RepositoryKind::Homebrew)).len(), 1);
    }

    #[test]
    fn test_ingest_three_valid_one_malformed() {
        let store = CorpusStore::new();
        let payload = r#"[
            {"cve_id": "CVE-2021-0001", "severity": "HIGH", "affected_products": [{"product": "a"}], "description": "a", "published_at": "2021-01-01T00:00:00Z"},
            {"cve_id": "CVE-2021-0002", "severity": "LOW", "affected_products": [{"product": "b"}], "description": "b", "published_at": "2021-01-01T00:00:00Z"},
            {"cve_id": "CVE-2021-0003", "severity": "CRITICAL", "affected_products": [{"product": "c"}], "published_at": "2021-01-01T00:00:00Z"},
            {"cve_id": "CVE-2021-0004", "severity": "UNKNOWN", "affected_products": [{"product": "d"}], "description": "d", "published_at": "2021-01-01T00:00:00Z"}
        ]"#;

        let report = store.ingest(payload);

        assert_eq!(store.len(), 3);
        assert_eq!(report.merged, 3);
        assert_eq!(report.skipped, 1);
        assert_eq!(report.failure, None);
    }

    #[test]
    fn test_reingest_counts_replacements() {
        let store = CorpusStore::new();
        store.ingest(&batch_json(&[("CVE-2021-0001", "a"), ("CVE-2021-0002", "b")]));
        let report = store.ingest(&batch_json(&[("CVE-2021-0002", "c"), ("CVE-2021-0003", "d")]));

        assert_eq!(report.merged, 2);
        assert_eq!(report.replaced, 1);
        assert_eq!(store.len(), 3);
        assert_eq!(store.snapshot().index_entries(), 3);
    }

    #[test]
    fn test_bad_envelope_leaves_store_untouched() {
        let store = CorpusStore::new();
        store.ingest(&batch_json(&[("CVE-2021-0001", "a")]));

        let report = store.ingest("{\"unexpected\": true}");

        assert!(report.is_failure());
        assert_eq!(report.merged, 0);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_snapshot_is_stable_during_ingest() {
        let store = CorpusStore::new();
        store.ingest(&batch_json(&[("CVE-2021-0001", "a")]));

        let before = store.snapshot();
        store.ingest(&batch_json(&[("CVE-2021-0002", "a")]));

        assert_eq!(before.len(), 1);
        assert_eq!(store.snapshot().len(), 2);
    }

    #[test]
    fn test_concurrent_readers_never_see_partial_batch() {
        use std::sync::atomic::{AtomicBool, Ordering};

        const BATCH: usize = 200;
        let store = CorpusStore::new();
        store.upsert(record("CVE-2020-0001", "zlib")).unwrap();

        let ids: Vec<String> = (0..BATCH).map(|i| format!("CVE-2021-{:04}", 1000 + i)).collect();
        let entries: Vec<(&str, &str)> = ids.iter().map(|id| (id.as_str(), "zlib")).collect();
        let payload = batch_json(&entries);

        let done = AtomicBool::new(false);
        let observed: Vec<Vec<(usize, usize)>> = std::thread::scope(|scope| {
            let readers: Vec<_> = (0..4)
                .map(|_| {
                    scope.spawn(|| {
                        let mut seen = Vec::new();
                        loop {
                            let finished = done.load(Ordering::Acquire);
                            let hits = store.lookup_by_product("zlib1g", RepositoryKind::DebianApt).len();
                            seen.push((store.snapshot().len(), hits));
                            if finished {
                                break;
                            }
                        }
                        seen
                    })
                })
                .collect();

            let report = store.ingest(&payload);
            assert_eq!(report.merged, BATCH);
            done.store(true, Ordering::Release);

            readers.into_iter().map(|r| r.join().unwrap()).collect()
        });

        for seen in observed {
            assert!(!seen.is_empty());
            for (len, hits) in &seen {
                assert!(*len == 1 || *len == BATCH + 1, "partial corpus of {} records", len);
                assert!(*hits == 1 || *hits == BATCH + 1, "partial lookup of {} records", hits);
            }
            assert_eq!(seen.last(), Some(&(BATCH + 1, BATCH + 1)));
        }
    }

    #[test]
    fn test_persist_and_reload_reproduce_lookups() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("corpus.json");

        let store = CorpusStore::new();
        store.upsert(record("CVE-2022-0778", "openssl")).unwrap();
        store.upsert(record("CVE-2021-22945", "curl")).unwrap();
        store.persist(&path).unwrap();

        let reloaded = CorpusStore::load(&path, AliasTable::with_defaults()).unwrap();
        for (name, kind) in [
            ("libssl3", RepositoryKind::DebianApt),
            ("curl", RepositoryKind::Homebrew),
            ("zlib", RepositoryKind::ArchPacman),
        ] {
            assert_eq!(
                store.lookup_by_product(name, kind),
                reloaded.lookup_by_product(name, kind)
            );
        }
        assert_eq!(reloaded.snapshot().updated_at(), store.snapshot().updated_at());
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[test]
    fn test_load_rejects_incompatible_format() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("corpus.json");
        std::fs::write(
            &path,
            r#"{"format_version": "2.0.0", "updated_at": null, "records": []}"#,
        )
        .unwrap();

        let err = CorpusStore::load(&path, AliasTable::new()).unwrap_err();
        assert!(matches!(err, StoreError::IncompatibleFormat { .. }));
    }

    struct FailingFeed;

    #[async_trait]
    impl FeedSource for FailingFeed {
        fn describe(&self) -> String {
            "failing".to_string()
        }

        async fn fetch(&self) -> Result<FeedBatch, IngestError> {
            Err(IngestError::Status {
                status: 503,
                url: "http://feed.invalid".to_string(),
            })
        }
    }

    struct SlowFeed;

    #[async_trait]
    impl FeedSource for SlowFeed {
        fn describe(&self) -> String {
            "slow".to_string()
        }

        async fn fetch(&self) -> Result<FeedBatch, IngestError> {
            tokio::time::sleep(Duration::from_secs(10)).await;
            Ok(FeedBatch::default())
        }
    }

    #[tokio::test]
    async fn test_failed_fetch_leaves_store_untouched() {
        let store = CorpusStore::new();
        store.upsert(record("CVE-2022-0778", "openssl")).unwrap();
        let before = store.snapshot();

        let report = store.ingest_from(&FailingFeed, Duration::from_secs(1)).await;

        assert_eq!(report.merged, 0);
        assert!(report.failure.unwrap().contains("503"));
        assert!(Arc::ptr_eq(&before, &store.snapshot()));
    }

    #[tokio::test]
    async fn test_fetch_timeout_is_reported() {
        let store = CorpusStore::new();
        let report = store.ingest_from(&SlowFeed, Duration::from_millis(50)).await;

        assert_eq!(report.merged, 0);
        assert!(report.is_failure());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_unreachable_nvd_leaves_store_untouched() {
        let store = CorpusStore::new();
        store.upsert(record("CVE-2022-0778", "openssl")).unwrap();

        let feed = NvdApiFeed::new("http://127.0.0.1:9/rest/json/cves/2.0", None, Duration::from_secs(2))
            .unwrap()
            .with_request_delay(Duration::ZERO);
        let report = store.ingest_from(&feed, Duration::from_secs(5)).await;

        assert!(report.is_failure());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_latest_modification() {
        let store = CorpusStore::new();
        assert_eq!(store.snapshot().latest_modification(), None);

        let mut newer = record("CVE-2022-0002", "b");
        newer.last_modified = Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap());
        store.upsert(record("CVE-2022-0001", "a")).unwrap();
        store.upsert(newer).unwrap();

        assert_eq!(
            store.snapshot().latest_modification(),
            Some(Utc.with_ymd_and_hms(2023, 6, 1, 0, 0, 0).unwrap())
        );
    }
}
