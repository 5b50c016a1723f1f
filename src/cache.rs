//! On-disk location and freshness of the persisted CVE corpus.
//!
//! # Cache Location
//!
//! The corpus is stored in platform-specific directories:
//! - Linux: `~/.cache/pkgaudit/corpus.json`
//! - macOS: `~/Library/Caches/pkgaudit/corpus.json`
//! - Windows: `%LOCALAPPDATA%\pkgaudit\corpus.json`
//!
//! # Example
//!
//! ```no_run
//! use pkgaudit::CorpusCache;
//! use pkgaudit::corpus::AliasTable;
//!
//! let cache = CorpusCache::with_ttl_hours(24);
//! if cache.is_stale() {
//!     println!("corpus needs a refresh");
//! }
//! let store = cache.load(AliasTable::with_defaults()).unwrap();
//! ```

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::debug;

use crate::corpus::{AliasTable, CorpusStore};
use crate::platform::cache_dir;

/// Default refresh TTL in hours.
const CACHE_TTL_HOURS: u64 = 24;

const CORPUS_FILE: &str = "corpus.json";

/// The persisted corpus file plus the TTL after which it counts as stale.
#[derive(Debug, Clone)]
pub struct CorpusCache {
    path: PathBuf,
    ttl: Duration,
}

impl CorpusCache {
    /// Creates a cache with the default 24-hour TTL.
    pub fn new() -> Self {
        Self::with_ttl_hours(CACHE_TTL_HOURS)
    }

    pub fn with_ttl_hours(hours: u64) -> Self {
        Self {
            path: cache_dir().join(CORPUS_FILE),
            ttl: Duration::from_secs(hours * 3600),
        }
    }

    /// A cache backed by an explicit file.
    pub fn at(path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            path: path.into(),
            ttl,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Time since the corpus file was last written.
    pub fn age(&self) -> Option<Duration> {
        let modified = fs::metadata(&self.path).ok()?.modified().ok()?;
        SystemTime::now().duration_since(modified).ok().or(Some(Duration::ZERO))
    }

    /// A missing corpus is always stale.
    pub fn is_stale(&self) -> bool {
        self.age().map_or(true, |age| age >= self.ttl)
    }

    /// Loads the persisted corpus, `None` when there is none yet.
    pub fn load(&self, aliases: AliasTable) -> Result<Option<CorpusStore>> {
        if !self.exists() {
            debug!("No cached corpus at {}", self.path.display());
            return Ok(None);
        }

        let store = CorpusStore::load(&self.path, aliases)
            .with_context(|| format!("Failed to load corpus from {}", self.path.display()))?;
        Ok(Some(store))
    }

    pub fn save(&self, store: &CorpusStore) -> Result<()> {
        store
            .persist(&self.path)
            .with_context(|| format!("Failed to write corpus to {}", self.path.display()))
    }

    /// Removes the persisted corpus. Returns whether anything was removed.
    pub fn clear(&self) -> Result<bool> {
        let mut removed = false;
        for path in [self.path.clone(), self.path.with_extension("json.tmp")] {
            if path.exists() {
                fs::remove_file(&path)
                    .with_context(|| format!("Failed to remove {}", path.display()))?;
                removed = true;
            }
        }
        Ok(removed)
    }
}

impl Default for CorpusCache {
    fn default() -> Self {
        Self::new()
    }
}
