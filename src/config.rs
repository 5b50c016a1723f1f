//! Configuration file handling.
//!
//! This module provides loading and saving of pkgaudit configuration
//! from a TOML file.
//!
//! # Configuration Location
//!
//! The configuration file is stored at:
//! - Linux: `~/.config/pkgaudit/config.toml`
//! - macOS: `~/Library/Application Support/pkgaudit/config.toml`
//! - Windows: `%APPDATA%\pkgaudit\config.toml`
//!
//! # Example Configuration
//!
//! ```toml
//! min_severity = "MEDIUM"
//! verbosity = 1
//! default_format = "table"
//! repositories = ["DEBIAN_APT", "PYTHON_PIP"]
//! adapter_timeout_secs = 60
//!
//! [feed]
//! api_key = "..."
//! refresh_ttl_hours = 24
//! auto_update = true
//!
//! [aliases]
//! "libfoo*" = "foo"
//!
//! [ignore]
//! packages = ["linux-image-*"]
//! vulnerabilities = ["CVE-2021-12345"]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::corpus::{AliasTable, NVD_API_URL, MAX_RESULTS_PER_PAGE};
use crate::model::{PackageRecord, RepositoryKind, Severity};

/// Application configuration.
///
/// # Example
///
/// ```no_run
/// use pkgaudit::Config;
///
/// // Load from file (or use defaults if file doesn't exist)
/// let config = Config::load().unwrap();
///
/// println!("Minimum severity: {}", config.min_severity);
/// println!("Feed refresh: every {} hours", config.feed.refresh_ttl_hours);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Findings below this severity are not reported.
    ///
    /// Default: LOW (everything)
    pub min_severity: Severity,

    /// Report detail: 0 brief, 1 adds ranges, 2 adds descriptions.
    pub verbosity: u8,

    /// Default output format when no `--format` flag is provided.
    ///
    /// Valid values: "table", "json"
    pub default_format: String,

    /// Package managers scanned when no `--repository` flag is provided.
    ///
    /// Default: all of them
    pub repositories: Vec<RepositoryKind>,

    /// Per package manager listing timeout, in seconds.
    pub adapter_timeout_secs: u64,

    pub feed: FeedConfig,

    /// Extra package name aliases, merged over the built-in table.
    /// A key ending in `*` matches by prefix.
    pub aliases: BTreeMap<String, String>,

    /// Ignore list configuration for suppressing known issues.
    pub ignore: IgnoreConfig,
}

/// Where and how often the CVE corpus is refreshed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub api_url: String,

    /// NVD API key. Raises the request rate limit considerably.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    pub results_per_page: u32,

    /// Per request HTTP timeout, in seconds.
    pub timeout_secs: u64,

    /// How long a cached corpus stays fresh, in hours.
    pub refresh_ttl_hours: u64,

    /// Refresh a stale corpus before scanning.
    pub auto_update: bool,

    /// Local feed documents imported on every scan.
    pub files: Vec<PathBuf>,
}

impl Default for FeedConfig {
    fn default() -> Self {
        Self {
            api_url: NVD_API_URL.to_string(),
            api_key: None,
            results_per_page: MAX_RESULTS_PER_PAGE,
            timeout_secs: 60,
            refresh_ttl_hours: 24,
            auto_update: true,
            files: Vec::new(),
        }
    }
}

impl FeedConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn refresh_ttl(&self) -> Duration {
        Duration::from_secs(self.refresh_ttl_hours * 3600)
    }

    /// The configured key, falling back to `NVD_API_KEY` from the environment.
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .clone()
            .or_else(|| std::env::var("NVD_API_KEY").ok())
            .filter(|key| !key.trim().is_empty())
    }
}

/// Configuration for ignoring specific packages or vulnerabilities.
///
/// Use this to suppress known false positives or accepted risks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreConfig {
    /// Package names to exclude from matching.
    ///
    /// Supports glob patterns (e.g., "linux-image-*"). A pattern of the
    /// form `<repository>:<pattern>` only applies to that repository,
    /// e.g. "pip:setuptools".
    pub packages: Vec<String>,

    /// CVE ids that are never reported.
    pub vulnerabilities: Vec<String>,
}

impl IgnoreConfig {
    /// Check if a package should be ignored.
    pub fn should_ignore_package(&self, package: &PackageRecord) -> bool {
        self.packages.iter().any(|pattern| {
            let (kind, pattern) = match pattern.split_once(':') {
                Some((kind, rest)) => match kind.parse::<RepositoryKind>() {
                    Ok(kind) => (Some(kind), rest),
                    Err(_) => (None, pattern.as_str()),
                },
                None => (None, pattern.as_str()),
            };
            kind.map_or(true, |k| k == package.repository_kind) && glob_match(pattern, &package.name)
        })
    }

    /// Check if a vulnerability should be ignored.
    pub fn should_ignore_vulnerability(&self, cve_id: &str) -> bool {
        self.vulnerabilities
            .iter()
            .any(|id| id.eq_ignore_ascii_case(cve_id))
    }

    pub fn is_empty(&self) -> bool {
        self.packages.is_empty() && self.vulnerabilities.is_empty()
    }
}

/// Simple glob matching (supports * as wildcard).
fn glob_match(pattern: &str, text: &str) -> bool {
    let parts: Vec<&str> = pattern.split('*').collect();

    if parts.len() == 1 {
        return pattern == text;
    }

    let mut remaining = text;

    // Check prefix (before first *)
    if !parts[0].is_empty() {
        if !remaining.starts_with(parts[0]) {
            return false;
        }
        remaining = &remaining[parts[0].len()..];
    }

    // Check suffix (after last *)
    let last_part = parts[parts.len() - 1];
    if !last_part.is_empty() {
        if !remaining.ends_with(last_part) {
            return false;
        }
        remaining = &remaining[..remaining.len() - last_part.len()];
    }

    for part in &parts[1..parts.len() - 1] {
        if part.is_empty() {
            continue;
        }
        if let Some(pos) = remaining.find(part) {
            remaining = &remaining[pos + part.len()..];
        } else {
            return false;
        }
    }

    true
}

impl Default for Config {
    fn default() -> Self {
        Self {
            min_severity: Severity::Low,
            verbosity: 0,
            default_format: "table".to_string(),
            repositories: RepositoryKind::ALL.to_vec(),
            adapter_timeout_secs: 60,
            feed: FeedConfig::default(),
            aliases: BTreeMap::new(),
            ignore: IgnoreConfig::default(),
        }
    }
}

impl Config {
    /// Loads configuration from the config file.
    ///
    /// If the config file doesn't exist, returns default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path())
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid configuration in {}", path.display()))?;
        Ok(config)
    }

    /// Saves the configuration to the config file.
    ///
    /// Creates the parent directory if it doesn't exist.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::config_path())
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.exists() {
                fs::create_dir_all(parent)?;
            }
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Returns the path to the configuration file.
    ///
    /// # Example
    ///
    /// ```
    /// use pkgaudit::Config;
    ///
    /// let path = Config::config_path();
    /// assert!(path.ends_with("pkgaudit/config.toml"));
    /// ```
    pub fn config_path() -> PathBuf {
        crate::platform::config_dir()
            .unwrap_or_else(|| PathBuf::from(".").join("pkgaudit"))
            .join("config.toml")
    }

    /// Generates a string containing the default configuration.
    pub fn generate_default_config() -> String {
        let config = Config::default();
        toml::to_string_pretty(&config).unwrap_or_default()
    }

    pub fn adapter_timeout(&self) -> Duration {
        Duration::from_secs(self.adapter_timeout_secs)
    }

    /// The built-in alias table extended with the `[aliases]` section.
    pub fn alias_table(&self) -> AliasTable {
        let mut table = AliasTable::with_defaults();
        for (alias, canonical) in &self.aliases {
            table.insert(alias, canonical);
        }
        table
    }
}
