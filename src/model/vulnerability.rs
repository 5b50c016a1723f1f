use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use super::RepositoryKind;
use crate::error::EntryError;

/// CVE severity as published by the feed.
///
/// `Unknown` has no place in the ordinal scale `Low < Medium < High <
/// Critical`; see [`Severity::meets`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
    Unknown,
}

impl Severity {
    /// Position on the ordinal scale, `None` for `Unknown`.
    pub fn rank(&self) -> Option<u8> {
        match self {
            Severity::Low => Some(1),
            Severity::Medium => Some(2),
            Severity::High => Some(3),
            Severity::Critical => Some(4),
            Severity::Unknown => None,
        }
    }

    /// Whether a finding of this severity survives a `min` threshold.
    ///
    /// Unknown severities always pass: an unrated CVE is not a low-risk one.
    pub fn meets(&self, min: Severity) -> bool {
        match (self.rank(), min.rank()) {
            (None, _) | (_, None) => true,
            (Some(own), Some(threshold)) => own >= threshold,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "LOW",
            Severity::Medium => "MEDIUM",
            Severity::High => "HIGH",
            Severity::Critical => "CRITICAL",
            Severity::Unknown => "UNKNOWN",
        }
    }

    /// Maps a CVSS base score onto the qualitative scale.
    pub fn from_cvss_score(score: f32) -> Self {
        match score {
            s if s >= 9.0 => Severity::Critical,
            s if s >= 7.0 => Severity::High,
            s if s >= 4.0 => Severity::Medium,
            s if s > 0.0 => Severity::Low,
            _ => Severity::Unknown,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "LOW" => Ok(Severity::Low),
            "MEDIUM" | "MODERATE" => Ok(Severity::Medium),
            "HIGH" => Ok(Severity::High),
            "CRITICAL" => Ok(Severity::Critical),
            "UNKNOWN" | "NONE" | "" => Ok(Severity::Unknown),
            _ => Err(format!(
                "Unknown severity: {}. Use: low, medium, high, critical",
                s
            )),
        }
    }
}

/// The affected-version predicate for one named product inside a CVE.
///
/// With no exact version and no bounds the range covers every version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductRange {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,
    pub product: String,
    /// Restricts the range to packages from one repository kind.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repository_hint: Option<RepositoryKind>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_start_including: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_start_excluding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_end_including: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_end_excluding: Option<String>,
}

impl ProductRange {
    pub fn new(product: impl Into<String>) -> Self {
        Self {
            product: product.into(),
            ..Self::default()
        }
    }

    pub fn with_vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = Some(vendor.into());
        self
    }

    pub fn with_hint(mut self, kind: RepositoryKind) -> Self {
        self.repository_hint = Some(kind);
        self
    }

    pub fn exact(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn start_including(mut self, version: impl Into<String>) -> Self {
        self.version_start_including = Some(version.into());
        self
    }

    pub fn start_excluding(mut self, version: impl Into<String>) -> Self {
        self.version_start_excluding = Some(version.into());
        self
    }

    pub fn end_including(mut self, version: impl Into<String>) -> Self {
        self.version_end_including = Some(version.into());
        self
    }

    pub fn end_excluding(mut self, version: impl Into<String>) -> Self {
        self.version_end_excluding = Some(version.into());
        self
    }

    pub fn has_bounds(&self) -> bool {
        self.version_start_including.is_some()
            || self.version_start_excluding.is_some()
            || self.version_end_including.is_some()
            || self.version_end_excluding.is_some()
    }

    /// True when every version of the product is affected.
    pub fn is_unbounded(&self) -> bool {
        self.version.is_none() && !self.has_bounds()
    }

    /// Whether this range may be applied to a package of `kind`.
    pub fn applies_to(&self, kind: RepositoryKind) -> bool {
        self.repository_hint.map_or(true, |hint| hint == kind)
    }

    /// Human-readable form, e.g. `>= 1.1.1, < 1.1.1-1ubuntu2.2`.
    pub fn describe(&self) -> String {
        if let Some(version) = &self.version {
            return format!("= {}", version);
        }
        let mut parts = Vec::new();
        if let Some(v) = &self.version_start_including {
            parts.push(format!(">= {}", v));
        }
        if let Some(v) = &self.version_start_excluding {
            parts.push(format!("> {}", v));
        }
        if let Some(v) = &self.version_end_including {
            parts.push(format!("<= {}", v));
        }
        if let Some(v) = &self.version_end_excluding {
            parts.push(format!("< {}", v));
        }
        if parts.is_empty() {
            "all versions".to_string()
        } else {
            parts.join(", ")
        }
    }

    fn validate(&self, cve_id: &str) -> Result<(), EntryError> {
        let invalid = |reason: &str| EntryError::InvalidRange {
            cve_id: cve_id.to_string(),
            reason: reason.to_string(),
        };
        if self.product.trim().is_empty() {
            return Err(invalid("empty product name"));
        }
        if self.version_start_including.is_some() && self.version_start_excluding.is_some() {
            return Err(invalid("both inclusive and exclusive start bounds"));
        }
        if self.version_end_including.is_some() && self.version_end_excluding.is_some() {
            return Err(invalid("both inclusive and exclusive end bounds"));
        }
        if self.version.is_some() && self.has_bounds() {
            return Err(invalid("exact version combined with bounds"));
        }
        Ok(())
    }
}

/// One CVE entry of the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VulnerabilityRecord {
    pub cve_id: String,
    pub severity: Severity,
    pub affected_products: Vec<ProductRange>,
    pub description: String,
    pub published_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<String>,
}

impl VulnerabilityRecord {
    pub fn new(
        cve_id: impl Into<String>,
        severity: Severity,
        description: impl Into<String>,
        published_at: DateTime<Utc>,
    ) -> Self {
        Self {
            cve_id: cve_id.into(),
            severity,
            affected_products: Vec::new(),
            description: description.into(),
            published_at,
            last_modified: None,
            cvss_score: None,
            references: Vec::new(),
        }
    }

    pub fn with_range(mut self, range: ProductRange) -> Self {
        self.affected_products.push(range);
        self
    }

    /// Checks the record's structural invariants before it enters a store.
    pub fn validate(&self) -> Result<(), EntryError> {
        if !is_valid_cve_id(&self.cve_id) {
            return Err(EntryError::InvalidId(self.cve_id.clone()));
        }
        for range in &self.affected_products {
            range.validate(&self.cve_id)?;
        }
        Ok(())
    }
}

/// `CVE-YYYY-NNNN...` with a four digit year and at least four sequence digits.
pub fn is_valid_cve_id(id: &str) -> bool {
    let mut parts = id.split('-');
    let (Some(prefix), Some(year), Some(seq), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return false;
    };
    prefix == "CVE"
        && year.len() == 4
        && year.bytes().all(|b| b.is_ascii_digit())
        && seq.len() >= 4
        && seq.bytes().all(|b| b.is_ascii_digit())
}
