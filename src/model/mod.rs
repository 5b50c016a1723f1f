//! Core data types for packages, vulnerabilities, and match results.
//!
//! - [`PackageRecord`] - An installed package, normalized from one package manager
//! - [`RepositoryKind`] - Which package manager (and so which versioning scheme)
//! - [`VulnerabilityRecord`] - A CVE entry of the corpus
//! - [`ProductRange`] - The affected-version predicate of one product in a CVE
//! - [`Severity`] - CVE severity with its ordinal scale
//! - [`MatchResult`] - A package matched against one range of one CVE
//!
//! # Example
//!
//! ```
//! use pkgaudit::model::{PackageRecord, ProductRange, RepositoryKind};
//!
//! let package = PackageRecord::new("openssl", "1.1.1-1ubuntu2.1", RepositoryKind::DebianApt);
//! let range = ProductRange::new("openssl").end_excluding("1.1.1-1ubuntu2.2");
//!
//! assert_eq!(package.repository_kind.as_str(), "DEBIAN_APT");
//! assert!(!range.is_unbounded());
//! ```

mod matching;
mod package;
mod vulnerability;

pub use matching::*;
pub use package::*;
pub use vulnerability::*;
