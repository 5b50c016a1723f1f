use serde::Serialize;

use super::{PackageRecord, ProductRange, VulnerabilityRecord};

/// One (package, CVE, range) justification produced by the matcher.
///
/// Borrows from the inventory and the corpus snapshot it was matched
/// against; nothing here is owned or persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MatchResult<'a> {
    pub package: &'a PackageRecord,
    pub cve: &'a VulnerabilityRecord,
    pub matched_range: &'a ProductRange,
    /// Position of `matched_range` within `cve.affected_products`.
    pub range_index: usize,
}

impl MatchResult<'_> {
    pub fn cve_id(&self) -> &str {
        &self.cve.cve_id
    }
}
