//! Feed document parsing.
//!
//! Recognized documents:
//! - NVD CVE API 2.0 responses (`{"vulnerabilities": [{"cve": {...}}]}`)
//! - Legacy NVD 1.1 JSON feeds (`{"CVE_Items": [...]}`)
//! - The store's own persisted file (`{"format_version": ..., "records": [...]}`)
//! - A bare array of vulnerability records
//!
//! The document envelope must be well formed or the whole batch is
//! rejected. Individual entries that cannot be mapped are kept as
//! [`EntryError`]s so the caller can count them.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::Deserialize;
use serde_json::Value;

use super::cpe::CpeName;
use crate::error::{EntryError, IngestError};
use crate::model::{ProductRange, Severity, VulnerabilityRecord};

/// The parsed entries of one or more feed documents.
#[derive(Debug, Default)]
pub struct FeedBatch {
    pub entries: Vec<Result<VulnerabilityRecord, EntryError>>,
}

impl FeedBatch {
    pub fn extend(&mut self, other: FeedBatch) {
        self.entries.extend(other.entries);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

type EntryParser = fn(&Value, usize) -> Result<VulnerabilityRecord, EntryError>;

/// Parses a feed document of any recognized shape.
pub fn parse_document(payload: &str) -> Result<FeedBatch, IngestError> {
    let document: Value = serde_json::from_str(payload)
        .map_err(|e| IngestError::Envelope(format!("not a JSON document: {}", e)))?;

    let (entries, parse_entry): (&Vec<Value>, EntryParser) =
        match &document {
            Value::Array(items) => (items, native_entry as EntryParser),
            Value::Object(map) => {
                if let Some(items) = map.get("vulnerabilities") {
                    (as_array(items, "vulnerabilities")?, nvd2_entry as EntryParser)
                } else if let Some(items) = map.get("CVE_Items") {
                    (as_array(items, "CVE_Items")?, nvd11_entry as EntryParser)
                } else if let Some(items) = map.get("records") {
                    (as_array(items, "records")?, native_entry as EntryParser)
                } else {
                    return Err(IngestError::Envelope(
                        "expected `vulnerabilities`, `CVE_Items` or `records`".to_string(),
                    ));
                }
            }
            _ => {
                return Err(IngestError::Envelope(
                    "expected a JSON object or array".to_string(),
                ))
            }
        };

    Ok(FeedBatch {
        entries: entries
            .iter()
            .enumerate()
            .map(|(index, value)| parse_entry(value, index))
            .collect(),
    })
}

fn as_array<'a>(value: &'a Value, field: &str) -> Result<&'a Vec<Value>, IngestError> {
    value
        .as_array()
        .ok_or_else(|| IngestError::Envelope(format!("`{}` is not an array", field)))
}

fn shape(index: usize, reason: impl ToString) -> EntryError {
    EntryError::Shape {
        index,
        reason: reason.to_string(),
    }
}

/// An entry already in [`VulnerabilityRecord`] form.
pub(crate) fn native_entry(value: &Value, index: usize) -> Result<VulnerabilityRecord, EntryError> {
    let record: VulnerabilityRecord =
        serde_json::from_value(value.clone()).map_err(|e| shape(index, e))?;
    if record.description.trim().is_empty() {
        return Err(EntryError::MissingField {
            cve_id: record.cve_id,
            field: "description",
        });
    }
    record.validate()?;
    Ok(record)
}

// NVD CVE API 2.0

#[derive(Deserialize)]
struct Nvd2Item {
    cve: Nvd2Cve,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nvd2Cve {
    id: String,
    published: Option<String>,
    last_modified: Option<String>,
    #[serde(default)]
    descriptions: Vec<LangString>,
    #[serde(default)]
    metrics: Nvd2Metrics,
    #[serde(default)]
    configurations: Vec<Nvd2Configuration>,
    #[serde(default)]
    references: Vec<UrlRef>,
}

#[derive(Deserialize)]
struct LangString {
    lang: String,
    value: String,
}

#[derive(Deserialize)]
struct UrlRef {
    url: String,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Nvd2Metrics {
    #[serde(default)]
    cvss_metric_v40: Vec<CvssMetric>,
    #[serde(default)]
    cvss_metric_v31: Vec<CvssMetric>,
    #[serde(default)]
    cvss_metric_v30: Vec<CvssMetric>,
    #[serde(default)]
    cvss_metric_v2: Vec<CvssMetric>,
}

/// v2 metrics carry `baseSeverity` next to `cvssData`, v3 and v4 inside it.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssMetric {
    cvss_data: CvssData,
    base_severity: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CvssData {
    base_score: Option<f32>,
    base_severity: Option<String>,
}

#[derive(Deserialize)]
struct Nvd2Configuration {
    #[serde(default)]
    nodes: Vec<Nvd2Node>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nvd2Node {
    #[serde(default)]
    negate: bool,
    #[serde(default)]
    cpe_match: Vec<CpeMatch>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct CpeMatch {
    vulnerable: bool,
    #[serde(alias = "cpe23Uri")]
    criteria: String,
    version_start_including: Option<String>,
    version_start_excluding: Option<String>,
    version_end_including: Option<String>,
    version_end_excluding: Option<String>,
}

/// One `vulnerabilities[]` item of an NVD 2.0 response.
pub(crate) fn nvd2_entry(value: &Value, index: usize) -> Result<VulnerabilityRecord, EntryError> {
    let item: Nvd2Item = serde_json::from_value(value.clone()).map_err(|e| shape(index, e))?;
    let cve = item.cve;

    let description = english(&cve.descriptions).ok_or_else(|| EntryError::MissingField {
        cve_id: cve.id.clone(),
        field: "description",
    })?;
    let published_at = required_timestamp(&cve.id, cve.published.as_deref())?;

    let metrics = [
        &cve.metrics.cvss_metric_v40,
        &cve.metrics.cvss_metric_v31,
        &cve.metrics.cvss_metric_v30,
        &cve.metrics.cvss_metric_v2,
    ];
    let chosen = metrics.iter().find_map(|list| list.first());
    let labelled = metrics
        .iter()
        .flat_map(|list| list.first())
        .find_map(|m| m.cvss_data.base_severity.as_deref().or(m.base_severity.as_deref()));
    let score = chosen.and_then(|m| m.cvss_data.base_score);

    let nodes = cve.configurations.iter().flat_map(|c| c.nodes.iter());
    let mut affected_products = Vec::new();
    for node in nodes.filter(|n| !n.negate) {
        for m in node.cpe_match.iter().filter(|m| m.vulnerable) {
            if let Some(range) = range_from_match(m) {
                affected_products.push(range);
            }
        }
    }

    let record = VulnerabilityRecord {
        severity: severity_of(labelled, score),
        affected_products,
        description,
        published_at,
        last_modified: cve.last_modified.as_deref().and_then(parse_timestamp),
        cvss_score: score,
        references: cve.references.into_iter().map(|r| r.url).collect(),
        cve_id: cve.id,
    };
    record.validate()?;
    Ok(record)
}

// NVD 1.1 JSON feeds

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nvd11Item {
    cve: Nvd11Cve,
    #[serde(default)]
    configurations: Nvd11Configurations,
    #[serde(default)]
    impact: Nvd11Impact,
    published_date: Option<String>,
    last_modified_date: Option<String>,
}

#[derive(Deserialize)]
struct Nvd11Cve {
    #[serde(rename = "CVE_data_meta")]
    meta: Nvd11Meta,
    description: Nvd11Description,
    #[serde(default)]
    references: Nvd11References,
}

#[derive(Deserialize)]
struct Nvd11Meta {
    #[serde(rename = "ID")]
    id: String,
}

#[derive(Deserialize)]
struct Nvd11Description {
    #[serde(default)]
    description_data: Vec<LangString>,
}

#[derive(Deserialize, Default)]
struct Nvd11References {
    #[serde(default)]
    reference_data: Vec<UrlRef>,
}

#[derive(Deserialize, Default)]
struct Nvd11Configurations {
    #[serde(default)]
    nodes: Vec<Nvd11Node>,
}

#[derive(Deserialize)]
struct Nvd11Node {
    #[serde(default)]
    negate: bool,
    #[serde(default)]
    children: Vec<Nvd11Node>,
    #[serde(default)]
    cpe_match: Vec<CpeMatch>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct Nvd11Impact {
    base_metric_v3: Option<Nvd11MetricV3>,
    base_metric_v2: Option<Nvd11MetricV2>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nvd11MetricV3 {
    cvss_v3: CvssData,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Nvd11MetricV2 {
    cvss_v2: CvssData,
    severity: Option<String>,
}

/// One `CVE_Items[]` entry of a legacy NVD 1.1 feed.
pub(crate) fn nvd11_entry(value: &Value, index: usize) -> Result<VulnerabilityRecord, EntryError> {
    let item: Nvd11Item = serde_json::from_value(value.clone()).map_err(|e| shape(index, e))?;
    let cve_id = item.cve.meta.id;

    let description =
        english(&item.cve.description.description_data).ok_or_else(|| EntryError::MissingField {
            cve_id: cve_id.clone(),
            field: "description",
        })?;
    let published_at = required_timestamp(&cve_id, item.published_date.as_deref())?;

    let (labelled, score) = match (&item.impact.base_metric_v3, &item.impact.base_metric_v2) {
        (Some(v3), _) => (v3.cvss_v3.base_severity.as_deref(), v3.cvss_v3.base_score),
        (None, Some(v2)) => (
            v2.severity.as_deref().or(v2.cvss_v2.base_severity.as_deref()),
            v2.cvss_v2.base_score,
        ),
        (None, None) => (None, None),
    };

    let mut affected_products = Vec::new();
    collect_nvd11_ranges(&item.configurations.nodes, &mut affected_products);

    let record = VulnerabilityRecord {
        severity: severity_of(labelled, score),
        affected_products,
        description,
        published_at,
        last_modified: item.last_modified_date.as_deref().and_then(parse_timestamp),
        cvss_score: score,
        references: item.cve.references.reference_data.into_iter().map(|r| r.url).collect(),
        cve_id,
    };
    record.validate()?;
    Ok(record)
}

fn collect_nvd11_ranges(nodes: &[Nvd11Node], out: &mut Vec<ProductRange>) {
    for node in nodes.iter().filter(|n| !n.negate) {
        out.extend(
            node.cpe_match
                .iter()
                .filter(|m| m.vulnerable)
                .filter_map(range_from_match),
        );
        collect_nvd11_ranges(&node.children, out);
    }
}

/// Maps one vulnerable CPE match to a range. A concrete CPE version with
/// no explicit bounds becomes an exact-version range.
fn range_from_match(m: &CpeMatch) -> Option<ProductRange> {
    let cpe = CpeName::parse(&m.criteria)?;
    let clean = |v: &Option<String>| v.as_ref().map(|s| s.trim()).filter(|s| !s.is_empty()).map(str::to_string);

    let mut range = ProductRange::new(cpe.product.clone());
    if !cpe.vendor.is_empty() && cpe.vendor != "*" {
        range = range.with_vendor(cpe.vendor.clone());
    }
    range.version_start_including = clean(&m.version_start_including);
    range.version_start_excluding = clean(&m.version_start_excluding);
    range.version_end_including = clean(&m.version_end_including);
    range.version_end_excluding = clean(&m.version_end_excluding);

    if !range.has_bounds() {
        range.version = cpe.full_version();
    }
    Some(range)
}

fn english(descriptions: &[LangString]) -> Option<String> {
    descriptions
        .iter()
        .find(|d| d.lang == "en")
        .or_else(|| descriptions.first())
        .map(|d| d.value.trim().to_string())
        .filter(|d| !d.is_empty())
}

/// Severity from the first labelled metric, then from the numeric score.
fn severity_of(label: Option<&str>, score: Option<f32>) -> Severity {
    label
        .and_then(|l| l.parse::<Severity>().ok())
        .filter(|s| *s != Severity::Unknown)
        .or_else(|| score.map(Severity::from_cvss_score))
        .unwrap_or(Severity::Unknown)
}

fn required_timestamp(cve_id: &str, value: Option<&str>) -> Result<DateTime<Utc>, EntryError> {
    let value = value.ok_or_else(|| EntryError::MissingField {
        cve_id: cve_id.to_string(),
        field: "published",
    })?;
    parse_timestamp(value).ok_or_else(|| EntryError::InvalidDate {
        cve_id: cve_id.to_string(),
        value: value.to_string(),
    })
}

/// NVD timestamps come with and without offsets, seconds, and fractions.
pub(crate) fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    let naive = value.trim_end_matches('Z');
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%dT%H:%M"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(naive, fmt).ok())
        .map(|dt| dt.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::RepositoryKind;

    const NVD2_PAGE: &str = r#"{
        "resultsPerPage": 2,
        "startIndex": 0,
        "totalResults": 2,
        "format": "NVD_CVE",
        "version": "2.0",
        "vulnerabilities": [
            {
                "cve": {
                    "id": "CVE-2022-0778",
                    "published": "2022-03-15T17:15:08.513",
                    "lastModified": "2023-11-07T03:44:13.203",
                    "descriptions": [
                        {"lang": "es", "value": "bucle infinito"},
                        {"lang": "en", "value": "Infinite loop in BN_mod_sqrt()."}
                    ],
                    "metrics": {
                        "cvssMetricV31": [{"cvssData": {"baseScore": 7.5, "baseSeverity": "HIGH"}}],
                        "cvssMetricV2": [{"cvssData": {"baseScore": 5.0}, "baseSeverity": "MEDIUM"}]
                    },
                    "configurations": [{
                        "nodes": [{
                            "operator": "OR",
                            "negate": false,
                            "cpeMatch": [
                                {
                                    "vulnerable": true,
                                    "criteria": "cpe:2.3:a:openssl:openssl:*:*:*:*:*:*:*:*",
                                    "versionStartIncluding": "1.0.2",
                                    "versionEndExcluding": "1.0.2zd"
                                },
                                {
                                    "vulnerable": true,
                                    "criteria": "cpe:2.3:a:openssl:openssl:3.0.0:*:*:*:*:*:*:*"
                                },
                                {
                                    "vulnerable": false,
                                    "criteria": "cpe:2.3:o:debian:debian_linux:10.0:*:*:*:*:*:*:*"
                                }
                            ]
                        }]
                    }],
                    "references": [{"url": "https://www.openssl.org/news/secadv/20220315.txt"}]
                }
            },
            {
                "cve": {
                    "id": "CVE-2023-99999",
                    "published": "2023-01-01T00:00:00.000",
                    "descriptions": [{"lang": "en", "value": "No metrics yet."}]
                }
            }
        ]
    }"#;

    #[test]
    fn test_parse_nvd2_page() {
        let batch = parse_document(NVD2_PAGE).unwrap();
        assert_eq!(batch.len(), 2);

        let record = batch.entries[0].as_ref().unwrap();
        assert_eq!(record.cve_id, "CVE-2022-0778");
        assert_eq!(record.severity, Severity::High);
        assert_eq!(record.cvss_score, Some(7.5));
        assert_eq!(record.description, "Infinite loop in BN_mod_sqrt().");
        assert_eq!(record.affected_products.len(), 2);
        assert_eq!(record.affected_products[0].product, "openssl");
        assert_eq!(
            record.affected_products[0].version_end_excluding.as_deref(),
            Some("1.0.2zd")
        );
        assert_eq!(record.affected_products[1].version.as_deref(), Some("3.0.0"));
        assert!(record.last_modified.is_some());
        assert_eq!(record.references.len(), 1);

        let unscored = batch.entries[1].as_ref().unwrap();
        assert_eq!(unscored.severity, Severity::Unknown);
        assert!(unscored.affected_products.is_empty());
    }

    #[test]
    fn test_severity_prefers_newest_labelled_metric() {
        assert_eq!(severity_of(Some("CRITICAL"), Some(5.0)), Severity::Critical);
        assert_eq!(severity_of(None, Some(9.8)), Severity::Critical);
        assert_eq!(severity_of(Some("NONE"), Some(4.3)), Severity::Medium);
        assert_eq!(severity_of(None, None), Severity::Unknown);
    }

    #[test]
    fn test_parse_nvd11_feed() {
        let raw = r#"{
            "CVE_data_type": "CVE",
            "CVE_Items": [{
                "cve": {
                    "CVE_data_meta": {"ID": "CVE-2019-1010022"},
                    "description": {"description_data": [{"lang": "en", "value": "GNU Libc stack guard bypass."}]},
                    "references": {"reference_data": [{"url": "https://sourceware.org/bugzilla/show_bug.cgi?id=22850"}]}
                },
                "configurations": {
                    "nodes": [{
                        "operator": "AND",
                        "children": [{
                            "operator": "OR",
                            "cpe_match": [{
                                "vulnerable": true,
                                "cpe23Uri": "cpe:2.3:a:gnu:glibc:*:*:*:*:*:*:*:*",
                                "versionEndIncluding": "2.29"
                            }]
                        }],
                        "cpe_match": []
                    }]
                },
                "impact": {
                    "baseMetricV3": {"cvssV3": {"baseScore": 9.8, "baseSeverity": "CRITICAL"}},
                    "baseMetricV2": {"cvssV2": {"baseScore": 7.5}, "severity": "HIGH"}
                },
                "publishedDate": "2019-07-15T04:15Z",
                "lastModifiedDate": "2019-07-22T18:15Z"
            }]
        }"#;
        let batch = parse_document(raw).unwrap();
        let record = batch.entries[0].as_ref().unwrap();

        assert_eq!(record.severity, Severity::Critical);
        assert_eq!(record.affected_products.len(), 1);
        assert_eq!(record.affected_products[0].product, "glibc");
        assert_eq!(record.affected_products[0].version_end_including.as_deref(), Some("2.29"));
        assert_eq!(record.published_at.to_rfc3339(), "2019-07-15T04:15:00+00:00");
    }

    #[test]
    fn test_native_entries_with_malformed_one() {
        let raw = r#"[
            {"cve_id": "CVE-2021-0001", "severity": "HIGH", "affected_products": [{"product": "curl", "version_end_excluding": "7.80.0"}], "description": "a", "published_at": "2021-01-01T00:00:00Z"},
            {"cve_id": "CVE-2021-0002", "severity": "LOW", "affected_products": [], "published_at": "2021-01-01T00:00:00Z"},
            {"cve_id": "CVE-21-1", "severity": "LOW", "affected_products": [], "description": "bad id", "published_at": "2021-01-01T00:00:00Z"},
            {"cve_id": "CVE-2021-0003", "severity": "UNKNOWN", "affected_products": [{"product": "pip", "repository_hint": "PYTHON_PIP"}], "description": "c", "published_at": "2021-01-01T00:00:00Z"}
        ]"#;
        let batch = parse_document(raw).unwrap();

        assert_eq!(batch.len(), 4);
        assert!(batch.entries[0].is_ok());
        assert!(matches!(batch.entries[1], Err(EntryError::Shape { index: 1, .. })));
        assert!(matches!(batch.entries[2], Err(EntryError::InvalidId(_))));
        let hinted = batch.entries[3].as_ref().unwrap();
        assert_eq!(hinted.affected_products[0].repository_hint, Some(RepositoryKind::PythonPip));
    }

    #[test]
    fn test_missing_description_and_date() {
        let raw = r#"{"vulnerabilities": [
            {"cve": {"id": "CVE-2020-1111", "published": "2020-01-01T00:00:00", "descriptions": []}},
            {"cve": {"id": "CVE-2020-2222", "descriptions": [{"lang": "en", "value": "x"}]}},
            {"cve": {"id": "CVE-2020-3333", "published": "yesterday", "descriptions": [{"lang": "en", "value": "x"}]}},
            {"not_a_cve": true}
        ]}"#;
        let batch = parse_document(raw).unwrap();

        assert!(matches!(
            batch.entries[0],
            Err(EntryError::MissingField { field: "description", .. })
        ));
        assert!(matches!(
            batch.entries[1],
            Err(EntryError::MissingField { field: "published", .. })
        ));
        assert!(matches!(batch.entries[2], Err(EntryError::InvalidDate { .. })));
        assert!(matches!(batch.entries[3], Err(EntryError::Shape { index: 3, .. })));
    }

    #[test]
    fn test_bad_envelopes_are_rejected() {
        assert!(matches!(parse_document("<html>"), Err(IngestError::Envelope(_))));
        assert!(matches!(parse_document("{\"foo\": 1}"), Err(IngestError::Envelope(_))));
        assert!(matches!(
            parse_document("{\"vulnerabilities\": 5}"),
            Err(IngestError::Envelope(_))
        ));
        assert!(matches!(parse_document("42"), Err(IngestError::Envelope(_))));
    }

    #[test]
    fn test_parse_timestamp_formats() {
        assert!(parse_timestamp("2022-03-15T17:15:08.513").is_some());
        assert!(parse_timestamp("2019-07-15T04:15Z").is_some());
        assert!(parse_timestamp("2021-01-01T00:00:00+02:00").is_some());
        assert!(parse_timestamp("not a date").is_none());
    }
}
