use super::{AuditReport, ReportEntry, Verbosity};
use crate::model::Severity;
use tabled::{settings::Style, Table, Tabled};

#[derive(Tabled)]
struct BriefRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "CVE")]
    cve: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Source")]
    source: String,
}

#[derive(Tabled)]
struct RangeRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "CVE")]
    cve: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Source")]
    source: String,
    #[tabled(rename = "Affected")]
    range: String,
}

#[derive(Tabled)]
struct FullRow {
    #[tabled(rename = "Severity")]
    severity: String,
    #[tabled(rename = "CVE")]
    cve: String,
    #[tabled(rename = "Package")]
    package: String,
    #[tabled(rename = "Version")]
    version: String,
    #[tabled(rename = "Affected")]
    range: String,
    #[tabled(rename = "CVSS")]
    score: String,
    #[tabled(rename = "Description")]
    description: String,
}

pub fn print_table(report: &AuditReport) {
    println!();
    println!(
        "Audit completed at: {}",
        report.generated_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!();

    if report.entries.is_empty() {
        println!(
            "No vulnerabilities at or above {} found.",
            report.min_severity
        );
    } else {
        println!("Found {} vulnerabilities:", report.entries.len());
        println!();

        // Worst first; ties keep the canonical CVE order.
        let mut entries: Vec<&ReportEntry> = report.entries.iter().collect();
        entries.sort_by_key(|e| std::cmp::Reverse(e.severity.rank().unwrap_or(0)));

        println!("{}", render(&entries, report.verbosity));

        if report.verbosity >= Verbosity::Full {
            print_references(&entries);
        }
    }

    println!();
    print_summary(report);
}

fn render(entries: &[&ReportEntry], verbosity: Verbosity) -> String {
    match verbosity {
        Verbosity::Brief => {
            let rows: Vec<BriefRow> = entries
                .iter()
                .map(|e| BriefRow {
                    severity: format_severity(&e.severity),
                    cve: e.cve_id.clone(),
                    package: truncate(&e.package, 40),
                    version: truncate(&e.version, 30),
                    source: e.repository_kind.display_name().to_string(),
                })
                .collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        Verbosity::Ranges => {
            let rows: Vec<RangeRow> = entries
                .iter()
                .map(|e| RangeRow {
                    severity: format_severity(&e.severity),
                    cve: e.cve_id.clone(),
                    package: truncate(&e.package, 40),
                    version: truncate(&e.version, 30),
                    source: e.repository_kind.display_name().to_string(),
                    range: e.matched_range.clone().unwrap_or_else(|| "-".to_string()),
                })
                .collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
        Verbosity::Full => {
            let rows: Vec<FullRow> = entries
                .iter()
                .map(|e| FullRow {
                    severity: format_severity(&e.severity),
                    cve: e.cve_id.clone(),
                    package: format!("{} ({})", truncate(&e.package, 30), e.repository_kind.display_name()),
                    version: truncate(&e.version, 30),
                    range: e.matched_range.clone().unwrap_or_else(|| "-".to_string()),
                    score: e
                        .cvss_score
                        .map(|s| format!("{:.1}", s))
                        .unwrap_or_else(|| "-".to_string()),
                    description: truncate(e.description.as_deref().unwrap_or("-"), 60),
                })
                .collect();
            Table::new(rows).with(Style::rounded()).to_string()
        }
    }
}

fn print_references(entries: &[&ReportEntry]) {
    let with_refs: Vec<_> = entries.iter().filter(|e| !e.references.is_empty()).collect();
    if with_refs.is_empty() {
        return;
    }

    println!();
    println!("References:");
    for entry in with_refs {
        println!("  {}", entry.cve_id);
        for url in &entry.references {
            println!("    {}", url);
        }
    }
}

fn print_summary(report: &AuditReport) {
    let summary = &report.summary;
    let counts = &summary.severity_counts;

    println!("Summary:");
    if summary.ignored_packages > 0 {
        println!(
            "  Packages scanned: {} ({} ignored)",
            summary.packages_scanned, summary.ignored_packages
        );
    } else {
        println!("  Packages scanned: {}", summary.packages_scanned);
    }

    if summary.packages_by_kind.len() > 1 {
        let by_kind: Vec<String> = summary
            .packages_by_kind
            .iter()
            .map(|(kind, count)| format!("{} {}", count, kind.display_name()))
            .collect();
        println!("  By source: {}", by_kind.join(", "));
    }

    match summary.corpus_updated_at {
        Some(updated) => println!(
            "  CVE records: {} (updated {})",
            summary.corpus_records,
            updated.format("%Y-%m-%d %H:%M UTC")
        ),
        None => println!("  CVE records: {}", summary.corpus_records),
    }

    if counts.total() > 0 {
        println!(
            "  Vulnerabilities: {} critical, {} high, {} medium, {} low, {} unrated",
            counts.critical, counts.high, counts.medium, counts.low, counts.unknown
        );
    }

    let hidden = summary.total_matches.saturating_sub(counts.total() + summary.ignored);
    if hidden > 0 {
        println!("  Below {}: {}", report.min_severity, hidden);
    }
    if summary.ignored > 0 {
        println!("  Ignored: {}", summary.ignored);
    }
    if summary.skipped_lines > 0 {
        println!("  Unparseable listing lines skipped: {}", summary.skipped_lines);
    }
    if summary.unresolved_comparisons > 0 {
        println!(
            "  Version comparisons left undecided: {}",
            summary.unresolved_comparisons
        );
    }
    if !summary.failed_adapters.is_empty() {
        println!(
            "  \x1b[33mFailed package managers:\x1b[0m {}",
            summary.failed_adapters.join(", ")
        );
    }
}

fn format_severity(severity: &Severity) -> String {
    match severity {
        Severity::Critical => "\x1b[31mCRITICAL\x1b[0m".to_string(),
        Severity::High => "\x1b[91mHIGH\x1b[0m".to_string(),
        Severity::Medium => "\x1b[33mMEDIUM\x1b[0m".to_string(),
        Severity::Low => "\x1b[32mLOW\x1b[0m".to_string(),
        Severity::Unknown => "UNKNOWN".to_string(),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
