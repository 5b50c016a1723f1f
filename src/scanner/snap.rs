use crate::model::{PackageDetails, PackageRecord, RepositoryKind};

use super::AdapterOutput;

pub(super) const PROGRAM: &str = "snap";
pub(super) const ARGS: &[&str] = &["list"];

/// Parses the `snap list` table.
///
/// ```text
/// Name    Version   Rev    Tracking       Publisher   Notes
/// core20  20230801  2015   latest/stable  canonical✓  base
/// ```
pub fn parse(raw: &str) -> AdapterOutput {
    let mut output = AdapterOutput::new(RepositoryKind::Snap);

    for (idx, line) in raw.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() || (idx == 0 && trimmed.starts_with("Name")) {
            continue;
        }

        let fields: Vec<&str> = trimmed.split_whitespace().collect();
        if fields.len() < 3 {
            output.skip(idx + 1, line, "expected name, version and revision columns");
            continue;
        }

        let details = PackageDetails {
            revision: Some(fields[2].to_string()),
            channel: fields.get(3).map(|s| s.to_string()),
            publisher: fields
                .get(4)
                .map(|p| p.trim_end_matches(['✓', '*']).to_string())
                .filter(|p| !p.is_empty() && p != "-"),
            ..PackageDetails::default()
        };
        output.push(PackageRecord::new(fields[0], fields[1], RepositoryKind::Snap).with_details(details));
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_snap_list() {
        let raw = "\
Name               Version          Rev    Tracking         Publisher     Notes
core20             20230801         2015   latest/stable    canonical✓    base
firefox            119.0-2          3358   latest/stable/…  mozilla✓      -
lxd                5.0.2-838e1b2    24322  5.0/stable/…     canonical✓    -
";
        let output = parse(raw);

        assert_eq!(output.records.len(), 3);
        let firefox = &output.records[1];
        assert_eq!(firefox.name, "firefox");
        assert_eq!(firefox.version, "119.0-2");
        assert_eq!(firefox.details.revision.as_deref(), Some("3358"));
        assert_eq!(firefox.details.publisher.as_deref(), Some("mozilla"));
        assert!(output.skipped.is_empty());
    }

    #[test]
    fn test_short_rows_are_skipped() {
        let raw = "Name Version Rev Tracking Publisher Notes\nbroken 1.0\n";
        let output = parse(raw);

        assert!(output.records.is_empty());
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].line, 2);
    }
}
