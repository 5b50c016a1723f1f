use crate::model::{PackageDetails, PackageRecord, RepositoryKind};

use super::AdapterOutput;

pub(super) const PROGRAM: &str = "dpkg-query";
pub(super) const ARGS: &[&str] = &[
    "-W",
    "-f=${Package}\t${Version}\t${Architecture}\t${Status}\n",
];

/// Parses `dpkg-query -W` tab-separated output or a `dpkg -l` listing.
pub fn parse(raw: &str) -> AdapterOutput {
    let mut output = AdapterOutput::new(RepositoryKind::DebianApt);

    for (idx, line) in raw.lines().enumerate() {
        let line_no = idx + 1;
        if line.trim().is_empty() {
            continue;
        }

        if line.contains('\t') {
            parse_query_line(&mut output, line_no, line);
        } else {
            parse_list_line(&mut output, line_no, line);
        }
    }

    output
}

fn parse_query_line(output: &mut AdapterOutput, line_no: usize, line: &str) {
    let parts: Vec<&str> = line.split('\t').collect();
    if parts.len() < 4 {
        output.skip(line_no, line, "expected package, version, architecture and status");
        return;
    }

    let (name, version, arch, status) = (parts[0].trim(), parts[1].trim(), parts[2].trim(), parts[3]);
    if !status_installed(status) {
        // Packages known to dpkg but never unpacked have no version.
        return;
    }
    if name.is_empty() || version.is_empty() {
        output.skip(line_no, line, "empty package name or version");
        return;
    }

    output.push(record(name, version, Some(arch)));
}

fn parse_list_line(output: &mut AdapterOutput, line_no: usize, line: &str) {
    let trimmed = line.trim_start();
    if trimmed.starts_with("Desired=")
        || trimmed.starts_with('|')
        || trimmed.starts_with("+++")
    {
        return;
    }

    let mut fields = trimmed.split_whitespace();
    let (Some(status), Some(name), Some(version)) = (fields.next(), fields.next(), fields.next())
    else {
        output.skip(line_no, line, "expected status, name and version columns");
        return;
    };

    if !(2..=3).contains(&status.len()) || !status.chars().all(|c| c.is_ascii_alphabetic()) {
        output.skip(line_no, line, "unrecognized dpkg status column");
        return;
    }
    if !row_installed(status) {
        return;
    }

    let arch = fields.next();
    let (name, qualifier) = match name.split_once(':') {
        Some((name, qualifier)) => (name, Some(qualifier)),
        None => (name, None),
    };
    output.push(record(name, version, qualifier.or(arch)));
}

/// `${Status}` is `<want> <error> <state>`. The selection (`install`, `hold`,
/// `deinstall`, `purge`) does not change what is on disk, so only the
/// current state and the error flag decide.
fn status_installed(status: &str) -> bool {
    let mut words = status.split_whitespace();
    let (Some(_want), Some(error), Some(state)) = (words.next(), words.next(), words.next()) else {
        return false;
    };
    error == "ok" && state == "installed"
}

/// `dpkg -l` rows: desired action, current state, then an optional error
/// flag. `ii` and `hi` are kept, `rc`, `iU`, `iH` and `iiR` are not.
fn row_installed(status: &str) -> bool {
    let mut flags = status.chars();
    let _desired = flags.next();
    flags.next() == Some('i') && flags.next().is_none()
}

fn record(name: &str, version: &str, arch: Option<&str>) -> PackageRecord {
    let details = PackageDetails {
        architecture: arch.filter(|a| !a.is_empty()).map(str::to_string),
        ..PackageDetails::default()
    };
    PackageRecord::new(name, version, RepositoryKind::DebianApt).with_details(details)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dpkg_query_output() {
        let raw = "openssl\t1.1.1f-1ubuntu2.20\tamd64\tinstall ok installed\n\
                   python3\t3.8.2-0ubuntu2\tamd64\tinstall ok installed\n\
                   oldpkg\t1.0-1\tamd64\tdeinstall ok config-files\n";
        let output = parse(raw);

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].name, "openssl");
        assert_eq!(output.records[0].version, "1.1.1f-1ubuntu2.20");
        assert_eq!(output.records[0].details.architecture.as_deref(), Some("amd64"));
        assert!(output.skipped.is_empty());
    }

    #[test]
    fn test_parse_dpkg_list_output() {
        let raw = "\
Desired=Unknown/Install/Remove/Purge/Hold
| Status=Not/Inst/Conf-files/Unpacked/halF-conf/Half-inst/trig-aWait/Trig-pend
|/ Err?=(none)/Reinst-required (Status,Err: uppercase=bad)
||/ Name           Version          Architecture Description
+++-==============-================-============-=================================
ii  libssl3:amd64  3.0.2-0ubuntu1.10 amd64       Secure Sockets Layer toolkit
rc  oldlib         1.2-3            amd64        removed library
ii  zlib1g         1:1.2.11.dfsg-2  amd64        compression library
";
        let output = parse(raw);

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].name, "libssl3");
        assert_eq!(output.records[0].details.architecture.as_deref(), Some("amd64"));
        assert_eq!(output.records[1].version, "1:1.2.11.dfsg-2");
        assert!(output.skipped.is_empty());
    }

    #[test]
    fn test_held_packages_are_kept() {
        let output = parse("openssl\t1.1.1f-1ubuntu2.1\tamd64\thold ok installed\n");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].name, "openssl");
        assert_eq!(output.records[0].version, "1.1.1f-1ubuntu2.1");

        let output = parse("hi  openssl  1.1.1f-1ubuntu2.1  amd64  Secure Sockets Layer toolkit\n");
        assert_eq!(output.records.len(), 1);
        assert_eq!(output.records[0].name, "openssl");
        assert!(output.skipped.is_empty());
    }

    #[test]
    fn test_query_status_states() {
        let cases = [
            ("install ok installed", true),
            ("hold ok installed", true),
            ("deinstall ok installed", true),
            ("deinstall ok config-files", false),
            ("purge ok not-installed", false),
            ("install ok half-installed", false),
            ("install ok unpacked", false),
            ("install ok half-configured", false),
            ("install reinstreq installed", false),
        ];
        for (status, kept) in cases {
            let line = format!("pkg\t1.0-1\tamd64\t{}\n", status);
            let output = parse(&line);
            assert_eq!(output.records.len() == 1, kept, "status {:?}", status);
            assert!(output.skipped.is_empty(), "status {:?}", status);
        }
    }

    #[test]
    fn test_list_row_states() {
        let cases = [
            ("ii", true),
            ("hi", true),
            ("ri", true),
            ("rc", false),
            ("un", false),
            ("iU", false),
            ("iH", false),
            ("iF", false),
            ("iiR", false),
        ];
        for (status, kept) in cases {
            let line = format!("{}  pkg  1.0-1  amd64  description\n", status);
            let output = parse(&line);
            assert_eq!(output.records.len() == 1, kept, "row state {:?}", status);
            assert!(output.skipped.is_empty(), "row state {:?}", status);
        }
    }

    #[test]
    fn test_malformed_lines_are_counted() {
        let raw = "openssl\t1.1.1\n\
                   curl\t7.68.0-1ubuntu2\tamd64\tinstall ok installed\n\
                   garbage\n";
        let output = parse(raw);

        assert_eq!(output.records.len(), 1);
        assert_eq!(output.skipped.len(), 2);
        assert_eq!(output.skipped[0].line, 1);
        assert_eq!(output.skipped[1].line, 3);
    }

    #[test]
    fn test_empty_output() {
        let output = parse("");
        assert!(output.records.is_empty());
        assert!(output.skipped.is_empty());
    }
}
