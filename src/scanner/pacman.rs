use crate::model::{PackageRecord, RepositoryKind};

use super::AdapterOutput;

pub(super) const PROGRAM: &str = "pacman";
pub(super) const ARGS: &[&str] = &["-Q"];

/// Parses `pacman -Q` output: one `name version` pair per line.
pub fn parse(raw: &str) -> AdapterOutput {
    let mut output = AdapterOutput::new(RepositoryKind::ArchPacman);

    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ') {
            Some((name, version)) if !name.is_empty() && !version.trim().is_empty() => {
                let version = version.trim();
                if version.contains(char::is_whitespace) {
                    output.skip(idx + 1, line, "unexpected extra columns");
                    continue;
                }
                output.push(PackageRecord::new(name, version, RepositoryKind::ArchPacman));
            }
            _ => output.skip(idx + 1, line, "expected `name version`"),
        }
    }

    output
}
