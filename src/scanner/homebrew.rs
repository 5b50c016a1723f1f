use serde::Deserialize;
use std::cmp::Ordering;

use crate::model::{PackageRecord, RepositoryKind};
use crate::version::{compare, Scheme};

use super::AdapterOutput;

pub(super) const PROGRAM: &str = "brew";
pub(super) const ARGS: &[&str] = &["info", "--json=v2", "--installed"];

#[derive(Deserialize)]
struct BrewInfo {
    #[serde(default)]
    formulae: Vec<serde_json::Value>,
    #[serde(default)]
    casks: Vec<serde_json::Value>,
}

#[derive(Deserialize)]
struct BrewFormula {
    name: String,
    #[serde(default)]
    installed: Vec<InstalledVersion>,
}

#[derive(Deserialize)]
struct InstalledVersion {
    version: String,
}

#[derive(Deserialize)]
struct BrewCask {
    token: String,
    installed: Option<String>,
    version: Option<String>,
}

/// Parses either `brew info --json=v2 --installed` or `brew list --versions`.
pub fn parse(raw: &str) -> AdapterOutput {
    if raw.trim_start().starts_with('{') {
        parse_info(raw)
    } else {
        parse_list(raw)
    }
}

/// `brew list --versions`: `name v1 [v2 ...]`. With several kegs installed
/// the highest version is kept.
fn parse_list(raw: &str) -> AdapterOutput {
    let mut output = AdapterOutput::new(RepositoryKind::Homebrew);

    for (idx, line) in raw.lines().enumerate() {
        let mut fields = line.split_whitespace();
        let Some(name) = fields.next() else { continue };
        match highest(fields) {
            Some(version) => output.push(PackageRecord::new(name, version, RepositoryKind::Homebrew)),
            None => output.skip(idx + 1, line, "no installed version"),
        }
    }

    output
}

fn parse_info(raw: &str) -> AdapterOutput {
    let mut output = AdapterOutput::new(RepositoryKind::Homebrew);

    let info: BrewInfo = match serde_json::from_str(raw) {
        Ok(info) => info,
        Err(e) => {
            output.skip(1, raw.chars().take(80).collect::<String>(), format!("invalid brew JSON: {}", e));
            return output;
        }
    };

    let mut entry = 0;
    for value in info.formulae {
        entry += 1;
        let content = value.to_string();
        match serde_json::from_value::<BrewFormula>(value) {
            Ok(formula) => {
                let installed = formula.installed.iter().map(|v| v.version.as_str());
                match highest(installed) {
                    Some(version) => output.push(PackageRecord::new(
                        formula.name,
                        version,
                        RepositoryKind::Homebrew,
                    )),
                    None => output.skip(entry, content, "formula has no installed version"),
                }
            }
            Err(e) => output.skip(entry, content, e.to_string()),
        }
    }

    for value in info.casks {
        entry += 1;
        let content = value.to_string();
        match serde_json::from_value::<BrewCask>(value) {
            Ok(cask) => match cask.installed.or(cask.version).filter(|v| !v.is_empty()) {
                Some(version) => {
                    output.push(PackageRecord::new(cask.token, version, RepositoryKind::Homebrew))
                }
                None => output.skip(entry, content, "cask has no installed version"),
            },
            Err(e) => output.skip(entry, content, e.to_string()),
        }
    }

    output
}

/// Picks the highest version under the Homebrew scheme. Unparseable
/// versions lose against parseable ones; ties keep the first seen.
fn highest<'a>(versions: impl Iterator<Item = &'a str>) -> Option<&'a str> {
    versions.fold(None, |best, candidate| match best {
        None => Some(candidate),
        Some(current) => match compare(candidate, current, Scheme::Homebrew) {
            Ok(Ordering::Greater) => Some(candidate),
            Ok(_) => Some(current),
            Err(_) if compare(current, current, Scheme::Homebrew).is_err() => Some(candidate),
            Err(_) => Some(current),
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_versions() {
        let raw = "openssl@3 3.1.4 3.2.0\ncurl 8.4.0\nwget\n";
        let output = parse(raw);

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].name, "openssl@3");
        assert_eq!(output.records[0].version, "3.2.0");
        assert_eq!(output.records[1].version, "8.4.0");
        assert_eq!(output.skipped.len(), 1);
        assert_eq!(output.skipped[0].line, 3);
    }

    #[test]
    fn test_highest_version_ignores_listing_order() {
        let output = parse("python@3.11 3.11.6_1 3.11.10 3.11.9\n");
        assert_eq!(output.records[0].version, "3.11.10");
    }

    #[test]
    fn test_parse_info_json() {
        let raw = r#"{
            "formulae": [
                {"name": "openssl@3", "full_name": "openssl@3", "installed": [{"version": "3.1.4"}]},
                {"name": "ghost", "installed": []}
            ],
            "casks": [
                {"token": "firefox", "name": ["Firefox"], "version": "120.0", "installed": "119.0.1"}
            ]
        }"#;
        let output = parse(raw);

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].name, "openssl@3");
        assert_eq!(output.records[1].name, "firefox");
        assert_eq!(output.records[1].version, "119.0.1");
        assert_eq!(output.skipped.len(), 1);
    }
}
