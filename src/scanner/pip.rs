use serde::Deserialize;

use crate::model::{PackageRecord, RepositoryKind};

use super::AdapterOutput;

/// Tried in order; the first one found on `PATH` is used.
pub(super) const PROGRAMS: &[&str] = &["pip3", "pip"];
pub(super) const ARGS: &[&str] = &["list", "--format=json"];

#[derive(Deserialize)]
struct PipEntry {
    name: String,
    version: String,
}

/// Parses the JSON array printed by `pip list --format=json`.
pub fn parse(raw: &str) -> AdapterOutput {
    let mut output = AdapterOutput::new(RepositoryKind::PythonPip);
    if raw.trim().is_empty() {
        return output;
    }

    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(entries) => entries,
        Err(e) => {
            output.skip(1, excerpt(raw), format!("invalid pip JSON: {}", e));
            return output;
        }
    };

    for (idx, value) in entries.into_iter().enumerate() {
        let content = value.to_string();
        match serde_json::from_value::<PipEntry>(value) {
            Ok(entry) if !entry.name.trim().is_empty() && !entry.version.trim().is_empty() => {
                output.push(PackageRecord::new(
                    entry.name.trim(),
                    entry.version.trim(),
                    RepositoryKind::PythonPip,
                ));
            }
            Ok(_) => output.skip(idx + 1, content, "empty name or version"),
            Err(e) => output.skip(idx + 1, content, e.to_string()),
        }
    }

    output
}

fn excerpt(raw: &str) -> String {
    raw.chars().take(80).collect()
}
