use serde::Deserialize;

use crate::model::{PackageDetails, PackageRecord, RepositoryKind};

use super::AdapterOutput;

pub(super) const PROGRAM: &str = "docker";
pub(super) const IMAGES_ARGS: &[&str] = &["images", "--format", "json"];
pub(super) const CONTAINERS_ARGS: &[&str] = &["ps", "-a", "--format", "json"];

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ImageLine {
    repository: String,
    tag: String,
    #[serde(rename = "ID", default)]
    id: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ContainerLine {
    image: String,
    #[serde(default)]
    names: Option<String>,
}

/// Parses JSON-lines from `docker images --format json` or
/// `docker ps -a --format json`; the shape is detected per line.
pub fn parse(raw: &str) -> AdapterOutput {
    let mut output = AdapterOutput::new(RepositoryKind::Docker);

    for (idx, line) in raw.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let value: serde_json::Value = match serde_json::from_str(line) {
            Ok(value) => value,
            Err(e) => {
                output.skip(idx + 1, line, format!("invalid JSON: {}", e));
                continue;
            }
        };

        if value.get("Repository").is_some() {
            match serde_json::from_value::<ImageLine>(value) {
                Ok(image) => push_image(&mut output, idx + 1, line, image),
                Err(e) => output.skip(idx + 1, line, e.to_string()),
            }
        } else if value.get("Image").is_some() {
            match serde_json::from_value::<ContainerLine>(value) {
                Ok(container) => push_container(&mut output, idx + 1, line, container),
                Err(e) => output.skip(idx + 1, line, e.to_string()),
            }
        } else {
            output.skip(idx + 1, line, "neither an image nor a container listing");
        }
    }

    output
}

fn push_image(output: &mut AdapterOutput, line_no: usize, line: &str, image: ImageLine) {
    if image.repository.is_empty() {
        output.skip(line_no, line, "empty repository");
        return;
    }
    // Dangling layers carry no name to match against.
    if image.repository == "<none>" {
        return;
    }

    let details = PackageDetails {
        origin: image.id.filter(|id| !id.is_empty()),
        ..PackageDetails::default()
    };
    output.push(
        PackageRecord::new(image.repository, image.tag, RepositoryKind::Docker).with_details(details),
    );
}

fn push_container(output: &mut AdapterOutput, line_no: usize, line: &str, container: ContainerLine) {
    let Some((repository, version)) = split_reference(&container.image) else {
        output.skip(line_no, line, "empty image reference");
        return;
    };

    let details = PackageDetails {
        origin: container.names.filter(|n| !n.is_empty()),
        ..PackageDetails::default()
    };
    output.push(PackageRecord::new(repository, version, RepositoryKind::Docker).with_details(details));
}

/// Splits `repo[:tag][@digest]` into repository and version. A digest wins
/// over the tag; with neither, the tag defaults to `latest`.
pub(crate) fn split_reference(reference: &str) -> Option<(&str, &str)> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    if let Some((repo, digest)) = reference.split_once('@') {
        let repo = strip_tag(repo).0;
        return Some((repo, digest));
    }

    let (repo, tag) = strip_tag(reference);
    Some((repo, tag.unwrap_or("latest")))
}

fn strip_tag(reference: &str) -> (&str, Option<&str>) {
    // A colon before the last '/' belongs to a registry port.
    let name_start = reference.rfind('/').map(|i| i + 1).unwrap_or(0);
    match reference[name_start..].rfind(':') {
        Some(pos) => {
            let split = name_start + pos;
            (&reference[..split], Some(&reference[split + 1..]))
        }
        None => (reference, None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_images() {
        let raw = r#"{"Containers":"N/A","CreatedAt":"2023-11-01","ID":"a1b2c3","Repository":"nginx","Tag":"1.25.3","Size":"187MB"}
{"ID":"d4e5f6","Repository":"redis","Tag":"latest"}
{"ID":"0000aa","Repository":"<none>","Tag":"<none>"}"#;
        let output = parse(raw);

        assert_eq!(output.records.len(), 2);
        assert_eq!(output.records[0].name, "nginx");
        assert_eq!(output.records[0].version, "1.25.3");
        assert_eq!(output.records[0].details.origin.as_deref(), Some("a1b2c3"));
        assert_eq!(output.records[1].version, "latest");
        assert!(output.skipped.is_empty());
    }

    #[test]
    fn test_parse_containers() {
        let raw = r#"{"Names":"web","Image":"nginx:1.25.3","State":"running"}
{"Names":"cache","Image":"redis"}
{"Names":"app","Image":"registry.local:5000/team/app:2.0.1"}"#;
        let output = parse(raw);

        assert_eq!(output.records.len(), 3);
        assert_eq!(output.records[0].details.origin.as_deref(), Some("web"));
        assert_eq!(output.records[1].name, "redis");
        assert_eq!(output.records[1].version, "latest");
        assert_eq!(output.records[2].name, "registry.local:5000/team/app");
        assert_eq!(output.records[2].version, "2.0.1");
    }

    #[test]
    fn test_split_reference_digest() {
        assert_eq!(
            split_reference("alpine@sha256:abcd"),
            Some(("alpine", "sha256:abcd"))
        );
        assert_eq!(split_reference("registry:5000/app"), Some(("registry:5000/app", "latest")));
        assert_eq!(split_reference("  "), None);
    }

    #[test]
    fn test_malformed_lines() {
        let output = parse("not json\n{\"Foo\":1}\n");
        assert!(output.records.is_empty());
        assert_eq!(output.skipped.len(), 2);
    }
}
