use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// The package manager a record came from.
///
/// The kind doubles as the selector for the versioning scheme used when
/// comparing the record's version (see [`crate::version::Scheme::for_kind`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryKind {
    DebianApt,
    PythonPip,
    Snap,
    Homebrew,
    ArchPacman,
    Docker,
    Unknown,
}

impl RepositoryKind {
    /// Every concrete package manager, in scan order.
    pub const ALL: [RepositoryKind; 6] = [
        RepositoryKind::DebianApt,
        RepositoryKind::PythonPip,
        RepositoryKind::Snap,
        RepositoryKind::Docker,
        RepositoryKind::Homebrew,
        RepositoryKind::ArchPacman,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryKind::DebianApt => "DEBIAN_APT",
            RepositoryKind::PythonPip => "PYTHON_PIP",
            RepositoryKind::Snap => "SNAP",
            RepositoryKind::Homebrew => "HOMEBREW",
            RepositoryKind::ArchPacman => "ARCH_PACMAN",
            RepositoryKind::Docker => "DOCKER",
            RepositoryKind::Unknown => "UNKNOWN",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            RepositoryKind::DebianApt => "APT",
            RepositoryKind::PythonPip => "pip",
            RepositoryKind::Snap => "Snap",
            RepositoryKind::Homebrew => "Homebrew",
            RepositoryKind::ArchPacman => "pacman",
            RepositoryKind::Docker => "Docker",
            RepositoryKind::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for RepositoryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

impl FromStr for RepositoryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "debian_apt" | "apt" | "dpkg" | "debian" => Ok(RepositoryKind::DebianApt),
            "python_pip" | "pip" | "python" | "pypi" => Ok(RepositoryKind::PythonPip),
            "snap" => Ok(RepositoryKind::Snap),
            "homebrew" | "brew" => Ok(RepositoryKind::Homebrew),
            "arch_pacman" | "pacman" | "arch" => Ok(RepositoryKind::ArchPacman),
            "docker" => Ok(RepositoryKind::Docker),
            "unknown" => Ok(RepositoryKind::Unknown),
            _ => Err(format!(
                "Unknown repository: {}. Use: apt, pip, snap, homebrew, pacman, docker",
                s
            )),
        }
    }
}

/// Optional manager-specific facts about an installed package.
///
/// None of these take part in matching.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageDetails {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub architecture: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub revision: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub publisher: Option<String>,
    /// Image id or container name for Docker records.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin: Option<String>,
}

impl PackageDetails {
    pub fn is_empty(&self) -> bool {
        self == &PackageDetails::default()
    }
}

/// One installed package, normalized from a package manager's listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PackageRecord {
    pub name: String,
    /// Raw version string; its scheme follows from `repository_kind`.
    pub version: String,
    pub repository_kind: RepositoryKind,
    #[serde(default, skip_serializing_if = "PackageDetails::is_empty")]
    pub details: PackageDetails,
}

impl PackageRecord {
    pub fn new(
        name: impl Into<String>,
        version: impl Into<String>,
        repository_kind: RepositoryKind,
    ) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            repository_kind,
            details: PackageDetails::default(),
        }
    }

    pub fn with_details(mut self, details: PackageDetails) -> Self {
        self.details = details;
        self
    }
}
