//! Package-manager adapters.
//!
//! Each [`Adapter`] turns one manager's native listing into canonical
//! [`PackageRecord`]s. Parsing is pure and works on captured text;
//! [`Adapter::collect`] additionally runs the listing command.
//!
//! # Available Adapters
//!
//! | Adapter | Command | Platforms |
//! |---------|---------|-----------|
//! | [`Adapter::Apt`] | `dpkg-query -W` (or `dpkg -l` text) | Linux |
//! | [`Adapter::Pip`] | `pip3 list --format=json` | All |
//! | [`Adapter::Snap`] | `snap list` | Linux |
//! | [`Adapter::Docker`] | `docker images` / `docker ps -a` | All |
//! | [`Adapter::Homebrew`] | `brew info --json=v2 --installed` | Linux, macOS |
//! | [`Adapter::Pacman`] | `pacman -Q` | Linux |
//!
//! # Example
//!
//! ```
//! use pkgaudit::scanner::Adapter;
//! use pkgaudit::RepositoryKind;
//!
//! let output = Adapter::Pacman.parse("openssl 3.1.4-1\nbash 5.2.021-1\n");
//! assert_eq!(output.records.len(), 2);
//! assert_eq!(output.records[0].repository_kind, RepositoryKind::ArchPacman);
//! ```

mod apt;
mod docker;
mod homebrew;
mod pacman;
mod pip;
mod snap;

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use crate::error::{AdapterParseError, CollectError};
use crate::model::{PackageRecord, RepositoryKind};
use crate::platform::{find_executable, Platform};

/// Records parsed from one listing plus the lines that were skipped.
#[derive(Debug, Clone, PartialEq)]
pub struct AdapterOutput {
    pub kind: RepositoryKind,
    pub records: Vec<PackageRecord>,
    pub skipped: Vec<AdapterParseError>,
}

impl AdapterOutput {
    pub fn new(kind: RepositoryKind) -> Self {
        Self {
            kind,
            records: Vec::new(),
            skipped: Vec::new(),
        }
    }

    pub fn push(&mut self, record: PackageRecord) {
        self.records.push(record);
    }

    pub fn skip(&mut self, line: usize, content: impl Into<String>, reason: impl Into<String>) {
        self.skipped.push(AdapterParseError::new(line, content, reason));
    }

    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }

    fn extend(&mut self, other: AdapterOutput) {
        self.records.extend(other.records);
        self.skipped.extend(other.skipped);
    }
}

/// One supported package manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Adapter {
    Apt,
    Pip,
    Snap,
    Docker,
    Homebrew,
    Pacman,
}

impl Adapter {
    /// Returns the adapter for a repository kind; `Unknown` has none.
    pub fn for_kind(kind: RepositoryKind) -> Option<Adapter> {
        match kind {
            RepositoryKind::DebianApt => Some(Adapter::Apt),
            RepositoryKind::PythonPip => Some(Adapter::Pip),
            RepositoryKind::Snap => Some(Adapter::Snap),
            RepositoryKind::Docker => Some(Adapter::Docker),
            RepositoryKind::Homebrew => Some(Adapter::Homebrew),
            RepositoryKind::ArchPacman => Some(Adapter::Pacman),
            RepositoryKind::Unknown => None,
        }
    }

    pub fn kind(&self) -> RepositoryKind {
        match self {
            Adapter::Apt => RepositoryKind::DebianApt,
            Adapter::Pip => RepositoryKind::PythonPip,
            Adapter::Snap => RepositoryKind::Snap,
            Adapter::Docker => RepositoryKind::Docker,
            Adapter::Homebrew => RepositoryKind::Homebrew,
            Adapter::Pacman => RepositoryKind::ArchPacman,
        }
    }

    /// Returns the human-readable name of this adapter.
    pub fn name(&self) -> &'static str {
        match self {
            Adapter::Apt => "APT (dpkg)",
            Adapter::Pip => "pip",
            Adapter::Snap => "Snap",
            Adapter::Docker => "Docker images",
            Adapter::Homebrew => "Homebrew",
            Adapter::Pacman => "pacman",
        }
    }

    pub fn supported_platforms(&self) -> &'static [Platform] {
        match self {
            Adapter::Apt | Adapter::Snap | Adapter::Pacman => &[Platform::Linux],
            Adapter::Homebrew => &[Platform::Linux, Platform::MacOS],
            Adapter::Pip | Adapter::Docker => {
                &[Platform::Linux, Platform::MacOS, Platform::Windows]
            }
        }
    }

    /// Returns true if this adapter can run on the current platform.
    pub fn is_supported(&self) -> bool {
        self.supported_platforms().contains(&Platform::current())
    }

    /// Parses captured listing output. Malformed lines are skipped and
    /// reported in [`AdapterOutput::skipped`]; this never fails.
    pub fn parse(&self, raw: &str) -> AdapterOutput {
        match self {
            Adapter::Apt => apt::parse(raw),
            Adapter::Pip => pip::parse(raw),
            Adapter::Snap => snap::parse(raw),
            Adapter::Docker => docker::parse(raw),
            Adapter::Homebrew => homebrew::parse(raw),
            Adapter::Pacman => pacman::parse(raw),
        }
    }

    /// Runs the manager's listing command and parses its output.
    ///
    /// A manager that is not installed yields an empty output.
    ///
    /// # Errors
    ///
    /// Returns an error if the command cannot be spawned, exits with a
    /// failure status, or does not finish within `timeout`.
    pub async fn collect(&self, timeout: Duration) -> Result<AdapterOutput, CollectError> {
        let Some(program) = self.locate() else {
            tracing::debug!("{} not found on PATH, skipping", self.programs().join("/"));
            return Ok(AdapterOutput::new(self.kind()));
        };

        let mut output = AdapterOutput::new(self.kind());
        for args in self.invocations() {
            let raw = run_listing(&program, args, timeout).await?;
            output.extend(self.parse(&raw));
        }
        Ok(output)
    }

    /// Executable names tried in order.
    pub fn programs(&self) -> &'static [&'static str] {
        match self {
            Adapter::Apt => &[apt::PROGRAM],
            Adapter::Pip => pip::PROGRAMS,
            Adapter::Snap => &[snap::PROGRAM],
            Adapter::Docker => &[docker::PROGRAM],
            Adapter::Homebrew => &[homebrew::PROGRAM],
            Adapter::Pacman => &[pacman::PROGRAM],
        }
    }

    /// The first of [`Adapter::programs`] found on `PATH`.
    pub fn locate(&self) -> Option<PathBuf> {
        self.programs().iter().find_map(|p| find_executable(p))
    }

    /// The listing commands, as shown to users.
    pub fn commands(&self) -> Vec<String> {
        let program = self.programs().first().copied().unwrap_or_default();
        self.invocations()
            .iter()
            .map(|args| format!("{} {}", program, args.join(" ")))
            .collect()
    }

    fn invocations(&self) -> &'static [&'static [&'static str]] {
        match self {
            Adapter::Apt => &[apt::ARGS],
            Adapter::Pip => &[pip::ARGS],
            Adapter::Snap => &[snap::ARGS],
            Adapter::Docker => &[docker::IMAGES_ARGS, docker::CONTAINERS_ARGS],
            Adapter::Homebrew => &[homebrew::ARGS],
            Adapter::Pacman => &[pacman::ARGS],
        }
    }
}

impl std::fmt::Display for Adapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Returns every adapter, in scan order.
pub fn all_adapters() -> Vec<Adapter> {
    RepositoryKind::ALL
        .iter()
        .filter_map(|kind| Adapter::for_kind(*kind))
        .collect()
}

/// Runs a listing command, capturing stdout. The child is killed if the
/// timeout elapses.
async fn run_listing(program: &Path, args: &[&str], timeout: Duration) -> Result<String, CollectError> {
    let name = program
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| program.display().to_string());

    tracing::debug!("running {} {}", name, args.join(" "));

    let child = tokio::process::Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CollectError::Spawn {
            program: name.clone(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| CollectError::Spawn {
            program: name.clone(),
            source,
        })?,
        Err(_) => {
            return Err(CollectError::Timeout {
                program: name,
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(CollectError::Failed {
            program: name,
            status: output.status.to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}
