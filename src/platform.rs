//! Platform detection and path resolution.
//!
//! Locates the per-user configuration and cache directories and
//! finds package-manager executables on `PATH`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const APP_DIR: &str = "pkgaudit";

/// Operating system family an adapter can run on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linux,
    MacOS,
    Windows,
}

impl Platform {
    /// Returns the platform this binary was compiled for.
    pub fn current() -> Self {
        if cfg!(target_os = "macos") {
            Platform::MacOS
        } else if cfg!(target_os = "windows") {
            Platform::Windows
        } else {
            Platform::Linux
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Platform::Linux => write!(f, "Linux"),
            Platform::MacOS => write!(f, "macOS"),
            Platform::Windows => write!(f, "Windows"),
        }
    }
}

/// Returns the configuration directory, e.g. `~/.config/pkgaudit/`.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

/// Returns the cache directory for pkgaudit.
///
/// Platform-specific locations:
/// - Linux: `~/.cache/pkgaudit/`
/// - macOS: `~/Library/Caches/pkgaudit/`
/// - Windows: `%LOCALAPPDATA%\pkgaudit\`
///
/// Falls back to the system temp directory if none can be determined.
pub fn cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(APP_DIR)
}

/// Finds `program` in the directories listed in `PATH`.
pub fn find_executable(program: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    find_in(program, std::env::split_paths(&path))
}

fn find_in(program: &str, dirs: impl Iterator<Item = PathBuf>) -> Option<PathBuf> {
    for dir in dirs {
        for name in candidate_names(program) {
            let candidate = dir.join(&name);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

fn candidate_names(program: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{}.exe", program), program.to_string()]
    } else {
        vec![program.to_string()]
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_dir_is_namespaced() {
        assert!(cache_dir().ends_with("pkgaudit"));
    }

    #[test]
    fn test_find_in_skips_missing_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let dirs = vec![dir.path().join("absent"), dir.path().to_path_buf()];
        assert!(find_in("definitely-not-installed-pm", dirs.into_iter()).is_none());
    }

    #[cfg(unix)]
    #[test]
    fn test_find_in_requires_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("fakepm");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        let lookup = || find_in("fakepm", vec![dir.path().to_path_buf()].into_iter());
        assert!(lookup().is_none());

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(lookup(), Some(tool));
    }
}
