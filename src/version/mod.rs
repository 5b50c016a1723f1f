//! Version ordering and range containment across package-manager schemes.
//!
//! Every [`RepositoryKind`] maps to exactly one [`Scheme`]. Versions are
//! parsed into a [`ParsedVersion`] tagged with their scheme; only versions
//! of the same scheme can be ordered.
//!
//! | Scheme | Used by | Grammar |
//! |--------|---------|---------|
//! | Debian | APT | `[epoch:]upstream[-revision]`, dpkg ordering |
//! | PEP 440 | pip | release, pre/post/dev segments (`pep440_rs`) |
//! | Pacman | pacman | `[epoch:]x.y.z[-pkgrel]` |
//! | Homebrew, Snap | brew, snap | `x.y.z[suffix]` |
//! | Docker | image tags | `[v]x.y.z[suffix]`; `latest`, digests are unorderable |
//!
//! # Example
//!
//! ```
//! use pkgaudit::model::ProductRange;
//! use pkgaudit::version::{compare, in_range, Scheme};
//! use std::cmp::Ordering;
//!
//! assert_eq!(compare("1.0~rc1", "1.0", Scheme::Debian).unwrap(), Ordering::Less);
//!
//! let range = ProductRange::new("openssl").end_excluding("1.1.1-1ubuntu2.2");
//! assert!(in_range("1.1.1-1ubuntu2.1", &range, Some(Scheme::Debian)));
//! ```

mod debian;
mod generic;

pub use debian::DebianVersion;
pub use generic::GenericVersion;

use serde::Serialize;
use std::cmp::Ordering;
use std::str::FromStr;

use crate::error::CompareError;
use crate::model::{ProductRange, RepositoryKind};

/// A versioning grammar with its ordering rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Scheme {
    Debian,
    Pep440,
    Pacman,
    Homebrew,
    Snap,
    Docker,
}

impl Scheme {
    /// The scheme a repository's versions follow; `Unknown` has none.
    pub fn for_kind(kind: RepositoryKind) -> Option<Scheme> {
        match kind {
            RepositoryKind::DebianApt => Some(Scheme::Debian),
            RepositoryKind::PythonPip => Some(Scheme::Pep440),
            RepositoryKind::ArchPacman => Some(Scheme::Pacman),
            RepositoryKind::Homebrew => Some(Scheme::Homebrew),
            RepositoryKind::Snap => Some(Scheme::Snap),
            RepositoryKind::Docker => Some(Scheme::Docker),
            RepositoryKind::Unknown => None,
        }
    }
}

impl std::fmt::Display for Scheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Scheme::Debian => "Debian",
            Scheme::Pep440 => "PEP 440",
            Scheme::Pacman => "pacman",
            Scheme::Homebrew => "Homebrew",
            Scheme::Snap => "Snap",
            Scheme::Docker => "Docker",
        };
        f.write_str(name)
    }
}

/// A version string parsed under a specific scheme.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedVersion {
    Debian(DebianVersion),
    Pep440(pep440_rs::Version),
    Generic {
        scheme: Scheme,
        version: GenericVersion,
    },
}

impl ParsedVersion {
    pub fn parse(raw: &str, scheme: Scheme) -> Result<Self, CompareError> {
        let parsed = match scheme {
            Scheme::Debian => DebianVersion::parse(raw).map(ParsedVersion::Debian),
            Scheme::Pep440 => pep440_rs::Version::from_str(raw.trim())
                .ok()
                .map(ParsedVersion::Pep440),
            Scheme::Pacman => GenericVersion::parse(raw, true)
                .map(|version| ParsedVersion::Generic { scheme, version }),
            Scheme::Homebrew | Scheme::Snap | Scheme::Docker => GenericVersion::parse(raw, false)
                .map(|version| ParsedVersion::Generic { scheme, version }),
        };

        parsed.ok_or_else(|| match scheme {
            Scheme::Docker => CompareError::Unresolvable {
                version: raw.to_string(),
            },
            _ => CompareError::UnknownScheme {
                version: raw.to_string(),
                scheme,
            },
        })
    }

    pub fn scheme(&self) -> Scheme {
        match self {
            ParsedVersion::Debian(_) => Scheme::Debian,
            ParsedVersion::Pep440(_) => Scheme::Pep440,
            ParsedVersion::Generic { scheme, .. } => *scheme,
        }
    }

    /// Orders two parsed versions; fails when their schemes differ.
    pub fn compare(&self, other: &ParsedVersion) -> Result<Ordering, CompareError> {
        match (self, other) {
            (ParsedVersion::Debian(a), ParsedVersion::Debian(b)) => Ok(a.cmp(b)),
            (ParsedVersion::Pep440(a), ParsedVersion::Pep440(b)) => Ok(a.cmp(b)),
            (
                ParsedVersion::Generic { scheme: sa, version: a },
                ParsedVersion::Generic { scheme: sb, version: b },
            ) if sa == sb => Ok(a.cmp(b)),
            _ => Err(CompareError::SchemeMismatch {
                left: self.scheme(),
                right: other.scheme(),
            }),
        }
    }
}

/// Compares two raw version strings under `scheme`.
pub fn compare(a: &str, b: &str, scheme: Scheme) -> Result<Ordering, CompareError> {
    let a = ParsedVersion::parse(a, scheme)?;
    let b = ParsedVersion::parse(b, scheme)?;
    a.compare(&b)
}

/// Outcome of testing one version against one range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeCheck {
    Inside,
    Outside,
    /// A comparison needed by the range could not be made.
    Unresolved(CompareError),
}

impl RangeCheck {
    pub fn is_inside(&self) -> bool {
        matches!(self, RangeCheck::Inside)
    }
}

/// Tests `version` against `range`, reporting why a check could not be made.
///
/// `scheme` is `None` for packages of an unknown repository kind: those can
/// only match unbounded ranges or an exact version by string equality.
pub fn check_range(version: &str, range: &ProductRange, scheme: Option<Scheme>) -> RangeCheck {
    if range.is_unbounded() {
        return RangeCheck::Inside;
    }

    if let Some(exact) = &range.version {
        let equal_strings = exact.trim() == version.trim();
        let Some(scheme) = scheme else {
            return inside_if(equal_strings);
        };
        return match compare(version, exact, scheme) {
            Ok(ord) => inside_if(ord == Ordering::Equal),
            Err(_) if equal_strings => RangeCheck::Inside,
            Err(err) => RangeCheck::Unresolved(err),
        };
    }

    let Some(scheme) = scheme else {
        return RangeCheck::Unresolved(CompareError::Unresolvable {
            version: version.to_string(),
        });
    };
    let installed = match ParsedVersion::parse(version, scheme) {
        Ok(parsed) => parsed,
        Err(err) => return RangeCheck::Unresolved(err),
    };

    let bounds = [
        (&range.version_start_including, Bound::StartIncluding),
        (&range.version_start_excluding, Bound::StartExcluding),
        (&range.version_end_including, Bound::EndIncluding),
        (&range.version_end_excluding, Bound::EndExcluding),
    ];
    for (limit, bound) in bounds {
        let Some(limit) = limit else { continue };
        let ord = match ParsedVersion::parse(limit, scheme).and_then(|l| installed.compare(&l)) {
            Ok(ord) => ord,
            Err(err) => return RangeCheck::Unresolved(err),
        };
        if !bound.admits(ord) {
            return RangeCheck::Outside;
        }
    }

    RangeCheck::Inside
}

/// Whether `version` falls inside `range`. Unresolvable comparisons never match.
pub fn in_range(version: &str, range: &ProductRange, scheme: Option<Scheme>) -> bool {
    check_range(version, range, scheme).is_inside()
}

fn inside_if(condition: bool) -> RangeCheck {
    if condition {
        RangeCheck::Inside
    } else {
        RangeCheck::Outside
    }
}

#[derive(Clone, Copy)]
enum Bound {
    StartIncluding,
    StartExcluding,
    EndIncluding,
    EndExcluding,
}

impl Bound {
    /// `ord` is the installed version compared to the bound's version.
    fn admits(self, ord: Ordering) -> bool {
        match self {
            Bound::StartIncluding => ord != Ordering::Less,
            Bound::StartExcluding => ord == Ordering::Greater,
            Bound::EndIncluding => ord != Ordering::Greater,
            Bound::EndExcluding => ord == Ordering::Less,
        }
    }
}
