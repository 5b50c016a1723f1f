//! Dot-separated numeric versions used by pacman, Homebrew, Snap and Docker.
//!
//! A version is an optional numeric epoch, a release made of dot-separated
//! integers (compared with implicit zero padding) and a free-form trailing
//! suffix that only breaks ties.

use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenericVersion {
    pub epoch: u64,
    pub release: Vec<u64>,
    pub suffix: String,
}

impl GenericVersion {
    /// Parses a version that starts with a digit (after an optional `v`).
    ///
    /// `allow_epoch` enables the pacman `epoch:` prefix.
    pub fn parse(raw: &str, allow_epoch: bool) -> Option<Self> {
        let mut s = raw.trim();
        if s.is_empty() || s.chars().any(char::is_whitespace) {
            return None;
        }

        let mut epoch = 0;
        if allow_epoch {
            if let Some((prefix, rest)) = s.split_once(':') {
                if !prefix.is_empty() && prefix.bytes().all(|b| b.is_ascii_digit()) {
                    epoch = prefix.parse().ok()?;
                    s = rest;
                }
            }
        }

        if let Some(rest) = s.strip_prefix(['v', 'V']) {
            if rest.starts_with(|c: char| c.is_ascii_digit()) {
                s = rest;
            }
        }

        let bytes = s.as_bytes();
        if !bytes.first().is_some_and(u8::is_ascii_digit) {
            return None;
        }

        let mut release = Vec::new();
        let mut pos = 0;
        loop {
            let start = pos;
            while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                pos += 1;
            }
            release.push(s[start..pos].parse().ok()?);

            let next_is_segment = bytes.get(pos) == Some(&b'.')
                && bytes.get(pos + 1).is_some_and(u8::is_ascii_digit);
            if !next_is_segment {
                break;
            }
            pos += 1;
        }

        Some(Self {
            epoch,
            release,
            suffix: s[pos..].to_string(),
        })
    }
}

impl Ord for GenericVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.epoch
            .cmp(&other.epoch)
            .then_with(|| compare_release(&self.release, &other.release))
            .then_with(|| compare_runs(&self.suffix, &other.suffix))
    }
}

impl PartialOrd for GenericVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

fn compare_release(a: &[u64], b: &[u64]) -> Ordering {
    let len = a.len().max(b.len());
    (0..len)
        .map(|i| {
            let x = a.get(i).copied().unwrap_or(0);
            let y = b.get(i).copied().unwrap_or(0);
            x.cmp(&y)
        })
        .find(|ord| ord.is_ne())
        .unwrap_or(Ordering::Equal)
}

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord)]
enum Run<'a> {
    Text(&'a str),
    Number(&'a str),
}

fn split_runs(s: &str) -> Vec<Run<'_>> {
    let mut runs = Vec::new();
    let mut start = 0;
    let bytes = s.as_bytes();
    while start < bytes.len() {
        let digit = bytes[start].is_ascii_digit();
        let mut end = start;
        while end < bytes.len() && bytes[end].is_ascii_digit() == digit {
            end += 1;
        }
        let run = &s[start..end];
        runs.push(if digit { Run::Number(run) } else { Run::Text(run) });
        start = end;
    }
    runs
}

fn compare_number_runs(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Suffix tie-break: digit runs numerically, everything else lexically,
/// and a shorter run sequence before a longer one (so no suffix sorts first).
fn compare_runs(a: &str, b: &str) -> Ordering {
    let a = split_runs(a);
    let b = split_runs(b);
    for (x, y) in a.iter().zip(b.iter()) {
        let ord = match (x, y) {
            (Run::Number(x), Run::Number(y)) => compare_number_runs(x, y),
            _ => x.cmp(y),
        };
        if ord.is_ne() {
            return ord;
        }
    }
    a.len().cmp(&b.len())
}
