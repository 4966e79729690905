// Directory Resolver
//
// Maps version identifiers (dates, semver strings, keywords) to install
// directories and to the executable inside an extracted install.

use std::cmp::Reverse;
use std::fmt;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::adapters::{AdapterError, ArchiveShape, PlatformTag, ReleaseSource};
use crate::config::{Layout, BINARY_NAME};
use crate::ledger::Ledger;

/// Keywords accepted wherever a version is expected.
pub const KEYWORDS: [&str; 2] = ["nightly", "stable"];

/// Maximum edit distance at which a keyword is suggested.
const SUGGESTION_DISTANCE: usize = 2;

/// Folder names used by past and present release archives.
const KNOWN_FOLDERS: &[&str] = &[
    "nvim-macos-arm64",
    "nvim-macos-x86_64",
    "nvim-macos",
    "nvim-osx64",
    "nvim-linux-x86_64",
    "nvim-linux-arm64",
    "nvim-linux64",
];

#[derive(Debug, thiserror::Error)]
pub enum ResolveError {
    #[error("{}", describe_invalid(.input, .suggestion))]
    InvalidVersionSpec {
        input: String,
        suggestion: Option<&'static str>,
    },

    #[error("no {} executable found under {}", BINARY_NAME, .0.display())]
    BinaryNotFound(PathBuf),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_invalid(input: &str, suggestion: &Option<&'static str>) -> String {
    match suggestion {
        Some(keyword) => format!("invalid version `{input}`: did you mean `{keyword}`?"),
        None => format!(
            "invalid version `{input}`; valid forms: `nightly` (latest nightly build), \
             `stable` (latest stable release), `x.y.z` (e.g. 0.9.5)"
        ),
    }
}

/// A `major.minor.patch` release number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StableVersion {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl StableVersion {
    pub const fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Tag name as published upstream.
    pub fn tag(&self) -> String {
        format!("v{self}")
    }
}

impl FromStr for StableVersion {
    type Err = ();

    /// Accepts `x.y.z` with an optional leading `v`.
    fn from_str(input: &str) -> Result<Self, Self::Err> {
        let trimmed = input.trim();
        let bare = trimmed
            .strip_prefix('v')
            .or_else(|| trimmed.strip_prefix('V'))
            .unwrap_or(trimmed);

        let mut parts = bare.split('.');
        let mut next = || -> Result<u64, ()> {
            let part = parts.next().ok_or(())?;
            if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(());
            }
            part.parse().map_err(|_| ())
        };
        let version = StableVersion::new(next()?, next()?, next()?);

        if parts.next().is_some() {
            return Err(());
        }
        Ok(version)
    }
}

impl fmt::Display for StableVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// What the user asked for, before any remote lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestedVersion {
    Nightly,
    LatestStable,
    Exact(StableVersion),
}

/// Canonical version after keyword resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionSpec {
    Nightly,
    Stable(StableVersion),
}

impl fmt::Display for VersionSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionSpec::Nightly => f.write_str("nightly"),
            VersionSpec::Stable(version) => write!(f, "{version}"),
        }
    }
}

/// Classify user input without touching the network.
pub fn parse_version_spec(input: &str) -> Result<RequestedVersion, ResolveError> {
    let lowered = input.trim().to_lowercase();
    match lowered.as_str() {
        "nightly" => return Ok(RequestedVersion::Nightly),
        "stable" => return Ok(RequestedVersion::LatestStable),
        _ => {}
    }

    if let Ok(version) = lowered.parse::<StableVersion>() {
        return Ok(RequestedVersion::Exact(version));
    }

    Err(ResolveError::InvalidVersionSpec {
        input: input.to_string(),
        suggestion: suggest_keyword(&lowered),
    })
}

/// Normalize user input to `nightly` or a concrete stable version.
pub fn resolve_version_spec(
    input: &str,
    releases: &dyn ReleaseSource,
) -> Result<VersionSpec, ResolveError> {
    match parse_version_spec(input)? {
        RequestedVersion::Nightly => Ok(VersionSpec::Nightly),
        RequestedVersion::Exact(version) => Ok(VersionSpec::Stable(version)),
        RequestedVersion::LatestStable => {
            let tag = releases.latest_stable_tag()?;
            let version = tag.parse::<StableVersion>().map_err(|_| {
                AdapterError::MetadataUnavailable(format!("unexpected stable tag `{tag}`"))
            })?;
            Ok(VersionSpec::Stable(version))
        }
    }
}

/// Closest keyword within the suggestion distance, if any.
pub fn suggest_keyword(input: &str) -> Option<&'static str> {
    KEYWORDS
        .iter()
        .filter(|keyword| **keyword != input)
        .map(|keyword| (edit_distance(input, keyword), *keyword))
        .filter(|(distance, _)| *distance <= SUGGESTION_DISTANCE)
        .min_by_key(|(distance, _)| *distance)
        .map(|(_, keyword)| keyword)
}

/// Optimal string alignment distance: insertions, deletions,
/// substitutions and adjacent transpositions each cost one.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    let mut before = vec![0; b.len() + 1];
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for i in 0..a.len() {
        curr[0] = i + 1;
        for j in 0..b.len() {
            let substitution = prev[j] + usize::from(a[i] != b[j]);
            let mut best = substitution.min(prev[j + 1] + 1).min(curr[j] + 1);
            if i > 0 && j > 0 && a[i] == b[j - 1] && a[i - 1] == b[j] {
                best = best.min(before[j - 1] + 1);
            }
            curr[j + 1] = best;
        }
        std::mem::swap(&mut before, &mut prev);
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

/// What is about to be installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallTarget {
    Nightly(DateTime<Utc>),
    Stable(StableVersion),
}

/// Directory a build should be extracted into.
pub fn resolve_install_target(layout: &Layout, ledger: &Ledger, target: &InstallTarget) -> PathBuf {
    match target {
        InstallTarget::Stable(version) => layout.stable_dir().join(version.to_string()),
        InstallTarget::Nightly(created_at) => nightly_install_dir(layout, ledger, created_at),
    }
}

/// Nightly installs are keyed by calendar date. A second build cut on the
/// same day gets a time-of-day suffix so the two never share a directory.
fn nightly_install_dir(layout: &Layout, ledger: &Ledger, created_at: &DateTime<Utc>) -> PathBuf {
    let base = layout.nightly_dir();
    let taken = |name: &str| ledger.find_by_directory(&base.join(name)).is_some();

    let shares_day = ledger
        .on_date(created_at.date_naive())
        .any(|r| r.created_at != *created_at);

    let mut candidates = Vec::with_capacity(3);
    if !shares_day {
        candidates.push(created_at.format("%Y-%m-%d").to_string());
    }
    candidates.push(created_at.format("%Y-%m-%d-%H%M").to_string());
    candidates.push(created_at.format("%Y-%m-%d-%H%M%S").to_string());

    if let Some(free) = candidates.iter().find(|name| !taken(name.as_str())) {
        return base.join(free);
    }

    let stem = created_at.format("%Y-%m-%d-%H%M%S").to_string();
    let mut n = 2usize;
    loop {
        let name = format!("{stem}-{n}");
        if !taken(name.as_str()) {
            return base.join(name);
        }
        n += 1;
    }
}

/// Locate the executable inside an extracted install.
///
/// The top-level folder name has changed between releases, so a few
/// known layouts are probed before giving up.
pub fn resolve_binary_path(directory: &Path, tag: &PlatformTag) -> Result<PathBuf, ResolveError> {
    let mut candidates = Vec::new();

    match tag.shape {
        ArchiveShape::Executable => {
            candidates.push(directory.join(&tag.asset));
            candidates.push(directory.join(BINARY_NAME));
        }
        ArchiveShape::TarGz => {
            candidates.push(binary_in(directory, &tag.folder));
            candidates.extend(
                KNOWN_FOLDERS
                    .iter()
                    .map(|folder| binary_in(directory, folder)),
            );

            if let Ok(entries) = fs::read_dir(directory) {
                let mut folders: Vec<PathBuf> = entries
                    .filter_map(Result::ok)
                    .map(|entry| entry.path())
                    .filter(|path| path.is_dir())
                    .collect();
                folders.sort();
                candidates.extend(folders.iter().map(|folder| folder.join("bin").join(BINARY_NAME)));
            }

            candidates.push(directory.join("bin").join(BINARY_NAME));
        }
    }

    candidates
        .into_iter()
        .find(|path| path.is_file())
        .ok_or_else(|| ResolveError::BinaryNotFound(directory.to_path_buf()))
}

fn binary_in(directory: &Path, folder: &str) -> PathBuf {
    directory.join(folder).join("bin").join(BINARY_NAME)
}

/// Stable versions present on disk, newest first.
///
/// Stable installs are not tracked in the ledger; the directory name is
/// the version.
pub fn installed_stable_versions(layout: &Layout) -> Result<Vec<StableVersion>, ResolveError> {
    let stable_dir = layout.stable_dir();
    let entries = match fs::read_dir(&stable_dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(source) => {
            return Err(ResolveError::Io {
                path: stable_dir,
                source,
            })
        }
    };

    let mut versions: Vec<StableVersion> = entries
        .filter_map(Result::ok)
        .filter(|entry| entry.path().is_dir())
        .filter_map(|entry| entry.file_name().to_str()?.parse().ok())
        .collect();
    versions.sort_by_key(|v| Reverse(*v));
    Ok(versions)
}
