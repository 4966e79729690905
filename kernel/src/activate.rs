// Activation Switch
//
// Repoints the single active symlink at an installed executable.
// The new link is created beside the live one and renamed over it, so
// a concurrent reader always sees either the old or the new target.

use std::fs;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};

use chrono::NaiveDate;
use uuid::Uuid;

use crate::config::Layout;
use crate::lock::LedgerLock;
use crate::resolve::StableVersion;

#[derive(Debug, thiserror::Error)]
pub enum ActivationError {
    #[error("not installed: {0} is missing or not executable")]
    NotInstalled(PathBuf),

    #[error("no version is active ({0} does not exist)")]
    NotActivated(PathBuf),

    #[error("active link {0} does not point into a managed install")]
    Unparseable(PathBuf),

    #[error("activation i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Version identified from the active link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActiveVersion {
    /// Nightly install directory name, e.g. `2024-02-10` or `2024-02-10-2140`.
    Nightly(String),
    Stable(StableVersion),
}

impl std::fmt::Display for ActiveVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActiveVersion::Nightly(label) => write!(f, "nightly {label}"),
            ActiveVersion::Stable(version) => write!(f, "{version}"),
        }
    }
}

/// Resolved state of the active link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveTarget {
    pub version: ActiveVersion,
    /// Install directory containing the executable.
    pub install_dir: PathBuf,
    /// Link target.
    pub binary: PathBuf,
}

/// Owner of the active link.
#[derive(Debug, Clone)]
pub struct ActivationSwitch {
    link: PathBuf,
}

impl ActivationSwitch {
    pub fn new(layout: &Layout) -> Self {
        Self {
            link: layout.active_link(),
        }
    }

    pub fn link(&self) -> &Path {
        &self.link
    }

    /// Point the active link at `target`.
    ///
    /// A relative `target` is anchored at the current directory; the link
    /// always stores an absolute path. On `NotInstalled` the previous link
    /// is left untouched.
    pub fn activate(&self, _lock: &LedgerLock, target: &Path) -> Result<(), ActivationError> {
        let target = std::path::absolute(target).map_err(|source| ActivationError::Io {
            path: target.to_path_buf(),
            source,
        })?;
        ensure_executable(&target)?;

        let link_dir = self
            .link
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&link_dir).map_err(|source| ActivationError::Io {
            path: link_dir.clone(),
            source,
        })?;

        let link_name = self
            .link
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "active".into());
        let staged = link_dir.join(format!(".{link_name}.{}.tmp", Uuid::new_v4()));

        create_symlink(&target, &staged).map_err(|source| ActivationError::Io {
            path: staged.clone(),
            source,
        })?;

        if let Err(source) = fs::rename(&staged, &self.link) {
            let _ = fs::remove_file(&staged);
            return Err(ActivationError::Io {
                path: self.link.clone(),
                source,
            });
        }
        Ok(())
    }

    /// Identify the active version from the link target's path.
    ///
    /// A link whose target no longer exists reports `NotInstalled`.
    pub fn current(&self) -> Result<ActiveTarget, ActivationError> {
        let target = match fs::read_link(&self.link) {
            Ok(target) => target,
            Err(err) if err.kind() == ErrorKind::NotFound => {
                return Err(ActivationError::NotActivated(self.link.clone()))
            }
            Err(err) if err.kind() == ErrorKind::InvalidInput => {
                return Err(ActivationError::Unparseable(self.link.clone()))
            }
            Err(source) => {
                return Err(ActivationError::Io {
                    path: self.link.clone(),
                    source,
                })
            }
        };

        let binary = match self.link.parent() {
            Some(parent) if target.is_relative() => parent.join(&target),
            _ => target,
        };

        let active = identify(&binary).ok_or(ActivationError::Unparseable(binary))?;
        if !active.binary.is_file() {
            return Err(ActivationError::NotInstalled(active.binary));
        }
        Ok(active)
    }
}

/// Find the innermost `nightly/<date>` or `stable/<x.y.z>` pair in `binary`.
fn identify(binary: &Path) -> Option<ActiveTarget> {
    let components: Vec<Component<'_>> = binary.components().collect();

    for idx in (0..components.len().saturating_sub(1)).rev() {
        let (Some(kind), Some(name)) = (
            components[idx].as_os_str().to_str(),
            components[idx + 1].as_os_str().to_str(),
        ) else {
            continue;
        };

        let version = match kind {
            "nightly" if is_nightly_dir_name(name) => ActiveVersion::Nightly(name.to_string()),
            "stable" => match name.parse::<StableVersion>() {
                Ok(version) => ActiveVersion::Stable(version),
                Err(()) => continue,
            },
            _ => continue,
        };

        return Some(ActiveTarget {
            version,
            install_dir: components[..=idx + 1].iter().collect(),
            binary: binary.to_path_buf(),
        });
    }
    None
}

/// `YYYY-MM-DD` optionally followed by a `-HHMM[SS][-n]` suffix.
pub fn is_nightly_dir_name(name: &str) -> bool {
    let Some(date) = name.get(..10) else {
        return false;
    };
    if NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return false;
    }
    let suffix = &name[10..];
    suffix.is_empty()
        || (suffix.starts_with('-')
            && suffix.len() > 1
            && suffix.chars().all(|c| c == '-' || c.is_ascii_digit()))
}

fn ensure_executable(target: &Path) -> Result<(), ActivationError> {
    let metadata = match fs::metadata(target) {
        Ok(metadata) => metadata,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            return Err(ActivationError::NotInstalled(target.to_path_buf()))
        }
        Err(source) => {
            return Err(ActivationError::Io {
                path: target.to_path_buf(),
                source,
            })
        }
    };

    if !metadata.is_file() || !is_executable(&metadata) {
        return Err(ActivationError::NotInstalled(target.to_path_buf()));
    }
    Ok(())
}

#[cfg(unix)]
fn is_executable(metadata: &fs::Metadata) -> bool {
    use std::os::unix::fs::PermissionsExt;
    metadata.permissions().mode() & 0o111 != 0
}

#[cfg(not(unix))]
fn is_executable(_metadata: &fs::Metadata) -> bool {
    true
}

#[cfg(unix)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn create_symlink(target: &Path, link: &Path) -> std::io::Result<()> {
    std::os::windows::fs::symlink_file(target, link)
}
