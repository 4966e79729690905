// External Collaborators
//
// Narrow contracts for the I/O the core depends on but does not own:
// release metadata, archive transfer, and host platform lookup.
// Implementations live with the binary; the core only sees these traits.

use std::fmt;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::resolve::StableVersion;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum AdapterError {
    #[error("release metadata unavailable: {0}")]
    MetadataUnavailable(String),

    #[error("transfer failed: {0}")]
    TransferFailed(String),

    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
}

/// Which upstream release an operation refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Nightly,
    Stable(StableVersion),
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Channel::Nightly => f.write_str("nightly"),
            Channel::Stable(version) => write!(f, "{version}"),
        }
    }
}

/// Metadata of the current upstream nightly build.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NightlyBuild {
    #[serde(rename = "node_id")]
    pub id: String,
    pub created_at: DateTime<Utc>,
}

/// Shape of a downloadable asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveShape {
    /// Gzipped tarball with a single top-level folder.
    TarGz,
    /// A bare executable (e.g. an AppImage).
    Executable,
}

/// Platform-specific asset naming for one release.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformTag {
    /// Asset file name on the release page.
    pub asset: String,
    /// Top-level folder the archive is expected to unpack into.
    pub folder: String,
    pub shape: ArchiveShape,
}

/// Upstream release metadata.
pub trait ReleaseSource {
    /// Latest published stable tag, e.g. `v0.10.2`.
    fn latest_stable_tag(&self) -> Result<String, AdapterError>;

    fn latest_nightly(&self) -> Result<NightlyBuild, AdapterError>;

    /// Published stable tags, newest first.
    fn stable_tags(&self) -> Result<Vec<String>, AdapterError>;

    fn asset_url(&self, channel: &Channel, asset: &str) -> String;
}

/// Download and unpack an asset. Must be safe to retry into the same
/// destination.
pub trait ArchiveFetcher {
    fn download_and_unpack(
        &self,
        url: &str,
        destination: &Path,
        shape: ArchiveShape,
    ) -> Result<(), AdapterError>;
}

/// Host platform lookup.
pub trait PlatformProbe {
    fn archive_tag(&self, channel: &Channel) -> Result<PlatformTag, AdapterError>;
}
