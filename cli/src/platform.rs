// Host Platform
//
// Maps the running OS and CPU to the release asset name. Asset names
// changed over time: macOS had a single universal archive before 0.10.0,
// and the Linux x86_64 archive was renamed in 0.10.4.

use neoman_kernel::adapters::{AdapterError, ArchiveShape, Channel, PlatformProbe, PlatformTag};
use neoman_kernel::resolve::StableVersion;

const MACOS_SPLIT_ARCHIVES: StableVersion = StableVersion::new(0, 10, 0);
const LINUX_RENAMED_ARCHIVES: StableVersion = StableVersion::new(0, 10, 4);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostPlatform {
    pub os: String,
    pub arch: String,
}

impl HostPlatform {
    pub fn detect() -> Self {
        Self {
            os: std::env::consts::OS.to_string(),
            arch: std::env::consts::ARCH.to_string(),
        }
    }

    fn folder(&self, channel: &Channel) -> Option<&'static str> {
        let older_than = |cutoff: StableVersion| matches!(channel, Channel::Stable(v) if *v < cutoff);

        match (self.os.as_str(), self.arch.as_str()) {
            ("macos", _) if older_than(MACOS_SPLIT_ARCHIVES) => Some("nvim-macos"),
            ("macos", "aarch64") => Some("nvim-macos-arm64"),
            ("macos", "x86_64") => Some("nvim-macos-x86_64"),
            ("linux", "x86_64") if older_than(LINUX_RENAMED_ARCHIVES) => Some("nvim-linux64"),
            ("linux", "x86_64") => Some("nvim-linux-x86_64"),
            ("linux", "aarch64") if older_than(LINUX_RENAMED_ARCHIVES) => None,
            ("linux", "aarch64") => Some("nvim-linux-arm64"),
            _ => None,
        }
    }
}

impl PlatformProbe for HostPlatform {
    fn archive_tag(&self, channel: &Channel) -> Result<PlatformTag, AdapterError> {
        let folder = self.folder(channel).ok_or_else(|| {
            AdapterError::UnsupportedPlatform(format!("{}/{} has no {channel} archive", self.os, self.arch))
        })?;

        Ok(PlatformTag {
            asset: format!("{folder}.tar.gz"),
            folder: folder.to_string(),
            shape: ArchiveShape::TarGz,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(os: &str, arch: &str) -> HostPlatform {
        HostPlatform {
            os: os.into(),
            arch: arch.into(),
        }
    }

    fn stable(major: u64, minor: u64, patch: u64) -> Channel {
        Channel::Stable(StableVersion::new(major, minor, patch))
    }

    fn asset(platform: &HostPlatform, channel: Channel) -> String {
        platform.archive_tag(&channel).unwrap().asset
    }

    #[test]
    fn macos_assets() {
        let arm = host("macos", "aarch64");
        assert_eq!(asset(&arm, Channel::Nightly), "nvim-macos-arm64.tar.gz");
        assert_eq!(asset(&arm, stable(0, 10, 0)), "nvim-macos-arm64.tar.gz");
        assert_eq!(asset(&arm, stable(0, 9, 5)), "nvim-macos.tar.gz");
        assert_eq!(asset(&host("macos", "x86_64"), Channel::Nightly), "nvim-macos-x86_64.tar.gz");
    }

    #[test]
    fn linux_assets() {
        let x86 = host("linux", "x86_64");
        assert_eq!(asset(&x86, Channel::Nightly), "nvim-linux-x86_64.tar.gz");
        assert_eq!(asset(&x86, stable(0, 9, 5)), "nvim-linux64.tar.gz");

        let arm = host("linux", "aarch64");
        assert_eq!(asset(&arm, stable(0, 11, 0)), "nvim-linux-arm64.tar.gz");
        assert!(arm.archive_tag(&stable(0, 9, 5)).is_err());
    }

    #[test]
    fn unknown_host_is_unsupported() {
        let err = host("freebsd", "x86_64")
            .archive_tag(&Channel::Nightly)
            .unwrap_err();
        assert!(matches!(err, AdapterError::UnsupportedPlatform(_)));
    }
}
