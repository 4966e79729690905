// Version Manager
//
// Composes the ledger, resolver, eviction policy and activation switch
// into the user-facing flows: install, use, rollback, clean, list.
// Every flow returns a typed outcome; rendering is the caller's job.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};

use crate::activate::{ActivationError, ActivationSwitch, ActiveTarget, ActiveVersion};
use crate::adapters::{AdapterError, ArchiveFetcher, Channel, PlatformProbe, PlatformTag, ReleaseSource};
use crate::config::{Config, Layout};
use crate::ledger::{DateSelector, Ledger, LedgerChange, LedgerError, LedgerStore, VersionRecord};
use crate::lock::LedgerLock;
use crate::resolve::{
    installed_stable_versions, resolve_binary_path, resolve_install_target, InstallTarget,
    ResolveError, StableVersion, VersionSpec,
};

#[derive(Debug, thiserror::Error)]
pub enum ManagerError {
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Activation(#[from] ActivationError),

    #[error(transparent)]
    Adapter(#[from] AdapterError),

    #[error("{}", describe_rollback(*.steps, *.available))]
    InvalidRollback { steps: usize, available: usize },

    #[error("stable version {0} is not installed")]
    StableNotFound(StableVersion),

    #[error("cannot update {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

fn describe_rollback(steps: usize, available: usize) -> String {
    if steps == 0 {
        "rollback steps must be at least 1; use `use nightly` for the newest build".into()
    } else {
        format!("cannot roll back {steps} step(s): only {available} nightly build(s) installed")
    }
}

/// External I/O the manager delegates to.
#[derive(Clone, Copy)]
pub struct Collaborators<'a> {
    pub releases: &'a dyn ReleaseSource,
    pub fetcher: &'a dyn ArchiveFetcher,
    pub platform: &'a dyn PlatformProbe,
}

/// A directory whose deletion failed after the ledger already dropped it.
#[derive(Debug)]
pub struct CleanupFailure {
    pub directory: PathBuf,
    pub source: std::io::Error,
}

#[derive(Debug)]
pub struct InstallReport {
    pub channel: Channel,
    /// Upstream build time, for nightlies.
    pub created_at: Option<DateTime<Utc>>,
    pub directory: PathBuf,
    pub binary: PathBuf,
    /// Nightly builds evicted to respect the rollback limit.
    pub evicted: Vec<VersionRecord>,
    pub cleanup_failures: Vec<CleanupFailure>,
    /// False only when the new build was itself the oldest and got evicted.
    pub activated: bool,
}

#[derive(Debug)]
pub enum InstallOutcome {
    Installed(InstallReport),
    AlreadyInstalled { channel: Channel, directory: PathBuf },
}

/// What `clean` should remove.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanTarget {
    LatestNightly,
    NightlyOn(DateSelector),
    AllNightly,
    Stable(StableVersion),
    AllStable,
    Everything,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Removed {
    Nightly(VersionRecord),
    Stable(StableVersion),
}

#[derive(Debug, Default)]
pub struct CleanReport {
    pub removed: Vec<Removed>,
    pub cleanup_failures: Vec<CleanupFailure>,
    /// The active link now points into a removed install.
    pub active_removed: bool,
}

/// Snapshot of everything installed locally.
#[derive(Debug, Clone)]
pub struct LocalListing {
    pub stable: Vec<StableVersion>,
    pub nightly: Ledger,
    pub active: Option<ActiveTarget>,
}

impl LocalListing {
    pub fn is_active_nightly(&self, record: &VersionRecord) -> bool {
        self.active
            .as_ref()
            .is_some_and(|active| active.install_dir == record.directory)
    }

    pub fn is_active_stable(&self, version: &StableVersion) -> bool {
        matches!(
            self.active.as_ref().map(|a| &a.version),
            Some(ActiveVersion::Stable(active)) if active == version
        )
    }
}

pub struct VersionManager<'a, S: LedgerStore> {
    layout: &'a Layout,
    config: &'a Config,
    store: S,
    switch: ActivationSwitch,
    io: Collaborators<'a>,
}

impl<'a, S: LedgerStore> VersionManager<'a, S> {
    pub fn new(layout: &'a Layout, config: &'a Config, store: S, io: Collaborators<'a>) -> Self {
        Self {
            layout,
            config,
            store,
            switch: ActivationSwitch::new(layout),
            io,
        }
    }

    pub fn ledger(&self) -> Result<Ledger, LedgerError> {
        self.store.load()
    }

    pub fn current(&self) -> Result<ActiveTarget, ActivationError> {
        self.switch.current()
    }

    fn lock(&self) -> Result<LedgerLock, LedgerError> {
        LedgerLock::acquire(&self.layout.lock_path(), self.config.lock_timeout())
    }

    pub fn install(&self, spec: &VersionSpec) -> Result<InstallOutcome, ManagerError> {
        match spec {
            VersionSpec::Nightly => self.install_nightly(),
            VersionSpec::Stable(version) => self.install_stable(*version),
        }
    }

    fn install_nightly(&self) -> Result<InstallOutcome, ManagerError> {
        let channel = Channel::Nightly;
        let tag = self.io.platform.archive_tag(&channel)?;
        let build = self.io.releases.latest_nightly()?;

        let lock = self.lock()?;
        let ledger = self.store.load()?;
        if let Some(existing) = ledger.records().iter().find(|r| r.id == build.id) {
            return Ok(InstallOutcome::AlreadyInstalled {
                channel,
                directory: existing.directory.clone(),
            });
        }

        let directory =
            resolve_install_target(self.layout, &ledger, &InstallTarget::Nightly(build.created_at));
        let binary = self.fetch_into(&channel, &tag, &directory)?;

        let record = VersionRecord::new(build.id, build.created_at, directory.clone());
        let change = match self.store.insert(&lock, record, self.config.rollback_limit) {
            Ok(change) => change,
            Err(err) => {
                let _ = fs::remove_dir_all(&directory);
                return Err(err.into());
            }
        };
        let cleanup_failures = remove_directories(&change.removed_directories());

        let activated = change.ledger.find_by_directory(&directory).is_some();
        if activated {
            self.switch.activate(&lock, &binary)?;
        }

        Ok(InstallOutcome::Installed(InstallReport {
            channel,
            created_at: Some(build.created_at),
            directory,
            binary,
            evicted: change.removed,
            cleanup_failures,
            activated,
        }))
    }

    fn install_stable(&self, version: StableVersion) -> Result<InstallOutcome, ManagerError> {
        let channel = Channel::Stable(version);
        let tag = self.io.platform.archive_tag(&channel)?;

        let lock = self.lock()?;
        let directory =
            resolve_install_target(self.layout, &Ledger::new(), &InstallTarget::Stable(version));
        if resolve_binary_path(&directory, &tag).is_ok() {
            return Ok(InstallOutcome::AlreadyInstalled { channel, directory });
        }

        let binary = self.fetch_into(&channel, &tag, &directory)?;
        self.switch.activate(&lock, &binary)?;

        Ok(InstallOutcome::Installed(InstallReport {
            channel,
            created_at: None,
            directory,
            binary,
            evicted: Vec::new(),
            cleanup_failures: Vec::new(),
            activated: true,
        }))
    }

    /// Download into `directory` and verify the executable is present.
    /// A failed attempt leaves no directory behind.
    fn fetch_into(
        &self,
        channel: &Channel,
        tag: &PlatformTag,
        directory: &Path,
    ) -> Result<PathBuf, ManagerError> {
        fs::create_dir_all(directory).map_err(|source| ManagerError::Io {
            path: directory.to_path_buf(),
            source,
        })?;

        let url = self.io.releases.asset_url(channel, &tag.asset);
        let fetched = self
            .io
            .fetcher
            .download_and_unpack(&url, directory, tag.shape)
            .map_err(ManagerError::from)
            .and_then(|()| resolve_binary_path(directory, tag).map_err(ManagerError::from));

        if fetched.is_err() {
            let _ = fs::remove_dir_all(directory);
        }
        fetched
    }

    /// Activate an installed version.
    pub fn use_version(&self, spec: &VersionSpec) -> Result<ActiveTarget, ManagerError> {
        match spec {
            VersionSpec::Nightly => {
                let lock = self.lock()?;
                let ledger = self.store.load()?;
                let latest = ledger.latest().ok_or(LedgerError::Empty)?;
                self.activate_nightly(&lock, latest)
            }
            VersionSpec::Stable(version) => {
                let channel = Channel::Stable(*version);
                let tag = self.io.platform.archive_tag(&channel)?;
                let directory = resolve_install_target(
                    self.layout,
                    &Ledger::new(),
                    &InstallTarget::Stable(*version),
                );
                let binary = binary_or_not_installed(&directory, &tag)?;

                let lock = self.lock()?;
                self.switch.activate(&lock, &binary)?;
                Ok(ActiveTarget {
                    version: ActiveVersion::Stable(*version),
                    install_dir: directory,
                    binary,
                })
            }
        }
    }

    /// Activate the nightly `steps` builds older than the newest.
    pub fn rollback(&self, steps: usize) -> Result<ActiveTarget, ManagerError> {
        let lock = self.lock()?;
        let ledger = self.store.load()?;

        let target = match ledger.get(steps) {
            Some(record) if steps >= 1 => record,
            _ => {
                return Err(ManagerError::InvalidRollback {
                    steps,
                    available: ledger.len(),
                })
            }
        };
        self.activate_nightly(&lock, target)
    }

    fn activate_nightly(
        &self,
        lock: &LedgerLock,
        record: &VersionRecord,
    ) -> Result<ActiveTarget, ManagerError> {
        let tag = self.io.platform.archive_tag(&Channel::Nightly)?;
        let binary = binary_or_not_installed(&record.directory, &tag)?;
        self.switch.activate(lock, &binary)?;

        let label = record
            .directory
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.created_at.format("%Y-%m-%d").to_string());
        Ok(ActiveTarget {
            version: ActiveVersion::Nightly(label),
            install_dir: record.directory.clone(),
            binary,
        })
    }

    /// Remove installs. The ledger write always precedes directory
    /// deletion; deletion failures are reported, not fatal.
    pub fn clean(&self, target: &CleanTarget) -> Result<CleanReport, ManagerError> {
        let lock = self.lock()?;
        let active = self.switch.current().ok();
        let mut report = CleanReport::default();

        match target {
            CleanTarget::LatestNightly => {
                let change = self.store.remove_latest(&lock)?;
                absorb(&mut report, change);
            }
            CleanTarget::NightlyOn(selector) => {
                let change = self.store.remove_by_date(&lock, selector)?;
                absorb(&mut report, change);
            }
            CleanTarget::AllNightly => {
                let change = self.store.remove_all(&lock)?;
                absorb(&mut report, change);
            }
            CleanTarget::Stable(version) => {
                self.remove_stable(*version)?;
                report.removed.push(Removed::Stable(*version));
            }
            CleanTarget::AllStable => {
                self.remove_all_stable(&mut report)?;
            }
            CleanTarget::Everything => {
                let change = self.store.remove_all(&lock)?;
                absorb(&mut report, change);
                self.remove_all_stable(&mut report)?;
            }
        }

        report.active_removed = active.is_some_and(|active| {
            report.removed.iter().any(|removed| match removed {
                Removed::Nightly(record) => active.install_dir == record.directory,
                Removed::Stable(version) => active.version == ActiveVersion::Stable(*version),
            })
        });
        Ok(report)
    }

    fn remove_stable(&self, version: StableVersion) -> Result<(), ManagerError> {
        let directory = self.layout.stable_dir().join(version.to_string());
        match fs::remove_dir_all(&directory) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => {
                Err(ManagerError::StableNotFound(version))
            }
            Err(source) => Err(ManagerError::Io {
                path: directory,
                source,
            }),
        }
    }

    fn remove_all_stable(&self, report: &mut CleanReport) -> Result<(), ManagerError> {
        for version in installed_stable_versions(self.layout)? {
            let directory = self.layout.stable_dir().join(version.to_string());
            match fs::remove_dir_all(&directory) {
                Ok(()) => report.removed.push(Removed::Stable(version)),
                Err(source) => report.cleanup_failures.push(CleanupFailure { directory, source }),
            }
        }
        Ok(())
    }

    /// Installed stable versions, the nightly ledger and the active build.
    pub fn list_local(&self) -> Result<LocalListing, ManagerError> {
        Ok(LocalListing {
            stable: installed_stable_versions(self.layout)?,
            nightly: self.store.load()?,
            active: self.switch.current().ok(),
        })
    }

    /// Published stable versions, newest first.
    pub fn list_remote(&self) -> Result<Vec<StableVersion>, ManagerError> {
        let mut versions: Vec<StableVersion> = self
            .io
            .releases
            .stable_tags()?
            .iter()
            .filter_map(|tag| tag.parse().ok())
            .collect();
        versions.sort_by(|a, b| b.cmp(a));
        versions.dedup();
        Ok(versions)
    }
}

fn absorb(report: &mut CleanReport, change: LedgerChange) {
    report
        .cleanup_failures
        .extend(remove_directories(&change.removed_directories()));
    report
        .removed
        .extend(change.removed.into_iter().map(Removed::Nightly));
}

/// A ledger entry whose files are gone reports as not installed.
fn binary_or_not_installed(directory: &Path, tag: &PlatformTag) -> Result<PathBuf, ManagerError> {
    resolve_binary_path(directory, tag).map_err(|err| match err {
        ResolveError::BinaryNotFound(dir) => ActivationError::NotInstalled(dir).into(),
        other => other.into(),
    })
}

/// Best-effort removal; a directory that is already gone is not a failure.
fn remove_directories(directories: &[PathBuf]) -> Vec<CleanupFailure> {
    directories
        .iter()
        .filter_map(|directory| match fs::remove_dir_all(directory) {
            Ok(()) => None,
            Err(err) if err.kind() == ErrorKind::NotFound => None,
            Err(source) => Some(CleanupFailure {
                directory: directory.clone(),
                source,
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activate::tests::install_fake_binary;
    use crate::adapters::{ArchiveShape, NightlyBuild};
    use crate::ledger::tests::ts;
    use crate::ledger::JsonLedgerStore;
    use std::cell::RefCell;

    struct FakeReleases {
        nightly: RefCell<NightlyBuild>,
        tags: Vec<String>,
    }

    impl FakeReleases {
        fn new(id: &str, created_at: &str) -> Self {
            Self {
                nightly: RefCell::new(NightlyBuild {
                    id: id.into(),
                    created_at: ts(created_at),
                }),
                tags: vec!["v0.9.5".into(), "nightly".into(), "v0.10.2".into(), "stable".into()],
            }
        }

        fn publish(&self, id: &str, created_at: &str) {
            *self.nightly.borrow_mut() = NightlyBuild {
                id: id.into(),
                created_at: ts(created_at),
            };
        }
    }

    impl ReleaseSource for FakeReleases {
        fn latest_stable_tag(&self) -> Result<String, AdapterError> {
            Ok("v0.10.2".into())
        }

        fn latest_nightly(&self) -> Result<NightlyBuild, AdapterError> {
            Ok(self.nightly.borrow().clone())
        }

        fn stable_tags(&self) -> Result<Vec<String>, AdapterError> {
            Ok(self.tags.clone())
        }

        fn asset_url(&self, channel: &Channel, asset: &str) -> String {
            format!("https://example.invalid/{channel}/{asset}")
        }
    }

    /// Unpacks a fake `nvim-linux-x86_64/bin/nvim`, or fails on demand.
    #[derive(Default)]
    struct FakeFetcher {
        fail: bool,
        urls: RefCell<Vec<String>>,
    }

    impl ArchiveFetcher for FakeFetcher {
        fn download_and_unpack(
            &self,
            url: &str,
            destination: &Path,
            _shape: ArchiveShape,
        ) -> Result<(), AdapterError> {
            self.urls.borrow_mut().push(url.to_string());
            if self.fail {
                fs::write(destination.join("partial.tar.gz"), b"\x1f\x8b").unwrap();
                return Err(AdapterError::TransferFailed("connection reset".into()));
            }
            install_fake_binary(&destination.join("nvim-linux-x86_64/bin/nvim"));
            Ok(())
        }
    }

    struct FakePlatform;

    impl PlatformProbe for FakePlatform {
        fn archive_tag(&self, _channel: &Channel) -> Result<PlatformTag, AdapterError> {
            Ok(PlatformTag {
                asset: "nvim-linux-x86_64.tar.gz".into(),
                folder: "nvim-linux-x86_64".into(),
                shape: ArchiveShape::TarGz,
            })
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        layout: Layout,
        config: Config,
        releases: FakeReleases,
        fetcher: FakeFetcher,
    }

    impl Harness {
        fn new(limit: usize) -> Self {
            Self::in_dir(tempfile::tempdir().unwrap(), limit)
        }

        fn in_dir(dir: tempfile::TempDir, limit: usize) -> Self {
            let layout = Layout::new(dir.path().join("neoManager"));
            layout.scaffold().unwrap();
            Self {
                dir,
                layout,
                config: Config {
                    rollback_limit: limit,
                    lock_timeout_secs: 1,
                },
                releases: FakeReleases::new("N1", "2024-01-01T04:00:00Z"),
                fetcher: FakeFetcher::default(),
            }
        }

        fn manager(&self) -> VersionManager<'_, JsonLedgerStore> {
            VersionManager::new(
                &self.layout,
                &self.config,
                JsonLedgerStore::new(self.layout.ledger_path()),
                Collaborators {
                    releases: &self.releases,
                    fetcher: &self.fetcher,
                    platform: &FakePlatform,
                },
            )
        }

        fn install_nightly(&self, id: &str, created_at: &str) -> InstallReport {
            self.releases.publish(id, created_at);
            match self.manager().install(&VersionSpec::Nightly).unwrap() {
                InstallOutcome::Installed(report) => report,
                other => panic!("unexpected outcome: {other:?}"),
            }
        }
    }

    #[test]
    fn nightly_install_records_and_activates() {
        let h = Harness::new(7);
        let report = h.install_nightly("N1", "2024-01-01T04:00:00Z");

        assert_eq!(report.directory, h.layout.nightly_dir().join("2024-01-01"));
        assert!(report.activated);
        assert!(report.evicted.is_empty());

        let manager = h.manager();
        let ledger = manager.ledger().unwrap();
        assert_eq!(ledger.len(), 1);
        assert_eq!(ledger.latest().unwrap().id, "N1");

        let current = manager.current().unwrap();
        assert_eq!(current.version, ActiveVersion::Nightly("2024-01-01".into()));
        assert_eq!(current.binary, report.binary);
        assert_eq!(
            h.fetcher.urls.borrow().as_slice(),
            ["https://example.invalid/nightly/nvim-linux-x86_64.tar.gz"]
        );
    }

    #[test]
    fn relative_root_records_absolute_paths() {
        let h = Harness::in_dir(tempfile::tempdir_in(".").unwrap(), 7);
        assert!(h.dir.path().is_relative());

        let report = h.install_nightly("N1", "2024-01-01T04:00:00Z");
        assert!(report.directory.is_absolute());

        let manager = h.manager();
        let ledger = manager.ledger().unwrap();
        assert!(ledger.latest().unwrap().directory.is_absolute());

        let link = h.layout.active_link();
        assert!(fs::read_link(&link).unwrap().is_absolute());
        assert!(fs::metadata(&link).unwrap().is_file());
        assert_eq!(manager.current().unwrap().binary, report.binary);
    }

    #[test]
    fn reinstalling_same_build_is_informational() {
        let h = Harness::new(7);
        h.install_nightly("N1", "2024-01-01T04:00:00Z");

        let outcome = h.manager().install(&VersionSpec::Nightly).unwrap();
        assert!(matches!(outcome, InstallOutcome::AlreadyInstalled { .. }));
        assert_eq!(h.fetcher.urls.borrow().len(), 1);
    }

    #[test]
    fn install_beyond_limit_evicts_and_deletes_oldest() {
        let h = Harness::new(3);
        let oldest = h.install_nightly("D1", "2024-01-01T00:00:00Z");
        h.install_nightly("D2", "2024-01-02T00:00:00Z");
        h.install_nightly("D3", "2024-01-03T00:00:00Z");
        let report = h.install_nightly("D4", "2024-01-04T00:00:00Z");

        assert_eq!(report.evicted.len(), 1);
        assert_eq!(report.evicted[0].directory, oldest.directory);
        assert!(report.cleanup_failures.is_empty());
        assert!(!oldest.directory.exists());

        let ledger = h.manager().ledger().unwrap();
        let summary: Vec<_> = ledger
            .records()
            .iter()
            .map(|r| (r.id.as_str(), r.ordinal))
            .collect();
        assert_eq!(summary, vec![("D4", 0), ("D3", 1), ("D2", 2)]);
    }

    #[test]
    fn same_day_builds_do_not_collide() {
        let h = Harness::new(7);
        let morning = h.install_nightly("A", "2024-02-10T03:15:00Z");
        let evening = h.install_nightly("B", "2024-02-10T21:40:00Z");

        assert_ne!(morning.directory, evening.directory);
        assert!(morning.binary.exists());
        assert!(evening.binary.exists());

        let err = h
            .manager()
            .clean(&CleanTarget::NightlyOn("2024-02-10".parse().unwrap()))
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Ledger(LedgerError::NotFound { .. })
        ));
        assert!(morning.directory.exists());
        assert!(evening.directory.exists());
    }

    #[test]
    fn failed_transfer_leaves_nothing_behind() {
        let mut h = Harness::new(7);
        h.fetcher.fail = true;

        let err = h.manager().install(&VersionSpec::Nightly).unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Adapter(AdapterError::TransferFailed(_))
        ));
        assert!(h.manager().ledger().unwrap().is_empty());
        assert!(!h.layout.nightly_dir().join("2024-01-01").exists());
        assert!(matches!(
            h.manager().current(),
            Err(ActivationError::NotActivated(_))
        ));
    }

    #[test]
    fn rollback_activates_older_build() {
        let h = Harness::new(7);
        let first = h.install_nightly("D1", "2024-01-01T00:00:00Z");
        h.install_nightly("D2", "2024-01-02T00:00:00Z");

        let manager = h.manager();
        let target = manager.rollback(1).unwrap();
        assert_eq!(target.install_dir, first.directory);
        assert_eq!(
            manager.current().unwrap().version,
            ActiveVersion::Nightly("2024-01-01".into())
        );

        assert!(matches!(
            manager.rollback(0),
            Err(ManagerError::InvalidRollback { steps: 0, .. })
        ));
        assert!(matches!(
            manager.rollback(2),
            Err(ManagerError::InvalidRollback {
                steps: 2,
                available: 2
            })
        ));
    }

    #[test]
    fn rollback_to_missing_directory_is_not_installed() {
        let h = Harness::new(7);
        let first = h.install_nightly("D1", "2024-01-01T00:00:00Z");
        let second = h.install_nightly("D2", "2024-01-02T00:00:00Z");
        fs::remove_dir_all(&first.directory).unwrap();

        let manager = h.manager();
        let err = manager.rollback(1).unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Activation(ActivationError::NotInstalled(_))
        ));
        assert_eq!(manager.current().unwrap().install_dir, second.directory);
    }

    #[test]
    fn stable_install_use_and_clean() {
        let h = Harness::new(7);
        let manager = h.manager();
        let version = StableVersion::new(0, 9, 5);

        let outcome = manager.install(&VersionSpec::Stable(version)).unwrap();
        let InstallOutcome::Installed(report) = outcome else {
            panic!("expected a fresh install");
        };
        assert_eq!(report.directory, h.layout.stable_dir().join("0.9.5"));
        assert_eq!(
            manager.current().unwrap().version,
            ActiveVersion::Stable(version)
        );
        assert!(matches!(
            manager.install(&VersionSpec::Stable(version)).unwrap(),
            InstallOutcome::AlreadyInstalled { .. }
        ));

        h.install_nightly("N1", "2024-01-01T04:00:00Z");
        manager.use_version(&VersionSpec::Stable(version)).unwrap();
        assert!(manager.list_local().unwrap().is_active_stable(&version));

        let report = manager.clean(&CleanTarget::Stable(version)).unwrap();
        assert_eq!(report.removed, vec![Removed::Stable(version)]);
        assert!(report.active_removed);
        assert!(matches!(
            manager.clean(&CleanTarget::Stable(version)),
            Err(ManagerError::StableNotFound(_))
        ));
    }

    #[test]
    fn use_missing_stable_is_not_installed() {
        let h = Harness::new(7);
        let err = h
            .manager()
            .use_version(&VersionSpec::Stable(StableVersion::new(0, 8, 0)))
            .unwrap_err();
        assert!(matches!(
            err,
            ManagerError::Activation(ActivationError::NotInstalled(_))
        ));
    }

    #[test]
    fn use_nightly_on_empty_ledger() {
        let h = Harness::new(7);
        assert!(matches!(
            h.manager().use_version(&VersionSpec::Nightly),
            Err(ManagerError::Ledger(LedgerError::Empty))
        ));
    }

    #[test]
    fn clean_everything_twice() {
        let h = Harness::new(7);
        let nightly = h.install_nightly("N1", "2024-01-01T04:00:00Z");
        let manager = h.manager();
        manager
            .install(&VersionSpec::Stable(StableVersion::new(0, 10, 2)))
            .unwrap();

        let report = manager.clean(&CleanTarget::Everything).unwrap();
        assert_eq!(report.removed.len(), 2);
        assert!(report.active_removed);
        assert!(!nightly.directory.exists());
        assert!(manager.list_local().unwrap().stable.is_empty());

        let again = manager.clean(&CleanTarget::Everything).unwrap();
        assert!(again.removed.is_empty());
        assert!(manager.ledger().unwrap().is_empty());
    }

    #[test]
    fn clean_latest_nightly_keeps_older() {
        let h = Harness::new(7);
        let older = h.install_nightly("D1", "2024-01-01T00:00:00Z");
        let newer = h.install_nightly("D2", "2024-01-02T00:00:00Z");

        let manager = h.manager();
        let report = manager.clean(&CleanTarget::LatestNightly).unwrap();
        assert!(report.active_removed);
        assert!(!newer.directory.exists());
        assert!(older.directory.exists());

        let listing = manager.list_local().unwrap();
        assert_eq!(listing.nightly.latest().unwrap().ordinal, 0);
        assert_eq!(listing.nightly.latest().unwrap().id, "D1");
    }

    #[test]
    fn remote_listing_filters_keywords() {
        let h = Harness::new(7);
        assert_eq!(
            h.manager().list_remote().unwrap(),
            vec![StableVersion::new(0, 10, 2), StableVersion::new(0, 9, 5)]
        );
    }
}
