// Ledger Storage
//
// Durability contract for the ledger plus the locked read-modify-write
// operations built on top of it.

use std::fs::{self, File};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use uuid::Uuid;

use super::{DateSelector, Ledger, LedgerError, VersionRecord};
use crate::lock::LedgerLock;

/// Result of a ledger mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerChange {
    /// Ledger as persisted after the mutation.
    pub ledger: Ledger,
    /// Records dropped by the mutation. Their directories are still on
    /// disk and must be deleted by the caller.
    pub removed: Vec<VersionRecord>,
}

impl LedgerChange {
    pub fn removed_directories(&self) -> Vec<PathBuf> {
        self.removed.iter().map(|r| r.directory.clone()).collect()
    }
}

/// Storage backend for the ledger.
///
/// Implementations must:
/// - return an empty ledger when nothing has been stored yet
/// - never expose a partially written ledger to readers
///
/// Mutating operations require the ledger lock; holding the guard is
/// the caller's proof that no other process is mid-mutation.
pub trait LedgerStore {
    /// Load the ledger, sorted newest-first with ordinals recomputed.
    fn load(&self) -> Result<Ledger, LedgerError>;

    /// Persist the ledger atomically.
    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError>;

    fn insert(
        &self,
        _lock: &LedgerLock,
        record: VersionRecord,
        limit: usize,
    ) -> Result<LedgerChange, LedgerError> {
        let mut ledger = self.load()?;
        let removed = ledger.insert(record, limit)?;
        self.save(&ledger)?;
        Ok(LedgerChange { ledger, removed })
    }

    fn remove_latest(&self, _lock: &LedgerLock) -> Result<LedgerChange, LedgerError> {
        let mut ledger = self.load()?;
        let removed = ledger.remove_latest()?;
        self.save(&ledger)?;
        Ok(LedgerChange {
            ledger,
            removed: vec![removed],
        })
    }

    fn remove_by_date(
        &self,
        _lock: &LedgerLock,
        selector: &DateSelector,
    ) -> Result<LedgerChange, LedgerError> {
        let mut ledger = self.load()?;
        let removed = ledger.remove_matching(selector)?;
        self.save(&ledger)?;
        Ok(LedgerChange {
            ledger,
            removed: vec![removed],
        })
    }

    fn remove_all(&self, _lock: &LedgerLock) -> Result<LedgerChange, LedgerError> {
        let mut ledger = self.load()?;
        let removed = ledger.remove_all();
        self.save(&ledger)?;
        Ok(LedgerChange { ledger, removed })
    }
}

/// Ledger persisted as a single JSON document.
#[derive(Debug, Clone)]
pub struct JsonLedgerStore {
    path: PathBuf,
}

impl JsonLedgerStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_error(&self, source: std::io::Error) -> LedgerError {
        LedgerError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl LedgerStore for JsonLedgerStore {
    fn load(&self) -> Result<Ledger, LedgerError> {
        let data = match fs::read(&self.path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Ledger::new()),
            Err(err) => return Err(self.io_error(err)),
        };

        let records: Vec<VersionRecord> =
            serde_json::from_slice(&data).map_err(|source| LedgerError::Corrupt {
                path: self.path.clone(),
                source,
            })?;
        Ok(Ledger::from_records(records))
    }

    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        let dir = self
            .path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&dir).map_err(|err| self.io_error(err))?;

        let mut bytes = serde_json::to_vec_pretty(ledger).map_err(|source| LedgerError::Corrupt {
            path: self.path.clone(),
            source,
        })?;
        bytes.push(b'\n');

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "ledger".into());
        let tmp = dir.join(format!(".{file_name}.{}.tmp", Uuid::new_v4()));

        let written = (|| -> std::io::Result<()> {
            let mut file = File::create(&tmp)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
            fs::rename(&tmp, &self.path)?;
            // Persist the rename itself.
            if let Ok(dir_handle) = File::open(&dir) {
                let _ = dir_handle.sync_all();
            }
            Ok(())
        })();

        if let Err(err) = written {
            let _ = fs::remove_file(&tmp);
            return Err(self.io_error(err));
        }
        Ok(())
    }
}

/// Volatile store for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryLedgerStore {
    ledger: Mutex<Ledger>,
}

impl InMemoryLedgerStore {
    pub fn with_records(records: Vec<VersionRecord>) -> Self {
        Self {
            ledger: Mutex::new(Ledger::from_records(records)),
        }
    }
}

impl LedgerStore for InMemoryLedgerStore {
    fn load(&self) -> Result<Ledger, LedgerError> {
        Ok(self
            .ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone())
    }

    fn save(&self, ledger: &Ledger) -> Result<(), LedgerError> {
        *self
            .ledger
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = ledger.clone();
        Ok(())
    }
}
