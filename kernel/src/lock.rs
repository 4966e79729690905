// Ledger Lock
//
// Cross-process advisory lock held for every ledger mutation and every
// activation. Released when the guard is dropped.

use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs4::FileExt;

use crate::ledger::LedgerError;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Exclusive lock on the ledger's lock file.
#[derive(Debug)]
pub struct LedgerLock {
    file: File,
    path: PathBuf,
}

impl LedgerLock {
    /// Acquire the lock, polling until `timeout` elapses.
    pub fn acquire(path: &Path, timeout: Duration) -> Result<Self, LedgerError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| LedgerError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|source| LedgerError::Io {
                path: path.to_path_buf(),
                source,
            })?;

        let started = Instant::now();
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    return Ok(Self {
                        file,
                        path: path.to_path_buf(),
                    })
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(LedgerError::Busy {
                            path: path.to_path_buf(),
                            waited,
                        });
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(source) => {
                    return Err(LedgerError::Io {
                        path: path.to_path_buf(),
                        source,
                    })
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LedgerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}
