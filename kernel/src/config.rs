// Runtime Configuration
//
// Explicit configuration and on-disk layout, constructed once per process
// and passed by reference to every component.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

pub const DEFAULT_ROLLBACK_LIMIT: usize = 7;
pub const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;

/// Name of the managed executable.
pub const BINARY_NAME: &str = "nvim";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("malformed config {path}: {source}")]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),

    #[error("config i/o on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// User configuration loaded from `config.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Maximum number of nightly builds retained at once.
    #[serde(default = "default_rollback_limit")]
    pub rollback_limit: usize,

    /// How long a mutating command waits for the ledger lock.
    #[serde(default = "default_lock_timeout_secs")]
    pub lock_timeout_secs: u64,
}

fn default_rollback_limit() -> usize {
    DEFAULT_ROLLBACK_LIMIT
}

fn default_lock_timeout_secs() -> u64 {
    DEFAULT_LOCK_TIMEOUT_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rollback_limit: DEFAULT_ROLLBACK_LIMIT,
            lock_timeout_secs: DEFAULT_LOCK_TIMEOUT_SECS,
        }
    }
}

impl Config {
    /// Load the config document. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };

        let config: Config =
            serde_json::from_str(&data).map_err(|source| ConfigError::Malformed {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.rollback_limit < 1 {
            return Err(ConfigError::Invalid(
                "rollbackLimit must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_secs)
    }
}

/// Directory tree owned by the manager.
///
/// ```text
/// <root>/config.json
/// <root>/bin/nvim                      active pointer
/// <root>/nightly/versions_info.json    ledger
/// <root>/nightly/versions_info.lock
/// <root>/nightly/<date>/               nightly installs
/// <root>/stable/<x.y.z>/               stable installs
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    root: PathBuf,
}

impl Layout {
    /// A relative `root` is anchored at the current directory so every
    /// recorded directory and link target is absolute.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = std::path::absolute(&root).unwrap_or(root);
        Self { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn config_path(&self) -> PathBuf {
        self.root.join("config.json")
    }

    pub fn bin_dir(&self) -> PathBuf {
        self.root.join("bin")
    }

    pub fn active_link(&self) -> PathBuf {
        self.bin_dir().join(BINARY_NAME)
    }

    pub fn nightly_dir(&self) -> PathBuf {
        self.root.join("nightly")
    }

    pub fn stable_dir(&self) -> PathBuf {
        self.root.join("stable")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.nightly_dir().join("versions_info.json")
    }

    pub fn lock_path(&self) -> PathBuf {
        self.nightly_dir().join("versions_info.lock")
    }

    /// Create the directory tree and a default config if none exists.
    pub fn scaffold(&self) -> Result<(), ConfigError> {
        for dir in [
            self.root.clone(),
            self.bin_dir(),
            self.nightly_dir(),
            self.stable_dir(),
        ] {
            fs::create_dir_all(&dir).map_err(|source| ConfigError::Io {
                path: dir.clone(),
                source,
            })?;
        }

        let config_path = self.config_path();
        if !config_path.exists() {
            let mut data = serde_json::to_string_pretty(&Config::default()).map_err(|source| {
                ConfigError::Malformed {
                    path: config_path.clone(),
                    source,
                }
            })?;
            data.push('\n');
            fs::write(&config_path, data).map_err(|source| ConfigError::Io {
                path: config_path,
                source,
            })?;
        }

        Ok(())
    }
}
