use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use neoman_kernel::config::{Config, Layout};
use neoman_kernel::ledger::JsonLedgerStore;
use neoman_kernel::manager::{Collaborators, VersionManager};
use neoman_kernel::resolve::resolve_version_spec;

mod archive;
mod clean;
mod github;
mod output;
mod platform;

use archive::HttpArchiveFetcher;
use github::GitHubReleases;
use platform::HostPlatform;

/// Environment variable overriding the data root.
const HOME_ENV: &str = "NEOMAN_HOME";
/// Environment variable holding the log filter.
const LOG_ENV: &str = "NEOMAN_LOG";

/// Neovim version manager
#[derive(Parser, Debug)]
#[command(name = "neoman", version)]
#[command(about = "Install and switch between Neovim nightly and stable builds", long_about = None)]
struct Cli {
    /// Data root (defaults to $NEOMAN_HOME, then ~/.local/share/neoManager)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Install `nightly`, `stable` or `x.y.z` and make it active
    Install { version: String },

    /// Activate an installed `nightly`, `stable` or `x.y.z`
    Use { version: String },

    /// List installed or published versions
    #[command(subcommand)]
    Ls(LsCommand),

    /// Remove installs: nightly [all|<date>], stable [all|<x.y.z>], all, <x.y.z>, <date>
    Clean {
        target: String,
        option: Option<String>,
    },

    /// Activate the nightly `steps` builds older than the newest
    Rollback { steps: usize },

    /// Show the active version
    Current,
}

#[derive(Subcommand, Debug)]
enum LsCommand {
    /// Installed versions
    Local {
        /// Number of nightlies to show (-1 for all)
        #[arg(default_value_t = 7, allow_negative_numbers = true)]
        count: i64,
    },
    /// Published versions
    Remote {
        /// Number of stable versions to show (-1 for all)
        #[arg(default_value_t = 7, allow_negative_numbers = true)]
        count: i64,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // ----------------------------
    // Data root and config
    // ----------------------------
    let layout = Layout::new(data_root(cli.root)?);
    layout
        .scaffold()
        .with_context(|| format!("failed to prepare {}", layout.root().display()))?;
    let config = Config::load(&layout.config_path())?;
    tracing::debug!(root = %layout.root().display(), rollback_limit = config.rollback_limit, "loaded config");

    // ----------------------------
    // Collaborators
    // ----------------------------
    let releases = GitHubReleases::new()?;
    let fetcher = HttpArchiveFetcher::new(releases.client().clone());
    let platform = HostPlatform::detect();

    let manager = VersionManager::new(
        &layout,
        &config,
        JsonLedgerStore::new(layout.ledger_path()),
        Collaborators {
            releases: &releases,
            fetcher: &fetcher,
            platform: &platform,
        },
    );

    // ----------------------------
    // Dispatch
    // ----------------------------
    match cli.command {
        Command::Install { version } => {
            let spec = resolve_version_spec(&version, &releases)?;
            let outcome = manager.install(&spec)?;
            output::print_install(&outcome, config.rollback_limit);
            output::print_path_hint(&layout.bin_dir());
        }
        Command::Use { version } => {
            let spec = resolve_version_spec(&version, &releases)?;
            let target = manager.use_version(&spec)?;
            output::print_active(&target);
            output::print_path_hint(&layout.bin_dir());
        }
        Command::Rollback { steps } => {
            let target = manager.rollback(steps)?;
            output::print_active(&target);
        }
        Command::Clean { target, option } => {
            let target = clean::parse_clean_target(&target, option.as_deref(), &releases)?;
            let report = manager.clean(&target)?;
            output::print_clean(&report);
        }
        Command::Ls(LsCommand::Local { count }) => {
            let listing = manager.list_local()?;
            output::print_local(&listing, row_limit(count)?);
        }
        Command::Ls(LsCommand::Remote { count }) => {
            let versions = manager.list_remote()?;
            let listing = manager.list_local()?;
            output::print_remote(&versions, &listing, row_limit(count)?);
        }
        Command::Current => {
            let target = manager.current()?;
            output::print_active(&target);
        }
    }

    Ok(())
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// `--root`, then `$NEOMAN_HOME`, then the conventional location under home.
/// The result is always absolute.
fn data_root(flag: Option<PathBuf>) -> Result<PathBuf> {
    let root = match flag {
        Some(root) => root,
        None => match std::env::var_os(HOME_ENV).filter(|v| !v.is_empty()) {
            Some(root) => PathBuf::from(root),
            None => {
                let home = dirs::home_dir().context("cannot determine the home directory; pass --root")?;
                default_root(&home)
            }
        },
    };
    std::path::absolute(&root).with_context(|| format!("cannot resolve data root {}", root.display()))
}

fn default_root(home: &Path) -> PathBuf {
    home.join(".local").join("share").join("neoManager")
}

/// `-1` means no limit.
fn row_limit(count: i64) -> Result<Option<usize>> {
    match count {
        -1 => Ok(None),
        n if n >= 0 => Ok(Some(usize::try_from(n)?)),
        n => bail!("invalid count {n}; use a non-negative number or -1 for all"),
    }
}
