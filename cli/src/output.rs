// Output
//
// Tables and status lines for the CLI. Everything user-facing is printed
// from here; tracing goes to stderr separately.

use std::path::Path;

use colored::Colorize;
use tabled::{Table, Tabled};

use neoman_kernel::activate::ActiveTarget;
use neoman_kernel::ledger::VersionRecord;
use neoman_kernel::manager::{
    CleanReport, CleanupFailure, InstallOutcome, InstallReport, LocalListing, Removed,
};
use neoman_kernel::resolve::StableVersion;

/// One installed version in `ls local`.
#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct LocalRow {
    #[tabled(rename = "Version")]
    pub version: String,
    #[tabled(rename = "Created At")]
    pub created_at: String,
    #[tabled(rename = "Rollback Step")]
    pub step: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

/// One published version in `ls remote`.
#[derive(Debug, Clone, PartialEq, Eq, Tabled)]
pub struct RemoteRow {
    #[tabled(rename = "Version")]
    pub version: String,
    #[tabled(rename = "Status")]
    pub status: String,
}

pub fn format_table<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows).to_string()
}

fn status(active: bool) -> String {
    let label = if active { "used" } else { "installed" };
    label.to_string()
}

/// Date label for a nightly; minute precision when the day is shared.
fn nightly_label(record: &VersionRecord, all: &[VersionRecord]) -> String {
    let shared = all
        .iter()
        .any(|other| other.id != record.id && other.date() == record.date());
    if shared {
        record.created_at.format("%Y-%m-%d %H:%M").to_string()
    } else {
        record.created_at.format("%Y-%m-%d").to_string()
    }
}

/// Stable installs first, then up to `limit` nightlies, newest first.
pub fn local_rows(listing: &LocalListing, limit: Option<usize>) -> Vec<LocalRow> {
    let stable = listing.stable.iter().map(|version| LocalRow {
        version: version.to_string(),
        created_at: "-".into(),
        step: "-".into(),
        status: status(listing.is_active_stable(version)),
    });

    let records = listing.nightly.records();
    let nightly = records
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|record| LocalRow {
            version: "nightly".into(),
            created_at: nightly_label(record, records),
            step: record.ordinal.to_string(),
            status: status(listing.is_active_nightly(record)),
        });

    stable.chain(nightly).collect()
}

pub fn print_local(listing: &LocalListing, limit: Option<usize>) {
    let rows = local_rows(listing, limit);
    if rows.is_empty() {
        println!("{}", "No versions installed. Try `neoman install nightly`.".yellow());
        return;
    }
    println!("{}", format_table(&rows));
    println!("Total (nightlies): {}", listing.nightly.len());
}

/// A `nightly` row followed by up to `limit` stable versions.
pub fn remote_rows(
    versions: &[StableVersion],
    listing: &LocalListing,
    limit: Option<usize>,
) -> Vec<RemoteRow> {
    let nightly = RemoteRow {
        version: "nightly".into(),
        status: if listing.nightly.is_empty() {
            String::new()
        } else {
            "installed".into()
        },
    };

    let stable = versions
        .iter()
        .take(limit.unwrap_or(usize::MAX))
        .map(|version| RemoteRow {
            version: version.to_string(),
            status: if listing.is_active_stable(version) {
                status(true)
            } else if listing.stable.contains(version) {
                status(false)
            } else {
                String::new()
            },
        });

    std::iter::once(nightly).chain(stable).collect()
}

pub fn print_remote(versions: &[StableVersion], listing: &LocalListing, limit: Option<usize>) {
    let rows = remote_rows(versions, listing, limit);
    println!("{}", format_table(&rows));
    println!(
        "Showing {} of {} available versions",
        rows.len() - 1,
        versions.len()
    );
}

pub fn print_install(outcome: &InstallOutcome, rollback_limit: usize) {
    match outcome {
        InstallOutcome::AlreadyInstalled { channel, directory } => {
            println!(
                "{} {channel} is already installed at {}",
                "=".yellow(),
                directory.display()
            );
            println!("  run `neoman use {channel}` to switch to it");
        }
        InstallOutcome::Installed(report) => print_install_report(report, rollback_limit),
    }
}

fn print_install_report(report: &InstallReport, rollback_limit: usize) {
    let label = match report.created_at {
        Some(created_at) => format!("{} ({})", report.channel, created_at.format("%Y-%m-%d %H:%M")),
        None => report.channel.to_string(),
    };
    println!(
        "{} Installed {} into {}",
        "✓".green().bold(),
        label.bold(),
        report.directory.display()
    );

    for record in &report.evicted {
        println!(
            "  {} removed nightly {} (rollback limit is {rollback_limit})",
            "→".yellow(),
            record.created_at.format("%Y-%m-%d %H:%M"),
        );
    }
    print_cleanup_failures(&report.cleanup_failures);

    if report.activated {
        println!("{} Now using {}", "✓".green().bold(), report.binary.display());
    } else {
        println!(
            "{} {} is older than every kept nightly and was not activated",
            "!".yellow().bold(),
            label
        );
    }
}

pub fn print_clean(report: &CleanReport) {
    if report.removed.is_empty() {
        println!("{}", "Nothing to remove.".yellow());
    }
    for removed in &report.removed {
        let what = match removed {
            Removed::Nightly(record) => format!("nightly {}", record.created_at.format("%Y-%m-%d %H:%M")),
            Removed::Stable(version) => version.to_string(),
        };
        println!("{} Removed {what}", "✓".green().bold());
    }
    print_cleanup_failures(&report.cleanup_failures);

    if report.active_removed {
        println!(
            "{} the active version was removed; run `neoman use <version>` to pick another",
            "!".yellow().bold()
        );
    }
}

fn print_cleanup_failures(failures: &[CleanupFailure]) {
    for failure in failures {
        eprintln!(
            "{} could not delete {}: {} (safe to remove by hand)",
            "warning:".yellow().bold(),
            failure.directory.display(),
            failure.source
        );
    }
}

pub fn print_active(target: &ActiveTarget) {
    println!(
        "{} Using {} ({})",
        "✓".green().bold(),
        target.version.to_string().bold(),
        target.binary.display()
    );
}

/// Remind the user to put the active link's directory on `PATH`.
pub fn print_path_hint(bin_dir: &Path) {
    let on_path = std::env::var_os("PATH")
        .map(|paths| std::env::split_paths(&paths).any(|p| p == bin_dir))
        .unwrap_or(false);
    if on_path {
        return;
    }
    println!(
        "\n{} {} is not on your PATH. Add this to your shell profile:",
        "hint:".cyan().bold(),
        bin_dir.display()
    );
    println!("  export PATH=\"{}:$PATH\"", bin_dir.display());
}
