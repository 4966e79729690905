// Clean Targets
//
// Turns `clean <target> [option]` arguments into a `CleanTarget`.

use anyhow::{anyhow, bail, Context, Result};

use neoman_kernel::adapters::ReleaseSource;
use neoman_kernel::ledger::DateSelector;
use neoman_kernel::manager::CleanTarget;
use neoman_kernel::resolve::{resolve_version_spec, StableVersion, VersionSpec};

const USAGE: &str = "expected one of: nightly [all|<date>], stable [all|<x.y.z>], all, <x.y.z>, <date>";

pub fn parse_clean_target(
    target: &str,
    option: Option<&str>,
    releases: &dyn ReleaseSource,
) -> Result<CleanTarget> {
    let target = target.trim().to_lowercase();
    let option = option.map(str::trim);

    match (target.as_str(), option) {
        ("all", None) => Ok(CleanTarget::Everything),
        ("nightly", None) => Ok(CleanTarget::LatestNightly),
        ("nightly", Some("all")) => Ok(CleanTarget::AllNightly),
        ("nightly", Some(date)) => Ok(CleanTarget::NightlyOn(date.parse()?)),
        ("stable", Some("all")) => Ok(CleanTarget::AllStable),
        ("stable", Some(version)) => Ok(CleanTarget::Stable(parse_stable(version)?)),
        ("stable", None) => match resolve_version_spec("stable", releases)
            .context("cannot look up the latest stable release")?
        {
            VersionSpec::Stable(version) => Ok(CleanTarget::Stable(version)),
            VersionSpec::Nightly => Err(anyhow!("latest stable release resolved to nightly")),
        },
        (bare, None) => {
            if let Ok(version) = bare.parse::<StableVersion>() {
                Ok(CleanTarget::Stable(version))
            } else if DateSelector::looks_like_date(bare) {
                Ok(CleanTarget::NightlyOn(bare.parse()?))
            } else {
                bail!("unknown clean target `{bare}`; {USAGE}")
            }
        }
        (other, Some(extra)) => bail!("unexpected argument `{extra}` after `{other}`; {USAGE}"),
    }
}

fn parse_stable(input: &str) -> Result<StableVersion> {
    input
        .parse()
        .map_err(|()| anyhow!("invalid stable version `{input}`; expected x.y.z, e.g. 0.9.5"))
}
