// GitHub Releases
//
// Release metadata for neovim/neovim over the public GitHub API.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::de::DeserializeOwned;
use serde::Deserialize;

use neoman_kernel::adapters::{AdapterError, Channel, NightlyBuild, ReleaseSource};
use neoman_kernel::resolve::StableVersion;

const API_BASE: &str = "https://api.github.com/repos/neovim/neovim";
const DOWNLOAD_BASE: &str = "https://github.com/neovim/neovim/releases/download";
const USER_AGENT: &str = concat!("neoman/", env!("CARGO_PKG_VERSION"));

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Covers full archive downloads, not just metadata calls.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Debug, Deserialize)]
struct Tag {
    name: String,
}

pub struct GitHubReleases {
    client: Client,
    api_base: String,
    download_base: String,
}

impl GitHubReleases {
    pub fn new() -> Result<Self, AdapterError> {
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .connect_timeout(CONNECT_TIMEOUT)
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| AdapterError::MetadataUnavailable(format!("failed to build http client: {e}")))?;

        Ok(Self {
            client,
            api_base: API_BASE.to_string(),
            download_base: DOWNLOAD_BASE.to_string(),
        })
    }

    /// HTTP client shared with the archive fetcher.
    pub fn client(&self) -> &Client {
        &self.client
    }

    fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, AdapterError> {
        tracing::debug!(%url, "fetching release metadata");

        let response = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .send()
            .map_err(|e| AdapterError::MetadataUnavailable(format!("failed to reach {url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().unwrap_or_default();
            return Err(AdapterError::MetadataUnavailable(format!(
                "github http error {status} for {url}: {}",
                text.trim()
            )));
        }

        response
            .json()
            .map_err(|e| AdapterError::MetadataUnavailable(format!("github returned invalid JSON: {e}")))
    }
}

impl ReleaseSource for GitHubReleases {
    fn latest_stable_tag(&self) -> Result<String, AdapterError> {
        let tags = self.stable_tags()?;
        newest_stable(&tags)
            .map(|version| version.tag())
            .ok_or_else(|| AdapterError::MetadataUnavailable("no stable release tags published".into()))
    }

    fn latest_nightly(&self) -> Result<NightlyBuild, AdapterError> {
        let build: NightlyBuild = self.get_json(&format!("{}/releases/tags/nightly", self.api_base))?;
        tracing::debug!(id = %build.id, created_at = %build.created_at, "latest nightly");
        Ok(build)
    }

    fn stable_tags(&self) -> Result<Vec<String>, AdapterError> {
        let tags: Vec<Tag> = self.get_json(&format!("{}/tags?per_page=100", self.api_base))?;
        Ok(stable_only(tags.into_iter().map(|t| t.name)))
    }

    fn asset_url(&self, channel: &Channel, asset: &str) -> String {
        match channel {
            Channel::Nightly => format!("{}/nightly/{asset}", self.download_base),
            Channel::Stable(version) => format!("{}/{}/{asset}", self.download_base, version.tag()),
        }
    }
}

/// Keep tags that name a release, newest first.
fn stable_only(names: impl Iterator<Item = String>) -> Vec<String> {
    let mut versioned: Vec<(StableVersion, String)> = names
        .filter_map(|name| Some((name.parse().ok()?, name)))
        .collect();
    versioned.sort_by(|a, b| b.0.cmp(&a.0));
    versioned.into_iter().map(|(_, name)| name).collect()
}

/// Highest version among `tags`. The API's tag order is not release order.
fn newest_stable(tags: &[String]) -> Option<StableVersion> {
    tags.iter().filter_map(|tag| tag.parse().ok()).max()
}
