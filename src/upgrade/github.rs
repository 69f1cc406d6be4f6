use regex::Regex;
use reqwest::blocking::Client;
use reqwest::header::{ACCEPT, HeaderMap, HeaderValue, USER_AGENT};
use serde::Deserialize;
use std::env;
use std::sync::LazyLock;
use std::time::Duration;
use tracing::debug;

use crate::error::UpdateError;

pub const RELEASES_URL: &str = "https://api.github.com/repos/FreeCAD/FreeCAD/releases";
pub const AGENT: &str = "FreeCAD-Updater";

const FEED_TIMEOUT: Duration = Duration::from_secs(15);

/// Fully anchored so near-misses (extra prefix or suffix) never match.
static WEEKLY_ASSET: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^FreeCAD_weekly-\d{4}\.\d{2}\.\d{2}-Windows-x86_64-py311\.7z$")
        .expect("weekly asset pattern is valid")
});

#[derive(Debug, Deserialize)]
pub struct Release {
    #[serde(default)]
    pub assets: Vec<ReleaseAsset>,
}

#[derive(Debug, Deserialize)]
pub struct ReleaseAsset {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub browser_download_url: String,
}

/// One downloadable weekly build resolved from the feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Asset {
    pub name: String,
    pub url: String,
}

pub fn is_weekly_asset(name: &str) -> bool {
    WEEKLY_ASSET.is_match(name)
}

pub fn gh_client() -> Result<Client, UpdateError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        ACCEPT,
        HeaderValue::from_static("application/vnd.github.v3+json"),
    );
    headers.insert(USER_AGENT, HeaderValue::from_static(AGENT));
    if let Ok(tok) = env::var("GITHUB_TOKEN")
        && let Ok(v) = HeaderValue::from_str(&format!("Bearer {}", tok))
    {
        headers.insert("Authorization", v);
    }
    Client::builder()
        .default_headers(headers)
        .build()
        .map_err(|e| UpdateError::network("failed to build HTTP client", e))
}

/// The upstream release listing.
#[derive(Debug, Clone)]
pub struct FeedSource {
    client: Client,
    url: String,
}

impl FeedSource {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        FeedSource {
            client,
            url: url.into(),
        }
    }

    /// Newest weekly build in feed order, or `None` if no release carries one.
    ///
    /// The feed is trusted to list releases newest-first; nothing is re-sorted.
    pub fn latest_weekly_asset(&self) -> Result<Option<Asset>, UpdateError> {
        debug!("querying release feed {}", self.url);
        let releases: Vec<Release> = self
            .client
            .get(&self.url)
            .timeout(FEED_TIMEOUT)
            .send()
            .and_then(|r| r.error_for_status())
            .and_then(|r| r.json())
            .map_err(|e| UpdateError::network("release feed query failed", e))?;
        Ok(pick_weekly(&releases))
    }
}

fn pick_weekly(releases: &[Release]) -> Option<Asset> {
    releases
        .iter()
        .flat_map(|rel| rel.assets.iter())
        .find(|a| is_weekly_asset(&a.name))
        .map(|a| Asset {
            name: a.name.clone(),
            url: a.browser_download_url.clone(),
        })
}
