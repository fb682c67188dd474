//! Upstream releases and pending font updates.

use std::{
    fmt,
    fs::{self, OpenOptions},
    io::{self, Write as _},
    path::Path,
};

use log::{error, info};
use regex::Regex;
use serde::{Deserialize, Serialize};
use ureq::Agent;

use crate::{
    fetch::{http_agent, MAX_API_RESPONSE_SIZE, USER_AGENT},
    ConfigError, FetchError, FleetConfig, VersionLedger,
};

/// Release asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Asset {
    /// Asset file name.
    pub name: String,
    /// URL to download the asset from.
    pub browser_download_url: String,
}

/// Latest release of a font repository.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Release {
    /// Release tag, used as the font version.
    pub tag_name: String,
    /// URL of the release web page.
    pub html_url: String,
    /// Publication timestamp (RFC 3339).
    #[serde(default)]
    pub published_at: Option<String>,
    /// Release assets.
    #[serde(default)]
    pub assets: Vec<Asset>,
}

/// Pending update of a font, as recorded in `updates.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateInfo {
    /// Font name from the configuration.
    pub name: String,
    /// Repository publishing the font.
    #[serde(default)]
    pub repo: String,
    /// New version (release tag).
    pub version: String,
    /// URL of the release web page.
    #[serde(default)]
    pub release_url: String,
    /// Publication timestamp of the release.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub published_at: Option<String>,
    /// Release assets.
    pub assets: Vec<Asset>,
}

impl UpdateInfo {
    /// Creates an update from the latest release of a font.
    pub fn new(name: &str, repo: &str, release: Release) -> Self {
        Self {
            name: name.to_owned(),
            repo: repo.to_owned(),
            version: release.tag_name,
            release_url: release.html_url,
            published_at: release.published_at,
            assets: release.assets,
        }
    }

    /// Finds the first asset whose name contains a match of `pattern`.
    pub fn find_asset(&self, pattern: &Regex) -> Option<&Asset> {
        self.assets.iter().find(|asset| pattern.is_match(&asset.name))
    }
}

/// Source of upstream releases.
pub trait ReleaseFeed: fmt::Debug + Send + Sync {
    /// Returns the latest release of `repo` (in the `owner/repo` form).
    ///
    /// # Errors
    ///
    /// Returns an error if the release cannot be fetched or parsed.
    fn latest_release(&self, repo: &str) -> Result<Release, FetchError>;
}

/// [`ReleaseFeed`] backed by the GitHub REST API.
#[derive(Clone)]
pub struct GitHubReleases {
    agent: Agent,
    api_url: String,
    token: Option<String>,
}

impl fmt::Debug for GitHubReleases {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("GitHubReleases")
            .field("api_url", &self.api_url)
            .field("has_token", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

impl GitHubReleases {
    /// Default API root.
    pub const API_URL: &'static str = "https://api.github.com";

    /// Creates a feed with an optional API token. The token raises API rate limits.
    pub fn new(token: Option<String>) -> Self {
        Self {
            agent: http_agent(),
            api_url: Self::API_URL.to_owned(),
            token: token.filter(|token| !token.is_empty()),
        }
    }
}

impl ReleaseFeed for GitHubReleases {
    fn latest_release(&self, repo: &str) -> Result<Release, FetchError> {
        let url = format!("{}/repos/{repo}/releases/latest", self.api_url);
        let http_error = |err| FetchError::Http {
            url: url.clone(),
            source: Box::new(err),
        };

        let mut request = self
            .agent
            .get(&url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("token {token}"));
        }
        let body = request
            .call()
            .map_err(http_error)?
            .into_body()
            .with_config()
            .limit(MAX_API_RESPONSE_SIZE)
            .read_to_vec()
            .map_err(http_error)?;
        serde_json::from_slice(&body).map_err(|source| FetchError::Json { url, source })
    }
}

/// Checks configured fonts for releases newer than recorded in the `ledger`.
///
/// Fonts whose release cannot be fetched are logged and skipped; they will be checked
/// on the next run.
pub fn check_updates(
    config: &FleetConfig,
    ledger: &VersionLedger,
    feed: &dyn ReleaseFeed,
) -> Vec<UpdateInfo> {
    let mut updates = vec![];
    for font in config.fonts() {
        let (name, repo) = (font.name(), font.repo());
        info!("Checking {name} ({repo})");
        let release = match feed.latest_release(repo) {
            Ok(release) => release,
            Err(err) => {
                error!("Failed checking {name} ({repo}): {err}");
                continue;
            }
        };

        let current_version = ledger.version(name);
        if current_version == Some(release.tag_name.as_str()) {
            info!("{name} is up to date: {}", release.tag_name);
        } else {
            info!(
                "Found new version of {name}: {} -> {}",
                current_version.unwrap_or("none"),
                release.tag_name
            );
            updates.push(UpdateInfo::new(name, repo, release));
        }
    }
    updates
}

/// Loads pending updates from a JSON file.
///
/// # Errors
///
/// Returns an error if the file cannot be read or parsed.
pub fn load_updates(path: &Path) -> Result<Vec<UpdateInfo>, ConfigError> {
    let json = fs::read(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    Ok(serde_json::from_slice(&json)?)
}

/// Saves pending updates to a JSON file, creating parent directories if necessary.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn save_updates(path: &Path, updates: &[UpdateInfo]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let json = serde_json::to_string_pretty(updates)?;
    fs::write(path, json)
}

/// Appends update outputs (`has_updates`, `update_count`) to a GitHub Actions output file.
///
/// # Errors
///
/// Returns an I/O error if the file cannot be written.
pub fn write_github_output(path: &Path, updates: &[UpdateInfo]) -> io::Result<()> {
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "has_updates={}", !updates.is_empty())?;
    writeln!(file, "update_count={}", updates.len())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[derive(Debug, Default)]
    struct StaticFeed {
        releases: HashMap<&'static str, Release>,
    }

    impl StaticFeed {
        fn with_release(mut self, repo: &'static str, tag: &str) -> Self {
            let release = Release {
                tag_name: tag.to_owned(),
                html_url: format!("https://github.com/{repo}/releases/tag/{tag}"),
                published_at: Some("2024-05-01T12:00:00Z".to_owned()),
                assets: vec![Asset {
                    name: format!("fonts-{tag}.zip"),
                    browser_download_url: format!(
                        "https://github.com/{repo}/releases/download/{tag}/fonts-{tag}.zip"
                    ),
                }],
            };
            self.releases.insert(repo, release);
            self
        }
    }

    impl ReleaseFeed for StaticFeed {
        fn latest_release(&self, repo: &str) -> Result<Release, FetchError> {
            self.releases.get(repo).cloned().ok_or_else(|| FetchError::Io {
                path: repo.into(),
                source: io::ErrorKind::NotFound.into(),
            })
        }
    }

    fn config() -> FleetConfig {
        let json = r#"{ "fonts": [
            { "name": "Inter", "repo": "rsms/inter",
              "files": [{ "variant": "Regular", "weight": 400, "asset_pattern": ".*" }] },
            { "name": "LXGWWenKai", "repo": "lxgw/LxgwWenKai",
              "files": [{ "variant": "Regular", "weight": 400, "asset_pattern": ".*" }] },
            { "name": "Missing", "repo": "owner/missing",
              "files": [{ "variant": "Regular", "weight": 400, "asset_pattern": ".*" }] }
        ] }"#;
        FleetConfig::from_json(json).unwrap()
    }

    #[test]
    fn checking_updates() {
        let feed = StaticFeed::default()
            .with_release("rsms/inter", "v4.0")
            .with_release("lxgw/LxgwWenKai", "v1.501");
        let mut ledger = VersionLedger::default();
        ledger.record("Inter", "v4.0", "2024-01-01T00:00:00Z");
        ledger.record("LXGWWenKai", "v1.500", "2024-01-01T00:00:00Z");

        let updates = check_updates(&config(), &ledger, &feed);
        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.name, "LXGWWenKai");
        assert_eq!(update.repo, "lxgw/LxgwWenKai");
        assert_eq!(update.version, "v1.501");
        assert_eq!(update.assets.len(), 1);

        let updates = check_updates(&config(), &VersionLedger::default(), &feed);
        let names: Vec<_> = updates.iter().map(|update| update.name.as_str()).collect();
        assert_eq!(names, ["Inter", "LXGWWenKai"]);
    }

    #[test]
    fn finding_assets() {
        let update = UpdateInfo {
            name: "Inter".to_owned(),
            repo: "rsms/inter".to_owned(),
            version: "v4.0".to_owned(),
            release_url: String::new(),
            published_at: None,
            assets: ["Inter-4.0.zip", "Inter-4.0-web.zip", "Inter.ttc"]
                .into_iter()
                .map(|name| Asset {
                    name: name.to_owned(),
                    browser_download_url: format!("https://example.com/{name}"),
                })
                .collect(),
        };

        let pattern = Regex::new(r"Inter-.*\.zip").unwrap();
        assert_eq!(update.find_asset(&pattern).unwrap().name, "Inter-4.0.zip");
        let pattern = Regex::new("web").unwrap();
        assert_eq!(update.find_asset(&pattern).unwrap().name, "Inter-4.0-web.zip");
        let pattern = Regex::new(r"\.otf$").unwrap();
        assert!(update.find_asset(&pattern).is_none());
    }

    #[test]
    fn parsing_github_release() {
        let json = r#"{
            "url": "https://api.github.com/repos/rsms/inter/releases/1",
            "tag_name": "v4.0",
            "html_url": "https://github.com/rsms/inter/releases/tag/v4.0",
            "published_at": "2023-11-16T20:38:18Z",
            "assets": [{
                "id": 1,
                "name": "Inter-4.0.zip",
                "size": 42,
                "browser_download_url": "https://github.com/rsms/inter/releases/download/v4.0/Inter-4.0.zip"
            }]
        }"#;
        let release: Release = serde_json::from_str(json).unwrap();
        assert_eq!(release.tag_name, "v4.0");
        assert_eq!(release.assets[0].name, "Inter-4.0.zip");

        let update = UpdateInfo::new("Inter", "rsms/inter", release);
        assert_eq!(update.published_at.as_deref(), Some("2023-11-16T20:38:18Z"));
    }

    #[test]
    fn updates_file_roundtrip_and_github_output() {
        let dir = tempfile::tempdir().unwrap();
        let feed = StaticFeed::default().with_release("rsms/inter", "v4.0");
        let updates = check_updates(&config(), &VersionLedger::default(), &feed);

        let updates_path = dir.path().join("data/updates.json");
        save_updates(&updates_path, &updates).unwrap();
        assert_eq!(load_updates(&updates_path).unwrap(), updates);

        let output_path = dir.path().join("github_output");
        fs::write(&output_path, "previous=1\n").unwrap();
        write_github_output(&output_path, &updates).unwrap();
        let output = fs::read_to_string(&output_path).unwrap();
        assert_eq!(output, "previous=1\nhas_updates=true\nupdate_count=1\n");
    }

    #[test]
    fn loading_updates_with_full_github_assets() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("updates.json");
        let json = r#"[{
            "name": "Inter",
            "repo": "rsms/inter",
            "version": "v4.0",
            "release_url": "https://github.com/rsms/inter/releases/tag/v4.0",
            "assets": [{ "id": 1, "name": "Inter-4.0.zip", "browser_download_url": "https://example.com/a.zip" }]
        }]"#;
        fs::write(&path, json).unwrap();
        let updates = load_updates(&path).unwrap();
        assert_eq!(updates[0].assets[0].browser_download_url, "https://example.com/a.zip");
        assert_eq!(updates[0].published_at, None);
    }
}
