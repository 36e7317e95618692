use std::time::Duration;

use anyhow::{Context, Result, bail};
use dashboard_core::{
    config::DroneConfig,
    models::{BuildInfo, BuildStatus},
    source::StatusLookup,
};
use serde::{Deserialize, Serialize};
use url::Url;

/// Client for the Drone build list API.
#[derive(Clone)]
pub struct Drone {
    client: reqwest::Client,
    server: Url,
    token: String,
    max_pages: u32,
}

/// One entry of `GET /api/repos/{owner}/{repo}/builds`.
#[derive(Debug, Clone, Deserialize)]
pub struct Build {
    pub event: String,
    pub branch: String,
    pub status: String,
    pub number: u64,
}

#[derive(Serialize)]
struct PageParams<'a> {
    token: &'a str,
    page: u32,
}

#[derive(Debug, PartialEq, Eq)]
enum PageOutcome {
    Found(BuildInfo),
    /// Empty page: no more history for this repository.
    Exhausted,
    /// Failed or unrelated page; keep scanning.
    Inconclusive,
}

impl Drone {
    pub fn new(config: &DroneConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("Failed to create Drone client")?;
        Self::with_client(client, config)
    }

    /// Shares an existing client (and its connection pool).
    pub fn with_client(client: reqwest::Client, config: &DroneConfig) -> Result<Self> {
        let server = config.server.clone().context("Drone server URL is not set")?;
        if server.cannot_be_a_base() {
            bail!("Invalid Drone server URL: {}", server);
        }
        Ok(Self {
            client,
            server,
            token: config.token.clone(),
            max_pages: config.max_pages,
        })
    }

    pub async fn latest_status(&self, owner: &str, repo: &str, branch: &str) -> BuildStatus {
        for page in 1..=self.max_pages {
            match self.fetch_page(owner, repo, branch, page).await {
                PageOutcome::Found(info) => {
                    tracing::debug!(
                        "{}/{} {}: build #{} {} (page {})",
                        owner,
                        repo,
                        branch,
                        info.number,
                        info.state,
                        page
                    );
                    return BuildStatus::Found(info);
                }
                PageOutcome::Exhausted => {
                    tracing::debug!("{}/{} {}: no push build in history", owner, repo, branch);
                    return BuildStatus::Unknown;
                }
                PageOutcome::Inconclusive => {}
            }
        }
        tracing::debug!(
            "{}/{} {}: no push build within {} pages",
            owner,
            repo,
            branch,
            self.max_pages
        );
        BuildStatus::Unknown
    }

    async fn fetch_page(&self, owner: &str, repo: &str, branch: &str, page: u32) -> PageOutcome {
        let response = match self
            .client
            .get(self.builds_url(owner, repo))
            .query(&PageParams { token: &self.token, page })
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                // Strip the URL, it carries the token.
                tracing::warn!(
                    "Failed to fetch builds for {}/{} page {}: {}",
                    owner,
                    repo,
                    page,
                    e.without_url()
                );
                return PageOutcome::Inconclusive;
            }
        };
        let status = response.status();
        if !status.is_success() {
            tracing::warn!("Builds for {}/{} page {}: HTTP {}", owner, repo, page, status);
            return PageOutcome::Inconclusive;
        }
        let builds = match response.json::<Vec<Build>>().await {
            Ok(builds) => builds,
            Err(e) => {
                tracing::warn!(
                    "Malformed builds for {}/{} page {}: {}",
                    owner,
                    repo,
                    page,
                    e.without_url()
                );
                return PageOutcome::Inconclusive;
            }
        };
        if builds.is_empty() {
            return PageOutcome::Exhausted;
        }
        match find_push_build(&builds, branch) {
            Some(build) => PageOutcome::Found(BuildInfo {
                state: build.status.clone(),
                number: build.number,
                url: self.build_url(owner, repo, build.number),
            }),
            None => PageOutcome::Inconclusive,
        }
    }

    fn builds_url(&self, owner: &str, repo: &str) -> Url {
        self.server_path(&["api", "repos", owner, repo, "builds"])
    }

    /// Web UI link for a single build.
    pub fn build_url(&self, owner: &str, repo: &str, number: u64) -> String {
        self.server_path(&[owner, repo, &number.to_string()]).into()
    }

    fn server_path(&self, segments: &[&str]) -> Url {
        let mut url = self.server.clone();
        // Checked in `with_client`
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }
}

/// The first push build on `branch`, in page order (newest first).
pub fn find_push_build<'a>(builds: &'a [Build], branch: &str) -> Option<&'a Build> {
    builds.iter().find(|build| build.event == "push" && build.branch == branch)
}

impl StatusLookup for Drone {
    async fn latest_status(&self, owner: &str, repo: &str, branch: &str) -> BuildStatus {
        Drone::latest_status(self, owner, repo, branch).await
    }
}
