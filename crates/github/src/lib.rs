use std::sync::Arc;

use anyhow::{Context, Result};
use dashboard_core::{config::GitHubConfig, source::RepoDiscovery};
use octocrab::Octocrab;

#[derive(Clone)]
pub struct GitHub {
    pub client: Octocrab,
}

/// Name and topics of an organization repository.
pub struct TaggedRepository {
    pub name: String,
    pub topics: Vec<String>,
}

impl GitHub {
    pub async fn new(config: &GitHubConfig) -> Result<Arc<Self>> {
        let mut builder = Octocrab::builder();
        if let Some(token) = &config.token {
            builder = builder.personal_token(token.clone());
        }
        if let Some(api_url) = &config.api_url {
            builder = builder.base_uri(api_url.as_str()).context("Invalid GitHub API URL")?;
        }
        let client = builder.build().context("Failed to create GitHub client")?;
        if config.token.is_some() {
            let profile = client.current().user().await.context("Failed to fetch current user")?;
            tracing::info!("Logged in as {}", profile.login);
        } else {
            tracing::warn!("No GitHub token configured, using anonymous (rate limited) access");
        }
        Ok(Arc::new(Self { client }))
    }

    /// Every repository of `org`, forks included, in listing order.
    pub async fn org_repositories(&self, org: &str) -> Result<Vec<TaggedRepository>> {
        let repos = self
            .client
            .all_pages(
                self.client
                    .orgs(org)
                    .list_repos()
                    .per_page(100)
                    .send()
                    .await
                    .with_context(|| format!("Failed to list {org} repositories"))?,
            )
            .await
            .with_context(|| format!("Failed to list {org} repositories"))?;
        tracing::debug!("Listed {} repositories of {}", repos.len(), org);
        Ok(repos
            .into_iter()
            .map(|r| TaggedRepository { name: r.name, topics: r.topics.unwrap_or_default() })
            .collect())
    }
}

/// Names tagged with each topic, topic by topic; a name tagged with several
/// topics appears once per topic. Names in `exclude` are dropped.
pub fn select_by_topics(
    repos: &[TaggedRepository],
    topics: &[String],
    exclude: &[String],
) -> Vec<String> {
    topics
        .iter()
        .flat_map(|topic| {
            repos.iter().filter(move |repo| repo.topics.contains(topic)).map(|repo| &repo.name)
        })
        .filter(|name| !exclude.contains(name))
        .cloned()
        .collect()
}

impl RepoDiscovery for GitHub {
    async fn discover(&self, org: &str, topics: &[String], exclude: &[String]) -> Result<Vec<String>> {
        let repos = self.org_repositories(org).await?;
        Ok(select_by_topics(&repos, topics, exclude))
    }
}
