use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use dashboard_core::{
    config::DashboardConfig,
    exclusion::ExclusionSet,
    models::{BuildStatus, RepoEntry, Snapshot},
    source::{RepoDiscovery, StatusLookup, dedup_names},
};
use tokio::{sync::Semaphore, task::JoinSet};

/// Everything a pass needs besides its collaborators.
#[derive(Debug, Clone)]
pub struct AggregatorSettings {
    pub org: String,
    pub topics: Vec<String>,
    pub exclude_repos: Vec<String>,
    pub branches: Vec<String>,
    pub exclusions: ExclusionSet,
    pub max_concurrent_lookups: usize,
}

impl From<&DashboardConfig> for AggregatorSettings {
    fn from(config: &DashboardConfig) -> Self {
        Self {
            org: config.org.clone(),
            topics: config.topics.clone(),
            exclude_repos: config.exclude_repos.clone(),
            branches: config.branches.clone(),
            exclusions: ExclusionSet::new(&config.exclusions),
            max_concurrent_lookups: config.max_concurrent_lookups.max(1),
        }
    }
}

pub struct Aggregator<D, L> {
    settings: Arc<AggregatorSettings>,
    discovery: Arc<D>,
    lookup: Arc<L>,
}

impl<D, L> Clone for Aggregator<D, L> {
    fn clone(&self) -> Self {
        Self {
            settings: self.settings.clone(),
            discovery: self.discovery.clone(),
            lookup: self.lookup.clone(),
        }
    }
}

struct CellResult {
    repo_index: usize,
    branch_index: usize,
    status: BuildStatus,
}

impl<D, L> Aggregator<D, L>
where
    D: RepoDiscovery,
    L: StatusLookup,
{
    pub fn new(settings: AggregatorSettings, discovery: Arc<D>, lookup: Arc<L>) -> Self {
        Self { settings: Arc::new(settings), discovery, lookup }
    }

    /// Repositories across all topics, deduplicated in first-seen order.
    pub async fn discover_repos(&self) -> Result<Vec<String>> {
        let settings = &self.settings;
        let names = self
            .discovery
            .discover(&settings.org, &settings.topics, &settings.exclude_repos)
            .await
            .with_context(|| {
                format!("Failed to discover {} repositories ({})", settings.org, settings.topics.join(", "))
            })?;
        Ok(dedup_names(names))
    }

    /// Runs a full pass: discovery, then every non-excluded lookup concurrently.
    pub async fn snapshot(&self) -> Result<Snapshot> {
        let start = Instant::now();
        let settings = &self.settings;
        let repos = self.discover_repos().await?;
        let branches = &settings.branches;

        let mut matrix = vec![vec![BuildStatus::Unknown; branches.len()]; repos.len()];
        let sem = Arc::new(Semaphore::new(settings.max_concurrent_lookups));
        let mut set = JoinSet::new();
        for (repo_index, repo) in repos.iter().enumerate() {
            for (branch_index, branch) in branches.iter().enumerate() {
                if settings.exclusions.is_excluded(repo, branch) {
                    tracing::trace!("Skipping excluded {}/{}", repo, branch);
                    continue;
                }
                let sem = sem.clone();
                let lookup = self.lookup.clone();
                let owner = settings.org.clone();
                let repo = repo.clone();
                let branch = branch.clone();
                set.spawn(async move {
                    let _permit = sem.acquire().await;
                    let status = lookup.latest_status(&owner, &repo, &branch).await;
                    CellResult { repo_index, branch_index, status }
                });
            }
        }
        let dispatched = set.len();

        while let Some(join_result) = set.join_next().await {
            match join_result {
                Ok(CellResult { repo_index, branch_index, status }) => {
                    matrix[repo_index][branch_index] = status;
                }
                Err(e) => {
                    tracing::error!("Status lookup task failed: {:?}", e);
                }
            }
        }

        let snapshot = Snapshot {
            repos: repos
                .iter()
                .zip(matrix)
                .map(|(repo, statuses)| {
                    RepoEntry::new(&settings.org, repo, branches.iter().cloned().zip(statuses))
                })
                .collect(),
            branches: branches.clone(),
        };
        tracing::info!(
            "Snapshot: {} repositories, {} lookups ({} found) in {}ms",
            snapshot.repos.len(),
            dispatched,
            snapshot.cells().filter(|(_, entry)| !entry.status.is_unknown()).count(),
            start.elapsed().as_millis()
        );
        Ok(snapshot)
    }

    /// Like [`Self::snapshot`], but gives up once `timeout` elapses.
    /// In-flight lookups are aborted and no partial snapshot is returned.
    pub async fn snapshot_with_timeout(&self, timeout: Duration) -> Result<Snapshot> {
        tokio::time::timeout(timeout, self.snapshot())
            .await
            .with_context(|| format!("Snapshot timed out after {}s", timeout.as_secs_f32()))?
    }
}

#[cfg(test)]
mod tests {
    use dashboard_core::config::ExclusionRule;

    use super::*;

    #[test]
    fn settings_from_config() {
        let config = DashboardConfig {
            org: "metwork-framework".to_string(),
            topics: vec!["integration-level-1".to_string()],
            exclude_repos: vec!["testrepo".to_string()],
            branches: vec!["integration".to_string(), "master".to_string()],
            exclusions: vec![ExclusionRule {
                repo: "mflog".to_string(),
                branch: "integration".to_string(),
            }],
            max_concurrent_lookups: 0,
        };
        let settings = AggregatorSettings::from(&config);
        assert_eq!(settings.max_concurrent_lookups, 1);
        assert!(settings.exclusions.is_excluded("mflog", "integration"));
        assert_eq!(settings.branches, config.branches);
    }
}
