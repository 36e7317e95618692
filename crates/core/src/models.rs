use serde::{Deserialize, Serialize};

pub const GITHUB_URL: &str = "https://github.com";

/// Latest push build for a (repository, branch) cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum BuildStatus {
    /// Excluded, or no matching build within the page bound.
    #[default]
    Unknown,
    Found(BuildInfo),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildInfo {
    /// Raw upstream state, e.g. `success`, `failure`, `running`.
    pub state: String,
    pub number: u64,
    pub url: String,
}

impl BuildStatus {
    pub fn is_unknown(&self) -> bool { matches!(self, Self::Unknown) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BranchEntry {
    pub branch: String,
    pub github_link: String,
    pub status: BuildStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoEntry {
    pub name: String,
    pub url: String,
    pub branches: Vec<BranchEntry>,
}

impl RepoEntry {
    /// Builds a row; `statuses` must already be in configured branch order.
    pub fn new<I, B>(org: &str, name: &str, statuses: I) -> Self
    where
        I: IntoIterator<Item = (B, BuildStatus)>,
        B: Into<String>,
    {
        let branches = statuses
            .into_iter()
            .map(|(branch, status)| {
                let branch = branch.into();
                BranchEntry { github_link: branch_url(org, name, &branch), branch, status }
            })
            .collect();
        Self { name: name.to_string(), url: repo_url(org, name), branches }
    }
}

/// One aggregation pass, in discovery order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub repos: Vec<RepoEntry>,
    pub branches: Vec<String>,
}

impl Snapshot {
    pub fn cells(&self) -> impl Iterator<Item = (&RepoEntry, &BranchEntry)> {
        self.repos.iter().flat_map(|repo| repo.branches.iter().map(move |entry| (repo, entry)))
    }
}

pub fn repo_url(org: &str, repo: &str) -> String { format!("{GITHUB_URL}/{org}/{repo}") }

pub fn branch_url(org: &str, repo: &str, branch: &str) -> String {
    format!("{GITHUB_URL}/{org}/{repo}/tree/{branch}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repo_entry_links() {
        let entry = RepoEntry::new("metwork-framework", "mfext", [
            ("integration", BuildStatus::Unknown),
            ("master", BuildStatus::Unknown),
        ]);
        assert_eq!(entry.url, "https://github.com/metwork-framework/mfext");
        assert_eq!(
            entry.branches.iter().map(|b| b.github_link.as_str()).collect::<Vec<_>>(),
            [
                "https://github.com/metwork-framework/mfext/tree/integration",
                "https://github.com/metwork-framework/mfext/tree/master",
            ]
        );
    }

    #[test]
    fn status_serializes_tagged() {
        let found = BuildStatus::Found(BuildInfo {
            state: "success".to_string(),
            number: 42,
            url: "https://drone.example.com/org/repo/42".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&found).unwrap(),
            serde_json::json!({
                "kind": "found",
                "state": "success",
                "number": 42,
                "url": "https://drone.example.com/org/repo/42",
            })
        );
        assert_eq!(
            serde_json::to_value(BuildStatus::Unknown).unwrap(),
            serde_json::json!({ "kind": "unknown" })
        );
    }
}
