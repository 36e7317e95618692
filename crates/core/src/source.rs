//! Collaborators consumed by the aggregator.

use std::{collections::HashSet, future::Future};

use anyhow::Result;

use crate::models::BuildStatus;

pub trait RepoDiscovery: Send + Sync + 'static {
    /// Names of `org` repositories tagged with `topics`, topic by topic, minus `exclude`.
    /// A name may repeat; callers dedup.
    fn discover(
        &self,
        org: &str,
        topics: &[String],
        exclude: &[String],
    ) -> impl Future<Output = Result<Vec<String>>> + Send;
}

pub trait StatusLookup: Send + Sync + 'static {
    /// Latest push build of `branch`. Never fails: anything inconclusive is `Unknown`.
    fn latest_status(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> impl Future<Output = BuildStatus> + Send;
}

/// Drops repeated names, keeping each at its first position.
pub fn dedup_names(names: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    names.into_iter().filter(|name| seen.insert(name.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(values: &[&str]) -> Vec<String> { values.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn test_dedup_names() {
        let deduped = dedup_names(names(&["mfext", "mfserv", "mfdata", "mfext", "mfbase", "mfdata"]));
        assert_eq!(deduped, names(&["mfext", "mfserv", "mfdata", "mfbase"]));
    }
}
