use std::collections::{HashMap, HashSet};

use crate::config::ExclusionRule;

/// Static (repository, branch) pairs whose status is never looked up.
#[derive(Debug, Clone, Default)]
pub struct ExclusionSet {
    by_repo: HashMap<String, HashSet<String>>,
}

impl ExclusionSet {
    pub fn new(rules: &[ExclusionRule]) -> Self { rules.iter().cloned().collect() }

    pub fn is_excluded(&self, repo: &str, branch: &str) -> bool {
        self.by_repo.get(repo).is_some_and(|branches| branches.contains(branch))
    }

    pub fn len(&self) -> usize { self.by_repo.values().map(HashSet::len).sum() }

    pub fn is_empty(&self) -> bool { self.by_repo.is_empty() }
}

impl FromIterator<ExclusionRule> for ExclusionSet {
    fn from_iter<T: IntoIterator<Item = ExclusionRule>>(iter: T) -> Self {
        let mut by_repo: HashMap<String, HashSet<String>> = HashMap::new();
        for ExclusionRule { repo, branch } in iter {
            by_repo.entry(repo).or_default().insert(branch);
        }
        Self { by_repo }
    }
}
