//! Fuzzy job name matching and candidate resolution.

use crate::jenkins::JobCandidate;

/// Maximum number of candidates presented to the user.
pub const MAX_CHOICES: usize = 5;

/// True when `fragment` is an ordered (not necessarily contiguous)
/// subsequence of `candidate`, case-insensitive. The empty fragment
/// matches everything.
pub fn matches(candidate: &str, fragment: &str) -> bool {
    let candidate: Vec<char> = candidate.to_lowercase().chars().collect();
    let mut pos = 0;

    for ch in fragment.to_lowercase().chars() {
        match candidate[pos..].iter().position(|&c| c == ch) {
            Some(offset) => pos += offset + 1,
            None => return false,
        }
    }
    true
}

/// Outcome of resolving a user fragment against the job list.
#[derive(Debug, Clone)]
pub struct Resolution {
    /// Matching candidates, server order preserved, capped at [`MAX_CHOICES`].
    pub candidates: Vec<JobCandidate>,
    /// Total number of matches before capping.
    pub total_matches: usize,
    /// The query actually used (the configured default when the fragment
    /// was empty).
    pub query: String,
}

impl Resolution {
    /// More matches exist than are presented.
    pub fn truncated(&self) -> bool {
        self.total_matches > self.candidates.len()
    }

    /// Exactly one job matched — the caller can trigger it directly.
    pub fn single(&self) -> Option<&JobCandidate> {
        if self.total_matches == 1 {
            self.candidates.first()
        } else {
            None
        }
    }
}

/// Filter `jobs` down to the ones matching `query` (or `default_query`
/// when the query is empty), preserving the server's ordering.
pub fn resolve(query: &str, default_query: &str, jobs: Vec<JobCandidate>) -> Resolution {
    let query = if query.is_empty() {
        default_query
    } else {
        query
    };

    let mut candidates: Vec<JobCandidate> = jobs
        .into_iter()
        .filter(|job| matches(&job.full_name, query))
        .collect();
    let total_matches = candidates.len();
    candidates.truncate(MAX_CHOICES);

    Resolution {
        candidates,
        total_matches,
        query: query.to_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jobs(names: &[&str]) -> Vec<JobCandidate> {
        names
            .iter()
            .map(|n| JobCandidate {
                full_name: (*n).to_owned(),
            })
            .collect()
    }

    #[test]
    fn test_matches_subsequence() {
        assert!(matches("frontend-deploy", "fdep"));
        assert!(matches("frontend-deploy", "frontend-deploy"));
        assert!(matches("frontend-deploy", "fd"));
    }

    #[test]
    fn test_matches_is_case_insensitive() {
        assert!(matches("Frontend-Deploy", "fdep"));
        assert!(matches("frontend-deploy", "FDEP"));
    }

    #[test]
    fn test_matches_requires_order() {
        // 'p' then 'f' never appears in order.
        assert!(!matches("frontend-deploy", "pf"));
    }

    #[test]
    fn test_matches_fails_on_missing_char() {
        assert!(!matches("frontend-deploy", "fdz"));
        assert!(!matches("backend-deploy", "fdep"));
    }

    #[test]
    fn test_empty_fragment_matches_everything() {
        assert!(matches("anything", ""));
        assert!(matches("", ""));
    }

    #[test]
    fn test_fragment_longer_than_candidate_fails() {
        assert!(!matches("ab", "abc"));
    }

    #[test]
    fn test_resolve_fdep_scenario() {
        let resolution = resolve(
            "fdep",
            "deploy",
            jobs(&["frontend-deploy", "backend-deploy", "frontend-test"]),
        );
        assert_eq!(resolution.total_matches, 1);
        assert_eq!(resolution.single().unwrap().full_name, "frontend-deploy");
        assert!(!resolution.truncated());
    }

    #[test]
    fn test_resolve_deploy_scenario() {
        let resolution = resolve(
            "deploy",
            "deploy",
            jobs(&["frontend-deploy", "backend-deploy", "frontend-test"]),
        );
        assert_eq!(resolution.total_matches, 2);
        assert!(resolution.single().is_none());
        assert!(!resolution.truncated());
        let names: Vec<_> = resolution
            .candidates
            .iter()
            .map(|c| c.full_name.as_str())
            .collect();
        // Server order preserved.
        assert_eq!(names, vec!["frontend-deploy", "backend-deploy"]);
    }

    #[test]
    fn test_resolve_caps_at_five() {
        let all = jobs(&["d1", "d2", "d3", "d4", "d5", "d6", "d7"]);
        let resolution = resolve("d", "deploy", all);
        assert_eq!(resolution.candidates.len(), 5);
        assert_eq!(resolution.total_matches, 7);
        assert!(resolution.truncated());
        // Not "single" even though the cap hides most of the matches.
        assert!(resolution.single().is_none());
    }

    #[test]
    fn test_resolve_empty_query_uses_default() {
        let resolution = resolve("", "deploy", jobs(&["frontend-deploy", "lint-check"]));
        assert_eq!(resolution.query, "deploy");
        assert_eq!(resolution.total_matches, 1);
        assert_eq!(resolution.single().unwrap().full_name, "frontend-deploy");
    }

    #[test]
    fn test_resolve_no_matches_is_valid() {
        let resolution = resolve("zzz", "deploy", jobs(&["frontend-deploy"]));
        assert_eq!(resolution.total_matches, 0);
        assert!(resolution.candidates.is_empty());
        assert!(resolution.single().is_none());
    }
}
