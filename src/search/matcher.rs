//! Keyword/fuzzy matching primitive.
//!
//! Every "does X exist matching keyword Y" check in the auditor goes
//! through [`MatchPolicy::matches`]: a case-insensitive substring test
//! first, then a similarity-ratio test against a threshold. The ratio
//! algorithm and threshold are policy, not hard-coded — the heuristic
//! is known-coarse and has no test oracle for "correct" matches.

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

/// Similarity ratio used when the substring test misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum Similarity {
    /// Edit-distance-based normalized score in [0, 1].
    #[default]
    NormalizedLevenshtein,
    /// Prefix-weighted score, forgiving of trailing differences.
    JaroWinkler,
}

impl Similarity {
    fn ratio(&self, a: &str, b: &str) -> f64 {
        match self {
            Similarity::NormalizedLevenshtein => strsim::normalized_levenshtein(a, b),
            Similarity::JaroWinkler => strsim::jaro_winkler(a, b),
        }
    }
}

/// Configurable matching policy.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MatchPolicy {
    /// Minimum similarity score for a fuzzy hit, in [0, 1].
    pub threshold: f64,
    pub algorithm: Similarity,
}

impl Default for MatchPolicy {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            algorithm: Similarity::default(),
        }
    }
}

impl MatchPolicy {
    pub fn new(threshold: f64, algorithm: Similarity) -> Self {
        Self {
            threshold,
            algorithm,
        }
    }

    /// True when `text` contains `term` case-insensitively, or their
    /// similarity ratio meets the threshold. Empty text never matches
    /// a non-empty term.
    pub fn matches(&self, term: &str, text: &str) -> bool {
        if text.is_empty() {
            return term.is_empty();
        }

        let term_lower = term.to_lowercase();
        let text_lower = text.to_lowercase();

        if text_lower.contains(&term_lower) {
            return true;
        }

        self.algorithm.ratio(&term_lower, &text_lower) >= self.threshold
    }

    /// Like [`matches`](Self::matches) for optional metadata text.
    pub fn matches_opt(&self, term: &str, text: Option<&str>) -> bool {
        text.map(|t| self.matches(term, t)).unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_matches_at_any_threshold() {
        let strict = MatchPolicy::new(1.0, Similarity::NormalizedLevenshtein);
        assert!(strict.matches("attribution", "attribution"));
        assert!(strict.matches("Attribution", "attribution"));
    }

    #[test]
    fn test_empty_text_never_matches_nonempty_term() {
        let policy = MatchPolicy::default();
        assert!(!policy.matches("touch", ""));
        assert!(!policy.matches_opt("touch", None));
    }

    #[test]
    fn test_substring_hit_ignores_threshold() {
        let strict = MatchPolicy::new(1.0, Similarity::NormalizedLevenshtein);
        assert!(strict.matches("touch", "Last_Touch_Channel__c"));
    }

    #[test]
    fn test_fuzzy_hit_respects_threshold() {
        let policy = MatchPolicy::default();
        assert!(policy.matches("attribution", "atribution"));

        let strict = MatchPolicy::new(0.99, Similarity::NormalizedLevenshtein);
        assert!(!strict.matches("attribution", "atribution"));
    }

    #[test]
    fn test_algorithm_is_swappable() {
        let jw = MatchPolicy::new(0.85, Similarity::JaroWinkler);
        assert!(jw.matches("salesforce", "salesforc"));
        assert!(!jw.matches("salesforce", "microsoft"));
    }
}
