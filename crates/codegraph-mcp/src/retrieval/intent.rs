/// Natural-language query intent (§4.6.1). `Semantic` is the fallback when
/// no templated intent's signal words match.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Cypher,
    Structure,
    Dependency,
    TestImpact,
    Progress,
    Semantic,
}

impl Intent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cypher => "cypher",
            Self::Structure => "structure",
            Self::Dependency => "dependency",
            Self::TestImpact => "test-impact",
            Self::Progress => "progress",
            Self::Semantic => "semantic",
        }
    }
}

const CYPHER_VERBS: &[&str] = &["match", "call", "return", "select"];
const STRUCTURE_SIGNALS: &[&str] = &["list", "count", "all files", "all classes", "all functions", "files", "classes", "functions"];
const DEPENDENCY_SIGNALS: &[&str] = &["imports", "depends on", "references", "callers of", "dependency", "dependencies"];
const TEST_IMPACT_SIGNALS: &[&str] = &["tests for", "impacted by", "test impact", "coverage of"];
const PROGRESS_SIGNALS: &[&str] = &["in progress", "blocked", "tasks for", "task status", "feature status"];

fn matched_token_count(query_lower: &str, signals: &[&str]) -> usize {
    signals
        .iter()
        .filter(|s| query_lower.contains(*s))
        .map(|s| s.split_whitespace().count())
        .sum()
}

/// Classifies free-text into one of the templated intents, or `Semantic` as
/// a fallback. Ties among templated intents break by whichever signal list
/// matches the most tokens from the input (§4.6.1).
pub fn classify(query: &str) -> Intent {
    let trimmed = query.trim_start();
    let first_word = trimmed.split_whitespace().next().unwrap_or("").to_uppercase();
    if CYPHER_VERBS.iter().any(|v| v.to_uppercase() == first_word) {
        return Intent::Cypher;
    }

    let lower = query.to_lowercase();
    let candidates = [
        (Intent::Structure, matched_token_count(&lower, STRUCTURE_SIGNALS)),
        (Intent::Dependency, matched_token_count(&lower, DEPENDENCY_SIGNALS)),
        (Intent::TestImpact, matched_token_count(&lower, TEST_IMPACT_SIGNALS)),
        (Intent::Progress, matched_token_count(&lower, PROGRESS_SIGNALS)),
    ];

    let best = candidates.iter().filter(|(_, score)| *score > 0).max_by_key(|(_, score)| *score);
    match best {
        Some((intent, _)) => *intent,
        None => Intent::Semantic,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cypher_verb_prefix_is_forwarded_verbatim() {
        assert_eq!(classify("MATCH (n) RETURN n"), Intent::Cypher);
    }

    #[test]
    fn structure_signal_wins() {
        assert_eq!(classify("list all functions in the auth module"), Intent::Structure);
    }

    #[test]
    fn dependency_signal_wins() {
        assert_eq!(classify("what depends on src/auth.ts"), Intent::Dependency);
    }

    #[test]
    fn test_impact_signal_wins() {
        assert_eq!(classify("tests for src/auth.ts"), Intent::TestImpact);
    }

    #[test]
    fn progress_signal_wins() {
        assert_eq!(classify("what tasks are blocked right now"), Intent::Progress);
    }

    #[test]
    fn unmatched_query_falls_back_to_semantic() {
        assert_eq!(classify("how does retry backoff work here"), Intent::Semantic);
    }
}
