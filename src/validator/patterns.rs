//! Log line patterns.
//!
//! All matching is line-local and case-insensitive. Each category reports the
//! first line that matches any of its patterns.

use regex::{Regex, RegexSet};

const PROMOTION_PATTERNS: &[&str] = &[
    r"Failover election won",
    r"configEpoch set to \d+ after successful failover",
    r"Failover auth granted",
];

const FAILOVER_ERROR_PATTERNS: &[&str] = &[
    r"Failover attempt expired",
    r"Manual failover timed out",
    r"Failover election in progress for epoch 0",
];

const REPLICATION_ISSUE_PATTERNS: &[&str] = &[r"I'm a sub-replica! Reconfiguring myself"];

const SHARD_FORMATION_PATTERN: &str = r"is now part of shard ([a-f0-9]{40})";

const PRIMARY_CLAIM_PATTERN: &str = r"Setting myself to primary in shard ([a-f0-9]{40})";

/// Compiled pattern categories.
#[derive(Debug, Clone)]
pub struct LogPatterns {
    promotion: RegexSet,
    failover_error: RegexSet,
    replication_issue: RegexSet,
    shard_formation: Regex,
    primary_claim: Regex,
}

impl LogPatterns {
    /// Compile the built-in pattern set.
    pub fn compile() -> Result<Self, regex::Error> {
        Ok(LogPatterns {
            promotion: case_insensitive_set(PROMOTION_PATTERNS)?,
            failover_error: case_insensitive_set(FAILOVER_ERROR_PATTERNS)?,
            replication_issue: case_insensitive_set(REPLICATION_ISSUE_PATTERNS)?,
            shard_formation: case_insensitive(SHARD_FORMATION_PATTERN)?,
            primary_claim: case_insensitive(PRIMARY_CLAIM_PATTERN)?,
        })
    }

    /// Pattern for a surviving node marking `cluster_node_id` as failing once
    /// quorum was reached.
    pub fn quorum_failing(cluster_node_id: &str) -> Result<Regex, regex::Error> {
        case_insensitive(&format!(
            r"Marking node {}.*as failing.*quorum reached",
            regex::escape(cluster_node_id)
        ))
    }

    pub fn has_promotion(&self, lines: &[String]) -> bool {
        lines.iter().any(|line| self.promotion.is_match(line))
    }

    pub fn first_failover_error<'a>(&self, lines: &'a [String]) -> Option<&'a str> {
        first_match(&self.failover_error, lines)
    }

    pub fn first_replication_issue<'a>(&self, lines: &'a [String]) -> Option<&'a str> {
        first_match(&self.replication_issue, lines)
    }

    /// Cluster shard token from the first shard formation line.
    pub fn first_shard_formation(&self, lines: &[String]) -> Option<String> {
        lines
            .iter()
            .find_map(|line| capture_token(&self.shard_formation, line))
    }

    /// First line where the node set itself as primary, with the claimed shard token.
    pub fn first_primary_claim<'a>(&self, lines: &'a [String]) -> Option<(&'a str, String)> {
        lines.iter().find_map(|line| {
            capture_token(&self.primary_claim, line).map(|token| (line.trim(), token))
        })
    }
}

impl Default for LogPatterns {
    fn default() -> Self {
        LogPatterns::compile().expect("built-in log patterns are valid")
    }
}

fn case_insensitive(pattern: &str) -> Result<Regex, regex::Error> {
    Regex::new(&format!("(?i){}", pattern))
}

fn case_insensitive_set(patterns: &[&str]) -> Result<RegexSet, regex::Error> {
    RegexSet::new(patterns.iter().map(|p| format!("(?i){}", p)))
}

fn first_match<'a>(set: &RegexSet, lines: &'a [String]) -> Option<&'a str> {
    lines
        .iter()
        .find(|line| set.is_match(line))
        .map(|line| line.trim())
}

/// Tokens are compared lowercase; the cluster prints them lowercase anyway.
fn capture_token(regex: &Regex, line: &str) -> Option<String> {
    regex
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_ascii_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOKEN: &str = "8f3a9c2b1d4e5f60718293a4b5c6d7e8f9a0b1c2";

    fn lines(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_promotion_is_case_insensitive() {
        let patterns = LogPatterns::default();
        assert!(patterns.has_promotion(&lines(&["1:M 12:00:00.000 * FAILOVER ELECTION WON"])));
        assert!(patterns.has_promotion(&lines(&[
            "1:M 12:00:00.000 * configEpoch set to 7 after successful failover"
        ])));
        assert!(!patterns.has_promotion(&lines(&["1:M 12:00:00.000 * Ready to accept connections"])));
    }

    #[test]
    fn test_first_failover_error_wins() {
        let patterns = LogPatterns::default();
        let log = lines(&[
            "noise",
            "1:S 12:00:01.000 # Manual failover timed out.",
            "1:S 12:00:02.000 # Failover attempt expired.",
        ]);
        assert_eq!(
            patterns.first_failover_error(&log),
            Some("1:S 12:00:01.000 # Manual failover timed out.")
        );
    }

    #[test]
    fn test_shard_tokens() {
        let patterns = LogPatterns::default();
        let log = vec![
            format!("1:M 12:00:00.000 * Node abc () is now part of shard {}", TOKEN),
            format!("1:M 12:00:05.000 * Setting myself to primary in shard {}", TOKEN.to_uppercase()),
        ];
        assert_eq!(patterns.first_shard_formation(&log).as_deref(), Some(TOKEN));
        let (line, token) = patterns.first_primary_claim(&log).unwrap();
        assert!(line.starts_with("1:M 12:00:05.000"));
        assert_eq!(token, TOKEN);
    }

    #[test]
    fn test_quorum_failing_escapes_identifier() {
        let regex = LogPatterns::quorum_failing("a.c").unwrap();
        assert!(regex.is_match("* Marking node a.c () as failing (quorum reached)."));
        assert!(!regex.is_match("* Marking node abc () as failing (quorum reached)."));
    }
}
