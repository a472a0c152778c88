//! Findings and the aggregate validation result.

use std::fmt;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use crate::cluster::ShardId;

/// How bad a finding is. Only errors fail a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

/// What a finding is evidence of.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FindingKind {
    /// No surviving node marked the killed node as failing after quorum.
    DetectionMiss { address: String },
    /// A primary of a failed-over shard logged no promotion.
    PromotionMissing,
    /// The promoted node claimed a cluster shard belonging to another harness shard.
    WrongShard { expected: ShardId, observed: ShardId },
    /// Election expiry, manual failover timeout or a stale-epoch election,
    /// with no promotion anywhere in the shard.
    FailoverError,
    /// Unexpected replication topology churn.
    ReplicationIssue,
}

impl FindingKind {
    /// Fixed per kind; callers cannot override it.
    pub fn severity(&self) -> Severity {
        match self {
            FindingKind::DetectionMiss { .. }
            | FindingKind::WrongShard { .. }
            | FindingKind::FailoverError => Severity::Error,
            FindingKind::PromotionMissing | FindingKind::ReplicationIssue => Severity::Warning,
        }
    }

    pub fn message(&self) -> String {
        match self {
            FindingKind::DetectionMiss { address } => format!(
                "Cluster did not detect failure of killed node {} (no \"quorum reached\" message found)",
                address
            ),
            FindingKind::PromotionMissing => {
                "Primary has no failover promotion messages in recent logs".to_string()
            }
            FindingKind::WrongShard { expected, observed } => format!(
                "Node promoted into wrong shard: expected shard {}, observed shard {}",
                expected, observed
            ),
            FindingKind::FailoverError => "Failover error detected".to_string(),
            FindingKind::ReplicationIssue => "Replication topology issue detected".to_string(),
        }
    }
}

/// One detected anomaly. Created only by the validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFinding {
    node_id: String,
    shard_id: Option<ShardId>,
    kind: FindingKind,
    log_line: String,
}

impl LogFinding {
    pub(crate) fn new(
        node_id: impl Into<String>,
        shard_id: Option<ShardId>,
        kind: FindingKind,
        log_line: impl Into<String>,
    ) -> Self {
        LogFinding {
            node_id: node_id.into(),
            shard_id,
            kind,
            log_line: log_line.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// `None` for cluster-wide findings.
    pub fn shard_id(&self) -> Option<ShardId> {
        self.shard_id
    }

    pub fn kind(&self) -> &FindingKind {
        &self.kind
    }

    pub fn severity(&self) -> Severity {
        self.kind.severity()
    }

    pub fn message(&self) -> String {
        self.kind.message()
    }

    /// Verbatim evidence, empty when the finding is about missing evidence.
    pub fn log_line(&self) -> &str {
        &self.log_line
    }
}

impl Serialize for LogFinding {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("LogFinding", 6)?;
        s.serialize_field("node_id", &self.node_id)?;
        s.serialize_field("shard_id", &self.shard_id)?;
        s.serialize_field("severity", &self.severity())?;
        s.serialize_field("finding", &self.kind)?;
        s.serialize_field("message", &self.message())?;
        s.serialize_field("log_line", &self.log_line)?;
        s.end()
    }
}

/// Outcome of one validation run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogValidationResult {
    findings: Vec<LogFinding>,
    shards_checked: usize,
}

impl LogValidationResult {
    pub(crate) fn new(findings: Vec<LogFinding>, shards_checked: usize) -> Self {
        LogValidationResult {
            findings,
            shards_checked,
        }
    }

    /// True iff no finding has error severity.
    pub fn success(&self) -> bool {
        self.error_count() == 0
    }

    pub fn findings(&self) -> &[LogFinding] {
        &self.findings
    }

    /// Number of distinct affected shards.
    pub fn shards_checked(&self) -> usize {
        self.shards_checked
    }

    /// Findings with error severity.
    pub fn error_count(&self) -> usize {
        self.count(Severity::Error)
    }

    pub fn warning_count(&self) -> usize {
        self.count(Severity::Warning)
    }

    fn count(&self, severity: Severity) -> usize {
        self.findings
            .iter()
            .filter(|f| f.severity() == severity)
            .count()
    }
}

impl fmt::Display for LogValidationResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.success() {
            write!(f, "Log validation passed ({} shards checked)", self.shards_checked)
        } else {
            write!(
                f,
                "Log validation failed: {} errors, {} warnings",
                self.error_count(),
                self.warning_count()
            )
        }
    }
}

impl Serialize for LogValidationResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("LogValidationResult", 5)?;
        s.serialize_field("success", &self.success())?;
        s.serialize_field("shards_checked", &self.shards_checked)?;
        s.serialize_field("errors", &self.error_count())?;
        s.serialize_field("warnings", &self.warning_count())?;
        s.serialize_field("findings", &self.findings)?;
        s.end()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_passed_with_warning() {
        let result = LogValidationResult::new(
            vec![LogFinding::new("node-1", Some(1), FindingKind::PromotionMissing, "")],
            2,
        );
        assert!(result.success());
        assert_eq!(result.to_string(), "Log validation passed (2 shards checked)");
    }

    #[test]
    fn test_display_failed() {
        let result = LogValidationResult::new(
            vec![
                LogFinding::new(
                    "node-0",
                    None,
                    FindingKind::DetectionMiss {
                        address: "127.0.0.1:7000".to_string(),
                    },
                    "",
                ),
                LogFinding::new("node-1", Some(1), FindingKind::FailoverError, "Failover attempt expired"),
            ],
            1,
        );
        assert!(!result.success());
        assert_eq!(result.to_string(), "Log validation failed: 2 errors, 0 warnings");
    }

    #[test]
    fn test_severity_by_kind() {
        assert_eq!(FindingKind::ReplicationIssue.severity(), Severity::Warning);
        assert_eq!(
            FindingKind::WrongShard { expected: 3, observed: 5 }.severity(),
            Severity::Error
        );
        assert!(FindingKind::WrongShard { expected: 3, observed: 5 }
            .message()
            .contains("expected shard 3, observed shard 5"));
    }

    #[test]
    fn test_serialized_report() {
        let result = LogValidationResult::new(
            vec![LogFinding::new(
                "node-4",
                Some(5),
                FindingKind::WrongShard { expected: 3, observed: 5 },
                "Setting myself to primary in shard abc",
            )],
            1,
        );
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["errors"], 1);
        assert_eq!(json["findings"][0]["severity"], "error");
        assert_eq!(json["findings"][0]["finding"]["kind"], "wrong_shard");
        assert_eq!(json["findings"][0]["finding"]["expected"], 3);
    }
}
