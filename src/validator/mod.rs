//! Shard Log Validator.
//!
//! Verifies, from node logs alone, that the cluster reacted correctly to the
//! operations and kills of a chaos run:
//! - Failure detection: some surviving node marked each killed node as
//!   failing once quorum was reached.
//! - Failover: every shard that needed a failover promoted a node, and the
//!   promoted node claimed the cluster shard belonging to its harness shard.
//!
//! The validator only reads logs. It takes one snapshot of the log tails and
//! never polls or retries; callers wait for the cluster to settle first.

pub mod finding;
pub mod patterns;
pub mod reconcile;
pub mod resolve;
pub mod tail;


use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, info, warn};

use crate::cluster::{NodeInfo, Operation, ShardId};

pub use finding::{FindingKind, LogFinding, LogValidationResult, Severity};
pub use patterns::LogPatterns;
pub use reconcile::ShardTokenMap;
pub use resolve::{parse_shard_pattern, AddressKind, ShardResolver};
pub use tail::{read_tail, LogSnapshot};

/// Caller misuse. Log-level problems are never reported this way.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("shard {shard} is not present in the supplied topology")]
    UnknownShard { shard: ShardId },

    #[error("invalid log pattern: {0}")]
    Pattern(#[from] regex::Error),
}

/// How many trailing log lines each check inspects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TailLimits {
    /// Surviving nodes' tails scanned for quorum failure marking.
    pub detection: usize,
    /// Tails scanned for promotion, failover errors and replication churn.
    pub promotion: usize,
    /// Tails scanned for shard formation tokens.
    pub formation: usize,
}

impl Default for TailLimits {
    fn default() -> Self {
        TailLimits {
            detection: 200,
            promotion: 200,
            formation: 500,
        }
    }
}

impl TailLimits {
    /// Lines to capture so every check has its full window.
    fn widest(&self) -> usize {
        self.detection.max(self.promotion).max(self.formation)
    }
}

/// Validates logs for shards affected by operations and chaos.
#[derive(Debug, Clone, Default)]
pub struct ShardLogValidator {
    /// Per-check tail sizes.
    limits: TailLimits,
    /// Compiled once, shared by every run.
    patterns: LogPatterns,
}

impl ShardLogValidator {
    /// Validator scanning `limits` lines per check, with the built-in patterns.
    pub fn new(limits: TailLimits) -> Self {
        ShardLogValidator {
            limits,
            patterns: LogPatterns::default(),
        }
    }

    /// Tail sizes in use.
    pub fn limits(&self) -> &TailLimits {
        &self.limits
    }

    /// Validate the logs of every shard affected by `operations` or by the
    /// kills in `killed` (`host:port` addresses).
    ///
    /// `shards_with_primary_killed` is the orchestrator's record of shards
    /// that lost their primary; every id in it must exist in `topology`.
    pub fn validate_affected_shards(
        &self,
        topology: &[NodeInfo],
        operations: &[Operation],
        killed: &HashSet<String>,
        shards_with_primary_killed: &BTreeSet<ShardId>,
    ) -> Result<LogValidationResult, ValidationError> {
        let known: HashSet<ShardId> = topology.iter().map(|n| n.shard_id).collect();
        if let Some(&shard) = shards_with_primary_killed
            .iter()
            .find(|shard| !known.contains(shard))
        {
            return Err(ValidationError::UnknownShard { shard });
        }

        info!("starting log validation for affected shards");

        let resolver = ShardResolver::new(topology);
        let affected = resolver.affected_shards(operations, killed, topology);
        info!(
            count = affected.len(),
            shards = ?affected,
            "validating logs for affected shards"
        );

        let logs = LogSnapshot::capture(topology, self.limits.widest());
        let mut findings = self.check_failure_detection(topology, killed, &logs)?;

        let tokens = ShardTokenMap::build(topology, &logs, &self.patterns, self.limits.formation);

        for &shard in &affected {
            let needs_failover = resolver.had_failover(shard, operations)
                || shards_with_primary_killed.contains(&shard);
            if !needs_failover {
                continue;
            }
            let nodes: Vec<&NodeInfo> = topology.iter().filter(|n| n.shard_id == shard).collect();
            findings.extend(self.check_failover(&nodes, &tokens, &logs));
        }

        for finding in &findings {
            match finding.severity() {
                Severity::Error => error!(
                    node_id = %finding.node_id(),
                    shard = ?finding.shard_id(),
                    "log validation error: {}",
                    finding.message()
                ),
                Severity::Warning => warn!(
                    node_id = %finding.node_id(),
                    shard = ?finding.shard_id(),
                    "log validation warning: {}",
                    finding.message()
                ),
            }
        }

        Ok(LogValidationResult::new(findings, affected.len()))
    }

    /// One error per killed node (with a known cluster id) that no surviving
    /// node marked as failing after quorum.
    fn check_failure_detection(
        &self,
        topology: &[NodeInfo],
        killed: &HashSet<String>,
        logs: &LogSnapshot,
    ) -> Result<Vec<LogFinding>, ValidationError> {
        let mut findings = Vec::new();
        if killed.is_empty() {
            return Ok(findings);
        }

        let survivors: Vec<&NodeInfo> = topology
            .iter()
            .filter(|n| !killed.contains(&n.address()))
            .collect();

        let mut seen = HashSet::new();
        for node in topology {
            let address = node.address();
            if !killed.contains(&address) || !seen.insert(address.clone()) {
                continue;
            }
            let Some(cluster_id) = &node.cluster_node_id else {
                continue;
            };

            let marker = LogPatterns::quorum_failing(cluster_id)?;
            let detected = survivors
                .iter()
                .filter_map(|survivor| logs.tail(survivor, self.limits.detection))
                .any(|lines| lines.iter().any(|line| marker.is_match(line)));

            if !detected {
                findings.push(LogFinding::new(
                    node.node_id.clone(),
                    None,
                    FindingKind::DetectionMiss { address },
                    "",
                ));
            }
        }

        Ok(findings)
    }

    /// Check that a shard's failover completed and landed in the right shard.
    fn check_failover(
        &self,
        nodes: &[&NodeInfo],
        tokens: &ShardTokenMap,
        logs: &LogSnapshot,
    ) -> Vec<LogFinding> {
        let mut findings = Vec::new();

        // Failed elections are expected noise once any node in the shard was promoted.
        let shard_promoted = nodes.iter().any(|node| {
            logs.tail(node, self.limits.promotion)
                .is_some_and(|lines| self.patterns.has_promotion(lines))
        });

        for node in nodes {
            let Some(lines) = logs.tail(node, self.limits.promotion) else {
                continue;
            };

            if node.is_primary() {
                if !self.patterns.has_promotion(lines) {
                    findings.push(LogFinding::new(
                        node.node_id.clone(),
                        Some(node.shard_id),
                        FindingKind::PromotionMissing,
                        "",
                    ));
                } else if let Some((line, token)) = self.patterns.first_primary_claim(lines) {
                    if let Some(expected) = tokens.get(&token) {
                        if expected != node.shard_id {
                            findings.push(LogFinding::new(
                                node.node_id.clone(),
                                Some(node.shard_id),
                                FindingKind::WrongShard {
                                    expected,
                                    observed: node.shard_id,
                                },
                                line,
                            ));
                        }
                    }
                }
            }

            if !shard_promoted {
                if let Some(line) = self.patterns.first_failover_error(lines) {
                    findings.push(LogFinding::new(
                        node.node_id.clone(),
                        Some(node.shard_id),
                        FindingKind::FailoverError,
                        line,
                    ));
                }
            }

            if let Some(line) = self.patterns.first_replication_issue(lines) {
                findings.push(LogFinding::new(
                    node.node_id.clone(),
                    Some(node.shard_id),
                    FindingKind::ReplicationIssue,
                    line,
                ));
            }
        }

        findings
    }
}
