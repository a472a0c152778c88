//! Cluster Model.
//!
//! The topology snapshot and operation records the harness works against.
//! Everything here is owned by external collaborators (the topology provider
//! and the operation orchestrator) and treated as read-only by the checks.

pub mod snapshot;

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

pub use snapshot::{RunSnapshot, SnapshotError};

/// Harness-assigned shard number.
pub type ShardId = u32;

/// Role of a node within its shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Primary,
    Replica,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Primary => write!(f, "primary"),
            Role::Replica => write!(f, "replica"),
        }
    }
}

/// One cluster member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeInfo {
    /// Stable harness-assigned identifier.
    pub node_id: String,
    /// Host the node listens on.
    pub host: String,
    /// Client port; also one of the ways operations address the node.
    pub port: u16,
    /// Identifier assigned by the cluster software itself, once known.
    #[serde(default)]
    pub cluster_node_id: Option<String>,
    /// Harness shard grouping a primary with its replicas.
    pub shard_id: ShardId,
    /// Role assigned when the cluster was laid out.
    pub role: Role,
    /// Path to the node's append-only log.
    pub log_file: PathBuf,
    /// OS process id of the running server, if the harness spawned it.
    #[serde(default)]
    pub pid: Option<u32>,
}

impl NodeInfo {
    /// The `host:port` address used to identify killed nodes.
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether the node was laid out as its shard's primary.
    pub fn is_primary(&self) -> bool {
        self.role == Role::Primary
    }
}

/// Kind of an explicitly issued test operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Manual failover request.
    Failover,
    /// Any other orchestrated action; these only mark shards as affected.
    #[serde(other)]
    Other,
}

/// One explicitly issued test action, as recorded by the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Operation {
    /// What the operation does.
    #[serde(rename = "type")]
    pub kind: OperationKind,
    /// A `shard-<id>-<role>` token, a node id, a port, or a cluster node id.
    pub target_node: String,
}

impl Operation {
    pub fn new(kind: OperationKind, target_node: impl Into<String>) -> Self {
        Operation {
            kind,
            target_node: target_node.into(),
        }
    }

    /// Explicit failovers are what force a shard's failover check.
    pub fn is_failover(&self) -> bool {
        self.kind == OperationKind::Failover
    }
}
