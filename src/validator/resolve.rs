//! Target resolution.
//!
//! Operations name their target in one of several addressing schemes. A
//! `shard-<id>-<role>` token names a shard directly; anything else is looked
//! up as a node id, then a port, then a cluster node id.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::cluster::{NodeInfo, Operation, ShardId};

/// Addressing schemes for a single node, in resolution priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressKind {
    NodeId,
    Port,
    ClusterNodeId,
}

/// First successful lookup wins.
pub const RESOLUTION_ORDER: [AddressKind; 3] =
    [AddressKind::NodeId, AddressKind::Port, AddressKind::ClusterNodeId];

const SHARD_PATTERN_MARKER: &str = "shard-";

/// Parse a `shard-<id>-<role>` token.
///
/// Returns `None` for malformed tokens (too few parts, wrong prefix,
/// non-numeric id).
pub fn parse_shard_pattern(target: &str) -> Option<ShardId> {
    let parts: Vec<&str> = target.split('-').collect();
    if parts.len() < 3 || parts[0] != "shard" {
        return None;
    }
    parts[1].parse().ok()
}

/// Lookup tables from every addressing scheme to the harness shard.
#[derive(Debug, Default)]
pub struct ShardResolver {
    by_node_id: HashMap<String, ShardId>,
    by_port: HashMap<String, ShardId>,
    by_cluster_node_id: HashMap<String, ShardId>,
}

impl ShardResolver {
    pub fn new(topology: &[NodeInfo]) -> Self {
        let mut resolver = ShardResolver::default();
        for node in topology {
            resolver
                .by_node_id
                .insert(node.node_id.clone(), node.shard_id);
            resolver
                .by_port
                .insert(node.port.to_string(), node.shard_id);
            if let Some(cluster_id) = &node.cluster_node_id {
                resolver
                    .by_cluster_node_id
                    .insert(cluster_id.clone(), node.shard_id);
            }
        }
        resolver
    }

    /// Look a target up in a single addressing scheme.
    pub fn lookup(&self, kind: AddressKind, target: &str) -> Option<ShardId> {
        let table = match kind {
            AddressKind::NodeId => &self.by_node_id,
            AddressKind::Port => &self.by_port,
            AddressKind::ClusterNodeId => &self.by_cluster_node_id,
        };
        table.get(target).copied()
    }

    /// Resolve an operation target to a shard.
    ///
    /// Shard-pattern tokens never fall back to the node lookups, even when
    /// malformed.
    pub fn resolve(&self, target: &str) -> Option<ShardId> {
        if target.contains(SHARD_PATTERN_MARKER) {
            return parse_shard_pattern(target);
        }
        RESOLUTION_ORDER
            .iter()
            .find_map(|&kind| self.lookup(kind, target))
    }

    /// Union of shards targeted by operations and shards that lost a node to chaos.
    pub fn affected_shards(
        &self,
        operations: &[Operation],
        killed: &HashSet<String>,
        topology: &[NodeInfo],
    ) -> BTreeSet<ShardId> {
        let mut affected: BTreeSet<ShardId> = operations
            .iter()
            .filter_map(|op| self.resolve(&op.target_node))
            .collect();

        affected.extend(
            topology
                .iter()
                .filter(|node| killed.contains(&node.address()))
                .map(|node| node.shard_id),
        );

        affected
    }

    /// Whether any explicit failover operation targeted `shard`.
    pub fn had_failover(&self, shard: ShardId, operations: &[Operation]) -> bool {
        operations
            .iter()
            .filter(|op| op.is_failover())
            .any(|op| self.resolve(&op.target_node) == Some(shard))
    }
}
