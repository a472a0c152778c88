//! Cluster shard token reconciliation.
//!
//! The cluster names its shards with 40-character hex tokens that it may
//! reassign between runs. The table here maps those tokens to harness shard
//! ids for a single validation snapshot and is rebuilt every run.

use std::collections::hash_map::Entry;
use std::collections::HashMap;

use tracing::debug;

use super::patterns::LogPatterns;
use super::tail::LogSnapshot;
use crate::cluster::{NodeInfo, ShardId};

#[derive(Debug, Default, Clone)]
pub struct ShardTokenMap {
    tokens: HashMap<String, ShardId>,
}

impl ShardTokenMap {
    /// Map every node's first shard formation token to the node's shard.
    ///
    /// When nodes of different harness shards report the same token, the
    /// node earliest in topology order keeps it.
    pub fn build(
        nodes: &[NodeInfo],
        logs: &LogSnapshot,
        patterns: &LogPatterns,
        tail_lines: usize,
    ) -> Self {
        let mut tokens = HashMap::new();

        for node in nodes {
            let Some(lines) = logs.tail(node, tail_lines) else {
                continue;
            };
            let Some(token) = patterns.first_shard_formation(lines) else {
                continue;
            };
            match tokens.entry(token) {
                Entry::Vacant(slot) => {
                    slot.insert(node.shard_id);
                }
                Entry::Occupied(existing) if *existing.get() != node.shard_id => {
                    debug!(
                        token = %existing.key(),
                        kept = *existing.get(),
                        ignored = node.shard_id,
                        node_id = %node.node_id,
                        "cluster shard token reported by nodes of different shards"
                    );
                }
                Entry::Occupied(_) => {}
            }
        }

        ShardTokenMap { tokens }
    }

    /// Harness shard for a cluster shard token.
    pub fn get(&self, token: &str) -> Option<ShardId> {
        self.tokens.get(&token.to_ascii_lowercase()).copied()
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}
