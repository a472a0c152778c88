//! Target Selector.
//!
//! Picks which nodes to kill. Selection is a pure function of the topology,
//! the policy and the caller's RNG, so a seeded RNG replays the same targets.

use std::collections::HashSet;
use std::fmt;

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

use crate::cluster::{NodeInfo, Role, ShardId};

/// Which nodes are eligible.
#[derive(Debug, Clone, PartialEq)]
pub enum TargetScope {
    /// Any node in the topology.
    Any,
    /// Only nodes with this role.
    Role(Role),
    /// Any node of one shard.
    Shard(ShardId),
    /// The primary of one shard.
    PrimaryOf(ShardId),
    /// Any node, weighting each pick by role.
    WeightedByRole { primary: f64, replica: f64 },
}

impl TargetScope {
    fn admits(&self, node: &NodeInfo) -> bool {
        match self {
            TargetScope::Any | TargetScope::WeightedByRole { .. } => true,
            TargetScope::Role(role) => node.role == *role,
            TargetScope::Shard(shard) => node.shard_id == *shard,
            TargetScope::PrimaryOf(shard) => node.shard_id == *shard && node.is_primary(),
        }
    }
}

impl fmt::Display for TargetScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetScope::Any => write!(f, "any node"),
            TargetScope::Role(role) => write!(f, "role {}", role),
            TargetScope::Shard(shard) => write!(f, "shard {}", shard),
            TargetScope::PrimaryOf(shard) => write!(f, "primary of shard {}", shard),
            TargetScope::WeightedByRole { primary, replica } => {
                write!(f, "weighted (primary={}, replica={})", primary, replica)
            }
        }
    }
}

/// Selection policy.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectionPolicy {
    pub scope: TargetScope,
    /// Node ids that must never be picked (e.g. already killed).
    pub exclude: HashSet<String>,
    /// Maximum number of distinct nodes to pick.
    pub count: usize,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy {
            scope: TargetScope::Any,
            exclude: HashSet::new(),
            count: 1,
        }
    }
}

impl SelectionPolicy {
    /// Pick one node from `scope`, excluding nothing.
    pub fn new(scope: TargetScope) -> Self {
        SelectionPolicy {
            scope,
            ..SelectionPolicy::default()
        }
    }

    /// Pick up to `count` distinct nodes.
    pub fn with_count(mut self, count: usize) -> Self {
        self.count = count;
        self
    }

    /// Never pick any of `node_ids`.
    pub fn excluding<I, S>(mut self, node_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exclude.extend(node_ids.into_iter().map(Into::into));
        self
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum SelectError {
    #[error("no eligible targets for {scope}")]
    NoCandidates { scope: String },

    #[error("role weights must be finite, non-negative and not all zero")]
    InvalidWeights,
}

/// Select up to `policy.count` distinct nodes from `topology`.
pub fn select<'a, R: Rng + ?Sized>(
    topology: &'a [NodeInfo],
    policy: &SelectionPolicy,
    rng: &mut R,
) -> Result<Vec<&'a NodeInfo>, SelectError> {
    let mut candidates: Vec<&NodeInfo> = topology
        .iter()
        .filter(|node| policy.scope.admits(node))
        .filter(|node| !policy.exclude.contains(&node.node_id))
        .collect();

    if candidates.is_empty() {
        return Err(SelectError::NoCandidates {
            scope: policy.scope.to_string(),
        });
    }

    match policy.scope {
        TargetScope::WeightedByRole { primary, replica } => {
            weighted_picks(candidates, primary, replica, policy.count, rng)
        }
        _ => {
            candidates.shuffle(rng);
            candidates.truncate(policy.count);
            Ok(candidates)
        }
    }
}

/// Draw picks one at a time without replacement, each weighted by role.
fn weighted_picks<'a, R: Rng + ?Sized>(
    mut candidates: Vec<&'a NodeInfo>,
    primary: f64,
    replica: f64,
    count: usize,
    rng: &mut R,
) -> Result<Vec<&'a NodeInfo>, SelectError> {
    let valid = |w: f64| w.is_finite() && w >= 0.0;
    if !valid(primary) || !valid(replica) || primary + replica <= 0.0 {
        return Err(SelectError::InvalidWeights);
    }
    let weight = |node: &NodeInfo| match node.role {
        Role::Primary => primary,
        Role::Replica => replica,
    };

    let mut picks = Vec::with_capacity(count.min(candidates.len()));
    while picks.len() < count {
        let total: f64 = candidates.iter().map(|n| weight(*n)).sum();
        if total <= 0.0 {
            break;
        }

        let mut r = rng.gen::<f64>() * total;
        let mut chosen = candidates
            .iter()
            .rposition(|n| weight(*n) > 0.0)
            .unwrap_or(0);
        for (i, node) in candidates.iter().enumerate() {
            let w = weight(*node);
            if w > 0.0 && r < w {
                chosen = i;
                break;
            }
            r -= w;
        }
        picks.push(candidates.remove(chosen));
    }

    Ok(picks)
}
