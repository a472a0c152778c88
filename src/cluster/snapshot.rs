//! Run snapshot loading.
//!
//! A run file bundles everything one validation pass needs: the topology,
//! the operation ledger, the killed addresses and the primary-killed hint.

use std::collections::{BTreeSet, HashSet};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{NodeInfo, Operation, ShardId};

/// Errors loading a topology or run file.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Inputs of a single validation pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub topology: Vec<NodeInfo>,
    #[serde(default)]
    pub operations: Vec<Operation>,
    /// `host:port` of every node killed by chaos.
    #[serde(default)]
    pub killed_nodes: HashSet<String>,
    /// Shards whose primary was among the killed nodes.
    #[serde(default)]
    pub shards_with_primary_killed: BTreeSet<ShardId>,
}

impl RunSnapshot {
    /// Load a run file.
    pub fn load(path: &Path) -> Result<Self, SnapshotError> {
        read_json(path)
    }
}

/// Load a bare topology file (a JSON array of nodes).
pub fn load_topology(path: &Path) -> Result<Vec<NodeInfo>, SnapshotError> {
    read_json(path)
}

fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T, SnapshotError> {
    let raw = fs::read_to_string(path).map_err(|source| SnapshotError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&raw).map_err(|source| SnapshotError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
