//! Chaos harness for sharded, replicated clusters.
//!
//! Kills selected nodes, then checks from the nodes' own logs that the
//! cluster detected the failures and failed over correctly.

pub mod chaos;
pub mod cluster;
pub mod config;
pub mod trace;
pub mod validator;

pub use cluster::{NodeInfo, Operation, OperationKind, Role, RunSnapshot, ShardId};
pub use validator::{LogFinding, LogValidationResult, ShardLogValidator};
