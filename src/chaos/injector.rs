//! Fault Injector.
//!
//! Terminates node processes with SIGKILL (abrupt) or SIGTERM (graceful) and
//! records each kill with its wall-clock time. The recorded addresses are
//! what the log validator later treats as killed.

use std::collections::{BTreeSet, HashSet};
use std::io;
use std::sync::{Condvar, Mutex};
use std::thread;
use std::time::SystemTime;

use crossbeam_channel::unbounded;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::cluster::{NodeInfo, Role, ShardId};

/// How a node is terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TerminationMode {
    /// SIGKILL: no chance to flush or hand over.
    Abrupt,
    /// SIGTERM: the server may shut down cleanly.
    Graceful,
}

impl TerminationMode {
    /// The signal number delivered for this mode.
    pub fn signal(self) -> libc::c_int {
        match self {
            TerminationMode::Abrupt => libc::SIGKILL,
            TerminationMode::Graceful => libc::SIGTERM,
        }
    }

    /// Name used in logs and error messages.
    pub fn signal_name(self) -> &'static str {
        match self {
            TerminationMode::Abrupt => "SIGKILL",
            TerminationMode::Graceful => "SIGTERM",
        }
    }
}

/// Outcome of a single signal delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Delivery {
    /// The signal reached a live process.
    Delivered,
    /// The process no longer existed.
    AlreadyDead,
}

/// Delivers termination signals to processes.
pub trait ProcessSignaler: Send + Sync {
    /// Send the signal for `mode` to `pid`. A missing process is
    /// `Delivery::AlreadyDead`, not an error.
    fn deliver(&self, pid: u32, mode: TerminationMode) -> io::Result<Delivery>;
}

/// Signals real processes with `kill(2)`.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignaler;

impl ProcessSignaler for OsSignaler {
    fn deliver(&self, pid: u32, mode: TerminationMode) -> io::Result<Delivery> {
        // 0 and negative pids address process groups; never allow those.
        let pid = libc::pid_t::try_from(pid)
            .ok()
            .filter(|pid| *pid > 0)
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("invalid pid {}", pid)))?;

        let rc = unsafe { libc::kill(pid, mode.signal()) };
        if rc == 0 {
            return Ok(Delivery::Delivered);
        }

        let err = io::Error::last_os_error();
        if err.raw_os_error() == Some(libc::ESRCH) {
            Ok(Delivery::AlreadyDead)
        } else {
            Err(err)
        }
    }
}

/// Record of one killed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KilledNode {
    /// Harness identifier of the killed node.
    pub node_id: String,
    /// `host:port`, the key the validator uses.
    pub address: String,
    /// Harness shard the node belonged to.
    pub shard_id: ShardId,
    /// Role at the time of the kill; primary kills feed the validator's hint.
    pub role: Role,
    /// Signal used.
    pub mode: TerminationMode,
    /// Whether the process was alive to receive it.
    pub delivery: Delivery,
    /// When the signal was delivered (or the process found dead).
    pub killed_at: SystemTime,
}

impl KilledNode {
    fn new(node: &NodeInfo, mode: TerminationMode, delivery: Delivery) -> Self {
        KilledNode {
            node_id: node.node_id.clone(),
            address: node.address(),
            shard_id: node.shard_id,
            role: node.role,
            mode,
            delivery,
            killed_at: SystemTime::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum InjectError {
    /// The node has no pid to signal.
    #[error("node {node_id} has no process handle")]
    NoProcessHandle { node_id: String },

    /// The OS refused the signal (e.g. EPERM); nothing was recorded.
    #[error("failed to deliver {signal} to node {node_id} (pid {pid}): {source}")]
    Signal {
        node_id: String,
        pid: u32,
        signal: &'static str,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Default)]
struct InjectorState {
    /// Kills in the order they happened.
    records: Vec<KilledNode>,
    /// Addresses with a delivery currently in progress.
    in_flight: HashSet<String>,
}

/// The fault injector.
pub struct FaultInjector<S: ProcessSignaler = OsSignaler> {
    signaler: S,
    state: Mutex<InjectorState>,
    /// Notified whenever an in-flight delivery finishes, successful or not.
    settled: Condvar,
}

impl FaultInjector<OsSignaler> {
    /// Injector that signals real processes.
    pub fn new() -> Self {
        FaultInjector::with_signaler(OsSignaler)
    }
}

impl Default for FaultInjector<OsSignaler> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S: ProcessSignaler> FaultInjector<S> {
    /// Injector delivering through `signaler`.
    pub fn with_signaler(signaler: S) -> Self {
        FaultInjector {
            signaler,
            state: Mutex::new(InjectorState::default()),
            settled: Condvar::new(),
        }
    }

    /// The signaler in use.
    pub fn signaler(&self) -> &S {
        &self.signaler
    }

    /// Terminate `target`.
    ///
    /// A target this injector already killed is not signalled again; the
    /// existing record is returned. A process the OS no longer knows is
    /// recorded as already dead.
    ///
    /// If another thread is signalling the same address, this call waits
    /// for it. A successful delivery there returns that record; a failed
    /// one leaves the target unkilled and this call delivers on its own.
    pub fn inject(&self, target: &NodeInfo, mode: TerminationMode) -> Result<KilledNode, InjectError> {
        let address = target.address();
        let mut state = self.state.lock().unwrap();
        loop {
            if let Some(existing) = state.records.iter().find(|r| r.address == address) {
                debug!(node_id = %target.node_id, %address, "target already killed");
                return Ok(existing.clone());
            }
            if !state.in_flight.contains(&address) {
                break;
            }
            debug!(node_id = %target.node_id, %address, "waiting for kill in progress");
            state = self.settled.wait(state).unwrap();
        }
        let pid = target.pid.ok_or_else(|| InjectError::NoProcessHandle {
            node_id: target.node_id.clone(),
        })?;
        state.in_flight.insert(address.clone());
        drop(state);

        let delivery = self.signaler.deliver(pid, mode);

        let mut state = self.state.lock().unwrap();
        state.in_flight.remove(&address);
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(source) => {
                drop(state);
                self.settled.notify_all();
                return Err(InjectError::Signal {
                    node_id: target.node_id.clone(),
                    pid,
                    signal: mode.signal_name(),
                    source,
                });
            }
        };

        let record = KilledNode::new(target, mode, delivery);
        match delivery {
            Delivery::Delivered => info!(
                node_id = %record.node_id,
                address = %record.address,
                shard = record.shard_id,
                role = %record.role,
                signal = mode.signal_name(),
                "killed node"
            ),
            Delivery::AlreadyDead => warn!(
                node_id = %record.node_id,
                address = %record.address,
                "node process was already gone"
            ),
        }
        state.records.push(record.clone());
        drop(state);
        self.settled.notify_all();
        Ok(record)
    }

    /// Terminate several targets in parallel. Results follow `targets` order.
    pub fn inject_all(
        &self,
        targets: &[&NodeInfo],
        mode: TerminationMode,
    ) -> Vec<Result<KilledNode, InjectError>> {
        let (tx, rx) = unbounded();

        thread::scope(|scope| {
            for (index, target) in targets.iter().enumerate() {
                let tx = tx.clone();
                scope.spawn(move || {
                    let _ = tx.send((index, self.inject(target, mode)));
                });
            }
        });
        drop(tx);

        let mut results: Vec<_> = rx.iter().collect();
        results.sort_by_key(|(index, _)| *index);
        results.into_iter().map(|(_, result)| result).collect()
    }

    /// All kills so far, in order.
    pub fn records(&self) -> Vec<KilledNode> {
        self.state.lock().unwrap().records.clone()
    }

    /// `host:port` of every killed node.
    pub fn killed_addresses(&self) -> HashSet<String> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .map(|r| r.address.clone())
            .collect()
    }

    /// Shards whose primary was killed.
    pub fn shards_with_primary_killed(&self) -> BTreeSet<ShardId> {
        self.state
            .lock()
            .unwrap()
            .records
            .iter()
            .filter(|r| r.role == Role::Primary)
            .map(|r| r.shard_id)
            .collect()
    }
}
