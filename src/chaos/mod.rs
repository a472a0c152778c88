pub mod injector;
pub mod ledger;
pub mod selector;

pub use injector::{
    Delivery, FaultInjector, InjectError, KilledNode, OsSignaler, ProcessSignaler, TerminationMode,
};
pub use ledger::{LedgerEntry, OperationLedger, SharedLedger};
pub use selector::{select, SelectError, SelectionPolicy, TargetScope};
