//! Token propagation for BPMN-style process graphs.
//!
//! Sequence flows are taken or discarded, gateways join and fork on those
//! signals, and any instance can be captured as a `ProcessState` mid-run and
//! resumed against a freshly compiled graph.

pub mod actions;
pub mod compiler;
pub mod dsl;
pub mod error;
pub mod runtime;

pub use error::{FlowError, Result};
pub use runtime::listener::{Event, EventKind, EventLog, Listener};
pub use runtime::process::ProcessInstance;
pub use runtime::state::{ProcessState, StateSnapshot};
