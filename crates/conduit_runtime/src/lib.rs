//! CONDUIT Runtime
//!
//! Dependency-driven execution of compiled programs across a host worker
//! pool and device streams. Cross-stream edges are synchronized with
//! events; dead variables are collected while the run is in flight.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod event;
pub mod gc;
pub mod interpreter;
pub mod monitor;
pub mod scope;
pub mod standalone;
pub mod stream;
pub mod work_queue;

// Re-exports
pub use config::InterpreterConfig;
pub use error::{ExecutionError, RuntimeResult};
pub use event::{EventManager, EventState};
pub use gc::{GarbageCollector, GcMode};
pub use interpreter::{InterpreterCore, RunOutcome};
pub use monitor::{Metrics, RunMonitor, RunStats};
pub use scope::{Value, VariableScope};
pub use standalone::StandaloneExecutor;
pub use stream::{CrossEdge, EventSpec, StreamAnalyzer, StreamKind, StreamPlan};
pub use work_queue::{LaneId, Task, WorkQueue, WorkQueueBuilder};
