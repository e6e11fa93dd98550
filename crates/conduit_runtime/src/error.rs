//! Run-level error taxonomy.

use conduit_core::{CoreError, EventId, InstrId, KernelError};
use conduit_program::ProgramError;

/// Runtime result type
pub type RuntimeResult<T> = Result<T, ExecutionError>;

/// Errors surfaced by a run.
///
/// A failed run leaves the compiled program and the interpreter reusable;
/// the next run starts from a clean variable scope.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ExecutionError {
    /// A kernel returned an error
    #[error("{instruction} ({op}) failed: {source}")]
    KernelExecution {
        /// Failing instruction
        instruction: InstrId,
        /// Operator name
        op: String,
        /// Kernel error
        source: KernelError,
    },

    /// An input was never produced before it was read
    #[error("{instruction} reads `{variable}` which was never produced")]
    DependencyViolation {
        /// Reading instruction
        instruction: InstrId,
        /// Variable name
        variable: String,
    },

    /// The storage collaborator refused an allocation
    #[error("cannot allocate {requested} bytes for `{variable}` ({available} available)")]
    ResourceExhaustion {
        /// Variable being written
        variable: String,
        /// Requested bytes
        requested: u64,
        /// Bytes still available
        available: u64,
    },

    /// A cross-stream wait exceeded the configured budget
    #[error("{instruction} timed out after {waited_ms}ms waiting on {event}")]
    SynchronizationTimeout {
        /// Waiting instruction
        instruction: InstrId,
        /// Event waited on
        event: EventId,
        /// Time spent waiting
        waited_ms: u64,
    },

    /// Work abandoned because the run was aborted
    #[error("run cancelled")]
    Cancelled,

    /// A declared feed was not supplied
    #[error("feed `{name}` was not supplied")]
    MissingFeed {
        /// Variable name
        name: String,
    },

    /// A supplied feed is not declared by the program
    #[error("`{name}` is not a feed of this program")]
    UnknownFeed {
        /// Variable name
        name: String,
    },

    /// A fetch variable holds no value at the end of the run
    #[error("fetch `{name}` holds no value")]
    MissingFetch {
        /// Variable name
        name: String,
    },

    /// Fewer instructions ran than the program holds
    #[error("run finished after {executed} of {total} instructions")]
    Incomplete {
        /// Instructions executed
        executed: usize,
        /// Instructions in the program
        total: usize,
    },

    /// A worker task panicked
    #[error("worker on lane `{lane}` panicked: {message}")]
    WorkerPanic {
        /// Lane name
        lane: String,
        /// Panic payload, if it was a string
        message: String,
    },

    /// A worker thread could not be started
    #[error("cannot start worker for lane `{lane}`: {reason}")]
    WorkerSpawn {
        /// Lane name
        lane: String,
        /// OS error
        reason: String,
    },

    /// Configuration rejected
    #[error("invalid configuration: {reason}")]
    InvalidConfig {
        /// Why
        reason: String,
    },

    /// Program construction or analysis failed
    #[error(transparent)]
    Program(#[from] ProgramError),

    /// Storage or other core failure
    #[error(transparent)]
    Core(#[from] CoreError),
}

impl ExecutionError {
    /// Instruction the error is attributed to, if any
    #[must_use]
    pub fn instruction(&self) -> Option<InstrId> {
        match self {
            Self::KernelExecution { instruction, .. }
            | Self::DependencyViolation { instruction, .. }
            | Self::SynchronizationTimeout { instruction, .. } => Some(*instruction),
            _ => None,
        }
    }

    /// Whether this is a secondary error caused by an earlier abort
    #[must_use]
    pub const fn is_cancellation(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}
