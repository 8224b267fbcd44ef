//! Error types for the tracer crate.
//!
//! Every [`TraceError`] is a contract violation in the instruction stream. The
//! tracer does not recover from them: once a trace call fails, the session
//! refuses further work with [`TraceError::SessionAborted`].

use thiserror::Error;

use crate::ids::{Duration, LayerId, OpId, QubitId, Time};

/// Errors raised by the scheduler core.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum TraceError {
    /// Qubit handle was never allocated in this session.
    #[error("Qubit {qubit} is not allocated in this session")]
    QubitNotFound {
        /// The unknown qubit.
        qubit: QubitId,
    },

    /// Layer index outside of the layer store.
    #[error("Layer {layer} is out of bounds (store holds {len} layers)")]
    LayerOutOfBounds {
        /// The offending layer index.
        layer: LayerId,
        /// Number of layers in the store.
        len: usize,
    },

    /// Attempt to add an operation to a barrier layer.
    #[error("Cannot add operation {op} to barrier layer {layer}")]
    BarrierLayerWrite {
        /// The barrier layer.
        layer: LayerId,
        /// The operation that was rejected.
        op: OpId,
    },

    /// Multi-qubit operation without any target qubit.
    #[error("Multi-qubit operation {op} has an empty target group")]
    EmptyTargetGroup {
        /// The operation.
        op: OpId,
    },

    /// Scheduling an operation would move trace time past `Time::MAX`.
    #[error("Trace time overflow: {time} + {duration} exceeds the representable range")]
    TimeOverflow {
        /// Time the duration was added to.
        time: Time,
        /// The duration that did not fit.
        duration: Duration,
    },

    /// The session already failed and accepts no further operations.
    #[error("Tracing session aborted after an earlier contract violation")]
    SessionAborted,

    /// Configuration could not be loaded.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Writing a report failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// Serializing a report failed.
    #[error("Export error: {0}")]
    Export(String),
}

impl From<std::io::Error> for TraceError {
    fn from(e: std::io::Error) -> Self {
        TraceError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(e: serde_json::Error) -> Self {
        TraceError::Export(e.to_string())
    }
}

/// Result type for tracer operations.
pub type TraceResult<T> = Result<T, TraceError>;

/// Violations of the single-owner reference counting contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum AllocationError {
    /// An object was allocated while a live object with the same identity exists.
    #[error("Allocating an object over an existing object: {object}")]
    DoubleAllocation {
        /// Debug rendering of the object identity.
        object: String,
    },

    /// A reference was added to an object that was never allocated.
    #[error("Attempting to addref an object that isn't tracked: {object}")]
    UntrackedAddRef {
        /// Debug rendering of the object identity.
        object: String,
    },

    /// A reference was added to an object whose count already dropped to zero.
    #[error("Attempting to resurrect a previously released object: {object}")]
    Resurrection {
        /// Debug rendering of the object identity.
        object: String,
    },

    /// An object that was never allocated was released.
    #[error("Attempting to release an object that isn't tracked: {object}")]
    UntrackedRelease {
        /// Debug rendering of the object identity.
        object: String,
    },

    /// An object was released after its count already dropped to zero.
    #[error("Attempting to release a previously released object: {object}")]
    DoubleRelease {
        /// Debug rendering of the object identity.
        object: String,
    },

    /// Objects still hold references at shutdown.
    #[error("Found {count} potentially leaked object(s)")]
    Leak {
        /// Number of objects with a nonzero count.
        count: usize,
    },
}

/// Result type for allocation tracking.
pub type AllocationResult<T> = Result<T, AllocationError>;

/// Errors raised while loading or replaying a trace program.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ProgramError {
    /// The tracer rejected an instruction.
    #[error(transparent)]
    Trace(#[from] TraceError),

    /// The allocation tracker detected a lifecycle violation.
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    /// Instruction refers to a qubit the program never allocated.
    #[error("Instruction references qubit #{index}, but only {allocated} qubit(s) were allocated")]
    UnknownQubit {
        /// Program-local qubit index.
        index: u32,
        /// Number of qubits allocated so far.
        allocated: usize,
    },

    /// Instruction refers to a measurement result that does not exist yet.
    #[error("Instruction references result #{index}, but only {measured} measurement(s) were traced")]
    UnknownResult {
        /// Program-local result index.
        index: u32,
        /// Number of measurements traced so far.
        measured: usize,
    },

    /// Program text could not be parsed.
    #[error("Parse error: {0}")]
    Parse(String),

    /// Program file could not be read.
    #[error("I/O error: {0}")]
    Io(String),
}

impl From<serde_json::Error> for ProgramError {
    fn from(e: serde_json::Error) -> Self {
        ProgramError::Parse(e.to_string())
    }
}

impl From<serde_yaml_ng::Error> for ProgramError {
    fn from(e: serde_yaml_ng::Error) -> Self {
        ProgramError::Parse(e.to_string())
    }
}

/// Result type for program loading and replay.
pub type ProgramResult<T> = Result<T, ProgramError>;
