//! Arvak Circuit-Layering Tracer
//!
//! This crate schedules a stream of quantum operations into a sequence of
//! time layers and reports how many operations of each kind every layer holds.
//! It does not simulate anything: operations only carry an opaque id and a
//! nominal duration.
//!
//! # Overview
//!
//! A [`Tracer`] receives operations in program order. Each operation is packed
//! into the earliest layer that its qubits have reached and that still has
//! room, subject to two kinds of ordering constraints:
//!
//! - a **global barrier** forces every later operation into later layers;
//! - a **conditional fence** keeps operations that depend on measurement
//!   results behind the layers those measurements landed in.
//!
//! Layers are contiguous in time. Every layer lasts at least the preferred
//! layer duration, longer if the operation that created it needs more.
//!
//! # Core Components
//!
//! - **Identifiers**: [`QubitId`], [`OpId`], [`LayerId`] and [`ResultHandle`]
//! - **Scheduler**: [`Tracer`], with [`FenceScope`] guards for conditional regions
//! - **Storage**: [`LayerStore`] and [`QubitTimeline`]
//! - **Reporting**: [`MetricsReporter`] tables and [`LayerReport`] JSON snapshots
//! - **Replay**: [`TraceProgram`] instruction streams fed by a [`Replayer`]
//! - **Lifecycle checks**: [`AllocationsTracker`] for reference-counted objects
//!
//! # Example: Layer Metrics
//!
//! ```rust
//! use arvak_tracer::{LayerId, OpId, Tracer, TracerConfig};
//!
//! let mut tracer = Tracer::new(TracerConfig::new(10));
//! let q0 = tracer.allocate_qubit();
//!
//! // Two 4-tick operations fit into the first 10-tick layer, the third does not.
//! assert_eq!(tracer.trace_single_qubit_op(OpId(1), 4, q0).unwrap(), Some(LayerId(0)));
//! assert_eq!(tracer.trace_single_qubit_op(OpId(1), 4, q0).unwrap(), Some(LayerId(0)));
//! assert_eq!(tracer.trace_single_qubit_op(OpId(1), 4, q0).unwrap(), Some(LayerId(1)));
//!
//! let mut out = Vec::new();
//! tracer.print_layer_metrics(&mut out, ",", true).unwrap();
//! assert_eq!(String::from_utf8(out).unwrap(), "layer_id,name,1\n0,,2\n10,,1\n");
//! ```
//!
//! # Example: Conditional Fence
//!
//! ```rust
//! use arvak_tracer::{OpId, Tracer};
//!
//! let mut tracer = Tracer::with_preferred_duration(10);
//! let q0 = tracer.allocate_qubit();
//! let q1 = tracer.allocate_qubit();
//!
//! let m = tracer.trace_single_qubit_measurement(OpId(3), 10, q0).unwrap();
//! {
//!     let mut scope = tracer.fence_scope(&[m], &[]).unwrap();
//!     let layer = scope.trace_single_qubit_op(OpId(1), 1, q1).unwrap().unwrap();
//!     assert!(Some(layer) > m.layer());
//! }
//! assert_eq!(tracer.effective_fence(), None);
//! ```

pub mod allocations;
pub mod config;
pub mod error;
pub mod fence;
pub mod ids;
pub mod layer;
pub mod metrics;
pub mod program;
pub mod timeline;
pub mod tracer;

pub use allocations::AllocationsTracker;
pub use config::{ENV_PREFERRED_DURATION, TracerConfig};
pub use error::{
    AllocationError, AllocationResult, ProgramError, ProgramResult, TraceError, TraceResult,
};
pub use fence::{FenceScope, FenceStack};
pub use ids::{Duration, LayerId, OpId, QubitId, ResultHandle, Slot, Time};
pub use layer::{Layer, LayerStore};
pub use metrics::{LayerReport, MetricsReporter, OperationColumn};
pub use program::{Instruction, ReplayStats, Replayer, TraceProgram};
pub use timeline::{QubitState, QubitTimeline};
pub use tracer::Tracer;
