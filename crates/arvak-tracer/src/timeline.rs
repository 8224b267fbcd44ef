//! Per-qubit scheduling state.

use crate::error::{TraceError, TraceResult};
use crate::ids::{LayerId, OpId, QubitId, Time};

/// Scheduling state of a single qubit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QubitState {
    /// Last layer the qubit was scheduled into. Never moves backwards.
    pub layer: Option<LayerId>,
    /// Time at which the qubit becomes free again.
    pub last_used_time: Time,
    /// Zero-duration operations waiting for the qubit's next real layer.
    pub pending_zero_duration_ops: Vec<OpId>,
}

/// States of every qubit allocated in a session, indexed by handle.
///
/// Releasing a qubit does not drop its state; handles are never reused.
#[derive(Debug, Clone, Default)]
pub struct QubitTimeline {
    qubits: Vec<QubitState>,
}

impl QubitTimeline {
    /// Create an empty timeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh qubit that has never been scheduled.
    pub fn allocate(&mut self) -> QubitId {
        let qubit = QubitId::from(self.qubits.len());
        self.qubits.push(QubitState::default());
        qubit
    }

    /// Release a qubit. Its state stays available for reporting.
    pub fn release(&mut self, _qubit: QubitId) {}

    /// Number of qubits allocated so far.
    #[inline]
    pub fn len(&self) -> usize {
        self.qubits.len()
    }

    /// Whether no qubit has been allocated.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.qubits.is_empty()
    }

    /// State of an allocated qubit.
    pub fn get(&self, qubit: QubitId) -> TraceResult<&QubitState> {
        self.qubits
            .get(qubit.index())
            .ok_or(TraceError::QubitNotFound { qubit })
    }

    /// Mutable state of an allocated qubit.
    pub fn get_mut(&mut self, qubit: QubitId) -> TraceResult<&mut QubitState> {
        self.qubits
            .get_mut(qubit.index())
            .ok_or(TraceError::QubitNotFound { qubit })
    }

    /// Diagnostic description of a qubit's scheduling state.
    pub fn describe(&self, qubit: QubitId) -> TraceResult<String> {
        let state = self.get(qubit)?;
        let layer = state
            .layer
            .map_or_else(|| "none".to_string(), |l| l.to_string());
        Ok(format!(
            "{} last used in layer {} (pending zero ops: {})",
            qubit.index(),
            layer,
            state.pending_zero_duration_ops.len()
        ))
    }

    /// Total number of zero-duration operations still waiting on any qubit.
    pub fn pending_ops(&self) -> usize {
        self.qubits
            .iter()
            .map(|q| q.pending_zero_duration_ops.len())
            .sum()
    }
}
