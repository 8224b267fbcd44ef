//! The layering scheduler.
//!
//! A [`Tracer`] is one tracing session. It receives operations in program
//! order and assigns each of them to a layer of the [`LayerStore`]:
//!
//! - an operation never lands before the layer its qubits were last used in;
//! - it never lands at or before the effective fence, which is the later of
//!   the global barrier and the latest active conditional fence;
//! - within those bounds it is packed into the earliest layer with room left.
//!
//! Zero-duration operations on a qubit that has not been used yet (or not
//! since the current fence) are held back and committed together with the
//! next real operation on that qubit.

use std::collections::BTreeSet;
use std::io::Write;
use tracing::{debug, error, trace};

use crate::config::TracerConfig;
use crate::error::{TraceError, TraceResult};
use crate::fence::{FenceScope, FenceStack};
use crate::ids::{Duration, LayerId, OpId, QubitId, ResultHandle, Slot};
use crate::layer::LayerStore;
use crate::metrics::{LayerReport, MetricsReporter};
use crate::timeline::{QubitState, QubitTimeline};

/// A tracing session.
#[derive(Debug)]
pub struct Tracer {
    config: TracerConfig,
    qubits: QubitTimeline,
    layers: LayerStore,
    fences: FenceStack,
    /// Layer of the most recently injected global barrier.
    global_barrier: Option<LayerId>,
    /// Every operation id traced so far; fixes the report column order.
    seen_ops: BTreeSet<OpId>,
    /// Set once a trace call violated a contract.
    aborted: bool,
}

impl Tracer {
    /// Start a new session.
    pub fn new(config: TracerConfig) -> Self {
        let layers = LayerStore::new(config.preferred_layer_duration);
        Self {
            config,
            qubits: QubitTimeline::new(),
            layers,
            fences: FenceStack::new(),
            global_barrier: None,
            seen_ops: BTreeSet::new(),
            aborted: false,
        }
    }

    /// Start a new session without operation names.
    pub fn with_preferred_duration(preferred_layer_duration: Duration) -> Self {
        Self::new(TracerConfig::new(preferred_layer_duration))
    }

    /// Configuration the session was created with.
    pub fn config(&self) -> &TracerConfig {
        &self.config
    }

    /// Allocate a qubit.
    pub fn allocate_qubit(&mut self) -> QubitId {
        let qubit = self.qubits.allocate();
        trace!("Allocated qubit {}", qubit);
        qubit
    }

    /// Release a qubit. Scheduling state is kept; handles are not reused.
    pub fn release_qubit(&mut self, qubit: QubitId) {
        self.qubits.release(qubit);
    }

    /// Number of qubits allocated in this session.
    pub fn num_qubits(&self) -> usize {
        self.qubits.len()
    }

    /// Scheduling state of a qubit.
    pub fn qubit_state(&self, qubit: QubitId) -> TraceResult<&QubitState> {
        self.qubits.get(qubit)
    }

    /// Human-readable scheduling state of a qubit.
    pub fn qubit_to_string(&self, qubit: QubitId) -> TraceResult<String> {
        self.qubits.describe(qubit)
    }

    /// Constant `Zero` result. It was not measured, so it never fences.
    pub fn use_zero(&self) -> ResultHandle {
        ResultHandle::NONE
    }

    /// Constant `One` result. It was not measured, so it never fences.
    pub fn use_one(&self) -> ResultHandle {
        ResultHandle::NONE
    }

    /// Release a result. Results own no storage.
    pub fn release_result(&mut self, _result: ResultHandle) {}

    /// The layer store.
    pub fn layers(&self) -> &LayerStore {
        &self.layers
    }

    /// Operation ids traced so far, in ascending order.
    pub fn seen_ops(&self) -> &BTreeSet<OpId> {
        &self.seen_ops
    }

    /// Layer of the last injected global barrier.
    pub fn global_barrier(&self) -> Option<LayerId> {
        self.global_barrier
    }

    /// Latest fence among the active conditional scopes.
    pub fn latest_conditional_fence(&self) -> Option<LayerId> {
        self.fences.latest()
    }

    /// Number of active conditional scopes that carry a fence.
    pub fn fence_depth(&self) -> usize {
        self.fences.depth()
    }

    pub(crate) fn fences_mut(&mut self) -> &mut FenceStack {
        &mut self.fences
    }

    /// The earliest layer boundary every new operation must respect.
    pub fn effective_fence(&self) -> Option<LayerId> {
        self.global_barrier.max(self.fences.latest())
    }

    /// Zero-duration operations still waiting for a real operation on their
    /// qubit. They are not part of any layer and do not show up in metrics.
    pub fn pending_zero_duration_ops(&self) -> usize {
        self.qubits.pending_ops()
    }

    /// Whether an earlier contract violation aborted the session.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// Run `f` unless the session is aborted; abort it if `f` fails.
    fn checked<T>(&mut self, f: impl FnOnce(&mut Self) -> TraceResult<T>) -> TraceResult<T> {
        if self.aborted {
            return Err(TraceError::SessionAborted);
        }
        let result = f(self);
        if let Err(e) = &result {
            error!("Tracing session aborted: {}", e);
            self.aborted = true;
        }
        result
    }

    fn first_layer_after_barrier(&self) -> Slot {
        match self.effective_fence() {
            None if self.layers.is_empty() => Slot::RequestNew,
            None => Slot::Layer(LayerId(0)),
            Some(barrier) if barrier.index() + 1 == self.layers.len() => Slot::RequestNew,
            Some(barrier) => Slot::Layer(barrier.next()),
        }
    }

    /// Find the layer an operation of `duration` on `qubit` would go into.
    ///
    /// Returns [`Slot::RequestNew`] when no existing layer qualifies.
    pub fn find_layer(&self, qubit: QubitId, duration: Duration) -> TraceResult<Slot> {
        let state = self.qubits.get(qubit)?;

        let Slot::Layer(candidate) =
            Slot::from(state.layer).max(self.first_layer_after_barrier())
        else {
            return Ok(Slot::RequestNew);
        };

        let layer = self.layers.layer(candidate)?;
        let last_used = state.last_used_time.max(layer.start_time);
        let end = last_used
            .checked_add(duration)
            .ok_or(TraceError::TimeOverflow {
                time: last_used,
                duration,
            })?;
        if end <= layer.end_time() {
            return Ok(Slot::Layer(candidate));
        }

        // Later layers are only checked for capacity, which fills the slack
        // left in layers created for longer operations.
        Ok(self
            .layers
            .iter_from(candidate.next())
            .find(|(_, layer)| duration <= layer.duration)
            .map_or(Slot::RequestNew, |(id, _)| Slot::Layer(id)))
    }

    fn resolve(&mut self, slot: Slot, duration: Duration) -> TraceResult<LayerId> {
        match slot {
            Slot::Layer(layer) => Ok(layer),
            Slot::NoLayer | Slot::RequestNew => self.layers.create_layer(duration),
        }
    }

    fn commit_qubit(
        &mut self,
        qubit: QubitId,
        layer: LayerId,
        duration: Duration,
        flush_pending: bool,
    ) -> TraceResult<()> {
        let layer_start = self.layers.layer(layer)?.start_time;
        let state = self.qubits.get_mut(qubit)?;
        debug_assert!(state.layer <= Some(layer), "qubit time moved backwards");

        let busy_from = state.last_used_time.max(layer_start);
        let last_used_time =
            busy_from
                .checked_add(duration)
                .ok_or(TraceError::TimeOverflow {
                    time: busy_from,
                    duration,
                })?;

        let pending = if flush_pending {
            std::mem::take(&mut state.pending_zero_duration_ops)
        } else {
            Vec::new()
        };
        state.layer = Some(layer);
        state.last_used_time = last_used_time;

        for op in pending {
            self.layers.add_operation(layer, op)?;
        }
        Ok(())
    }

    /// Trace an operation on a single qubit.
    ///
    /// Returns the layer the operation was placed in, or `None` if it was a
    /// zero-duration operation that got deferred.
    pub fn trace_single_qubit_op(
        &mut self,
        op: OpId,
        duration: Duration,
        target: QubitId,
    ) -> TraceResult<Option<LayerId>> {
        self.checked(|t| t.trace_single(op, duration, target))
    }

    fn trace_single(
        &mut self,
        op: OpId,
        duration: Duration,
        target: QubitId,
    ) -> TraceResult<Option<LayerId>> {
        let fence = self.effective_fence();
        let state = self.qubits.get_mut(target)?;
        self.seen_ops.insert(op);

        if duration == 0 && defers_zero_duration(state.layer, fence) {
            state.pending_zero_duration_ops.push(op);
            trace!("Deferred zero-duration op {} on {}", op, target);
            return Ok(None);
        }

        let slot = self.find_layer(target, duration)?;
        let layer = self.resolve(slot, duration)?;
        self.layers.add_operation(layer, op)?;
        self.commit_qubit(target, layer, duration, true)?;

        trace!("Op {} on {} placed in layer {}", op, target, layer);
        Ok(Some(layer))
    }

    /// Trace an operation on several qubits.
    ///
    /// `first_group` holds controls and may be empty; `second_group` holds
    /// targets and must not be. A zero-duration operation on exactly one
    /// target and no controls is traced as a single-qubit operation and may
    /// therefore be deferred.
    pub fn trace_multi_qubit_op(
        &mut self,
        op: OpId,
        duration: Duration,
        first_group: &[QubitId],
        second_group: &[QubitId],
    ) -> TraceResult<Option<LayerId>> {
        self.checked(|t| t.trace_multi(op, duration, first_group, second_group))
    }

    fn trace_multi(
        &mut self,
        op: OpId,
        duration: Duration,
        first_group: &[QubitId],
        second_group: &[QubitId],
    ) -> TraceResult<Option<LayerId>> {
        if second_group.is_empty() {
            return Err(TraceError::EmptyTargetGroup { op });
        }
        // Deferring one operation across several qubit timelines is not
        // supported.
        if duration == 0 && first_group.is_empty() && second_group.len() == 1 {
            return self.trace_single(op, duration, second_group[0]);
        }
        for &qubit in first_group.iter().chain(second_group) {
            self.qubits.get(qubit)?;
        }

        self.seen_ops.insert(op);

        let mut slot = Slot::NoLayer;
        for &qubit in second_group.iter().chain(first_group) {
            slot = slot.max(self.find_layer(qubit, duration)?);
            if slot == Slot::RequestNew {
                break;
            }
        }

        let layer = self.resolve(slot, duration)?;
        self.layers.add_operation(layer, op)?;
        for &qubit in first_group.iter().chain(second_group) {
            self.commit_qubit(qubit, layer, duration, false)?;
        }

        trace!(
            "Op {} on {} qubit(s) placed in layer {}",
            op,
            first_group.len() + second_group.len(),
            layer
        );
        Ok(Some(layer))
    }

    /// Trace a measurement of one qubit.
    pub fn trace_single_qubit_measurement(
        &mut self,
        op: OpId,
        duration: Duration,
        target: QubitId,
    ) -> TraceResult<ResultHandle> {
        self.trace_single_qubit_op(op, duration, target)
            .map(ResultHandle::from_layer)
    }

    /// Trace a joint measurement of several qubits.
    pub fn trace_multi_qubit_measurement(
        &mut self,
        op: OpId,
        duration: Duration,
        targets: &[QubitId],
    ) -> TraceResult<ResultHandle> {
        self.trace_multi_qubit_op(op, duration, &[], targets)
            .map(ResultHandle::from_layer)
    }

    /// Append a barrier layer that every later operation must follow.
    ///
    /// The global barrier is replaced, not maximized with the previous one.
    pub fn inject_global_barrier(&mut self, op: OpId, duration: Duration) -> TraceResult<LayerId> {
        self.checked(|t| {
            let layer = t.layers.create_layer(duration)?;
            t.layers.mark_barrier(layer, op)?;
            t.global_barrier = Some(layer);
            debug!("Injected global barrier {} at layer {}", op, layer);
            Ok(layer)
        })
    }

    /// Enter a region conditioned on measurement results.
    ///
    /// The fence is the latest layer among the given results. Until the
    /// returned guard is dropped, no operation is placed at or before it.
    /// Results without a layer (constants, deferred measurements) are ignored;
    /// if none of them has one, the scope is a no-op.
    pub fn fence_scope(
        &mut self,
        results_a: &[ResultHandle],
        results_b: &[ResultHandle],
    ) -> TraceResult<FenceScope<'_>> {
        let fence = self.checked(|t| {
            let fence = results_a
                .iter()
                .chain(results_b)
                .filter_map(|r| r.layer())
                .max();
            if let Some(fence) = fence {
                if !t.layers.contains(fence) {
                    return Err(TraceError::LayerOutOfBounds {
                        layer: fence,
                        len: t.layers.len(),
                    });
                }
                t.fences.push(fence);
                debug!(
                    "Entered conditional scope fenced at layer {} (depth {})",
                    fence,
                    t.fences.depth()
                );
            }
            Ok(fence)
        })?;
        Ok(FenceScope::new(self, fence))
    }

    /// Run `body` inside a [`fence_scope`](Self::fence_scope).
    pub fn with_fence<R>(
        &mut self,
        results_a: &[ResultHandle],
        results_b: &[ResultHandle],
        body: impl FnOnce(&mut Tracer) -> TraceResult<R>,
    ) -> TraceResult<R> {
        let mut scope = self.fence_scope(results_a, results_b)?;
        body(&mut scope)
    }

    /// Reporter over the current layers.
    pub fn metrics(&self) -> MetricsReporter<'_> {
        MetricsReporter::new(&self.layers, &self.seen_ops, &self.config)
    }

    /// Write the layer metrics table.
    pub fn print_layer_metrics<W: Write + ?Sized>(
        &self,
        out: &mut W,
        separator: &str,
        print_zero_metrics: bool,
    ) -> TraceResult<()> {
        self.metrics()
            .write_table(out, separator, print_zero_metrics)
    }

    /// Serializable snapshot of the layer metrics.
    pub fn report(&self) -> LayerReport {
        self.metrics().report()
    }
}

/// Whether a zero-duration operation on a qubit last used in `layer` waits
/// for the qubit's next real operation.
fn defers_zero_duration(layer: Option<LayerId>, fence: Option<LayerId>) -> bool {
    match (layer, fence) {
        (None, _) => true,
        (Some(layer), Some(fence)) => layer < fence,
        (Some(_), None) => false,
    }
}
