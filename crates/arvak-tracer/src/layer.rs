//! Append-only store of scheduling layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

use crate::error::{TraceError, TraceResult};
use crate::ids::{Duration, LayerId, OpId, Time};

/// A contiguous time slot holding operations that may execute together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Layer {
    /// Sum of the durations of all preceding layers.
    pub start_time: Time,
    /// Length of the slot.
    pub duration: Duration,
    /// Operation id of the barrier that created this layer, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub barrier: Option<OpId>,
    /// Number of occurrences of each operation in this layer.
    #[serde(default)]
    pub operations: BTreeMap<OpId, u64>,
}

impl Layer {
    fn new(start_time: Time, duration: Duration) -> Self {
        Self {
            start_time,
            duration,
            barrier: None,
            operations: BTreeMap::new(),
        }
    }

    /// Time at which the next layer starts. The store never creates a layer
    /// that would end past `Time::MAX`.
    #[inline]
    pub fn end_time(&self) -> Time {
        self.start_time + self.duration
    }

    /// Whether this layer was created by a barrier.
    #[inline]
    pub fn is_barrier(&self) -> bool {
        self.barrier.is_some()
    }

    /// Occurrences of `op` in this layer.
    pub fn count(&self, op: OpId) -> u64 {
        self.operations.get(&op).copied().unwrap_or(0)
    }

    /// Total number of operations in this layer.
    pub fn total_ops(&self) -> u64 {
        self.operations.values().sum()
    }
}

/// Ordered, append-only sequence of layers.
///
/// Layers partition time without gaps: each layer starts where the previous
/// one ends. Layers are never removed or reordered.
#[derive(Debug, Clone, Default)]
pub struct LayerStore {
    /// Lower bound for the duration of every new layer.
    preferred_duration: Duration,
    layers: Vec<Layer>,
}

impl LayerStore {
    /// Create an empty store.
    pub fn new(preferred_duration: Duration) -> Self {
        Self {
            preferred_duration,
            layers: Vec::new(),
        }
    }

    /// Preferred duration applied to new layers.
    #[inline]
    pub fn preferred_duration(&self) -> Duration {
        self.preferred_duration
    }

    /// Number of layers.
    #[inline]
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    /// Whether no layer has been created yet.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    /// Whether `layer` names an existing layer.
    #[inline]
    pub fn contains(&self, layer: LayerId) -> bool {
        layer.index() < self.layers.len()
    }

    /// Id of the most recently created layer.
    pub fn last_id(&self) -> Option<LayerId> {
        self.layers.len().checked_sub(1).map(LayerId::from)
    }

    /// Look up a layer.
    pub fn get(&self, layer: LayerId) -> Option<&Layer> {
        self.layers.get(layer.index())
    }

    /// Look up a layer, treating a missing one as a contract violation.
    pub fn layer(&self, layer: LayerId) -> TraceResult<&Layer> {
        self.layers
            .get(layer.index())
            .ok_or(TraceError::LayerOutOfBounds {
                layer,
                len: self.layers.len(),
            })
    }

    fn layer_mut(&mut self, layer: LayerId) -> TraceResult<&mut Layer> {
        let len = self.layers.len();
        self.layers
            .get_mut(layer.index())
            .ok_or(TraceError::LayerOutOfBounds { layer, len })
    }

    /// All layers in creation order.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    /// Iterate over layers with their ids, in creation order.
    pub fn iter(&self) -> impl Iterator<Item = (LayerId, &Layer)> + '_ {
        self.layers
            .iter()
            .enumerate()
            .map(|(i, layer)| (LayerId::from(i), layer))
    }

    /// Iterate over layers starting at `from` (inclusive).
    pub fn iter_from(&self, from: LayerId) -> impl Iterator<Item = (LayerId, &Layer)> + '_ {
        self.iter().skip(from.index())
    }

    /// Append a layer long enough for an operation of `min_duration`.
    pub fn create_layer(&mut self, min_duration: Duration) -> TraceResult<LayerId> {
        let start_time = self.layers.last().map_or(0, Layer::end_time);
        let duration = self.preferred_duration.max(min_duration);
        if start_time.checked_add(duration).is_none() {
            return Err(TraceError::TimeOverflow {
                time: start_time,
                duration,
            });
        }
        self.layers.push(Layer::new(start_time, duration));

        let id = LayerId::from(self.layers.len() - 1);
        debug!(
            "Created layer {} (start {}, duration {})",
            id, start_time, duration
        );
        Ok(id)
    }

    /// Mark `layer` as created by the barrier `op`.
    pub fn mark_barrier(&mut self, layer: LayerId, op: OpId) -> TraceResult<()> {
        self.layer_mut(layer)?.barrier = Some(op);
        Ok(())
    }

    /// Count one more occurrence of `op` in `layer`.
    ///
    /// Barrier layers never receive operations.
    pub fn add_operation(&mut self, layer: LayerId, op: OpId) -> TraceResult<()> {
        let slot = self.layer_mut(layer)?;
        if slot.is_barrier() {
            return Err(TraceError::BarrierLayerWrite { layer, op });
        }
        *slot.operations.entry(op).or_insert(0) += 1;
        Ok(())
    }
}
