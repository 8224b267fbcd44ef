//! Identifier types for qubits, operations, layers and measurement results.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A point in trace time, measured in abstract ticks.
pub type Time = u64;

/// Nominal duration of an operation, in the same ticks as [`Time`].
pub type Duration = u64;

/// Handle of a qubit allocated in a tracing session.
///
/// Handles are dense and monotonically increasing; a session never reuses one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct QubitId(pub u32);

impl QubitId {
    /// Position of this qubit in the session's timeline.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for QubitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "q{}", self.0)
    }
}

impl From<u32> for QubitId {
    fn from(id: u32) -> Self {
        QubitId(id)
    }
}

impl From<usize> for QubitId {
    fn from(id: usize) -> Self {
        QubitId(u32::try_from(id).expect("QubitId overflow: exceeds u32::MAX"))
    }
}

/// Opaque identifier of an operation type.
///
/// The tracer never interprets it; it is only used to group counts and to
/// look up a display name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for OpId {
    fn from(id: u32) -> Self {
        OpId(id)
    }
}

/// Index of a layer in the layer store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct LayerId(pub u32);

impl LayerId {
    /// Position of this layer in the store.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// The layer created right after this one.
    #[inline]
    #[must_use]
    pub fn next(self) -> LayerId {
        LayerId(self.0 + 1)
    }
}

impl fmt::Display for LayerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for LayerId {
    fn from(id: usize) -> Self {
        LayerId(u32::try_from(id).expect("LayerId overflow: exceeds u32::MAX"))
    }
}

/// Outcome of a placement query.
///
/// Variants are declared in ascending order, so the derived ordering makes
/// `NoLayer` the minimum and `RequestNew` the maximum of any comparison. Taking
/// the `max` of several slots therefore picks the latest real layer unless one
/// of them needs a fresh layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Slot {
    /// No layer has been assigned yet.
    NoLayer,
    /// An existing layer.
    Layer(LayerId),
    /// A new layer must be appended to the store.
    RequestNew,
}

impl Slot {
    /// The concrete layer, if this slot names one.
    #[inline]
    pub fn layer(self) -> Option<LayerId> {
        match self {
            Slot::Layer(id) => Some(id),
            _ => None,
        }
    }
}

impl From<Option<LayerId>> for Slot {
    fn from(layer: Option<LayerId>) -> Self {
        layer.map_or(Slot::NoLayer, Slot::Layer)
    }
}

/// Token returned by a traced measurement.
///
/// It carries no outcome. It only remembers the layer the measurement landed
/// in, which is what conditional fences are computed from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct ResultHandle(Option<LayerId>);

impl ResultHandle {
    /// A result that does not originate from any traced measurement.
    pub const NONE: ResultHandle = ResultHandle(None);

    pub(crate) fn from_layer(layer: Option<LayerId>) -> Self {
        ResultHandle(layer)
    }

    /// Layer of the measurement that produced this result.
    #[inline]
    pub fn layer(self) -> Option<LayerId> {
        self.0
    }
}
