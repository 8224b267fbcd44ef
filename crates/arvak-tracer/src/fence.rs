//! Conditional fences.
//!
//! Operations executed under a classical condition must not be scheduled
//! before the measurements the condition depends on. Entering such a region
//! pushes the latest measurement layer onto a [`FenceStack`]; leaving it pops
//! the value again. The [`FenceScope`] guard ties the pop to the end of the
//! region so it happens on every exit path, `?` included.

use std::ops::{Deref, DerefMut};
use tracing::debug;

use crate::ids::LayerId;
use crate::tracer::Tracer;

/// Stack of conditional-fence layers.
#[derive(Debug, Clone, Default)]
pub struct FenceStack {
    fences: Vec<LayerId>,
    /// Maximum of `fences`, kept in sync on every push and pop.
    latest: Option<LayerId>,
}

impl FenceStack {
    /// Create an empty stack.
    pub fn new() -> Self {
        Self::default()
    }

    /// Enter a conditional region fenced at `fence`.
    pub fn push(&mut self, fence: LayerId) {
        self.fences.push(fence);
        self.latest = self.latest.max(Some(fence));
    }

    /// Leave the innermost conditional region.
    ///
    /// The latest fence is recomputed from the remaining entries, linear in
    /// the stack depth.
    pub fn pop(&mut self) -> Option<LayerId> {
        let popped = self.fences.pop();
        self.latest = self.fences.iter().copied().max();
        popped
    }

    /// Latest fence currently in effect.
    #[inline]
    pub fn latest(&self) -> Option<LayerId> {
        self.latest
    }

    /// Number of active conditional regions that carry a fence.
    #[inline]
    pub fn depth(&self) -> usize {
        self.fences.len()
    }

    /// Whether no fence is active.
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.fences.is_empty()
    }
}

/// Guard for a classically-conditioned region of a trace.
///
/// Created by [`Tracer::fence_scope`]. While alive it dereferences to the
/// tracer, so operations inside the region are traced through it. Dropping the
/// guard removes its fence. Nested scopes borrow the outer guard, which keeps
/// pushes and pops in strict LIFO order.
#[must_use = "the fence is lifted as soon as the scope is dropped"]
pub struct FenceScope<'t> {
    tracer: &'t mut Tracer,
    fence: Option<LayerId>,
}

impl<'t> FenceScope<'t> {
    pub(crate) fn new(tracer: &'t mut Tracer, fence: Option<LayerId>) -> Self {
        Self { tracer, fence }
    }

    /// Fence pushed by this scope, or `None` if no dependency had a layer.
    #[inline]
    pub fn fence(&self) -> Option<LayerId> {
        self.fence
    }
}

impl Deref for FenceScope<'_> {
    type Target = Tracer;

    fn deref(&self) -> &Tracer {
        self.tracer
    }
}

impl DerefMut for FenceScope<'_> {
    fn deref_mut(&mut self) -> &mut Tracer {
        self.tracer
    }
}

impl Drop for FenceScope<'_> {
    fn drop(&mut self) {
        let Some(fence) = self.fence else {
            return;
        };
        let popped = self.tracer.fences_mut().pop();
        debug_assert_eq!(popped, Some(fence), "fence scopes must unwind in LIFO order");
        debug!(
            "Lifted conditional fence at layer {}, latest fence now {:?}",
            fence,
            self.tracer.latest_conditional_fence()
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_pop_tracks_max() {
        let mut stack = FenceStack::new();
        assert_eq!(stack.latest(), None);

        stack.push(LayerId(5));
        stack.push(LayerId(2));
        assert_eq!(stack.latest(), Some(LayerId(5)));
        assert_eq!(stack.depth(), 2);

        assert_eq!(stack.pop(), Some(LayerId(2)));
        assert_eq!(stack.latest(), Some(LayerId(5)));

        assert_eq!(stack.pop(), Some(LayerId(5)));
        assert_eq!(stack.latest(), None);
        assert!(stack.is_empty());
    }

    #[test]
    fn test_inner_pop_restores_outer() {
        let mut stack = FenceStack::new();
        stack.push(LayerId(2));
        stack.push(LayerId(5));
        assert_eq!(stack.latest(), Some(LayerId(5)));
        stack.pop();
        assert_eq!(stack.latest(), Some(LayerId(2)));
    }

    #[test]
    fn test_pop_empty() {
        let mut stack = FenceStack::new();
        assert_eq!(stack.pop(), None);
        assert_eq!(stack.latest(), None);
    }
}
