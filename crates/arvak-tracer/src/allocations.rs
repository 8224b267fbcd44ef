//! Reference-count bookkeeping for runtime objects.
//!
//! The tracer itself does not use this; it is the collaborator a runtime
//! calls on object lifecycle events to catch ownership bugs early. Every
//! object has a single count that starts at one on allocation and must reach
//! zero before shutdown.

use rustc_hash::FxHashMap;
use std::fmt::Debug;
use std::hash::Hash;
use tracing::{trace, warn};

use crate::error::{AllocationError, AllocationResult};

/// Tracks the reference count of every object identity it has seen.
#[derive(Debug, Clone)]
pub struct AllocationsTracker<K> {
    counts: FxHashMap<K, u64>,
}

impl<K> Default for AllocationsTracker<K> {
    fn default() -> Self {
        Self {
            counts: FxHashMap::default(),
        }
    }
}

impl<K: Hash + Eq + Debug> AllocationsTracker<K> {
    /// Create an empty tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// An object was allocated.
    ///
    /// Identities may be reused once their previous object was fully released.
    pub fn on_allocate(&mut self, object: K) -> AllocationResult<()> {
        match self.counts.get_mut(&object) {
            Some(count) if *count > 0 => Err(AllocationError::DoubleAllocation {
                object: format!("{object:?}"),
            }),
            Some(count) => {
                *count = 1;
                trace!("Re-allocated {:?}", object);
                Ok(())
            }
            None => {
                trace!("Allocated {:?}", object);
                self.counts.insert(object, 1);
                Ok(())
            }
        }
    }

    /// A reference to a live object was added.
    pub fn on_add_ref(&mut self, object: &K) -> AllocationResult<()> {
        match self.counts.get_mut(object) {
            None => Err(AllocationError::UntrackedAddRef {
                object: format!("{object:?}"),
            }),
            Some(0) => Err(AllocationError::Resurrection {
                object: format!("{object:?}"),
            }),
            Some(count) => {
                *count += 1;
                Ok(())
            }
        }
    }

    /// A reference to a live object was dropped.
    pub fn on_release(&mut self, object: &K) -> AllocationResult<()> {
        match self.counts.get_mut(object) {
            None => Err(AllocationError::UntrackedRelease {
                object: format!("{object:?}"),
            }),
            Some(0) => Err(AllocationError::DoubleRelease {
                object: format!("{object:?}"),
            }),
            Some(count) => {
                *count -= 1;
                Ok(())
            }
        }
    }

    /// Current count of an object, if it was ever allocated.
    pub fn ref_count(&self, object: &K) -> Option<u64> {
        self.counts.get(object).copied()
    }

    /// Number of objects with a nonzero count.
    pub fn live_objects(&self) -> usize {
        self.counts.values().filter(|&&c| c > 0).count()
    }

    /// Fail if any object is still referenced.
    pub fn check_for_leaks(&self) -> AllocationResult<()> {
        let count = self.live_objects();
        if count > 0 {
            warn!("{} object(s) still referenced at shutdown", count);
            return Err(AllocationError::Leak { count });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_lifecycle() {
        let mut tracker = AllocationsTracker::new();
        tracker.on_allocate(1).unwrap();
        tracker.on_add_ref(&1).unwrap();
        assert_eq!(tracker.ref_count(&1), Some(2));
        tracker.on_release(&1).unwrap();
        tracker.on_release(&1).unwrap();
        assert_eq!(tracker.ref_count(&1), Some(0));
        tracker.check_for_leaks().unwrap();
    }

    #[test]
    fn test_double_allocation() {
        let mut tracker = AllocationsTracker::new();
        tracker.on_allocate("a").unwrap();
        assert!(matches!(
            tracker.on_allocate("a"),
            Err(AllocationError::DoubleAllocation { .. })
        ));
    }

    #[test]
    fn test_reallocate_after_release() {
        let mut tracker = AllocationsTracker::new();
        tracker.on_allocate(7u32).unwrap();
        tracker.on_release(&7).unwrap();
        tracker.on_allocate(7).unwrap();
        assert_eq!(tracker.ref_count(&7), Some(1));
    }

    #[test]
    fn test_untracked_objects() {
        let mut tracker: AllocationsTracker<u32> = AllocationsTracker::new();
        assert!(matches!(
            tracker.on_add_ref(&3),
            Err(AllocationError::UntrackedAddRef { .. })
        ));
        assert!(matches!(
            tracker.on_release(&3),
            Err(AllocationError::UntrackedRelease { .. })
        ));
    }

    #[test]
    fn test_resurrection_and_double_release() {
        let mut tracker = AllocationsTracker::new();
        tracker.on_allocate(1u8).unwrap();
        tracker.on_release(&1).unwrap();
        assert!(matches!(
            tracker.on_add_ref(&1),
            Err(AllocationError::Resurrection { .. })
        ));
        assert!(matches!(
            tracker.on_release(&1),
            Err(AllocationError::DoubleRelease { .. })
        ));
    }

    #[test]
    fn test_leak_detection() {
        let mut tracker = AllocationsTracker::new();
        tracker.on_allocate('x').unwrap();
        tracker.on_allocate('y').unwrap();
        tracker.on_release(&'y').unwrap();
        assert_eq!(
            tracker.check_for_leaks().unwrap_err(),
            AllocationError::Leak { count: 1 }
        );
    }
}
