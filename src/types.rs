//! Small shared value types used across the IR and graph runtime.

use derive_more::{Display, From, Into};
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::Arc;

/// A sticky, thread-shareable cancellation flag (spec.md §4.8, §4.9, §5).
/// `cancel()` may be called from any thread; `is_set()` is checked at
/// `run_once` entry, by iterator `next`, and by the query executor before
/// and after its method call. Once set it never clears.
#[derive(Clone, Debug)]
#[repr(transparent)]
pub struct Interruptor(Arc<AtomicBool>);

impl Interruptor {
    pub fn new() -> Self {
        Interruptor(Arc::new(AtomicBool::new(false)))
    }

    pub fn set(&self) {
        self.0.store(true, SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(SeqCst)
    }
}

impl Default for Interruptor {
    fn default() -> Self {
        Self::new()
    }
}

/// A `StreamClass`-scoped event class identifier (spec.md §3, §8 property 2).
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Into, Display, Default,
)]
#[repr(transparent)]
pub struct EventClassId(pub u64);

/// A `TraceClass`-scoped stream class identifier.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Into, Display, Default,
)]
#[repr(transparent)]
pub struct StreamClassId(pub u64);

/// A `Trace`-scoped stream instance identifier.
#[derive(
    Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, From, Into, Display, Default,
)]
#[repr(transparent)]
pub struct StreamId(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interruptor_is_sticky() {
        let i = Interruptor::new();
        assert!(!i.is_set());
        i.set();
        assert!(i.is_set());
        // A clone observes the same underlying flag.
        let j = i.clone();
        assert!(j.is_set());
    }
}
