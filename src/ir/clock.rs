//! Clock class and clock snapshots (spec.md §3 "ClockClass"/"ClockSnapshot",
//! §4.11 "Clock arithmetic", module K).
//!
//! Grounded on `original_source/formats/ctf/writer/clock.c`: a `ClockClass`
//! is a plain value bag (frequency, offset, precision, origin flag, UUID,
//! name) frozen on first use; conversion is a pure function of those fields
//! plus the cycle value, with explicit overflow reporting rather than
//! silent wraparound.

use crate::error::GraphError;
use crate::object::{FrozenFlag, ObjectPool, Recyclable, Recycled};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug)]
struct ClockClassInner {
    frozen: FrozenFlag,
    frequency: u64,
    offset_seconds: i64,
    offset_cycles: u64,
    precision: u64,
    origin_is_unix_epoch: bool,
    uuid: Option<Uuid>,
    name: Option<String>,
    description: Option<String>,
}

/// Cheaply cloneable; clones alias the same class (spec.md §3's "owning
/// StreamClass"/"default ClockClass" back-references are meant to share
/// identity, not copy values).
#[derive(Clone, Debug)]
pub struct ClockClass(Arc<ClockClassInner>);

impl ClockClass {
    /// `offset_cycles` must be `< frequency` (spec.md §4.11 step 1); this
    /// is checked at construction since a ClockClass is validated before
    /// any snapshot can reference it.
    pub fn new(
        frequency: u64,
        offset_seconds: i64,
        offset_cycles: u64,
        precision: u64,
        origin_is_unix_epoch: bool,
    ) -> Result<Self, crate::error::Error> {
        if frequency == 0 {
            return Err(crate::error::Error::Validation(
                "clock class frequency must be non-zero".into(),
            ));
        }
        if offset_cycles >= frequency {
            return Err(crate::error::Error::Validation(format!(
                "clock class offset_cycles {offset_cycles} must be < frequency {frequency}"
            )));
        }
        Ok(ClockClass(Arc::new(ClockClassInner {
            frozen: FrozenFlag::new(),
            frequency,
            offset_seconds,
            offset_cycles,
            precision,
            origin_is_unix_epoch,
            uuid: None,
            name: None,
            description: None,
        })))
    }

    /// Builder methods; callable only while this `ClockClass` is still
    /// uniquely held (before any clone has been handed out), matching the
    /// mutable-until-first-share window builders operate in throughout
    /// this crate.
    pub fn with_uuid(mut self, uuid: Uuid) -> Self {
        Arc::get_mut(&mut self.0)
            .expect("ClockClass builder methods require a unique reference")
            .uuid = Some(uuid);
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        Arc::get_mut(&mut self.0)
            .expect("ClockClass builder methods require a unique reference")
            .name = Some(name.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        Arc::get_mut(&mut self.0)
            .expect("ClockClass builder methods require a unique reference")
            .description = Some(description.into());
        self
    }

    pub fn frequency(&self) -> u64 {
        self.0.frequency
    }

    pub fn name(&self) -> Option<&str> {
        self.0.name.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    pub fn uuid(&self) -> Option<Uuid> {
        self.0.uuid
    }

    pub fn origin_is_unix_epoch(&self) -> bool {
        self.0.origin_is_unix_epoch
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    pub fn freeze(&self) {
        self.0.frozen.set();
    }

    pub fn ptr_eq(&self, other: &ClockClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// spec.md §4.11: cycles → nanoseconds-from-origin, with explicit
    /// overflow reporting at each arithmetic step rather than wrapping.
    pub fn ns_from_origin(&self, value_cycles: u64) -> Result<i64, GraphError> {
        let freq = self.0.frequency as i128;

        let base_s_ns = (self.0.offset_seconds as i128)
            .checked_mul(1_000_000_000)
            .ok_or(GraphError::Overflow)?;
        let base_c_ns = ((self.0.offset_cycles as i128) * 1_000_000_000 + freq / 2) / freq;
        let base_ns = base_s_ns.checked_add(base_c_ns).ok_or(GraphError::Overflow)?;
        if base_ns > i64::MAX as i128 || base_ns < i64::MIN as i128 {
            return Err(GraphError::Overflow);
        }

        let value_ns = ((value_cycles as i128) * 1_000_000_000 + freq / 2) / freq;
        if value_ns >= (1i128 << 63) {
            return Err(GraphError::Overflow);
        }

        let total = base_ns
            .checked_add(value_ns)
            .ok_or(GraphError::Overflow)?;
        if total > i64::MAX as i128 || total < i64::MIN as i128 {
            return Err(GraphError::Overflow);
        }
        Ok(total as i64)
    }
}

struct ClockSnapshotData {
    class: Option<ClockClass>,
    value_cycles: u64,
    /// Cached conversion result, stored as plain data (rather than
    /// `Result<i64, GraphError>`) so a read is a cheap `Copy` rather than
    /// needing `GraphError` to be cloneable.
    ns_from_origin: i64,
    overflowed: bool,
}

impl Default for ClockSnapshotData {
    fn default() -> Self {
        ClockSnapshotData {
            class: None,
            value_cycles: 0,
            ns_from_origin: 0,
            overflowed: false,
        }
    }
}

impl Recyclable for ClockSnapshotData {
    fn reset(&mut self) {
        self.class = None;
        self.value_cycles = 0;
        self.ns_from_origin = 0;
        self.overflowed = false;
    }
}

/// A clock reading, precomputed to nanoseconds-from-origin at creation
/// (spec.md §3: "precomputed ns-from-origin and overflow flag for O(1)
/// reads"). Pooled per clock class.
pub type ClockSnapshot = Recycled<ClockSnapshotData>;

pub struct ClockSnapshotPool(ObjectPool<ClockSnapshotData>);

impl ClockSnapshotPool {
    pub fn new(capacity: usize) -> Self {
        ClockSnapshotPool(ObjectPool::new(capacity))
    }

    pub fn create(&self, class: ClockClass, value_cycles: u64) -> ClockSnapshot {
        let (ns_from_origin, overflowed) = match class.ns_from_origin(value_cycles) {
            Ok(ns) => (ns, false),
            Err(_) => (0, true),
        };
        let mut snap = self.0.create(ClockSnapshotData::default);
        if let Some(data) = snap.get_mut() {
            data.class = Some(class);
            data.value_cycles = value_cycles;
            data.ns_from_origin = ns_from_origin;
            data.overflowed = overflowed;
        }
        snap
    }
}

impl ClockSnapshotData {
    pub fn class(&self) -> Option<&ClockClass> {
        self.class.as_ref()
    }

    pub fn value_cycles(&self) -> u64 {
        self.value_cycles
    }

    pub fn ns_from_origin(&self) -> Result<i64, GraphError> {
        if self.overflowed {
            Err(GraphError::Overflow)
        } else {
            Ok(self.ns_from_origin)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_conversion_no_offset() {
        let cc = ClockClass::new(1_000_000_000, 0, 0, 0, true).unwrap();
        assert_eq!(cc.ns_from_origin(42).unwrap(), 42);
    }

    #[test]
    fn overflow_at_value_boundary() {
        // Spec.md E2: freq=1, off_s=0, off_c=0, value=2^63 -> Overflow.
        let cc = ClockClass::new(1, 0, 0, 0, true).unwrap();
        let err = cc.ns_from_origin(1u64 << 63).unwrap_err();
        assert!(matches!(err, GraphError::Overflow));
    }

    #[test]
    fn monotonic_conversion() {
        let cc = ClockClass::new(48_000, 3, 100, 0, true).unwrap();
        let a = cc.ns_from_origin(1000).unwrap();
        let b = cc.ns_from_origin(2000).unwrap();
        assert!(a <= b);
    }

    #[test]
    fn rejects_offset_cycles_at_or_above_frequency() {
        assert!(ClockClass::new(1000, 0, 1000, 0, true).is_err());
    }

    #[test]
    fn snapshot_pool_recycles_and_resets() {
        let pool = ClockSnapshotPool::new(2);
        let cc = ClockClass::new(1_000_000_000, 0, 0, 0, true).unwrap();
        {
            let snap = pool.create(cc.clone(), 7);
            assert_eq!(snap.value_cycles(), 7);
        }
        let snap2 = pool.create(cc, 9);
        assert_eq!(snap2.value_cycles(), 9);
    }
}
