//! EventClass (spec.md §3 "EventClass").

use crate::error::Error;
use crate::ir::field_class::FieldClass;
use crate::object::FrozenFlag;
use crate::types::EventClassId;
use std::sync::{Arc, RwLock};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum LogLevel {
    Emergency,
    Alert,
    Critical,
    Error,
    Warning,
    Notice,
    Info,
    DebugSystem,
    DebugProgram,
    DebugProcess,
    DebugModule,
    DebugUnit,
    DebugFunction,
    DebugLine,
    Debug,
}

struct Inner {
    id: EventClassId,
    name: RwLock<Option<String>>,
    log_level: RwLock<Option<LogLevel>>,
    emf_uri: RwLock<Option<String>>,
    specific_context_fc: RwLock<Option<FieldClass>>,
    payload_fc: RwLock<Option<FieldClass>>,
    frozen: FrozenFlag,
}

/// Owned by a [`super::stream_class::StreamClass`]; `id` is unique within
/// that owner (spec.md §8 property 2).
#[derive(Clone)]
pub struct EventClass(Arc<Inner>);

impl EventClass {
    pub fn new(id: EventClassId) -> Self {
        EventClass(Arc::new(Inner {
            id,
            name: RwLock::new(None),
            log_level: RwLock::new(None),
            emf_uri: RwLock::new(None),
            specific_context_fc: RwLock::new(None),
            payload_fc: RwLock::new(None),
            frozen: FrozenFlag::new(),
        }))
    }

    pub fn id(&self) -> EventClassId {
        self.0.id
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.read().expect("poisoned").clone()
    }

    pub fn log_level(&self) -> Option<LogLevel> {
        *self.0.log_level.read().expect("poisoned")
    }

    pub fn specific_context_fc(&self) -> Option<FieldClass> {
        self.0.specific_context_fc.read().expect("poisoned").clone()
    }

    pub fn payload_fc(&self) -> Option<FieldClass> {
        self.0.payload_fc.read().expect("poisoned").clone()
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    fn check_mutable(&self) -> Result<(), Error> {
        if self.0.frozen.get() {
            Err(Error::FrozenWrite)
        } else {
            Ok(())
        }
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.name.write().expect("poisoned") = Some(name.into());
        Ok(())
    }

    pub fn set_log_level(&self, level: LogLevel) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.log_level.write().expect("poisoned") = Some(level);
        Ok(())
    }

    pub fn set_emf_uri(&self, uri: impl Into<String>) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.emf_uri.write().expect("poisoned") = Some(uri.into());
        Ok(())
    }

    pub fn set_specific_context_fc(&self, fc: FieldClass) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.specific_context_fc.write().expect("poisoned") = Some(fc);
        Ok(())
    }

    pub fn set_payload_fc(&self, fc: FieldClass) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.payload_fc.write().expect("poisoned") = Some(fc);
        Ok(())
    }

    /// Freezes this event class and its field-class trees, transitively
    /// (spec.md §4.3: "Validation produces copied, frozen field-class
    /// trees"). Called once the owning stream class is frozen.
    pub fn freeze(&self) {
        if self.0.frozen.get() {
            return;
        }
        self.0.frozen.set();
        if let Some(fc) = self.specific_context_fc() {
            fc.freeze();
        }
        if let Some(fc) = self.payload_fc() {
            fc.freeze();
        }
    }

    pub fn ptr_eq(&self, other: &EventClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for EventClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventClass")
            .field("id", &self.0.id)
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn freeze_rejects_mutation() {
        let ec = EventClass::new(EventClassId(1));
        ec.set_name("foo").unwrap();
        ec.freeze();
        assert!(matches!(ec.set_name("bar"), Err(Error::FrozenWrite)));
    }
}
