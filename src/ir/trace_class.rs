//! TraceClass (spec.md §3 "TraceClass").

use crate::error::Error;
use crate::ir::field_class::FieldClass;
use crate::ir::stream_class::StreamClass;
use crate::object::FrozenFlag;
use crate::types::StreamClassId;
use crate::value::Value;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

/// Invoked synchronously, in registration order, when a [`crate::ir::trace::Trace`]
/// is created from this class (spec.md §3 "listener list").
pub type TraceClassListener = Box<dyn Fn() + Send + Sync>;

struct Inner {
    uuid: RwLock<Option<Uuid>>,
    name: RwLock<Option<String>>,
    environment: Mutex<Vec<(String, Value)>>,
    packet_header_fc: RwLock<Option<FieldClass>>,
    stream_classes: Mutex<Vec<StreamClass>>,
    assigns_automatic_stream_class_ids: bool,
    listeners: Mutex<Vec<TraceClassListener>>,
    frozen: FrozenFlag,
}

#[derive(Clone)]
pub struct TraceClass(Arc<Inner>);

impl TraceClass {
    pub fn new(assigns_automatic_stream_class_ids: bool) -> Self {
        TraceClass(Arc::new(Inner {
            uuid: RwLock::new(None),
            name: RwLock::new(None),
            environment: Mutex::new(Vec::new()),
            packet_header_fc: RwLock::new(None),
            stream_classes: Mutex::new(Vec::new()),
            assigns_automatic_stream_class_ids,
            listeners: Mutex::new(Vec::new()),
            frozen: FrozenFlag::new(),
        }))
    }

    pub fn uuid(&self) -> Option<Uuid> {
        *self.0.uuid.read().expect("poisoned")
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.read().expect("poisoned").clone()
    }

    pub fn environment(&self) -> Vec<(String, Value)> {
        self.0.environment.lock().expect("poisoned").clone()
    }

    pub fn packet_header_fc(&self) -> Option<FieldClass> {
        self.0.packet_header_fc.read().expect("poisoned").clone()
    }

    pub fn stream_classes(&self) -> Vec<StreamClass> {
        self.0.stream_classes.lock().expect("poisoned").clone()
    }

    pub fn stream_class(&self, id: StreamClassId) -> Option<StreamClass> {
        self.0
            .stream_classes
            .lock()
            .expect("poisoned")
            .iter()
            .find(|sc| sc.id() == id)
            .cloned()
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

    pub fn set_uuid(&self, uuid: Uuid) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.uuid.write().expect("poisoned") = Some(uuid);
        Ok(())
    }

    pub fn set_name(&self, name: impl Into<String>) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.name.write().expect("poisoned") = Some(name.into());
        Ok(())
    }

    pub fn set_environment_entry(&self, key: impl Into<String>, value: Value) -> Result<(), Error> {
        self.check_mutable()?;
        let key = key.into();
        let mut env = self.0.environment.lock().expect("poisoned");
        if let Some(entry) = env.iter_mut().find(|(k, _)| *k == key) {
            entry.1 = value;
        } else {
            env.push((key, value));
        }
        Ok(())
    }

    pub fn set_packet_header_fc(&self, fc: FieldClass) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.packet_header_fc.write().expect("poisoned") = Some(fc);
        Ok(())
    }

    pub fn add_stream_class(&self, sc: StreamClass) -> Result<(), Error> {
        self.check_mutable()?;
        let mut classes = self.0.stream_classes.lock().expect("poisoned");
        if classes.iter().any(|existing| existing.id() == sc.id()) {
            return Err(Error::DuplicateId {
                kind: "StreamClass",
                id: sc.id().0,
            });
        }
        classes.push(sc);
        Ok(())
    }

    pub fn next_automatic_stream_class_id(&self) -> StreamClassId {
        let classes = self.0.stream_classes.lock().expect("poisoned");
        StreamClassId(classes.iter().map(|sc| sc.id().0).max().map_or(0, |m| m + 1))
    }

    pub fn assigns_automatic_stream_class_ids(&self) -> bool {
        self.0.assigns_automatic_stream_class_ids
    }

    pub fn add_listener(&self, listener: TraceClassListener) {
        self.0.listeners.lock().expect("poisoned").push(listener);
    }

    pub(crate) fn notify_listeners(&self) {
        for listener in self.0.listeners.lock().expect("poisoned").iter() {
            listener();
        }
    }

    /// Freezes the trace class, its stream classes, and their field-class
    /// trees. Called when the first `Trace` is created, or explicitly when
    /// a `Trace` becomes static (spec.md §3 "Becoming static freezes the
    /// class").
    pub fn freeze(&self) {
        if self.0.frozen.get() {
            return;
        }
        self.0.frozen.set();
        for sc in self.stream_classes() {
            sc.freeze();
        }
        if let Some(fc) = self.packet_header_fc() {
            fc.freeze();
        }
    }

    pub fn ptr_eq(&self, other: &TraceClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for TraceClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TraceClass")
            .field("name", &self.name())
            .field("stream_class_count", &self.stream_classes().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EventClassId;
    use crate::ir::stream_class::StreamClassBuilder;
    use crate::ir::event_class::EventClass;

    #[test]
    fn rejects_duplicate_stream_class_id() {
        let tc = TraceClass::new(true);
        tc.add_stream_class(StreamClassBuilder::new(StreamClassId(0)).build())
            .unwrap();
        let err = tc
            .add_stream_class(StreamClassBuilder::new(StreamClassId(0)).build())
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId { .. }));
    }

    #[test]
    fn freeze_cascades_to_stream_and_event_classes() {
        let tc = TraceClass::new(true);
        let sc = StreamClassBuilder::new(StreamClassId(0)).build();
        sc.add_event_class(EventClass::new(EventClassId(0))).unwrap();
        tc.add_stream_class(sc.clone()).unwrap();
        tc.freeze();
        assert!(sc.is_frozen());
        assert!(sc.event_class(EventClassId(0)).unwrap().is_frozen());
    }
}
