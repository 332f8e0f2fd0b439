//! StreamClass (spec.md §3 "StreamClass").

use crate::error::Error;
use crate::ir::clock::ClockClass;
use crate::ir::event_class::EventClass;
use crate::ir::field_class::FieldClass;
use crate::ir::trace::EventData;
use crate::object::{FrozenFlag, ObjectPool};
use crate::types::{EventClassId, StreamClassId};
use std::sync::{Arc, Mutex, RwLock};

const EVENT_POOL_CAPACITY: usize = 64;

struct Inner {
    id: StreamClassId,
    name: RwLock<Option<String>>,
    default_clock_class: RwLock<Option<ClockClass>>,
    packet_context_fc: RwLock<Option<FieldClass>>,
    event_header_fc: RwLock<Option<FieldClass>>,
    event_common_context_fc: RwLock<Option<FieldClass>>,
    event_classes: Mutex<Vec<EventClass>>,
    assigns_automatic_event_class_ids: bool,
    assigns_automatic_stream_ids: bool,
    supports_packets: bool,
    supports_discarded_events: bool,
    supports_discarded_packets: bool,
    packet_beginning_default_cs: bool,
    packet_end_default_cs: bool,
    event_pool: ObjectPool<EventData>,
    frozen: FrozenFlag,
}

/// Owns an ordered set of [`EventClass`]es and the `Event` recycling pool
/// for them (spec.md §3, §4.2). Frozen the first time any `Stream` is
/// created from it (spec.md §3: "Once a StreamClass has any Stream, it is
/// frozen").
#[derive(Clone)]
pub struct StreamClass(Arc<Inner>);

pub struct StreamClassBuilder {
    id: StreamClassId,
    assigns_automatic_event_class_ids: bool,
    assigns_automatic_stream_ids: bool,
    supports_packets: bool,
    supports_discarded_events: bool,
    supports_discarded_packets: bool,
    packet_beginning_default_cs: bool,
    packet_end_default_cs: bool,
}

impl StreamClassBuilder {
    pub fn new(id: StreamClassId) -> Self {
        StreamClassBuilder {
            id,
            assigns_automatic_event_class_ids: true,
            assigns_automatic_stream_ids: true,
            supports_packets: true,
            supports_discarded_events: false,
            supports_discarded_packets: false,
            packet_beginning_default_cs: false,
            packet_end_default_cs: false,
        }
    }

    pub fn assigns_automatic_event_class_ids(mut self, v: bool) -> Self {
        self.assigns_automatic_event_class_ids = v;
        self
    }

    pub fn assigns_automatic_stream_ids(mut self, v: bool) -> Self {
        self.assigns_automatic_stream_ids = v;
        self
    }

    pub fn supports_packets(mut self, v: bool) -> Self {
        self.supports_packets = v;
        self
    }

    pub fn supports_discarded_events(mut self, v: bool) -> Self {
        self.supports_discarded_events = v;
        self
    }

    pub fn supports_discarded_packets(mut self, v: bool) -> Self {
        self.supports_discarded_packets = v;
        self
    }

    pub fn build(self) -> StreamClass {
        StreamClass(Arc::new(Inner {
            id: self.id,
            name: RwLock::new(None),
            default_clock_class: RwLock::new(None),
            packet_context_fc: RwLock::new(None),
            event_header_fc: RwLock::new(None),
            event_common_context_fc: RwLock::new(None),
            event_classes: Mutex::new(Vec::new()),
            assigns_automatic_event_class_ids: self.assigns_automatic_event_class_ids,
            assigns_automatic_stream_ids: self.assigns_automatic_stream_ids,
            supports_packets: self.supports_packets,
            supports_discarded_events: self.supports_discarded_events,
            supports_discarded_packets: self.supports_discarded_packets,
            packet_beginning_default_cs: self.packet_beginning_default_cs,
            packet_end_default_cs: self.packet_end_default_cs,
            event_pool: ObjectPool::new(EVENT_POOL_CAPACITY),
            frozen: FrozenFlag::new(),
        }))
    }
}

impl StreamClass {
    pub fn id(&self) -> StreamClassId {
        self.0.id
    }

    pub fn name(&self) -> Option<String> {
        self.0.name.read().expect("poisoned").clone()
    }

    pub fn default_clock_class(&self) -> Option<ClockClass> {
        self.0.default_clock_class.read().expect("poisoned").clone()
    }

    pub fn packet_context_fc(&self) -> Option<FieldClass> {
        self.0.packet_context_fc.read().expect("poisoned").clone()
    }

    pub fn event_header_fc(&self) -> Option<FieldClass> {
        self.0.event_header_fc.read().expect("poisoned").clone()
    }

    pub fn event_common_context_fc(&self) -> Option<FieldClass> {
        self.0.event_common_context_fc.read().expect("poisoned").clone()
    }

    pub fn supports_packets(&self) -> bool {
        self.0.supports_packets
    }

    pub fn supports_discarded_events(&self) -> bool {
        self.0.supports_discarded_events
    }

    pub fn supports_discarded_packets(&self) -> bool {
        self.0.supports_discarded_packets
    }

    pub fn packet_beginning_has_default_cs(&self) -> bool {
        self.0.packet_beginning_default_cs
    }

    pub fn packet_end_has_default_cs(&self) -> bool {
        self.0.packet_end_default_cs
    }

    pub fn event_classes(&self) -> Vec<EventClass> {
        self.0.event_classes.lock().expect("poisoned").clone()
    }

    pub fn event_class(&self, id: EventClassId) -> Option<EventClass> {
        self.0
            .event_classes
            .lock()
            .expect("poisoned")
            .iter()
            .find(|ec| ec.id() == id)
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

    pub fn set_name(&self, name: impl Into<String>) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.name.write().expect("poisoned") = Some(name.into());
        Ok(())
    }

    pub fn set_default_clock_class(&self, cc: ClockClass) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.default_clock_class.write().expect("poisoned") = Some(cc);
        Ok(())
    }

    pub fn set_packet_context_fc(&self, fc: FieldClass) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.packet_context_fc.write().expect("poisoned") = Some(fc);
        Ok(())
    }

    pub fn set_event_header_fc(&self, fc: FieldClass) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.event_header_fc.write().expect("poisoned") = Some(fc);
        Ok(())
    }

    pub fn set_event_common_context_fc(&self, fc: FieldClass) -> Result<(), Error> {
        self.check_mutable()?;
        *self.0.event_common_context_fc.write().expect("poisoned") = Some(fc);
        Ok(())
    }

    /// Adds an event class, assigning the next automatic id if
    /// `assigns_automatic_event_class_ids` is set and `id` is `None`.
    /// Rejects a duplicate id (spec.md §8 property 2).
    pub fn add_event_class(&self, ec: EventClass) -> Result<(), Error> {
        self.check_mutable()?;
        let mut classes = self.0.event_classes.lock().expect("poisoned");
        if classes.iter().any(|existing| existing.id() == ec.id()) {
            return Err(Error::DuplicateId {
                kind: "EventClass",
                id: ec.id().0,
            });
        }
        classes.push(ec);
        Ok(())
    }

    pub fn next_automatic_event_class_id(&self) -> EventClassId {
        let classes = self.0.event_classes.lock().expect("poisoned");
        EventClassId(classes.iter().map(|ec| ec.id().0).max().map_or(0, |m| m + 1))
    }

    pub fn assigns_automatic_event_class_ids(&self) -> bool {
        self.0.assigns_automatic_event_class_ids
    }

    pub fn assigns_automatic_stream_ids(&self) -> bool {
        self.0.assigns_automatic_stream_ids
    }

    pub(crate) fn event_pool(&self) -> &ObjectPool<EventData> {
        &self.0.event_pool
    }

    /// Freezes the stream class, its event classes, and their field-class
    /// trees (spec.md §3: frozen on first Stream creation).
    pub fn freeze(&self) {
        if self.0.frozen.get() {
            return;
        }
        self.0.frozen.set();
        for ec in self.event_classes() {
            ec.freeze();
        }
        if let Some(fc) = self.packet_context_fc() {
            fc.freeze();
        }
        if let Some(fc) = self.event_header_fc() {
            fc.freeze();
        }
        if let Some(fc) = self.event_common_context_fc() {
            fc.freeze();
        }
    }

    pub fn ptr_eq(&self, other: &StreamClass) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for StreamClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamClass")
            .field("id", &self.0.id)
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_duplicate_event_class_id() {
        let sc = StreamClassBuilder::new(StreamClassId(0)).build();
        sc.add_event_class(EventClass::new(EventClassId(1))).unwrap();
        let err = sc
            .add_event_class(EventClass::new(EventClassId(1)))
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateId { .. }));
    }

    #[test]
    fn freeze_rejects_further_mutation() {
        let sc = StreamClassBuilder::new(StreamClassId(0)).build();
        sc.freeze();
        assert!(matches!(
            sc.add_event_class(EventClass::new(EventClassId(1))),
            Err(Error::FrozenWrite)
        ));
    }
}
