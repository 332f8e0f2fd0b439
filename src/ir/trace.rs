//! Trace, Stream, Packet, Event instances (spec.md §3).
//!
//! `Trace` strong-owns its `Stream`s; a `Stream`'s back-reference to its
//! owning `Trace` is weak to keep the graph acyclic (the spec's abstract
//! ownership rules leave the direction of this one back-edge unstated —
//! see the instance-graph decision in the design ledger). `Event` is the
//! one pooled instance type here, matching spec.md §3's "Owns an object
//! pool of Events" on `StreamClass`.

use crate::error::{Error, GraphError};
use crate::ir::clock::ClockSnapshot;
use crate::ir::event_class::EventClass;
use crate::ir::field::Field;
use crate::ir::field_class::FieldClass;
use crate::ir::stream_class::StreamClass;
use crate::ir::trace_class::TraceClass;
use crate::object::{FrozenFlag, Recyclable, Recycled};
use crate::types::StreamId;
use std::sync::{Arc, Mutex, RwLock, Weak};

struct TraceInner {
    class: TraceClass,
    streams: Mutex<Vec<Stream>>,
    is_static: FrozenFlag,
}

#[derive(Clone)]
pub struct Trace(Arc<TraceInner>);

impl Trace {
    /// Creating the first `Trace` from a class freezes it (spec.md §3
    /// lifecycle summary: class objects are "frozen on first
    /// instantiation").
    pub fn new(class: TraceClass) -> Self {
        class.freeze();
        class.notify_listeners();
        Trace(Arc::new(TraceInner {
            class,
            streams: Mutex::new(Vec::new()),
            is_static: FrozenFlag::new(),
        }))
    }

    pub fn class(&self) -> &TraceClass {
        &self.0.class
    }

    pub fn streams(&self) -> Vec<Stream> {
        self.0.streams.lock().expect("poisoned").clone()
    }

    pub fn is_static(&self) -> bool {
        self.0.is_static.get()
    }

    /// Disables further stream creation and freezes the owning class
    /// (spec.md §3: "Becoming static freezes the class and disables
    /// further stream creation").
    pub fn make_static(&self) {
        self.0.is_static.set();
        self.0.class.freeze();
    }

    pub fn create_stream(&self, stream_class: StreamClass, id: StreamId) -> Result<Stream, Error> {
        if self.0.is_static.get() {
            return Err(Error::Validation(
                "trace is static; no further streams may be created".into(),
            ));
        }
        let mut streams = self.0.streams.lock().expect("poisoned");
        if streams.iter().any(|s| s.id() == id) {
            return Err(Error::DuplicateId {
                kind: "Stream",
                id: id.0,
            });
        }
        stream_class.freeze();
        let stream = Stream(Arc::new(StreamInner {
            id,
            stream_class,
            trace: Arc::downgrade(&self.0),
        }));
        streams.push(stream.clone());
        Ok(stream)
    }

    pub fn ptr_eq(&self, other: &Trace) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

struct StreamInner {
    id: StreamId,
    stream_class: StreamClass,
    trace: Weak<TraceInner>,
}

#[derive(Clone)]
pub struct Stream(Arc<StreamInner>);

impl Stream {
    pub fn id(&self) -> StreamId {
        self.0.id
    }

    pub fn stream_class(&self) -> &StreamClass {
        &self.0.stream_class
    }

    pub fn trace(&self) -> Option<Trace> {
        self.0.trace.upgrade().map(Trace)
    }

    pub fn create_packet(&self) -> Packet {
        let context = self
            .0
            .stream_class
            .packet_context_fc()
            .map(|fc| Field::instantiate(&fc));
        Packet(Arc::new(PacketInner {
            stream: self.clone(),
            context: RwLock::new(context),
            frozen: FrozenFlag::new(),
        }))
    }

    pub fn ptr_eq(&self, other: &Stream) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

struct PacketInner {
    stream: Stream,
    context: RwLock<Option<Field>>,
    frozen: FrozenFlag,
}

#[derive(Clone)]
pub struct Packet(Arc<PacketInner>);

impl Packet {
    pub fn stream(&self) -> &Stream {
        &self.0.stream
    }

    pub fn context(&self) -> Option<std::sync::RwLockReadGuard<'_, Option<Field>>> {
        Some(self.0.context.read().expect("poisoned"))
    }

    pub fn is_frozen(&self) -> bool {
        self.0.frozen.get()
    }

    /// Freezes the packet context field tree; called when a
    /// `PacketBeginning`/`PacketEnd` message carrying this packet is
    /// emitted (spec.md §4.6).
    pub fn freeze(&self) {
        if self.0.frozen.get() {
            return;
        }
        self.0.frozen.set();
        if let Some(field) = &*self.0.context.read().expect("poisoned") {
            field.freeze();
        }
    }

    pub fn ptr_eq(&self, other: &Packet) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

/// The pooled payload behind an [`Event`] handle. `reset` clears the
/// `event_class` back-pointer first, per spec.md §9's "the release
/// function always clears the class back-pointer first, then hands the
/// empty shell to the pool" — this is what lets an `EventClass`'s own
/// pool be dropped safely when the class's last external reference goes
/// away, even while recycled shells still sit in that pool.
pub struct EventData {
    event_class: Option<EventClass>,
    packet: Option<Packet>,
    header: Option<Field>,
    common_context: Option<Field>,
    specific_context: Option<Field>,
    payload: Option<Field>,
    default_cs: Option<ClockSnapshot>,
    frozen: FrozenFlag,
}

impl Default for EventData {
    fn default() -> Self {
        EventData {
            event_class: None,
            packet: None,
            header: None,
            common_context: None,
            specific_context: None,
            payload: None,
            default_cs: None,
            frozen: FrozenFlag::new(),
        }
    }
}

impl Recyclable for EventData {
    fn reset(&mut self) {
        self.event_class = None;
        self.packet = None;
        self.header = None;
        self.common_context = None;
        self.specific_context = None;
        self.payload = None;
        self.default_cs = None;
        self.frozen = FrozenFlag::new();
    }
}

impl EventData {
    pub fn event_class(&self) -> Option<&EventClass> {
        self.event_class.as_ref()
    }

    pub fn packet(&self) -> Option<&Packet> {
        self.packet.as_ref()
    }

    pub fn header(&self) -> Option<&Field> {
        self.header.as_ref()
    }

    pub fn specific_context(&self) -> Option<&Field> {
        self.specific_context.as_ref()
    }

    pub fn payload(&self) -> Option<&Field> {
        self.payload.as_ref()
    }

    pub fn default_clock_snapshot(&self) -> Option<&ClockSnapshot> {
        self.default_cs.as_ref()
    }

    pub fn set_default_clock_snapshot(&mut self, cs: ClockSnapshot) {
        self.default_cs = Some(cs);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.get()
    }

    pub fn freeze(&self) {
        self.frozen.set();
        if let Some(f) = &self.header {
            f.freeze();
        }
        if let Some(f) = &self.common_context {
            f.freeze();
        }
        if let Some(f) = &self.specific_context {
            f.freeze();
        }
        if let Some(f) = &self.payload {
            f.freeze();
        }
    }
}

/// A pooled event instance, recycled back into its stream class's event
/// pool when the last handle drops.
pub type Event = Recycled<EventData>;

/// Instantiates an event from `event_class` within `packet`, recycling an
/// existing shell from `stream_class`'s event pool when one is available.
pub fn create_event(
    stream_class: &StreamClass,
    event_class: EventClass,
    packet: Packet,
) -> Result<Event, GraphError> {
    if !event_class.is_frozen() {
        return Err(GraphError::Error(Error::Validation(
            "event class is not frozen; owning stream class must be frozen first".into(),
        )));
    }
    let header = stream_class
        .event_header_fc()
        .map(|fc: FieldClass| Field::instantiate(&fc));
    let common_context = stream_class
        .event_common_context_fc()
        .map(|fc: FieldClass| Field::instantiate(&fc));
    let specific_context = event_class.specific_context_fc().map(|fc| Field::instantiate(&fc));
    let payload = event_class.payload_fc().map(|fc| Field::instantiate(&fc));

    let mut event = stream_class.event_pool().create(EventData::default);
    if let Some(data) = event.get_mut() {
        data.event_class = Some(event_class);
        data.packet = Some(packet);
        data.header = header;
        data.common_context = common_context;
        data.specific_context = specific_context;
        data.payload = payload;
    }
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::stream_class::StreamClassBuilder;
    use crate::types::{EventClassId, StreamClassId};

    fn trace() -> (Trace, StreamClass) {
        let tc = TraceClass::new(true);
        let sc = StreamClassBuilder::new(StreamClassId(0)).build();
        tc.add_stream_class(sc.clone()).unwrap();
        (Trace::new(tc), sc)
    }

    #[test]
    fn stream_ids_unique_within_trace() {
        let (trace, sc) = trace();
        trace.create_stream(sc.clone(), StreamId(0)).unwrap();
        let err = trace.create_stream(sc, StreamId(0)).unwrap_err();
        assert!(matches!(err, Error::DuplicateId { .. }));
    }

    #[test]
    fn static_trace_rejects_new_streams() {
        let (trace, sc) = trace();
        trace.make_static();
        assert!(trace.create_stream(sc, StreamId(0)).is_err());
    }

    #[test]
    fn event_recycles_through_stream_class_pool() {
        let (trace, sc) = trace();
        let ec = EventClass::new(EventClassId(0));
        sc.add_event_class(ec.clone()).unwrap();
        sc.freeze();
        let stream = trace.create_stream(sc.clone(), StreamId(0)).unwrap();
        let packet = stream.create_packet();
        assert_eq!(sc.event_pool().len(), 0);
        {
            let event = create_event(&sc, ec.clone(), packet.clone()).unwrap();
            assert!(event.event_class().unwrap().ptr_eq(&ec));
        }
        assert_eq!(sc.event_pool().len(), 1, "event recycled back on drop");
    }
}
