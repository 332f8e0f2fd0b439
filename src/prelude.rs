//! Convenience re-exports of the crate's common types (spec.md §3's
//! top-level entities).

pub use crate::config::load_component_params;
pub use crate::error::{Error, GraphError};
pub use crate::graph::{
    Component, ComponentClass, ComponentKind, Connection, Direction, Graph, IteratorState,
    MessageIterator, MessageIteratorClass, Port, QueryExecutor,
};
pub use crate::ir::{
    ClockClass, ClockSnapshot, Event, EventClass, Field, FieldClass, LogLevel, Packet, Stream,
    StreamClass, StreamClassBuilder, Trace, TraceClass,
};
pub use crate::message::Message;
pub use crate::types::Interruptor;
pub use crate::value::Value;
