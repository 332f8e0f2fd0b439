//! Trace IR (spec.md §3, module C): schema nodes (field class, event
//! class, stream class, trace class, clock class) and the instances built
//! from them (field, event, packet, stream, trace, clock snapshot).

pub mod clock;
pub mod event_class;
pub mod field;
pub mod field_class;
pub mod field_path;
pub mod stream_class;
pub mod trace;
pub mod trace_class;
pub mod validator;

pub use clock::{ClockClass, ClockSnapshot, ClockSnapshotPool};
pub use event_class::{EventClass, LogLevel};
pub use field::{Field, FieldValue, WalkedLeaf};
pub use field_class::{DisplayBase, FieldClass, RangeSet, RealPrecision};
pub use field_path::{FieldPath, PathRef, RootScope};
pub use stream_class::{StreamClass, StreamClassBuilder};
pub use trace::{create_event, Event, Packet, Stream, Trace};
pub use trace_class::TraceClass;
