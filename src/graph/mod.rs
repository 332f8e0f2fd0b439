//! Graph runtime: components, ports, connections, message iterators, the
//! cooperative scheduler, and the query executor (spec.md §3 E-I, §4.4-
//! §4.9, §5).

pub mod component;
pub mod connection;
pub mod iterator;
pub mod port;
pub mod query;
pub mod runtime;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use component::{Component, ComponentClass, ComponentKind, DestroyListener};
pub use connection::Connection;
pub use iterator::{IteratorState, MessageIterator, MessageIteratorClass};
pub use port::{Direction, Port};
pub use query::QueryExecutor;
pub use runtime::{Graph, PortListener};
