//! Connections (spec.md §3 "Connection", §4.5, §8 property 4).

use crate::graph::port::Port;
use std::sync::{Arc, Weak};

pub(crate) struct ConnectionInner {
    pub(crate) upstream: Weak<crate::graph::port::PortInner>,
    pub(crate) downstream: Weak<crate::graph::port::PortInner>,
}

/// A 1:1 edge between an output port and an input port (spec.md §3, §4.5).
/// Both endpoints are weak; the graph owns the strong side.
#[derive(Clone)]
pub struct Connection(pub(crate) Arc<ConnectionInner>);

impl Connection {
    pub(crate) fn new(upstream: &Port, downstream: &Port) -> Self {
        Connection(Arc::new(ConnectionInner {
            upstream: Arc::downgrade(&upstream.0),
            downstream: Arc::downgrade(&downstream.0),
        }))
    }

    pub fn upstream_port(&self) -> Option<Port> {
        self.0.upstream.upgrade().map(Port)
    }

    pub fn downstream_port(&self) -> Option<Port> {
        self.0.downstream.upgrade().map(Port)
    }

    pub fn ptr_eq(&self, other: &Connection) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
