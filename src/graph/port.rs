//! Ports (spec.md §3 "Port", §4.4, §8 property 3).

use crate::graph::component::ComponentInner;
use crate::graph::connection::ConnectionInner;
use std::any::Any;
use std::sync::{Arc, Mutex, Weak};

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum Direction {
    Input,
    Output,
}

pub(crate) struct PortInner {
    pub(crate) direction: Direction,
    pub(crate) name: String,
    pub(crate) component: Weak<ComponentInner>,
    pub(crate) user_data: Mutex<Option<Box<dyn Any + Send + Sync>>>,
    pub(crate) connection: Mutex<Option<Weak<ConnectionInner>>>,
}

/// A component's named input or output port (spec.md §3). A port belongs
/// to exactly one component (strong parent, weak child back-reference);
/// its connection, if any, is a weak reference (the graph/connection own
/// the strong side).
#[derive(Clone)]
pub struct Port(pub(crate) Arc<PortInner>);

impl Port {
    pub(crate) fn new(direction: Direction, name: impl Into<String>, component: Weak<ComponentInner>) -> Self {
        Port(Arc::new(PortInner {
            direction,
            name: name.into(),
            component,
            user_data: Mutex::new(None),
            connection: Mutex::new(None),
        }))
    }

    pub fn direction(&self) -> Direction {
        self.0.direction
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_connected(&self) -> bool {
        self.0
            .connection
            .lock()
            .expect("poisoned")
            .as_ref()
            .map(|c| c.strong_count() > 0)
            .unwrap_or(false)
    }

    pub fn set_user_data(&self, data: Box<dyn Any + Send + Sync>) {
        *self.0.user_data.lock().expect("poisoned") = Some(data);
    }

    pub(crate) fn set_connection(&self, conn: Weak<ConnectionInner>) {
        *self.0.connection.lock().expect("poisoned") = Some(conn);
    }

    pub(crate) fn clear_connection(&self) {
        *self.0.connection.lock().expect("poisoned") = None;
    }

    pub fn ptr_eq(&self, other: &Port) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn component_weak(&self) -> &Weak<ComponentInner> {
        &self.0.component
    }
}

impl std::fmt::Debug for Port {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Port")
            .field("direction", &self.0.direction)
            .field("name", &self.0.name)
            .finish()
    }
}
