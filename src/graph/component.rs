//! Components and component classes (spec.md §3 "Component", §4.4,
//! §6 "Component-class API surface", §9 "Component class 'methods'").
//!
//! A component class is modeled as a trait rather than the literal
//! function-pointer record the spec describes, because Rust's `dyn Trait`
//! vtable already *is* that record — each method below has a default that
//! encodes the spec's "well-defined null semantics" (`Unsupported`/no-op)
//! for a method a class doesn't provide.

use crate::error::GraphError;
use crate::graph::iterator::MessageIteratorClass;
use crate::graph::port::{Direction, Port};
use crate::graph::runtime::{Graph, GraphInner};
use crate::types::Interruptor;
use crate::value::Value;
use std::any::Any;
use std::sync::{Arc, Mutex, Weak};

pub type DestroyListener = Box<dyn Fn() + Send + Sync>;

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum ComponentKind {
    Source,
    Filter,
    Sink,
}

/// A component class's method table (spec.md §6). `initialize` is the
/// only method every class must supply; everything else defaults to
/// "not provided".
pub trait ComponentClass: Send + Sync {
    fn kind(&self) -> ComponentKind;

    fn initialize(&self, comp: &Component, params: &Value) -> Result<(), GraphError>;

    fn finalize(&self, _comp: &Component) {}

    fn query(&self, _object: &str, _params: &Value, _interruptor: &Interruptor) -> Result<Value, GraphError> {
        Err(GraphError::Unsupported)
    }

    fn input_port_connected(&self, _comp: &Component, _port: &Port) {}

    fn output_port_connected(&self, _comp: &Component, _port: &Port) {}

    fn input_port_disconnected(&self, _comp: &Component, _port: &Port) {}

    fn output_port_disconnected(&self, _comp: &Component, _port: &Port) {}

    /// Sinks only: invoked exactly once, after all connections are
    /// established and before the first `consume` (spec.md §4.4).
    fn graph_is_configured(&self, _comp: &Component) -> Result<(), GraphError> {
        Ok(())
    }

    /// Sinks only.
    fn consume(&self, _comp: &Component) -> Result<(), GraphError> {
        Err(GraphError::Unsupported)
    }

    /// Sources/filters only: constructs the per-connection iterator state
    /// machine driver for `port`.
    fn message_iterator_init(
        &self,
        _comp: &Component,
        _port: &Port,
    ) -> Result<Box<dyn MessageIteratorClass>, GraphError> {
        Err(GraphError::Unsupported)
    }
}

pub(crate) struct ComponentInner {
    class: Arc<dyn ComponentClass>,
    name: String,
    input_ports: Mutex<Vec<Port>>,
    output_ports: Mutex<Vec<Port>>,
    user_data: Mutex<Option<Box<dyn Any + Send + Sync>>>,
    initialized: Mutex<bool>,
    graph: Mutex<Option<Weak<GraphInner>>>,
    destroy_listeners: Mutex<Vec<DestroyListener>>,
}

impl Drop for ComponentInner {
    fn drop(&mut self) {
        for listener in self.destroy_listeners.lock().expect("poisoned").drain(..) {
            listener();
        }
    }
}

/// A typed component instance (spec.md §3 "Component"). Port names are
/// unique per direction per component (spec.md §8 property 3).
#[derive(Clone)]
pub struct Component(pub(crate) Arc<ComponentInner>);

impl Component {
    pub(crate) fn new(class: Arc<dyn ComponentClass>, name: impl Into<String>) -> Self {
        Component(Arc::new(ComponentInner {
            class,
            name: name.into(),
            input_ports: Mutex::new(Vec::new()),
            output_ports: Mutex::new(Vec::new()),
            user_data: Mutex::new(None),
            initialized: Mutex::new(false),
            graph: Mutex::new(None),
            destroy_listeners: Mutex::new(Vec::new()),
        }))
    }

    /// Set once by `Graph::add_component`, right after construction
    /// (spec.md §3 "Component" data: class, name, owning graph, ...).
    /// Weak, so a component never keeps its owning graph alive.
    pub(crate) fn set_graph(&self, graph: &Graph) {
        *self.0.graph.lock().expect("poisoned") = Some(graph.downgrade());
    }

    /// The graph that owns this component, if it still exists.
    pub fn graph(&self) -> Option<Graph> {
        self.0
            .graph
            .lock()
            .expect("poisoned")
            .as_ref()
            .and_then(Graph::from_weak)
    }

    /// Registers a callback run when the last reference to this component
    /// is dropped (spec.md §3 "destroy listeners").
    pub fn add_destroy_listener(&self, listener: DestroyListener) {
        self.0.destroy_listeners.lock().expect("poisoned").push(listener);
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn kind(&self) -> ComponentKind {
        self.0.class.kind()
    }

    pub fn class(&self) -> &Arc<dyn ComponentClass> {
        &self.0.class
    }

    pub fn input_ports(&self) -> Vec<Port> {
        self.0.input_ports.lock().expect("poisoned").clone()
    }

    pub fn output_ports(&self) -> Vec<Port> {
        self.0.output_ports.lock().expect("poisoned").clone()
    }

    pub fn input_port(&self, name: &str) -> Option<Port> {
        self.0
            .input_ports
            .lock()
            .expect("poisoned")
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn output_port(&self, name: &str) -> Option<Port> {
        self.0
            .output_ports
            .lock()
            .expect("poisoned")
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn set_user_data(&self, data: Box<dyn Any + Send + Sync>) {
        *self.0.user_data.lock().expect("poisoned") = Some(data);
    }

    /// Adds a port of the given direction; rejects a duplicate name among
    /// ports of the same direction (spec.md §8 property 3). Called by the
    /// component's own `initialize` method via its self-handle.
    pub fn add_port(&self, direction: Direction, name: impl Into<String>) -> Result<Port, crate::error::Error> {
        let name = name.into();
        let ports = match direction {
            Direction::Input => &self.0.input_ports,
            Direction::Output => &self.0.output_ports,
        };
        let mut ports = ports.lock().expect("poisoned");
        if ports.iter().any(|p| p.name() == name) {
            return Err(crate::error::Error::DuplicatePortName(name));
        }
        let port = Port::new(direction, name, Arc::downgrade(&self.0));
        ports.push(port.clone());
        Ok(port)
    }

    /// Removes a port. Rejected while it is connected (spec.md §4.4).
    pub fn remove_port(&self, name: &str, direction: Direction) -> Result<(), crate::error::Error> {
        let ports = match direction {
            Direction::Input => &self.0.input_ports,
            Direction::Output => &self.0.output_ports,
        };
        let mut ports = ports.lock().expect("poisoned");
        let idx = ports
            .iter()
            .position(|p| p.name() == name)
            .ok_or_else(|| crate::error::Error::other(format!("no such port {name:?}")))?;
        if ports[idx].is_connected() {
            return Err(crate::error::Error::PortIsConnected);
        }
        ports.remove(idx);
        Ok(())
    }

    pub fn is_initialized(&self) -> bool {
        *self.0.initialized.lock().expect("poisoned")
    }

    pub(crate) fn mark_initialized(&self) {
        *self.0.initialized.lock().expect("poisoned") = true;
    }

    pub fn ptr_eq(&self, other: &Component) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl std::fmt::Debug for Component {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Component")
            .field("name", &self.0.name)
            .field("kind", &self.kind())
            .finish()
    }
}

// Ports need a weak handle back to their owning component's Arc, so Port
// construction lives here alongside ComponentInner's definition; see
// `graph::port::Port::new`'s `Weak<ComponentInner>` parameter.
pub(crate) fn downgrade(component: &Component) -> Weak<ComponentInner> {
    Arc::downgrade(&component.0)
}
