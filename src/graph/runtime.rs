//! Graph runtime (spec.md §3 "Graph", §4.8, §5, module H).

use crate::error::Error;
use crate::graph::component::{Component, ComponentClass, ComponentKind};
use crate::graph::connection::Connection;
use crate::graph::iterator::MessageIterator;
use crate::graph::port::{Direction, Port};
use crate::message::MessagePools;
use crate::types::Interruptor;
use crate::value::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering::SeqCst};
use std::sync::{Arc, Mutex, Weak};

pub type PortListener = Box<dyn Fn(&Component, &Port) + Send + Sync>;

struct SinkEntry {
    component: Component,
    configured: bool,
}

pub(crate) struct GraphInner {
    components: Mutex<Vec<Component>>,
    connections: Mutex<Vec<Connection>>,
    sinks: Mutex<VecDeque<SinkEntry>>,
    canceled: Interruptor,
    has_sink: AtomicBool,
    can_consume: AtomicBool,
    message_pools: MessagePools,
    port_connected_listeners: Mutex<Vec<PortListener>>,
    port_disconnected_listeners: Mutex<Vec<PortListener>>,
    dispatching: AtomicBool,
}

/// Single-threaded cooperative driver of a component/port/connection
/// topology (spec.md §4.8, §5). Cloning shares the same runtime state.
#[derive(Clone)]
pub struct Graph(Arc<GraphInner>);

impl Graph {
    pub fn new() -> Self {
        Graph(Arc::new(GraphInner {
            components: Mutex::new(Vec::new()),
            connections: Mutex::new(Vec::new()),
            sinks: Mutex::new(VecDeque::new()),
            canceled: Interruptor::new(),
            has_sink: AtomicBool::new(false),
            can_consume: AtomicBool::new(false),
            message_pools: MessagePools::new(),
            port_connected_listeners: Mutex::new(Vec::new()),
            port_disconnected_listeners: Mutex::new(Vec::new()),
            dispatching: AtomicBool::new(false),
        }))
    }

    pub fn message_pools(&self) -> &MessagePools {
        &self.0.message_pools
    }

    pub(crate) fn downgrade(&self) -> Weak<GraphInner> {
        Arc::downgrade(&self.0)
    }

    pub(crate) fn from_weak(weak: &Weak<GraphInner>) -> Option<Graph> {
        weak.upgrade().map(Graph)
    }

    pub fn cancel_flag(&self) -> Interruptor {
        self.0.canceled.clone()
    }

    pub fn can_consume(&self) -> bool {
        self.0.can_consume.load(SeqCst)
    }

    fn check_structural_mutation_allowed(&self) -> Result<(), Error> {
        if self.0.can_consume.load(SeqCst) {
            Err(Error::GraphIsConfigured)
        } else {
            Ok(())
        }
    }

    /// Allocates a component from `class`, invokes its `initialize`
    /// method, and adds it to the graph (spec.md §4.4). Rejected once the
    /// graph has started running.
    pub fn add_component(
        &self,
        class: Arc<dyn ComponentClass>,
        name: impl Into<String>,
        params: &Value,
    ) -> Result<Component, crate::error::Error> {
        self.check_structural_mutation_allowed()?;
        let kind = class.kind();
        let component = Component::new(class, name);
        component.set_graph(self);
        component
            .class()
            .initialize(&component, params)
            .map_err(|e| match e {
                crate::error::GraphError::Error(err) => err,
                other => crate::error::Error::other(other.to_string()),
            })?;
        component.mark_initialized();
        self.0.components.lock().expect("poisoned").push(component.clone());
        if kind == ComponentKind::Sink {
            self.0.has_sink.store(true, SeqCst);
            self.0.sinks.lock().expect("poisoned").push_back(SinkEntry {
                component: component.clone(),
                configured: false,
            });
        }
        Ok(component)
    }

    pub fn components(&self) -> Vec<Component> {
        self.0.components.lock().expect("poisoned").clone()
    }

    pub fn connections(&self) -> Vec<Connection> {
        self.0.connections.lock().expect("poisoned").clone()
    }

    pub fn add_port_connected_listener(&self, listener: PortListener) {
        self.0.port_connected_listeners.lock().expect("poisoned").push(listener);
    }

    pub fn add_port_disconnected_listener(&self, listener: PortListener) {
        self.0
            .port_disconnected_listeners
            .lock()
            .expect("poisoned")
            .push(listener);
    }

    fn owns_port(&self, port: &Port) -> bool {
        let Some(owner) = port.component_weak().upgrade() else {
            return false;
        };
        self.0
            .components
            .lock()
            .expect("poisoned")
            .iter()
            .any(|c| Arc::ptr_eq(&c.0, &owner))
    }

    fn component_for_port(&self, port: &Port) -> Option<Component> {
        let owner = port.component_weak().upgrade()?;
        self.0
            .components
            .lock()
            .expect("poisoned")
            .iter()
            .find(|c| Arc::ptr_eq(&c.0, &owner))
            .cloned()
    }

    /// `graph.connect(upstream_port, downstream_port)` (spec.md §4.5, §8
    /// property 4).
    pub fn connect(&self, upstream: &Port, downstream: &Port) -> Result<Connection, crate::error::Error> {
        self.check_structural_mutation_allowed()?;
        if self.0.dispatching.load(SeqCst) {
            return Err(Error::ListenerMutationDuringCallback);
        }
        if upstream.direction() != Direction::Output || downstream.direction() != Direction::Input {
            return Err(Error::ConnectionDirectionMismatch);
        }
        if upstream.is_connected() || downstream.is_connected() {
            return Err(Error::PortAlreadyConnected);
        }
        if !self.owns_port(upstream) || !self.owns_port(downstream) {
            return Err(Error::CrossGraphConnection);
        }

        let connection = Connection::new(upstream, downstream);
        upstream.set_connection(Arc::downgrade(&connection.0));
        downstream.set_connection(Arc::downgrade(&connection.0));
        self.0.connections.lock().expect("poisoned").push(connection.clone());

        if let Some(comp) = self.component_for_port(upstream) {
            comp.class().output_port_connected(&comp, upstream);
        }
        if let Some(comp) = self.component_for_port(downstream) {
            comp.class().input_port_connected(&comp, downstream);
        }
        self.dispatch_port_listeners(&self.0.port_connected_listeners, upstream, downstream);
        Ok(connection)
    }

    /// Tears down a connection: clears both ports' weak connection
    /// pointers, invokes disconnect callbacks, fires listeners (spec.md
    /// §4.5).
    pub fn disconnect(&self, connection: &Connection) -> Result<(), crate::error::Error> {
        if self.0.dispatching.load(SeqCst) {
            return Err(Error::ListenerMutationDuringCallback);
        }
        if let Some(p) = connection.upstream_port() {
            p.clear_connection();
        }
        if let Some(p) = connection.downstream_port() {
            p.clear_connection();
        }
        self.0
            .connections
            .lock()
            .expect("poisoned")
            .retain(|c| !c.ptr_eq(connection));
        if let (Some(up), Some(down)) = (connection.upstream_port(), connection.downstream_port()) {
            if let Some(comp) = self.component_for_port(&up) {
                comp.class().output_port_disconnected(&comp, &up);
            }
            if let Some(comp) = self.component_for_port(&down) {
                comp.class().input_port_disconnected(&comp, &down);
            }
            self.dispatch_port_listeners(&self.0.port_disconnected_listeners, &up, &down);
        }
        Ok(())
    }

    fn dispatch_port_listeners(&self, listeners: &Mutex<Vec<PortListener>>, upstream: &Port, downstream: &Port) {
        if self.0.dispatching.load(SeqCst) {
            return;
        }
        self.0.dispatching.store(true, SeqCst);
        for listener in listeners.lock().expect("poisoned").iter() {
            listener(
                &self.component_for_port(upstream).expect("upstream port owned by this graph"),
                upstream,
            );
            listener(
                &self.component_for_port(downstream).expect("downstream port owned by this graph"),
                downstream,
            );
        }
        self.0.dispatching.store(false, SeqCst);
    }

    /// Creates a message iterator pulling from `upstream_port` through
    /// `connection` (spec.md §3 "MessageIterator").
    pub fn create_message_iterator(
        &self,
        connection: &Connection,
    ) -> Result<MessageIterator, crate::error::Error> {
        let upstream_port = connection
            .upstream_port()
            .ok_or_else(|| Error::other("connection's upstream port is gone"))?;
        let upstream_component = self
            .component_for_port(&upstream_port)
            .ok_or_else(|| Error::other("upstream port's component is gone"))?;
        let class = upstream_component
            .class()
            .message_iterator_init(&upstream_component, &upstream_port)
            .map_err(|e| Error::other(e.to_string()))?;
        Ok(MessageIterator::new(
            crate::graph::component::downgrade(&upstream_component),
            Arc::downgrade(&upstream_port.0),
            Arc::downgrade(&connection.0),
            self.0.canceled.clone(),
            class,
        ))
    }

    /// spec.md §4.8 `run_once`.
    pub fn run_once(&self) -> Result<(), crate::error::GraphError> {
        use crate::error::GraphError;

        if self.0.canceled.is_set() {
            return Err(GraphError::Canceled);
        }

        let mut entry = match self.0.sinks.lock().expect("poisoned").pop_front() {
            Some(e) => e,
            None => return Err(GraphError::End),
        };

        if !entry.configured {
            if let Err(e) = entry.component.class().graph_is_configured(&entry.component) {
                return Err(e);
            }
            entry.configured = true;
            self.0.can_consume.store(true, SeqCst);
        }

        let result = entry.component.class().consume(&entry.component);
        match result {
            Ok(()) => {
                self.0.sinks.lock().expect("poisoned").push_back(entry);
                Ok(())
            }
            Err(GraphError::Again) => {
                self.0.sinks.lock().expect("poisoned").push_back(entry);
                Err(GraphError::Again)
            }
            Err(GraphError::End) => {
                let empty = self.0.sinks.lock().expect("poisoned").is_empty();
                if empty {
                    Err(GraphError::End)
                } else {
                    Ok(())
                }
            }
            Err(e) => Err(e),
        }
    }

    /// spec.md §4.8 `run`: loop `run_once` until a terminal code.
    pub fn run(&self) -> Result<(), crate::error::GraphError> {
        use crate::error::GraphError;
        loop {
            match self.run_once() {
                Ok(()) => continue,
                Err(GraphError::Again) => {
                    std::thread::yield_now();
                    continue;
                }
                terminal => return terminal,
            }
        }
    }

    /// Sets the cancel flag; callable from any thread (spec.md §4.8, §5).
    /// Sticky.
    pub fn cancel(&self) {
        self.0.canceled.set();
    }

    pub fn is_canceled(&self) -> bool {
        self.0.canceled.is_set()
    }

    pub fn has_sink(&self) -> bool {
        self.0.has_sink.load(SeqCst)
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new()
    }
}
