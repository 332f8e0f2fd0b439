//! Test/harness-only sink (`SPEC_FULL.md` §3 REDESIGN FLAGS): a
//! synchronous drain sink for wiring up a graph from test code without
//! writing a bespoke sink each time.
//!
//! Grounded on
//! `original_source/lib/graph/component-class-sink-colander.c`: a sink
//! with a single input port that, once connected, creates its upstream
//! message iterator, and on each `consume` copies whatever `next` yields
//! out to the caller (there: a caller-owned notification array and
//! count; here: a shared `Vec<Message>`). The whole module compiles only
//! under `cfg(any(test, feature = "testing"))` since it's harness
//! tooling, not a production sink.

#![cfg(any(test, feature = "testing"))]

use crate::error::GraphError;
use crate::graph::component::{Component, ComponentClass, ComponentKind};
use crate::graph::iterator::MessageIterator;
use crate::graph::port::{Direction, Port};
use crate::message::Message;
use crate::value::Value;
use std::sync::{Arc, Mutex};

/// A sink that drains its single `"in"` port and appends every message it
/// pulls to a shared, caller-owned buffer, in order, across its lifetime.
pub struct ColanderSink {
    drained: Arc<Mutex<Vec<Message>>>,
    iterator: Mutex<Option<MessageIterator>>,
}

impl ColanderSink {
    /// `drained` receives every message this sink consumes from upstream.
    pub fn new(drained: Arc<Mutex<Vec<Message>>>) -> Arc<Self> {
        Arc::new(ColanderSink {
            drained,
            iterator: Mutex::new(None),
        })
    }
}

impl ComponentClass for ColanderSink {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Sink
    }

    fn initialize(&self, comp: &Component, _params: &Value) -> Result<(), GraphError> {
        comp.add_port(Direction::Input, "in")
            .map_err(GraphError::Error)?;
        Ok(())
    }

    /// Mirrors `colander_port_connected`: as soon as the input port gets a
    /// connection, build the iterator that pulls it.
    fn input_port_connected(&self, comp: &Component, port: &Port) {
        let Some(graph) = comp.graph() else { return };
        let connection = graph
            .connections()
            .into_iter()
            .find(|c| c.downstream_port().is_some_and(|p| p.ptr_eq(port)));
        let Some(connection) = connection else { return };
        if let Ok(iter) = graph.create_message_iterator(&connection) {
            *self.iterator.lock().expect("poisoned") = Some(iter);
        }
    }

    /// Mirrors `colander_consume`: without an upstream iterator yet,
    /// report no progress instead of erroring.
    fn consume(&self, _comp: &Component) -> Result<(), GraphError> {
        let iter = self.iterator.lock().expect("poisoned").clone();
        let Some(iter) = iter else {
            return Err(GraphError::Again);
        };
        let mut batch = Vec::new();
        iter.next(&mut batch)?;
        self.drained.lock().expect("poisoned").extend(batch);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{ComponentKind as CK, Graph, MessageIteratorClass};
    use crate::message::{MessageData, MessageKind};
    use crate::object::ObjectPool;

    struct OneShotSource;

    impl ComponentClass for OneShotSource {
        fn kind(&self) -> ComponentKind {
            CK::Source
        }

        fn initialize(&self, comp: &Component, _params: &Value) -> Result<(), GraphError> {
            comp.add_port(Direction::Output, "out")
                .map_err(GraphError::Error)?;
            Ok(())
        }

        fn message_iterator_init(
            &self,
            _comp: &Component,
            _port: &Port,
        ) -> Result<Box<dyn MessageIteratorClass>, GraphError> {
            Ok(Box::new(OneShotIterator { emitted: false }))
        }
    }

    struct OneShotIterator {
        emitted: bool,
    }

    impl MessageIteratorClass for OneShotIterator {
        fn next(&mut self, batch: &mut Vec<Message>) -> Result<(), GraphError> {
            if self.emitted {
                return Err(GraphError::End);
            }
            self.emitted = true;
            let pool: ObjectPool<MessageData> = ObjectPool::new(1);
            batch.push(pool.create(MessageData::default));
            Ok(())
        }
    }

    #[test]
    fn colander_drains_messages_into_the_shared_buffer() {
        let graph = Graph::new();
        let source = graph
            .add_component(Arc::new(OneShotSource), "source", &Value::null())
            .unwrap();
        let drained = Arc::new(Mutex::new(Vec::new()));
        let sink = graph
            .add_component(ColanderSink::new(drained.clone()), "sink", &Value::null())
            .unwrap();
        graph
            .connect(&source.output_port("out").unwrap(), &sink.input_port("in").unwrap())
            .unwrap();

        assert!(graph.run_once().is_ok());
        assert_eq!(drained.lock().unwrap().len(), 1);
        assert!(matches!(
            drained.lock().unwrap()[0].kind(),
            MessageKind::Unset
        ));
    }
}
