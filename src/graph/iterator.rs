//! Message iterator state machine (spec.md §3 "MessageIterator", §4.7,
//! module G).

use crate::graph::component::{Component, ComponentInner};
use crate::graph::connection::ConnectionInner;
use crate::graph::port::PortInner;
use crate::error::GraphError;
use crate::message::Message;
use crate::types::Interruptor;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, Weak};

/// The per-connection vtable a source/filter supplies (spec.md §3
/// "vtable of {next, seek-ns-from-origin?, seek-beginning?,
/// can-seek-ns-from-origin?, can-seek-beginning?}").
pub trait MessageIteratorClass: Send {
    /// Must produce 1..=`batch.capacity()` messages into `batch` on `Ok`.
    fn next(&mut self, batch: &mut Vec<Message>) -> Result<(), GraphError>;

    fn finalize(&mut self) {}

    fn can_seek_beginning(&self) -> bool {
        false
    }

    fn seek_beginning(&mut self) -> Result<(), GraphError> {
        Err(GraphError::Unsupported)
    }

    fn can_seek_ns_from_origin(&self) -> bool {
        false
    }

    fn seek_ns_from_origin(&mut self, _ns: i64) -> Result<(), GraphError> {
        Err(GraphError::Unsupported)
    }

    /// A class without native seek support must still be able to
    /// "finalize and re-initialize" for the auto-seek fallback (spec.md
    /// §4.7). This re-creates the class's internal cursor at its natural
    /// beginning; the default assumes `next` alone is stateless-restartable
    /// and simply reports success, which is correct for classes that have
    /// no state to reset.
    fn restart_for_auto_seek(&mut self) -> Result<(), GraphError> {
        Ok(())
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Debug)]
pub enum IteratorState {
    NonInitialized,
    Active,
    Ended,
    Finalizing,
    Finalized,
    Seeking,
    LastSeekReturnedAgain,
    LastSeekReturnedError,
}

const BATCH_CAPACITY: usize = 16;

struct IteratorInner {
    #[allow(dead_code)]
    upstream_component: Weak<ComponentInner>,
    #[allow(dead_code)]
    upstream_port: Weak<PortInner>,
    #[allow(dead_code)]
    connection: Weak<ConnectionInner>,
    cancel: Interruptor,
    state: Mutex<IteratorState>,
    class: Mutex<Box<dyn MessageIteratorClass>>,
    /// Messages buffered by the auto-seek drain fallback, presented to
    /// the caller before the class's `next` is invoked again.
    pending: Mutex<VecDeque<Message>>,
}

/// A pull-based cursor exposing `next`/seek operations over a connection
/// (spec.md §4.7). Strong-owns its graph to guarantee the message pools
/// it draws from outlive any message it has produced (spec.md §3).
#[derive(Clone)]
pub struct MessageIterator(Arc<IteratorInner>);

impl MessageIterator {
    pub(crate) fn new(
        upstream_component: Weak<ComponentInner>,
        upstream_port: Weak<PortInner>,
        connection: Weak<ConnectionInner>,
        cancel: Interruptor,
        class: Box<dyn MessageIteratorClass>,
    ) -> Self {
        MessageIterator(Arc::new(IteratorInner {
            upstream_component,
            upstream_port,
            connection,
            cancel,
            state: Mutex::new(IteratorState::NonInitialized),
            class: Mutex::new(class),
            pending: Mutex::new(VecDeque::new()),
        }))
    }

    pub fn state(&self) -> IteratorState {
        *self.0.state.lock().expect("poisoned")
    }

    fn set_state(&self, s: IteratorState) {
        *self.0.state.lock().expect("poisoned") = s;
    }

    /// spec.md §4.7 `next` contract.
    pub fn next(&self, out: &mut Vec<Message>) -> Result<(), GraphError> {
        out.clear();

        if self.0.cancel.is_set() {
            return Err(GraphError::Canceled);
        }

        if self.state() == IteratorState::Ended {
            return Err(GraphError::End);
        }

        {
            let mut pending = self.0.pending.lock().expect("poisoned");
            if !pending.is_empty() {
                out.extend(pending.drain(..));
                return Ok(());
            }
        }

        if self.state() == IteratorState::NonInitialized {
            self.set_state(IteratorState::Active);
        }

        let mut batch = Vec::with_capacity(BATCH_CAPACITY);
        let result = self.0.class.lock().expect("poisoned").next(&mut batch);
        match result {
            Ok(()) => {
                *out = batch;
                Ok(())
            }
            Err(GraphError::Again) => Err(GraphError::Again),
            Err(GraphError::End) => {
                self.set_state(IteratorState::Ended);
                Err(GraphError::End)
            }
            Err(other) => {
                self.set_state(IteratorState::Finalizing);
                Err(other)
            }
        }
    }

    pub fn finalize(&self) {
        if self.state() == IteratorState::Finalized {
            return;
        }
        self.set_state(IteratorState::Finalizing);
        self.0.class.lock().expect("poisoned").finalize();
        self.set_state(IteratorState::Finalized);
    }

    pub fn can_seek_beginning(&self) -> bool {
        self.0.class.lock().expect("poisoned").can_seek_beginning()
    }

    pub fn can_seek_ns_from_origin(&self) -> bool {
        self.0.class.lock().expect("poisoned").can_seek_ns_from_origin()
    }

    /// `seek_beginning`, with the native-unsupported auto-seek fallback:
    /// restart the class at its natural beginning (spec.md §4.7).
    pub fn seek_beginning(&self) -> Result<(), GraphError> {
        self.set_state(IteratorState::Seeking);
        let mut class = self.0.class.lock().expect("poisoned");
        let result = if class.can_seek_beginning() {
            class.seek_beginning()
        } else {
            class.restart_for_auto_seek()
        };
        drop(class);
        self.0.pending.lock().expect("poisoned").clear();
        match &result {
            Ok(()) => self.set_state(IteratorState::Active),
            Err(GraphError::Again) => self.set_state(IteratorState::LastSeekReturnedAgain),
            Err(_) => self.set_state(IteratorState::LastSeekReturnedError),
        }
        result
    }

    /// `seek_ns_from_origin`, with the native-unsupported auto-seek
    /// fallback: restart at the beginning, then drain and discard
    /// messages strictly before `ns`, buffering the first at-or-after
    /// `ns` (and everything pulled alongside it in the same batch) for
    /// the next `next()` call. Per spec.md §9's Open Question resolution,
    /// a message with no default clock snapshot encountered while
    /// draining fails the seek (stricter than the original's permissive
    /// draining).
    pub fn seek_ns_from_origin(&self, ns: i64) -> Result<(), GraphError> {
        self.set_state(IteratorState::Seeking);
        let can_native = self.0.class.lock().expect("poisoned").can_seek_ns_from_origin();
        if can_native {
            let result = self.0.class.lock().expect("poisoned").seek_ns_from_origin(ns);
            match &result {
                Ok(()) => self.set_state(IteratorState::Active),
                Err(GraphError::Again) => self.set_state(IteratorState::LastSeekReturnedAgain),
                Err(_) => self.set_state(IteratorState::LastSeekReturnedError),
            }
            return result;
        }

        if let Err(e) = self.seek_beginning() {
            return Err(e);
        }

        let mut kept = VecDeque::new();
        loop {
            let mut batch = Vec::with_capacity(BATCH_CAPACITY);
            match self.0.class.lock().expect("poisoned").next(&mut batch) {
                Ok(()) => {
                    if batch.is_empty() {
                        break;
                    }
                    for msg in batch {
                        let cs_ns = message_default_cs_ns(&msg);
                        match cs_ns {
                            Some(Ok(msg_ns)) if msg_ns < ns => continue,
                            Some(Ok(_)) => kept.push_back(msg),
                            Some(Err(_)) => {
                                self.set_state(IteratorState::LastSeekReturnedError);
                                return Err(GraphError::Overflow);
                            }
                            None => {
                                self.set_state(IteratorState::LastSeekReturnedError);
                                return Err(GraphError::Unsupported);
                            }
                        }
                    }
                    if !kept.is_empty() {
                        break;
                    }
                }
                Err(GraphError::End) => {
                    self.set_state(IteratorState::Ended);
                    break;
                }
                Err(GraphError::Again) => continue,
                Err(e) => {
                    self.set_state(IteratorState::LastSeekReturnedError);
                    return Err(e);
                }
            }
        }
        *self.0.pending.lock().expect("poisoned") = kept;
        self.set_state(IteratorState::Active);
        Ok(())
    }
}

/// Reads a message's default clock snapshot's ns-from-origin, if any.
fn message_default_cs_ns(msg: &Message) -> Option<Result<i64, GraphError>> {
    use crate::message::MessageKind;
    let cs = match msg.kind() {
        MessageKind::StreamBeginning { default_cs, .. }
        | MessageKind::StreamEnd { default_cs, .. }
        | MessageKind::PacketBeginning { default_cs, .. }
        | MessageKind::PacketEnd { default_cs, .. }
        | MessageKind::Event { default_cs, .. } => default_cs.as_ref(),
        MessageKind::MessageIteratorInactivity { cs } => Some(cs),
        MessageKind::DiscardedEvents { begin_cs, .. } | MessageKind::DiscardedPackets { begin_cs, .. } => {
            begin_cs.as_ref()
        }
        MessageKind::Unset => None,
    };
    cs.map(|cs| cs.ns_from_origin())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::{MessageData, MessageKind};
    use crate::object::ObjectPool;

    struct CountingClass {
        remaining: i32,
    }

    impl MessageIteratorClass for CountingClass {
        fn next(&mut self, batch: &mut Vec<Message>) -> Result<(), GraphError> {
            if self.remaining <= 0 {
                return Err(GraphError::End);
            }
            self.remaining -= 1;
            let pool: ObjectPool<MessageData> = ObjectPool::new(1);
            let msg = pool.create(MessageData::default);
            batch.push(msg);
            Ok(())
        }
    }

    fn make_iterator(remaining: i32) -> MessageIterator {
        MessageIterator::new(
            Weak::new(),
            Weak::new(),
            Weak::new(),
            Interruptor::new(),
            Box::new(CountingClass { remaining }),
        )
    }

    #[test]
    fn terminality_after_end() {
        let iter = make_iterator(1);
        let mut out = Vec::new();
        assert!(iter.next(&mut out).is_ok());
        assert_eq!(iter.next(&mut out).unwrap_err().is_end(), true);
        assert_eq!(iter.next(&mut out).unwrap_err().is_end(), true);
        assert_eq!(iter.state(), IteratorState::Ended);
    }

    #[test]
    fn cancellation_is_sticky() {
        let iter = make_iterator(5);
        let cancel = iter.0.cancel.clone();
        cancel.set();
        let mut out = Vec::new();
        assert!(iter.next(&mut out).unwrap_err().is_canceled());
        assert!(iter.next(&mut out).unwrap_err().is_canceled());
    }

    #[test]
    fn unset_message_has_no_default_cs() {
        assert!(message_default_cs_ns(&{
            let pool: ObjectPool<MessageData> = ObjectPool::new(1);
            pool.create(MessageData::default)
        })
        .is_none());
        let _ = MessageKind::Unset;
    }
}
