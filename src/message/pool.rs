//! Per-graph message pools (spec.md §4.6: "The graph owns one pool per
//! 'hot' message variant").

use crate::ir::clock::ClockSnapshot;
use crate::ir::trace::{Event, Packet, Stream};
use crate::message::{Message, MessageData, MessageKind};
use crate::object::ObjectPool;

const POOL_CAPACITY: usize = 64;

/// One recycling pool per hot message variant, owned by the graph.
/// Cold variants (`StreamBeginning`, `StreamEnd`, `MessageIteratorInactivity`,
/// discard counters) carry no per-message instance tree worth pooling and
/// are allocated directly via [`ObjectPool::create`] against a zero-capacity
/// pool, which degenerates to a plain allocation on every call.
pub struct MessagePools {
    event: ObjectPool<MessageData>,
    packet_beginning: ObjectPool<MessageData>,
    packet_end: ObjectPool<MessageData>,
    cold: ObjectPool<MessageData>,
}

impl MessagePools {
    pub fn new() -> Self {
        MessagePools {
            event: ObjectPool::new(POOL_CAPACITY),
            packet_beginning: ObjectPool::new(POOL_CAPACITY),
            packet_end: ObjectPool::new(POOL_CAPACITY),
            cold: ObjectPool::new(0),
        }
    }

    fn fill(pool: &ObjectPool<MessageData>, kind: MessageKind) -> Message {
        let mut msg = pool.create(MessageData::default);
        if let Some(data) = msg.get_mut() {
            data.fill_kind(kind);
        }
        msg
    }

    pub fn stream_beginning(&self, stream: Stream, default_cs: Option<ClockSnapshot>) -> Message {
        Self::fill(&self.cold, MessageKind::StreamBeginning { stream, default_cs })
    }

    pub fn stream_end(&self, stream: Stream, default_cs: Option<ClockSnapshot>) -> Message {
        Self::fill(&self.cold, MessageKind::StreamEnd { stream, default_cs })
    }

    pub fn packet_beginning(&self, packet: Packet, default_cs: Option<ClockSnapshot>) -> Message {
        Self::fill(
            &self.packet_beginning,
            MessageKind::PacketBeginning { packet, default_cs },
        )
    }

    pub fn packet_end(&self, packet: Packet, default_cs: Option<ClockSnapshot>) -> Message {
        Self::fill(&self.packet_end, MessageKind::PacketEnd { packet, default_cs })
    }

    pub fn event(&self, event: Event, default_cs: Option<ClockSnapshot>) -> Message {
        Self::fill(&self.event, MessageKind::Event { event, default_cs })
    }

    pub fn iterator_inactivity(&self, cs: ClockSnapshot) -> Message {
        Self::fill(&self.cold, MessageKind::MessageIteratorInactivity { cs })
    }

    pub fn discarded_events(
        &self,
        stream: Stream,
        count: Option<u64>,
        begin_cs: Option<ClockSnapshot>,
        end_cs: Option<ClockSnapshot>,
    ) -> Message {
        Self::fill(
            &self.cold,
            MessageKind::DiscardedEvents {
                stream,
                count,
                begin_cs,
                end_cs,
            },
        )
    }

    pub fn discarded_packets(
        &self,
        stream: Stream,
        count: Option<u64>,
        begin_cs: Option<ClockSnapshot>,
        end_cs: Option<ClockSnapshot>,
    ) -> Message {
        Self::fill(
            &self.cold,
            MessageKind::DiscardedPackets {
                stream,
                count,
                begin_cs,
                end_cs,
            },
        )
    }
}

impl Default for MessagePools {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::stream_class::StreamClassBuilder;
    use crate::ir::trace_class::TraceClass;
    use crate::types::{StreamClassId, StreamId};

    #[test]
    fn event_pool_recycles() {
        let pools = MessagePools::new();
        let tc = TraceClass::new(true);
        let sc = StreamClassBuilder::new(StreamClassId(0)).build();
        tc.add_stream_class(sc.clone()).unwrap();
        let trace = crate::ir::trace::Trace::new(tc);
        let stream = trace.create_stream(sc, StreamId(0)).unwrap();

        assert_eq!(pools.packet_beginning.len(), 0);
        {
            let packet = stream.create_packet();
            let _msg = pools.packet_beginning(packet, None);
        }
        assert_eq!(pools.packet_beginning.len(), 1);
    }
}
