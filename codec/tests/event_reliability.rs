use std::sync::Arc;

use codec::{
    Attempts, ClientPacket, Event, EventReceiver, EventSender, PacketCodec, PacketHeader, Tick,
};
use schema::{FieldCodec, FieldDef, FieldId, FieldValue, Registry, TypeDef, TypeKind};

fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .event(
                TypeDef::new(TypeKind::new(3).unwrap())
                    .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::uint(16))),
            )
            .build()
            .unwrap(),
    )
}

fn event(seq: u64) -> Event {
    Event::new(TypeKind::new(3).unwrap(), vec![FieldValue::UInt(seq)])
}

fn seq(event: &Event) -> u64 {
    event.fields[0].as_u64().unwrap()
}

/// Drops packets on a fixed pattern in both directions.
fn lost(tick: u32, salt: u32) -> bool {
    (tick.wrapping_mul(7).wrapping_add(salt)) % 5 < 2
}

#[test]
fn forever_events_arrive_once_in_order_over_loss() {
    let registry = registry();
    let codec = PacketCodec::new(Arc::clone(&registry)).unwrap();
    let mut sender = EventSender::new();
    let mut receiver = EventReceiver::new();
    let mut delivered = Vec::new();

    let mut remote_ack_tick = Tick::INVALID;
    let mut pending_ack: Option<(Tick, codec::EventId)> = None;
    let budget = 3 * (1 + 16 + 16);
    let total = 40;

    for t in 0..400u32 {
        let tick = Tick::new(t);
        if t < total {
            sender.queue(event(u64::from(t)), Attempts::Forever);
        }

        if let Some((ack_tick, ack_id)) = pending_ack.take() {
            sender.integrate_ack(ack_tick, ack_id);
        }

        let mut packet = ClientPacket::new(PacketHeader::new(
            tick,
            remote_ack_tick,
            codec::EventId::INVALID,
        ));
        packet.events = sender.pack(tick, budget, &registry);
        let bytes = codec.encode_client(&packet).unwrap();

        if !lost(t, 0) {
            let decoded = codec.decode_client(&bytes).unwrap();
            delivered.extend(receiver.receive(decoded.events));
            remote_ack_tick = decoded.header.tick;
            if !lost(t, 3) {
                pending_ack = Some((remote_ack_tick, receiver.last_processed()));
            }
        }
    }

    let seqs: Vec<_> = delivered.iter().map(seq).collect();
    assert_eq!(seqs, (0..u64::from(total)).collect::<Vec<_>>());
    assert_eq!(sender.pending_len(), 0);
}

#[test]
fn limited_events_may_be_lost_but_never_duplicated() {
    let registry = registry();
    let mut sender = EventSender::new();
    let mut receiver = EventReceiver::new();
    let mut delivered = Vec::new();

    for t in 0..50u32 {
        if t < 10 {
            sender.queue(event(u64::from(t)), Attempts::Limited(2));
        }
        let events = sender.pack(Tick::new(t), usize::MAX, &registry);
        // every packet lost except on every fourth tick
        if t % 4 == 3 {
            delivered.extend(receiver.receive(events));
        }
    }

    let seqs: Vec<u64> = delivered.iter().map(seq).collect();
    assert!(seqs.windows(2).all(|w| w[0] < w[1]));
    assert!(seqs.len() < 10);
    assert_eq!(sender.pending_len(), 0);
}
