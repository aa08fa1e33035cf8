use std::sync::Arc;

use codec::{ClientPacket, Command, PacketCodec, PacketHeader};
use schema::{FieldCodec, FieldDef, FieldId, FieldValue, Registry, TypeDef, TypeKind};
use ticksync::{
    Attempts, ChannelTransport, Client, ClientNotification, EntityId, Event, EventId, Inert,
    Server, ServerNotification, State, SyncConfig, Tick, Transport,
};

fn unit() -> TypeKind {
    TypeKind::new(1).unwrap()
}

fn chat() -> TypeKind {
    TypeKind::new(1).unwrap()
}

fn registry() -> Arc<Registry> {
    Arc::new(
        Registry::builder()
            .state(
                TypeDef::new(unit())
                    .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::uint(16)))
                    .field(FieldDef::new(FieldId::new(2).unwrap(), FieldCodec::bool())),
            )
            .event(
                TypeDef::new(chat())
                    .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::uint(16))),
            )
            .command(
                TypeDef::new(TypeKind::new(1).unwrap())
                    .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::uint(16))),
            )
            .build()
            .unwrap(),
    )
}

fn message(value: u64) -> Event {
    Event::new(chat(), vec![FieldValue::UInt(value)])
}

fn connect(server: &mut Server, loss: f32, seed: u64) -> (ticksync::PeerId, Client) {
    let (server_end, client_end) = ChannelTransport::pair();
    let peer = server.add_peer(server_end.with_loss(loss, seed));
    let mut client = Client::new(server.registry().clone(), SyncConfig::for_testing()).unwrap();
    client.start_room();
    client.set_peer(client_end.with_loss(loss, seed.wrapping_add(1)));
    (peer, client)
}

fn step(server: &mut Server, clients: &mut [&mut Client]) {
    server.update();
    for client in clients.iter_mut() {
        client.update();
    }
}

/// Moves while tick < `until`, then holds still.
fn mover(step: u64, until: u32) -> impl FnMut(Tick, &mut State, Option<&Command>) + Send {
    move |tick: Tick, state: &mut State, _: Option<&Command>| {
        if tick.raw() < until {
            let value = (u64::from(tick.raw()) * step) % 65_536;
            state.set(0, FieldValue::UInt(value));
        }
    }
}

#[test]
fn client_converges_over_lossy_link() {
    let mut server = Server::new(registry(), SyncConfig::for_testing()).unwrap();
    let (_, mut client) = connect(&mut server, 0.3, 11);

    let mut ids = Vec::new();
    for k in 1..=6 {
        let state = server.create_state(unit()).unwrap();
        let entity = server.create_entity(state, mover(k, 150));
        ids.push(server.add_entity(entity));
    }

    for tick in 0..250 {
        if tick == 60 {
            assert!(server.remove_entity(ids[2]));
        }
        if tick == 80 {
            let state = server.create_state(unit()).unwrap();
            let entity = server.create_entity(state, mover(7, 150));
            ids.push(server.add_entity(entity));
        }
        step(&mut server, &mut [&mut client]);
    }

    let room = client.room().unwrap();
    assert!(room.entity(ids[2]).is_none());
    assert_eq!(room.len(), server.room().len());
    for entity in server.room().entities() {
        let remote = room
            .entity(entity.id())
            .unwrap_or_else(|| panic!("entity {} missing on client", entity.id()));
        assert_eq!(remote.state(), entity.state());
    }
}

#[test]
fn forever_events_arrive_once_in_order_both_ways() {
    let mut server = Server::new(registry(), SyncConfig::for_testing()).unwrap();
    let (peer, mut client) = connect(&mut server, 0.4, 99);

    let mut to_client = Vec::new();
    let mut to_server = Vec::new();
    for tick in 0..300u64 {
        if tick < 60 {
            server.queue_event(peer, message(tick), Some(Attempts::Forever));
            client.queue_event(message(1000 + tick), Some(Attempts::Forever));
        }
        step(&mut server, &mut [&mut client]);

        for notification in server.drain_notifications() {
            if let ServerNotification::EventReceived { event, .. } = notification {
                to_server.push(event.fields[0].as_u64().unwrap());
            }
        }
        for notification in client.drain_notifications() {
            if let ClientNotification::EventReceived(event) = notification {
                to_client.push(event.fields[0].as_u64().unwrap());
            }
        }
    }

    assert_eq!(to_client, (0..60).collect::<Vec<_>>());
    assert_eq!(to_server, (1000..1060).collect::<Vec<_>>());
    assert_eq!(server.peer(peer).unwrap().pending_events(), 0);
    assert_eq!(client.peer().unwrap().pending_events(), 0);
}

#[test]
fn limited_events_are_never_duplicated() {
    let mut server = Server::new(registry(), SyncConfig::for_testing()).unwrap();
    let (peer, mut client) = connect(&mut server, 0.5, 5);

    for value in 0..40 {
        server.queue_event(peer, message(value), Some(Attempts::Limited(2)));
    }
    let mut received = Vec::new();
    for _ in 0..100 {
        step(&mut server, &mut [&mut client]);
        for notification in client.drain_notifications() {
            if let ClientNotification::EventReceived(event) = notification {
                received.push(event.fields[0].as_u64().unwrap());
            }
        }
    }
    assert!(received.windows(2).all(|pair| pair[0] < pair[1]));
}

#[test]
fn disconnect_releases_controlled_entities() {
    let mut server = Server::new(registry(), SyncConfig::for_testing()).unwrap();
    let (a, mut client_a) = connect(&mut server, 0.0, 1);
    let (b, mut client_b) = connect(&mut server, 0.0, 2);

    let e1 = {
        let state = server.create_state(unit()).unwrap();
        let entity = server.create_entity(state, Inert);
        server.add_entity(entity)
    };
    let e2 = {
        let state = server.create_state(unit()).unwrap();
        let entity = server.create_entity(state, Inert);
        server.add_entity(entity)
    };
    server.grant_control(b, e1);
    server.grant_control(a, e2);
    step(&mut server, &mut [&mut client_a, &mut client_b]);
    assert_eq!(server.room().entity(e2).unwrap().controller(), Some(a));
    server.drain_notifications();

    drop(client_a);
    step(&mut server, &mut [&mut client_b]);

    assert_eq!(
        server.drain_notifications(),
        vec![ServerNotification::PeerRemoved(a)]
    );
    assert_eq!(server.room().entity(e2).unwrap().controller(), None);
    assert!(server
        .room()
        .controllers()
        .all(|controller| !controller.controls(e2)));
    assert_eq!(server.room().entity(e1).unwrap().controller(), Some(b));

    // E2 can be handed to the remaining peer
    server.grant_control(b, e2);
    assert_eq!(server.room().controller(b).unwrap().len(), 2);
}

#[test]
fn commands_drive_controlled_entity() {
    let mut server = Server::new(registry(), SyncConfig::for_testing()).unwrap();
    let (peer, mut client) = connect(&mut server, 0.0, 3);

    let state = server.create_state(unit()).unwrap();
    let entity = server.create_entity(
        state,
        |_: Tick, state: &mut State, command: Option<&Command>| {
            if let Some(command) = command {
                state.set(0, command.fields[0]);
            }
        },
    );
    let id = server.add_entity(entity);
    server.grant_control(peer, id);

    step(&mut server, &mut [&mut client]);
    let controlled: Vec<EntityId> = client.room().unwrap().controlled_entities().collect();
    assert_eq!(controlled, vec![id]);

    client.set_command(id, vec![FieldValue::UInt(4242)]).unwrap();
    for _ in 0..4 {
        step(&mut server, &mut [&mut client]);
    }
    assert_eq!(
        server.room().entity(id).unwrap().state().get(0),
        Some(&FieldValue::UInt(4242))
    );
    assert_eq!(
        client.room().unwrap().entity(id).unwrap().state().get(0),
        Some(&FieldValue::UInt(4242))
    );
}

#[test]
fn commands_from_other_peers_are_ignored() {
    let registry = registry();
    let mut server = Server::new(registry.clone(), SyncConfig::for_testing()).unwrap();
    let (owner_end, _owner) = ChannelTransport::pair();
    let (intruder_end, mut intruder) = ChannelTransport::pair();
    let owner = server.add_peer(owner_end);
    server.add_peer(intruder_end);

    let state = server.create_state(unit()).unwrap();
    let entity = server.create_entity(state, Inert);
    let id = server.add_entity(entity);
    server.grant_control(owner, id);

    let codec = PacketCodec::new(registry).unwrap();
    let mut packet = ClientPacket::new(PacketHeader::new(
        Tick::START,
        Tick::INVALID,
        EventId::INVALID,
    ));
    packet.commands.push(Command {
        entity: id,
        tick: Tick::START,
        fields: vec![FieldValue::UInt(7)],
    });
    intruder.send(&codec.encode_client(&packet).unwrap()).unwrap();
    server.update();

    assert!(server.room().entity(id).unwrap().command().is_none());
}

#[test]
fn scope_filters_entities_per_peer() {
    use scope::{FnEvaluator, ScopeContext};

    let mut server = Server::new(registry(), SyncConfig::for_testing()).unwrap();
    let (peer, mut client) = connect(&mut server, 0.0, 8);

    let mut ids = Vec::new();
    for _ in 0..4 {
        let state = server.create_state(unit()).unwrap();
        let entity = server.create_entity(state, Inert);
        ids.push(server.add_entity(entity));
    }
    let visible = ids[1];
    server.set_scope_evaluator(
        peer,
        FnEvaluator::new(move |_: &ScopeContext<'_>, entity: EntityId, _, _| {
            (entity == visible).then_some(1.0)
        }),
    );

    for _ in 0..3 {
        step(&mut server, &mut [&mut client]);
    }
    let seen: Vec<EntityId> = client.room().unwrap().entities().map(|(id, _)| id).collect();
    assert_eq!(seen, vec![visible]);

    // leaving scope removes the entity from the client
    server.set_scope_evaluator(
        peer,
        FnEvaluator::new(|_: &ScopeContext<'_>, _: EntityId, _, _| None),
    );
    for _ in 0..3 {
        step(&mut server, &mut [&mut client]);
    }
    assert!(client.room().unwrap().is_empty());
    assert!(client
        .drain_notifications()
        .contains(&ClientNotification::EntityRemoved(visible)));
}

#[test]
fn oversized_event_does_not_block_later_events() {
    let bulk = TypeKind::new(2).unwrap();
    let registry = Arc::new(
        Registry::builder()
            .state(
                TypeDef::new(unit())
                    .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::uint(16))),
            )
            .event(
                TypeDef::new(chat())
                    .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::uint(16))),
            )
            .event((1..=100).fold(TypeDef::new(bulk), |def, id| {
                def.field(FieldDef::new(FieldId::new(id).unwrap(), FieldCodec::uint(64)))
            }))
            .build()
            .unwrap(),
    );
    let mut server = Server::new(registry, SyncConfig::for_testing()).unwrap();
    let (peer, mut client) = connect(&mut server, 0.0, 21);

    let oversized = Event::new(bulk, vec![FieldValue::UInt(u64::MAX); 100]);
    server.queue_event(peer, oversized, Some(Attempts::Limited(3)));
    server.queue_event(peer, message(7), Some(Attempts::Limited(3)));

    let mut received = Vec::new();
    for _ in 0..50 {
        step(&mut server, &mut [&mut client]);
        for notification in client.drain_notifications() {
            if let ClientNotification::EventReceived(event) = notification {
                received.push(event);
            }
        }
    }
    assert_eq!(received, vec![Event { id: EventId::new(2), ..message(7) }]);
    assert_eq!(server.peer(peer).unwrap().pending_events(), 0);
}
