//! Tick-synchronized client/server state replication.
//!
//! The [`Server`] owns an authoritative [`Room`] of entities and advances it
//! one tick per [`Server::update`]. On send ticks it snapshots the world,
//! keeps the snapshot in a bounded history and sends every peer the entities
//! its [`Scope`](scope::Scope) selects, delta-compressed against the newest
//! tick that peer acknowledged. Reliable events ride along until the remote
//! acknowledges them.
//!
//! The [`Client`] applies those packets to a [`ClientRoom`], follows the
//! server clock, and sends events plus per-tick commands for the entities
//! it controls.
//!
//! Both sides poll a [`Transport`] from inside `update()`; nothing blocks and
//! inbound decode failures are logged and dropped.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//!
//! use schema::{FieldCodec, FieldDef, FieldId, Registry, TypeDef, TypeKind};
//! use ticksync::{ChannelTransport, Client, Inert, Server, SyncConfig};
//!
//! let kind = TypeKind::new(1).unwrap();
//! let registry = Arc::new(
//!     Registry::builder()
//!         .state(
//!             TypeDef::new(kind)
//!                 .field(FieldDef::new(FieldId::new(1).unwrap(), FieldCodec::uint(8))),
//!         )
//!         .build()
//!         .unwrap(),
//! );
//!
//! let mut server = Server::new(registry.clone(), SyncConfig::for_testing()).unwrap();
//! let mut client = Client::new(registry, SyncConfig::for_testing()).unwrap();
//! let (server_end, client_end) = ChannelTransport::pair();
//! server.add_peer(server_end);
//! client.start_room();
//! client.set_peer(client_end);
//!
//! let state = server.create_state(kind).unwrap();
//! let entity = server.create_entity(state, Inert);
//! let id = server.add_entity(entity);
//!
//! server.update();
//! client.update();
//! assert!(client.room().unwrap().entity(id).is_some());
//! ```

mod client;
mod config;
mod controller;
mod entity;
mod error;
mod peer;
mod room;
mod server;
mod transport;

pub use client::{Client, ClientNotification};
pub use config::SyncConfig;
pub use controller::Controller;
pub use entity::{Entity, EntityLogic, Inert};
pub use error::{Error, Result, TransportError};
pub use peer::{Peer, PeerId};
pub use room::{ClientRoom, RemoteEntity, Room, RoomHooks};
pub use server::{Server, ServerNotification};
pub use transport::{ChannelTransport, Transport};

pub use codec::{Attempts, Command, EntityId, Event, EventId, Snapshot, State, StateDelta, Tick};
