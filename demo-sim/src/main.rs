use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use clap::Parser;
use schema::{FieldCodec, FieldDef, FieldId, FieldValue, Registry, TypeDef, TypeKind};
use scope::{DistanceEvaluator, Origin, Vec3};
use serde::Serialize;
use ticksync::{
    Attempts, ChannelTransport, Client, ClientNotification, Command, EntityId, Event, Server,
    State, SyncConfig, Tick, Transport, TransportError,
};
use tracing::info;
use tracing_subscriber::EnvFilter;

const POS_SCALE: u32 = 100;
const POS_MIN: i64 = -100_000;
const POS_MAX: i64 = 100_000;
const VEL_SCALE: u32 = 100;
const VEL_MIN: i64 = -2_000;
const VEL_MAX: i64 = 2_000;

const FIELD_POS_X: usize = 0;
const FIELD_POS_Y: usize = 1;
const FIELD_VEL_X: usize = 2;
const FIELD_VEL_Y: usize = 3;
const FIELD_YAW: usize = 4;

#[derive(Parser)]
#[command(
    name = "demo-sim",
    version,
    about = "Replicates a small world from a server to clients over a lossy link"
)]
struct Cli {
    /// Number of clients, each controlling one player entity.
    #[arg(long, default_value_t = 4)]
    players: u32,
    /// Number of uncontrolled wandering entities.
    #[arg(long, default_value_t = 32)]
    bots: u32,
    /// Number of ticks to simulate.
    #[arg(long, default_value_t = 300)]
    ticks: u32,
    /// Extra ticks with a frozen world, to let clients converge.
    #[arg(long, default_value_t = 60)]
    settle_ticks: u32,
    /// RNG seed for deterministic results.
    #[arg(long, default_value_t = 1)]
    seed: u64,
    /// Probability that any packet is dropped.
    #[arg(long, default_value_t = 0.1)]
    loss: f32,
    /// Only replicate entities within this distance of the player.
    #[arg(long)]
    radius: Option<f32>,
    /// Broadcast a reliable score event every N ticks.
    #[arg(long, default_value_t = 10)]
    event_every: u32,
    /// Load the sync configuration from a JSON file.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Output directory for the summary.
    #[arg(long, default_value = "captures")]
    out_dir: PathBuf,
    /// Fail if p95 server packet size exceeds this value.
    #[arg(long)]
    max_p95_packet_bytes: Option<u64>,
    /// Fail if average server packet size exceeds this value.
    #[arg(long)]
    max_avg_packet_bytes: Option<u64>,
    /// Fail unless every client matches the server after settling.
    #[arg(long)]
    require_converged: bool,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    let registry = Arc::new(demo_registry().context("build demo registry")?);

    fs::create_dir_all(&cli.out_dir)
        .with_context(|| format!("create output dir {}", cli.out_dir.display()))?;

    let mut server = Server::new(registry.clone(), config.clone()).context("create server")?;
    let server_sizes = Arc::new(Mutex::new(Vec::new()));
    let client_sizes = Arc::new(Mutex::new(Vec::new()));
    let stop_at = Tick::new(cli.ticks);

    for bot in 0..cli.bots {
        let state = spawn_state(&server, cli.seed.wrapping_add(u64::from(bot)))?;
        let entity = server.create_entity(state, wander(cli.seed ^ u64::from(bot), stop_at));
        server.add_entity(entity);
    }

    let mut clients = Vec::new();
    for player in 0..cli.players {
        let seed = cli.seed.wrapping_mul(31).wrapping_add(u64::from(player));
        let (server_end, client_end) = ChannelTransport::pair();
        let server_end = Metered::new(server_end.with_loss(cli.loss, seed), &server_sizes);
        let client_end = Metered::new(client_end.with_loss(cli.loss, !seed), &client_sizes);

        let peer = match cli.radius {
            Some(radius) => server.add_peer_with_scope(
                server_end,
                DistanceEvaluator::new(Origin::Controlled, radius, position),
            ),
            None => server.add_peer(server_end),
        };
        let state = spawn_state(&server, seed)?;
        let entity = server.create_entity(state, steer(stop_at));
        let id = server.add_entity(entity);
        server.grant_control(peer, id);

        let mut client = Client::new(registry.clone(), config.clone()).context("create client")?;
        client.start_room();
        client.set_peer(client_end);
        clients.push(Player {
            client,
            entity: id,
            rng: fastrand::Rng::with_seed(seed),
            events: 0,
        });
    }

    let mut events_sent = 0u32;
    for tick in 0..cli.ticks + cli.settle_ticks {
        if cli.event_every > 0 && tick < cli.ticks && tick % cli.event_every == 0 {
            let points = FieldValue::UInt(u64::from(tick % 65_536));
            let score = Event::new(score_kind(), vec![points]);
            server.broadcast_event(score, Some(Attempts::Forever));
            events_sent += 1;
        }
        server.update();
        for player in &mut clients {
            player.step(tick < cli.ticks)?;
        }
    }

    let mut summary = Summary::new(&cli, events_sent);
    summary.record_packets(&lock(&server_sizes)?, &lock(&client_sizes)?);
    for player in &clients {
        summary.record_client(&server, player);
    }
    summary.finalize();
    info!(
        avg = summary.avg_server_packet_bytes,
        p95 = summary.p95_server_packet_bytes,
        mismatched = summary.mismatched_entities,
        "simulation finished"
    );

    write_summary_json(&cli.out_dir, &summary)?;
    summary.assert_budgets(&cli)?;
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<SyncConfig> {
    let Some(path) = path else {
        return Ok(SyncConfig::default());
    };
    let contents =
        fs::read_to_string(path).with_context(|| format!("read config {}", path.display()))?;
    let config: SyncConfig = serde_json::from_str(&contents)
        .with_context(|| format!("parse config {}", path.display()))?;
    config.validate().context("validate config")?;
    Ok(config)
}

fn player_kind() -> TypeKind {
    TypeKind::new(1).expect("type kind must be non-zero")
}

fn score_kind() -> TypeKind {
    TypeKind::new(1).expect("type kind must be non-zero")
}

fn field_id(id: u16) -> FieldId {
    FieldId::new(id).expect("field id must be non-zero")
}

fn demo_registry() -> Result<Registry> {
    let position = || FieldCodec::fixed_point(POS_MIN, POS_MAX, POS_SCALE);
    let velocity = || FieldCodec::fixed_point(VEL_MIN, VEL_MAX, VEL_SCALE);
    let registry = Registry::builder()
        .state(
            TypeDef::new(player_kind())
                .field(FieldDef::new(field_id(1), position()))
                .field(FieldDef::new(field_id(2), position()))
                .field(FieldDef::new(field_id(3), velocity()))
                .field(FieldDef::new(field_id(4), velocity()))
                .field(FieldDef::new(field_id(5), FieldCodec::uint(12)))
                .field(FieldDef::new(field_id(6), FieldCodec::bool())),
        )
        .event(
            TypeDef::new(score_kind()).field(FieldDef::new(field_id(1), FieldCodec::uint(16))),
        )
        .command(
            TypeDef::new(TypeKind::new(1).expect("type kind must be non-zero"))
                .field(FieldDef::new(field_id(1), velocity()))
                .field(FieldDef::new(field_id(2), velocity())),
        )
        .build()?;
    Ok(registry)
}

fn spawn_state(server: &Server, seed: u64) -> Result<State> {
    let mut rng = fastrand::Rng::with_seed(seed);
    let mut state = server.create_state(player_kind())?;
    state.set(FIELD_POS_X, FieldValue::FixedPoint(rng.i64(POS_MIN / 2..POS_MAX / 2)));
    state.set(FIELD_POS_Y, FieldValue::FixedPoint(rng.i64(POS_MIN / 2..POS_MAX / 2)));
    state.set(FIELD_VEL_X, FieldValue::FixedPoint(rng.i64(VEL_MIN / 4..VEL_MAX / 4)));
    state.set(FIELD_VEL_Y, FieldValue::FixedPoint(rng.i64(VEL_MIN / 4..VEL_MAX / 4)));
    Ok(state)
}

fn quantized(state: &State, index: usize) -> i64 {
    state.get(index).and_then(FieldValue::as_i64).unwrap_or(0)
}

fn position(state: &State) -> Option<Vec3> {
    let scale = POS_SCALE as f32;
    Some(Vec3::new(
        quantized(state, FIELD_POS_X) as f32 / scale,
        quantized(state, FIELD_POS_Y) as f32 / scale,
        0.0,
    ))
}

/// Integrates velocity into position, bouncing off the world bounds.
fn integrate(state: &mut State) {
    for (pos, vel) in [(FIELD_POS_X, FIELD_VEL_X), (FIELD_POS_Y, FIELD_VEL_Y)] {
        let mut v = quantized(state, vel);
        let p = (quantized(state, pos) + v).clamp(POS_MIN, POS_MAX);
        if p == POS_MIN || p == POS_MAX {
            v = -v;
        }
        state.set(pos, FieldValue::FixedPoint(p));
        state.set(vel, FieldValue::FixedPoint(v));
    }
}

fn wander(seed: u64, stop_at: Tick) -> impl FnMut(Tick, &mut State, Option<&Command>) + Send {
    let mut rng = fastrand::Rng::with_seed(seed);
    move |tick: Tick, state: &mut State, _: Option<&Command>| {
        if tick >= stop_at {
            return;
        }
        if rng.u32(..20) == 0 {
            let axis = if rng.bool() { FIELD_VEL_X } else { FIELD_VEL_Y };
            let v = (quantized(state, axis) + rng.i64(-200..=200)).clamp(VEL_MIN, VEL_MAX);
            state.set(axis, FieldValue::FixedPoint(v));
        }
        let yaw = state.get(FIELD_YAW).and_then(FieldValue::as_u64).unwrap_or(0);
        state.set(FIELD_YAW, FieldValue::UInt((yaw + u64::from(rng.u8(..13))) % 4096));
        integrate(state);
    }
}

fn steer(stop_at: Tick) -> impl FnMut(Tick, &mut State, Option<&Command>) + Send {
    move |tick: Tick, state: &mut State, command: Option<&Command>| {
        if tick >= stop_at {
            return;
        }
        if let Some(command) = command {
            state.set(FIELD_VEL_X, command.fields[0]);
            state.set(FIELD_VEL_Y, command.fields[1]);
        }
        integrate(state);
    }
}

/// Records the size of every packet sent through the wrapped transport.
struct Metered<T> {
    inner: T,
    sizes: Arc<Mutex<Vec<u64>>>,
}

impl<T> Metered<T> {
    fn new(inner: T, sizes: &Arc<Mutex<Vec<u64>>>) -> Self {
        Self {
            inner,
            sizes: Arc::clone(sizes),
        }
    }
}

impl<T: Transport> Transport for Metered<T> {
    fn send(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        if let Ok(mut sizes) = self.sizes.lock() {
            sizes.push(payload.len() as u64);
        }
        self.inner.send(payload)
    }

    fn receive(&mut self) -> Option<Vec<u8>> {
        self.inner.receive()
    }

    fn is_connected(&self) -> bool {
        self.inner.is_connected()
    }
}

fn lock(sizes: &Mutex<Vec<u64>>) -> Result<Vec<u64>> {
    sizes
        .lock()
        .map(|sizes| sizes.clone())
        .map_err(|_| anyhow::anyhow!("packet size log poisoned"))
}

struct Player {
    client: Client,
    entity: EntityId,
    rng: fastrand::Rng,
    events: u32,
}

impl Player {
    fn step(&mut self, steering: bool) -> Result<()> {
        let controls = self
            .client
            .room()
            .is_some_and(|room| room.controlled_entities().any(|id| id == self.entity));
        if steering && controls && self.rng.u32(..10) == 0 {
            let mut velocity = || FieldValue::FixedPoint(self.rng.i64(VEL_MIN..=VEL_MAX));
            let fields = vec![velocity(), velocity()];
            self.client
                .set_command(self.entity, fields)
                .context("set player command")?;
        }
        self.client.update();
        for notification in self.client.drain_notifications() {
            if let ClientNotification::EventReceived(_) = notification {
                self.events += 1;
            }
        }
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Summary {
    players: u32,
    bots: u32,
    ticks: u32,
    settle_ticks: u32,
    seed: u64,
    loss: f32,
    radius: Option<f32>,
    server_packets: u64,
    server_bytes_total: u64,
    client_packets: u64,
    client_bytes_total: u64,
    avg_server_packet_bytes: u64,
    p95_server_packet_bytes: u64,
    events_sent: u32,
    min_events_received: u32,
    replicated_entities: u64,
    mismatched_entities: u64,
    #[serde(skip)]
    server_sizes: Vec<u64>,
}

impl Summary {
    fn new(cli: &Cli, events_sent: u32) -> Self {
        Self {
            players: cli.players,
            bots: cli.bots,
            ticks: cli.ticks,
            settle_ticks: cli.settle_ticks,
            seed: cli.seed,
            loss: cli.loss,
            radius: cli.radius,
            server_packets: 0,
            server_bytes_total: 0,
            client_packets: 0,
            client_bytes_total: 0,
            avg_server_packet_bytes: 0,
            p95_server_packet_bytes: 0,
            events_sent,
            min_events_received: u32::MAX,
            replicated_entities: 0,
            mismatched_entities: 0,
            server_sizes: Vec::new(),
        }
    }

    fn record_packets(&mut self, server: &[u64], client: &[u64]) {
        self.server_packets = server.len() as u64;
        self.server_bytes_total = server.iter().sum();
        self.client_packets = client.len() as u64;
        self.client_bytes_total = client.iter().sum();
        self.server_sizes = server.to_vec();
    }

    fn record_client(&mut self, server: &Server, player: &Player) {
        self.min_events_received = self.min_events_received.min(player.events);
        let Some(room) = player.client.room() else {
            return;
        };
        for (id, remote) in room.entities() {
            self.replicated_entities += 1;
            let matches = server
                .room()
                .entity(id)
                .is_some_and(|entity| entity.state() == remote.state());
            if !matches {
                self.mismatched_entities += 1;
            }
        }
    }

    fn finalize(&mut self) {
        if self.min_events_received == u32::MAX {
            self.min_events_received = 0;
        }
        if self.server_sizes.is_empty() {
            return;
        }
        self.avg_server_packet_bytes = self.server_bytes_total / self.server_packets;
        self.server_sizes.sort_unstable();
        let idx = ((self.server_sizes.len() as f64) * 0.95).ceil() as usize;
        let idx = idx.saturating_sub(1).min(self.server_sizes.len() - 1);
        self.p95_server_packet_bytes = self.server_sizes[idx];
    }

    fn assert_budgets(&self, cli: &Cli) -> Result<()> {
        if let Some(max_p95) = cli.max_p95_packet_bytes {
            if self.p95_server_packet_bytes > max_p95 {
                anyhow::bail!(
                    "p95 server packet bytes {} exceeds budget {}",
                    self.p95_server_packet_bytes,
                    max_p95
                );
            }
        }
        if let Some(max_avg) = cli.max_avg_packet_bytes {
            if self.avg_server_packet_bytes > max_avg {
                anyhow::bail!(
                    "avg server packet bytes {} exceeds budget {}",
                    self.avg_server_packet_bytes,
                    max_avg
                );
            }
        }
        if cli.require_converged {
            if self.mismatched_entities > 0 {
                anyhow::bail!(
                    "{} of {} replicated entities differ from the server",
                    self.mismatched_entities,
                    self.replicated_entities
                );
            }
            if self.min_events_received != self.events_sent {
                anyhow::bail!(
                    "a client received {} of {} reliable events",
                    self.min_events_received,
                    self.events_sent
                );
            }
        }
        Ok(())
    }
}

fn write_summary_json(out_dir: &Path, summary: &Summary) -> Result<()> {
    let path = out_dir.join("summary.json");
    let contents = serde_json::to_string_pretty(summary).context("serialize summary")?;
    fs::write(&path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}
