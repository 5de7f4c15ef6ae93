//! Server assembly: the accept loop, the tick driver, and the
//! background heartbeat/housekeeping tasks.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use volley_identity::IdentityStore;
use volley_protocol::ServerEvent;
use volley_room::advance_room;
use volley_tick::{TickConfig, TickScheduler};
use volley_transport::{Transport, WebSocketTransport};

use crate::handler::handle_connection;
use crate::{events, now_ms, ServerState, VolleyConfig, VolleyError};

/// Interval between server heartbeats.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
/// Interval between housekeeping sweeps (store pruning, invite expiry,
/// audit flush).
const HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(10);

/// Builder for a [`VolleyServer`].
pub struct VolleyServerBuilder {
    config: VolleyConfig,
}

impl VolleyServerBuilder {
    pub fn new() -> Self {
        Self { config: VolleyConfig::default() }
    }

    pub fn config(mut self, config: VolleyConfig) -> Self {
        self.config = config.validated();
        self
    }

    /// Binds the transport and assembles the server around the given
    /// identity store.
    pub async fn build<I: IdentityStore>(
        self,
        identity: I,
    ) -> Result<VolleyServer<I>, VolleyError> {
        let transport =
            WebSocketTransport::bind(&self.config.bind_addr()).await?;
        let state = Arc::new(ServerState::new(self.config, identity)?);
        Ok(VolleyServer { transport, state })
    }
}

impl Default for VolleyServerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// The assembled game server.
pub struct VolleyServer<I: IdentityStore> {
    transport: WebSocketTransport,
    state: Arc<ServerState<I>>,
}

impl<I: IdentityStore> VolleyServer<I> {
    pub fn builder() -> VolleyServerBuilder {
        VolleyServerBuilder::new()
    }

    /// The shared state, for tools and tests.
    pub fn state(&self) -> Arc<ServerState<I>> {
        Arc::clone(&self.state)
    }

    pub fn local_addr(&self) -> std::io::Result<std::net::SocketAddr> {
        self.transport.local_addr()
    }

    /// Runs until ctrl-c: accepts connections, drives the simulation,
    /// heartbeats, and housekeeping. Shutdown stops accepting and
    /// flushes the audit streams.
    pub async fn run(mut self) -> Result<(), VolleyError> {
        let tick = spawn_tick_driver(Arc::clone(&self.state));
        let heartbeat = spawn_heartbeat(Arc::clone(&self.state));
        let housekeeping = spawn_housekeeping(Arc::clone(&self.state));

        tracing::info!(
            tick_rate = self.state.config.tick_rate_hz,
            mode = ?self.state.config.guard.mode,
            "volley server running"
        );

        loop {
            tokio::select! {
                accepted = self.transport.accept() => match accepted {
                    Ok(conn) => {
                        let state = Arc::clone(&self.state);
                        tokio::spawn(handle_connection(conn, state));
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "accept failed");
                    }
                },
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("shutdown requested");
                    break;
                }
            }
        }

        tick.abort();
        heartbeat.abort();
        housekeeping.abort();
        let _ = self.transport.shutdown().await;
        self.state.audit.flush();
        tracing::info!("volley server stopped");
        Ok(())
    }
}

impl<I: IdentityStore> ServerState<I> {
    /// Advances every active room by one tick and settles matches that
    /// ended on it. The driver task calls this at the fixed rate; tests
    /// call it directly with a synthetic clock.
    pub async fn advance_all_rooms(&self, now: u64, dt: f64) {
        let mut rooms = self.rooms.lock().await;
        let mut ended = Vec::new();
        for code in rooms.room_codes() {
            let Some(room) = rooms.get_mut(&code) else { continue };
            if !room.status.is_active() {
                continue;
            }
            let output =
                advance_room(room, now, dt, self.config.snapshot_interval_ms);
            self.deliver(output.events);
            if let Some(report) = output.ended {
                ended.push((code, report));
            }
        }
        for (code, report) in ended {
            events::lobby::settle_match_end(self, &mut rooms, &code, report, now);
        }
    }
}

/// The global simulation driver: one fixed-rate loop advancing every
/// active room, then settling any matches that ended this tick.
fn spawn_tick_driver<I: IdentityStore>(
    state: Arc<ServerState<I>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut scheduler = TickScheduler::new(TickConfig::with_rate(
            state.config.tick_rate_hz,
        ));
        loop {
            let info = scheduler.wait_for_tick().await;
            state.advance_all_rooms(now_ms(), info.dt.as_secs_f64()).await;
            scheduler.record_tick_end();
        }
    })
}

fn spawn_heartbeat<I: IdentityStore>(
    state: Arc<ServerState<I>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HEARTBEAT_INTERVAL);
        loop {
            interval.tick().await;
            state
                .gateway
                .broadcast_all(ServerEvent::Heartbeat { t: now_ms() });
        }
    })
}

/// Periodic pruning of rolling-window stores plus party-invite expiry
/// and audit flushing.
fn spawn_housekeeping<I: IdentityStore>(
    state: Arc<ServerState<I>>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(HOUSEKEEPING_INTERVAL);
        loop {
            interval.tick().await;
            let now = now_ms();

            state.lock(&state.limiter).prune(now);
            state.lock(&state.handshakes).prune(now);
            state.lock(&state.reconnects).prune(now);
            state.lock(&state.results).prune(now);

            let expired = state.lock(&state.party).take_expired(now);
            for invite in expired {
                let event = ServerEvent::PartyInviteExpired {
                    invite_id: invite.invite_id.clone(),
                };
                state
                    .gateway
                    .emit_profile(&invite.to_profile_id, event.clone());
                state
                    .gateway
                    .emit_profile(&invite.from_profile_id, event);
            }

            state.audit.flush();
        }
    })
}
